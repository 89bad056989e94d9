use crate::{
    CLIENT_ID_PREFIX, DEFAULT_BROKER_URL, DEFAULT_CLIENTS, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_DURATION, DEFAULT_IDLE_TIMEOUT, DEFAULT_PAYLOAD_SIZE, DEFAULT_TOPIC_PREFIX,
};
#[cfg(feature = "rt")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid arguments: must specify either pub or sub mode")]
    Mode,

    #[error("Invalid arguments: number of clients should be >= 1, given: {0}")]
    Clients(usize),

    #[error("Invalid arguments: topics count should be >= 1, given: {0}")]
    Topics(usize),

    #[error("Invalid arguments: messages count should be >= 0, given: {0}")]
    NegativeCount(i64),

    #[error("Invalid arguments: QoS must be 0, 1 or 2, given: {0}")]
    Qos(u8),

    #[error("Invalid arguments: parallelism should be >= 1, given: {0}")]
    Parallelism(usize),
}

/// Whether the fleet publishes or subscribes. A single run is never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "rt", derive(Serialize, Deserialize))]
pub enum Mode {
    #[cfg_attr(feature = "rt", serde(rename = "pub"))]
    Publish,
    #[cfg_attr(feature = "rt", serde(rename = "sub"))]
    Subscribe,
}

impl Mode {
    /// Resolve the mutually exclusive `pub`/`sub` switches.
    pub fn from_flags(publish: bool, subscribe: bool) -> Result<Self, ConfigError> {
        match (publish, subscribe) {
            (true, false) => Ok(Mode::Publish),
            (false, true) => Ok(Mode::Subscribe),
            _ => Err(ConfigError::Mode),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Publish => write!(f, "pub"),
            Mode::Subscribe => write!(f, "sub"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qos {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for Qos {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(ConfigError::Qos(other)),
        }
    }
}

impl From<Qos> for u8 {
    fn from(qos: Qos) -> u8 {
        qos as u8
    }
}

/// What happens when a broker session fails mid-run.
///
/// The policy is chosen once per run and applied to every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the failure and let the session reconnect. Message-level errors only show up in the
    /// failure counters.
    #[default]
    Reconnect,
    /// Any connection, subscribe or publish error fails the whole run with no report.
    Abort,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Reconnect => write!(f, "reconnect"),
            ErrorPolicy::Abort => write!(f, "abort"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub run_id: String,
    pub mode: Mode,
    pub broker_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub topics: usize,
    pub qos: Qos,
    pub payload_size: usize,
    /// Messages per client; `0` means unbounded and the run is governed by `duration`.
    pub count: u64,
    pub duration: Duration,
    pub idle_timeout: Duration,
    pub clients: usize,
    pub parallelism: usize,
    /// Optional per-client publish rate in messages per second.
    pub rate: Option<NonZeroU32>,
    pub error_policy: ErrorPolicy,
    pub connect_timeout: Duration,
    pub client_id_prefix: String,
}

impl RunConfig {
    pub fn new(mode: Mode) -> Self {
        Self {
            run_id: String::new(),
            mode,
            broker_url: DEFAULT_BROKER_URL.to_string(),
            username: None,
            password: None,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            topics: 1,
            qos: Qos::AtLeastOnce,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            count: 0,
            duration: DEFAULT_DURATION,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            clients: DEFAULT_CLIENTS,
            parallelism: 1,
            rate: None,
            error_policy: ErrorPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            client_id_prefix: CLIENT_ID_PREFIX.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clients < 1 {
            return Err(ConfigError::Clients(self.clients));
        }

        if self.topics < 1 {
            return Err(ConfigError::Topics(self.topics));
        }

        if self.parallelism < 1 {
            return Err(ConfigError::Parallelism(self.parallelism));
        }

        Ok(())
    }

    /// Connection parameters for one worker. Credentials are only sent when both halves are
    /// present.
    pub fn connect_options(&self, client_id: &str) -> ConnectOptions {
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.clone(), pass.clone()))
            }
            _ => None,
        };

        ConnectOptions {
            url: self.broker_url.clone(),
            client_id: format!("{}-{}", self.client_id_prefix, client_id),
            credentials,
            error_policy: self.error_policy,
            connect_timeout: self.connect_timeout,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub url: String,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub error_policy: ErrorPolicy,
    pub connect_timeout: Duration,
}
