use crate::Qos;
#[cfg(feature = "rt")]
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// A single message moving through a worker.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub qos: Qos,
    pub payload: Vec<u8>,
    pub sent_at: Option<Instant>,
    pub delivered_at: Option<Instant>,
    pub failed: bool,
}

impl Message {
    /// A zero-filled outgoing message of `size` bytes.
    pub fn new(topic: &str, qos: Qos, size: usize) -> Self {
        Self {
            topic: topic.to_string(),
            qos,
            payload: vec![0; size],
            sent_at: None,
            delivered_at: None,
            failed: false,
        }
    }

    /// A message observed by a subscriber. Only topic and QoS are known.
    pub fn received(topic: impl Into<String>, qos: Qos) -> Self {
        Self {
            topic: topic.into(),
            qos,
            payload: Vec::new(),
            sent_at: None,
            delivered_at: None,
            failed: false,
        }
    }

    /// Send-to-ack time, if the message was delivered.
    pub fn latency(&self) -> Option<Duration> {
        match (self.sent_at, self.delivered_at) {
            (Some(sent), Some(delivered)) if !self.failed => Some(delivered - sent),
            _ => None,
        }
    }
}

/// Which condition ended a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "rt", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "rt", serde(rename_all = "snake_case"))]
pub enum StopReason {
    /// All expected messages were published or received.
    Completed,
    /// The test duration elapsed.
    Duration,
    /// No message arrived within the idle timeout.
    Idle,
    /// The worker could not run at all (recoverable error policy only).
    Failed,
}

/// Terminal record of one publisher or subscriber.
///
/// Latency figures are in milliseconds and only populated by publishers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "rt", derive(Serialize, Deserialize))]
pub struct ClientResult {
    #[cfg_attr(feature = "rt", serde(rename = "id"))]
    pub client_id: String,
    pub successes: u64,
    pub failures: u64,
    /// Seconds of useful run time.
    pub run_time: f64,
    pub msg_time_min: f64,
    pub msg_time_max: f64,
    pub msg_time_mean: f64,
    pub msg_time_std: f64,
    pub stop_reason: StopReason,
}

impl ClientResult {
    pub fn new(client_id: &str, stop_reason: StopReason) -> Self {
        Self {
            client_id: client_id.to_string(),
            successes: 0,
            failures: 0,
            run_time: 0.,
            msg_time_min: 0.,
            msg_time_max: 0.,
            msg_time_mean: 0.,
            msg_time_std: 0.,
            stop_reason,
        }
    }

    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Successful messages per second of this client's own run time.
    pub fn msgs_per_sec(&self) -> f64 {
        if self.run_time > 0. {
            self.successes as f64 / self.run_time
        } else {
            0.
        }
    }
}
