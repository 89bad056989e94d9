//! Contract between the workers and whatever speaks the broker's wire protocol.
//!
//! A [`Connector`] starts a session and hands back a [`Link`]: the session itself, a single-fire
//! [`Connected`] handshake that resolves once the session is live, and a channel on which the
//! session reports lost connections.
use crate::{ConnectOptions, Message, Qos};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("Error connecting to the broker: {0}")]
    Connect(String),

    #[error("Timed out connecting to the broker after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Lost connection to the broker: {0}")]
    ConnectionLost(String),

    #[error("Error publishing message: {0}")]
    Publish(String),

    #[error("Error subscribing to topics: {0}")]
    Subscribe(String),

    #[error("Error receiving message: {0}")]
    Delivery(String),

    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),

    #[error("Session closed")]
    Closed,
}

/// One delivered message, or the error the session hit while receiving it.
pub type Delivery = Result<Message, SessionError>;

/// Stream of deliveries for a subscription. Closes when the session disconnects.
pub type Deliveries = mpsc::Receiver<Delivery>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicFilter {
    pub filter: String,
    pub qos: Qos,
}

impl TopicFilter {
    pub fn new(filter: impl Into<String>, qos: Qos) -> Self {
        Self {
            filter: filter.into(),
            qos,
        }
    }
}

/// Create the two halves of a connection handshake.
pub fn handshake() -> (ConnectNotifier, Connected) {
    let (tx, rx) = oneshot::channel();
    (ConnectNotifier(tx), Connected(rx))
}

/// Session side of the handshake. Consumed on use, so it can only fire once.
#[derive(Debug)]
pub struct ConnectNotifier(oneshot::Sender<Result<(), SessionError>>);

impl ConnectNotifier {
    pub fn connected(self) {
        // The worker may have given up waiting already.
        let _ = self.0.send(Ok(()));
    }

    pub fn failed(self, error: SessionError) {
        let _ = self.0.send(Err(error));
    }
}

/// Worker side of the handshake.
#[derive(Debug)]
pub struct Connected(oneshot::Receiver<Result<(), SessionError>>);

impl Connected {
    /// Resolves once the session is live. A session dropped before connecting yields
    /// [`SessionError::Closed`].
    pub async fn wait(self) -> Result<(), SessionError> {
        match self.0.await {
            Ok(res) => res,
            Err(_) => Err(SessionError::Closed),
        }
    }

    /// Like [`Connected::wait`] but bounded by `limit`.
    pub async fn wait_timeout(self, limit: Duration) -> Result<(), SessionError> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(res) => res,
            Err(_) => Err(SessionError::ConnectTimeout(limit)),
        }
    }
}

/// A freshly started session.
pub struct Link<S> {
    pub session: S,
    pub connected: Connected,
    /// Connection losses observed after the handshake.
    pub lost: mpsc::UnboundedReceiver<SessionError>,
}

pub trait BrokerSession: Send + Sync + 'static {
    /// Publish one message, resolving once the broker acknowledged it at the requested QoS.
    fn publish(
        &self,
        topic: &str,
        qos: Qos,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    fn subscribe(
        &self,
        filters: &[TopicFilter],
    ) -> impl Future<Output = Result<Deliveries, SessionError>> + Send;

    fn unsubscribe(
        &self,
        filters: &[TopicFilter],
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}

pub trait Connector: Send + Sync + 'static {
    type Session: BrokerSession;

    fn connect(
        &self,
        options: ConnectOptions,
    ) -> impl Future<Output = Result<Link<Self::Session>, SessionError>> + Send;
}
