use mqbench_core::{ConfigError, SessionError};
use thiserror::Error;

/// A session-level failure that ended a worker before it could report.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("CLIENT {client_id} had error connecting to the broker: {source}")]
    Connect {
        client_id: String,
        source: SessionError,
    },

    #[error("CLIENT {client_id} lost connection to the broker: {source}")]
    ConnectionLost {
        client_id: String,
        source: SessionError,
    },

    #[error("CLIENT {client_id} error subscribing: {source}")]
    Subscribe {
        client_id: String,
        source: SessionError,
    },

    #[error("CLIENT {client_id} error publishing to {topic}: {source}")]
    Publish {
        client_id: String,
        topic: String,
        source: SessionError,
    },
}

impl WorkerError {
    pub fn client_id(&self) -> &str {
        match self {
            WorkerError::Connect { client_id, .. }
            | WorkerError::ConnectionLost { client_id, .. }
            | WorkerError::Subscribe { client_id, .. }
            | WorkerError::Publish { client_id, .. } => client_id,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AggregateError {
    #[error("No client results to aggregate")]
    NoResults,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Run aborted: {0}")]
    Aborted(#[from] WorkerError),

    #[error("Result channel closed before every client reported.")]
    ChannelClosed,

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}
