use crate::readiness::ReadinessError;
use crate::server::ServerError;
use crate::telemetry::TelemetryError;
use mqbench::RunError;
use mqbench_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Did not get the ready confirmation from subscriber in time: {0}")]
    Readiness(#[from] ReadinessError),

    #[error("Error publishing test results: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Ready endpoint failed: {0}")]
    Server(#[from] ServerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error serializing report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[cfg(feature = "metrics")]
    #[error("Error installing metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}
