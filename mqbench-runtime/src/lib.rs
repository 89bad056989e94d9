//! Command line runtime for mqbench: the MQTT session, the subscriber ready endpoint, result
//! reporting and the telemetry upload.
pub mod cli;
pub mod mqtt;
pub mod readiness;
pub mod report;
pub mod runtime;
pub mod server;
pub mod telemetry;

mod error;

pub use crate::cli::BenchCli;
pub use crate::error::RuntimeError;
pub use crate::runtime::BenchRuntime;
