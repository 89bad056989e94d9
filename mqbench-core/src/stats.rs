use crate::{Mode, RunConfig};
#[cfg(feature = "rt")]
use serde::{Deserialize, Serialize};

/// Identifiers and fleet parameters of a run, copied verbatim into the [`TotalResult`].
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub run_id: String,
    pub instance: String,
    pub mode: Mode,
    pub clients: usize,
    pub topics: usize,
    pub messages: u64,
    pub message_size: usize,
    pub qos: u8,
    pub parallelism: usize,
}

impl RunMetadata {
    pub fn new(config: &RunConfig, instance: impl Into<String>) -> Self {
        Self {
            run_id: config.run_id.clone(),
            instance: instance.into(),
            mode: config.mode,
            clients: config.clients,
            topics: config.topics,
            messages: config.count,
            message_size: config.payload_size,
            qos: config.qos.into(),
            parallelism: config.parallelism,
        }
    }
}

/// Fleet-wide aggregation of every client's result.
///
/// Cross-client standard deviations are left at `0.` unless more than one client reported.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "rt", derive(Serialize, Deserialize))]
pub struct TotalResult {
    pub run_id: String,
    #[cfg_attr(feature = "rt", serde(rename = "run_instance"))]
    pub instance: String,
    #[cfg_attr(feature = "rt", serde(rename = "run_type"))]
    pub mode: Mode,
    #[cfg_attr(feature = "rt", serde(rename = "num_clients"))]
    pub clients: usize,
    #[cfg_attr(feature = "rt", serde(rename = "num_topics"))]
    pub topics: usize,
    #[cfg_attr(feature = "rt", serde(rename = "num_messages"))]
    pub messages: u64,
    pub message_size: usize,
    #[cfg_attr(feature = "rt", serde(rename = "dop"))]
    pub parallelism: usize,
    pub qos: u8,
    pub ratio: f64,
    pub successes: u64,
    pub failures: u64,
    pub total_run_time: f64,

    pub client_run_time_min: f64,
    pub client_run_time_max: f64,
    pub client_run_time_mean: f64,
    pub client_run_time_std: f64,

    pub msg_per_client_min: f64,
    pub msg_per_client_max: f64,
    pub msg_per_client_mean: f64,
    pub msg_per_client_std: f64,

    pub msg_time_min: f64,
    pub msg_time_max: f64,
    #[cfg_attr(feature = "rt", serde(rename = "msg_time_mean_mean"))]
    pub msg_time_mean: f64,
    #[cfg_attr(feature = "rt", serde(rename = "msg_time_mean_std"))]
    pub msg_time_std: f64,

    /// Sum of all successes divided by the total wall-clock run time.
    #[cfg_attr(feature = "rt", serde(rename = "total_msgs_per_sec"))]
    pub total_msgs_per_sec: f64,

    /// Mean of every client's own successes over its own run time.
    #[cfg_attr(feature = "rt", serde(rename = "avg_msgs_per_sec"))]
    pub avg_msgs_per_sec: f64,
}
