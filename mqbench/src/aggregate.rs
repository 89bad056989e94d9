//! Reduction of per-client results into the fleet-level report.
use crate::error::AggregateError;
use mqbench_core::{ClientResult, RunMetadata, TotalResult};
use std::time::Duration;

/// Min/max/mean/standard deviation of a set of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Distribution {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl Distribution {
    /// Summarize `values`. The sample standard deviation is only computed when `with_std` is set
    /// and there is more than one value, otherwise it stays `0.`. An empty slice is all zeroes.
    pub fn of(values: &[f64], with_std: bool) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = statistical::mean(values);
        let std = if with_std && values.len() > 1 {
            statistical::standard_deviation(values, Some(mean))
        } else {
            0.
        };

        Self {
            min,
            max,
            mean,
            std,
        }
    }
}

/// Combine every client's result into one [`TotalResult`].
///
/// `total_elapsed` is the orchestrator's own wall-clock for the run and is the denominator of
/// the fleet throughput; the per-client average rate uses each client's own run time instead.
pub fn aggregate(
    results: &[ClientResult],
    total_elapsed: Duration,
    meta: &RunMetadata,
) -> Result<TotalResult, AggregateError> {
    if results.is_empty() {
        return Err(AggregateError::NoResults);
    }

    let successes: u64 = results.iter().map(|r| r.successes).sum();
    let failures: u64 = results.iter().map(|r| r.failures).sum();
    let total_run_time = total_elapsed.as_secs_f64();

    let run_times: Vec<f64> = results.iter().map(|r| r.run_time).collect();
    let msgs_per_client: Vec<f64> = results.iter().map(|r| r.total() as f64).collect();
    let msg_time_means: Vec<f64> = results.iter().map(|r| r.msg_time_mean).collect();
    let msgs_per_sec: Vec<f64> = results.iter().map(ClientResult::msgs_per_sec).collect();

    let with_std = results.len() > 1;
    let run_time = Distribution::of(&run_times, with_std);
    let per_client = Distribution::of(&msgs_per_client, with_std);
    let msg_time = Distribution::of(&msg_time_means, with_std);

    Ok(TotalResult {
        run_id: meta.run_id.clone(),
        instance: meta.instance.clone(),
        mode: meta.mode,
        clients: meta.clients,
        topics: meta.topics,
        messages: meta.messages,
        message_size: meta.message_size,
        parallelism: meta.parallelism,
        qos: meta.qos,
        ratio: ratio(successes, failures),
        successes,
        failures,
        total_run_time,

        client_run_time_min: run_time.min,
        client_run_time_max: run_time.max,
        client_run_time_mean: run_time.mean,
        client_run_time_std: run_time.std,

        msg_per_client_min: per_client.min,
        msg_per_client_max: per_client.max,
        msg_per_client_mean: per_client.mean,
        msg_per_client_std: per_client.std,

        msg_time_min: msg_time.min,
        msg_time_max: msg_time.max,
        msg_time_mean: msg_time.mean,
        msg_time_std: msg_time.std,

        total_msgs_per_sec: if total_run_time > 0. {
            successes as f64 / total_run_time
        } else {
            0.
        },
        avg_msgs_per_sec: statistical::mean(&msgs_per_sec),
    })
}

fn ratio(successes: u64, failures: u64) -> f64 {
    let total = successes + failures;
    if total == 0 {
        0.
    } else {
        successes as f64 / total as f64
    }
}
