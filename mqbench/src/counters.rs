//! Live counters exported through the `metrics` facade (requires the `metrics` feature).
#![cfg_attr(not(feature = "metrics"), allow(unused_variables))]

pub(crate) const ROLE_PUB: &str = "pub";
pub(crate) const ROLE_SUB: &str = "sub";

pub(crate) fn record_success(role: &'static str) {
    #[cfg(feature = "metrics")]
    metrics::counter!("mqbench_messages_total", "role" => role, "outcome" => "success")
        .increment(1);
}

pub(crate) fn record_failure(role: &'static str) {
    #[cfg(feature = "metrics")]
    metrics::counter!("mqbench_messages_total", "role" => role, "outcome" => "failure")
        .increment(1);
}

pub(crate) fn record_latency(millis: f64) {
    #[cfg(feature = "metrics")]
    metrics::histogram!("mqbench_publish_latency_ms").record(millis);
}

/// Register descriptions once per run.
pub(crate) fn describe() {
    #[cfg(feature = "metrics")]
    {
        metrics::describe_counter!(
            "mqbench_messages_total",
            "Terminal message outcomes by role and outcome"
        );
        metrics::describe_histogram!(
            "mqbench_publish_latency_ms",
            metrics::Unit::Milliseconds,
            "Publish to acknowledgement latency"
        );
    }
}
