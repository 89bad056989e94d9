//! Waiting for a subscriber fleet's ready endpoint before publishing.
use mqbench_core::{READY_MAX_RETRIES, READY_RETRY_DELAY, READY_TIMEOUT};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("gave up after {attempts} attempts, last error: {last}")]
    Exhausted { attempts: usize, last: String },

    #[error("no confirmation within {0:?}")]
    Timeout(Duration),
}

/// Retry schedule for [`wait_for_peer`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub delay: Duration,
    /// Bound on all attempts together.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: READY_MAX_RETRIES,
            delay: READY_RETRY_DELAY,
            timeout: READY_TIMEOUT,
        }
    }
}

/// Poll `url` until it answers with a success status.
///
/// Transport errors and non-success statuses are both retried.
pub async fn wait_for_peer(url: &Url, policy: RetryPolicy) -> Result<(), ReadinessError> {
    info!("Waiting for subscriber at {url} to start.");
    let client = reqwest::Client::new();

    let attempts = async {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let last = match client.get(url.clone()).send().await {
                Ok(res) if res.status().is_success() => return Ok(()),
                Ok(res) => format!("status {}", res.status()),
                Err(err) => err.to_string(),
            };
            debug!("Subscriber not ready ({last}), attempt {attempts}");

            if attempts > policy.max_retries {
                return Err(ReadinessError::Exhausted { attempts, last });
            }
            tokio::time::sleep(policy.delay).await;
        }
    };

    tokio::time::timeout(policy.timeout, attempts)
        .await
        .map_err(|_| ReadinessError::Timeout(policy.timeout))?
}
