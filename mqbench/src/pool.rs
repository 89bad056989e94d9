//! Fleet orchestration.
//!
//! A [`ClientPool`] spawns one worker per client, waits for all of them, applies the run's
//! [`ErrorPolicy`] to the ones that failed and measures the fleet's own wall-clock.
use crate::aggregate::aggregate;
use crate::counters;
use crate::error::{RunError, WorkerError};
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use mqbench_core::{
    ClientResult, Connector, ErrorPolicy, Mode, RunConfig, RunMetadata, StopReason, TotalResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

pub struct ClientPool<C> {
    config: Arc<RunConfig>,
    connector: Arc<C>,
    started: Option<oneshot::Sender<()>>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct PoolRun {
    /// One entry per client, in completion order.
    pub results: Vec<ClientResult>,
    /// Fleet wall-clock, with the trailing idle wait removed for subscriber fleets that stopped
    /// on it.
    pub elapsed: Duration,
}

impl PoolRun {
    pub fn aggregate(&self, meta: &RunMetadata) -> Result<TotalResult, RunError> {
        Ok(aggregate(&self.results, self.elapsed, meta)?)
    }
}

impl<C: Connector> ClientPool<C> {
    pub fn new(config: RunConfig, connector: C) -> Self {
        Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
            started: None,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Notified once every worker has been spawned.
    pub fn on_started(mut self, tx: oneshot::Sender<()>) -> Self {
        self.started = Some(tx);
        self
    }

    #[instrument(name = "pool", skip_all, fields(run_id = %self.config.run_id, mode = %self.config.mode))]
    pub async fn run(self) -> Result<PoolRun, RunError> {
        let config = self.config;
        config.validate()?;
        counters::describe();

        info!(
            "Starting {} {} clients against {}",
            config.clients, config.mode, config.broker_url
        );

        let start = Instant::now();
        let (tx, rx) = async_channel::bounded(config.clients);
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(config.clients);

        for id in 0..config.clients {
            let tx = tx.clone();
            let config = config.clone();
            let connector = self.connector.clone();

            let handle = tokio::spawn(
                async move {
                    let res = match config.mode {
                        Mode::Publish => Publisher::new(id, config, connector).run().await,
                        Mode::Subscribe => Subscriber::new(id, config, connector).run().await,
                    };
                    // Receiver only goes away when the run was aborted.
                    let _ = tx.send(res).await;
                }
                .in_current_span(),
            );
            handles.push(handle);
        }
        drop(tx);

        info!("All clients have started.");
        if let Some(started) = self.started {
            let _ = started.send(());
        }

        let mut results = Vec::with_capacity(config.clients);
        while results.len() < config.clients {
            let res = rx.recv().await.map_err(|_| RunError::ChannelClosed)?;
            match handle_outcome(res, config.error_policy) {
                Ok(result) => results.push(result),
                Err(err) => {
                    error!("{err}");
                    for handle in &handles {
                        handle.abort();
                    }
                    return Err(err.into());
                }
            }
        }
        info!("All clients have finished.");

        let mut elapsed = start.elapsed();
        if config.mode == Mode::Subscribe
            && results.iter().any(|r| r.stop_reason == StopReason::Idle)
        {
            elapsed = elapsed.saturating_sub(config.idle_timeout);
        }

        Ok(PoolRun { results, elapsed })
    }
}

/// Apply the error policy to one worker's outcome. Under [`ErrorPolicy::Reconnect`] a failed
/// worker is recorded as an empty result instead of failing the run.
fn handle_outcome(
    res: Result<ClientResult, WorkerError>,
    policy: ErrorPolicy,
) -> Result<ClientResult, WorkerError> {
    match (res, policy) {
        (Ok(result), _) => Ok(result),
        (Err(err), ErrorPolicy::Abort) => Err(err),
        (Err(err), ErrorPolicy::Reconnect) => {
            warn!("{err}");
            Ok(ClientResult::new(err.client_id(), StopReason::Failed))
        }
    }
}
