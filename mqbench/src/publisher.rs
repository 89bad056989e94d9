//! Publisher worker.
//!
//! A generator task produces messages and a publish task pushes them through the broker session,
//! one at a time. Both are joined by capacity-1 channels so a slow broker stalls the generator
//! instead of letting messages pile up. The worker's own loop collects the published messages
//! and races them against the test duration.
use crate::aggregate::Distribution;
use crate::connect::{self, Session};
use crate::counters::{self, ROLE_PUB};
use crate::error::WorkerError;
use crate::timer::Deadline;
use crate::topics::publisher_topic;
use governor::{Quota, RateLimiter};
use mqbench_core::{
    BrokerSession, ClientResult, Connector, ErrorPolicy, Message, Qos, RunConfig, SessionError,
    StopReason,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

pub struct Publisher<C> {
    client_id: String,
    topic: String,
    config: Arc<RunConfig>,
    connector: Arc<C>,
}

/// A message after its publish attempt.
struct Published {
    message: Message,
    error: Option<SessionError>,
}

impl<C: Connector> Publisher<C> {
    pub fn new(id: usize, config: Arc<RunConfig>, connector: Arc<C>) -> Self {
        Self {
            client_id: format!("pub-{id}"),
            topic: publisher_topic(&config.topic_prefix, id, config.topics),
            config,
            connector,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Run until every message is published or the test duration elapses.
    ///
    /// Errors are only returned for failures that end the worker: a connection that never came
    /// up, or (under [`ErrorPolicy::Abort`]) a lost connection or failed publish.
    #[instrument(name = "publisher", skip_all, fields(client = %self.client_id))]
    pub async fn run(self) -> Result<ClientResult, WorkerError> {
        let config = &self.config;

        let (gen_tx, gen_rx) = mpsc::channel(1);
        let generator = tokio::spawn(
            generate(
                self.topic.clone(),
                config.qos,
                config.payload_size,
                config.count,
                config.rate,
                gen_tx,
            )
            .in_current_span(),
        );

        let Session { session, mut lost } =
            match connect::open(self.connector.as_ref(), config, &self.client_id).await {
                Ok(session) => session,
                Err(source) => {
                    generator.abort();
                    return Err(WorkerError::Connect {
                        client_id: self.client_id.clone(),
                        source,
                    });
                }
            };
        let connected_at = Instant::now();
        info!(
            "CLIENT {} is connected to the broker {} and topic {}",
            self.client_id, config.broker_url, self.topic
        );

        let session = Arc::new(session);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let publisher = tokio::spawn(
            publish_messages(session.clone(), gen_rx, out_tx).in_current_span(),
        );

        let mut duration = Deadline::after(config.duration);
        let mut samples = LatencySamples::with_capacity(config.count);

        let outcome = loop {
            tokio::select! {
                biased;

                Some(error) = lost.recv() => match config.error_policy {
                    ErrorPolicy::Abort => {
                        break Err(WorkerError::ConnectionLost {
                            client_id: self.client_id.clone(),
                            source: error,
                        });
                    }
                    ErrorPolicy::Reconnect => {
                        warn!("CLIENT {} {error}. Waiting for reconnect.", self.client_id);
                    }
                },

                published = out_rx.recv() => match published {
                    Some(Published { message, error: None }) => samples.record(&message),
                    Some(Published { message, error: Some(error) }) => {
                        samples.record(&message);
                        if config.error_policy == ErrorPolicy::Abort {
                            break Err(WorkerError::Publish {
                                client_id: self.client_id.clone(),
                                topic: message.topic,
                                source: error,
                            });
                        }
                    }
                    None => {
                        info!("CLIENT {} is done publishing", self.client_id);
                        break Ok(StopReason::Completed);
                    }
                },

                _ = duration.fired() => {
                    info!("CLIENT {} test duration is over: {:?}", self.client_id, config.duration);
                    break Ok(StopReason::Duration);
                }
            }
        };

        generator.abort();
        publisher.abort();
        session.disconnect().await;

        let stop_reason = outcome?;
        Ok(samples.into_result(&self.client_id, connected_at.elapsed(), stop_reason))
    }
}

async fn generate(
    topic: String,
    qos: Qos,
    size: usize,
    count: u64,
    rate: Option<NonZeroU32>,
    tx: mpsc::Sender<Message>,
) {
    let limiter = rate.map(|rate| RateLimiter::direct(Quota::per_second(rate)));

    let mut produced = 0u64;
    while count == 0 || produced < count {
        if let Some(limiter) = &limiter {
            limiter.until_ready().await;
        }

        if tx.send(Message::new(&topic, qos, size)).await.is_err() {
            break;
        }
        produced += 1;
    }

    trace!("Generated {produced} messages");
}

async fn publish_messages<S: BrokerSession>(
    session: Arc<S>,
    mut rx: mpsc::Receiver<Message>,
    tx: mpsc::Sender<Published>,
) {
    while let Some(mut message) = rx.recv().await {
        message.sent_at = Some(Instant::now());
        let res = session
            .publish(&message.topic, message.qos, &message.payload)
            .await;

        let error = match res {
            Ok(()) => {
                message.delivered_at = Some(Instant::now());
                None
            }
            Err(error) => {
                error!("Error sending message to {}: {error}", message.topic);
                message.failed = true;
                Some(error)
            }
        };

        if tx.send(Published { message, error }).await.is_err() {
            break;
        }
    }
}

/// Outcome counters and successful latencies of one publisher, in milliseconds.
#[derive(Debug, Default)]
pub(crate) struct LatencySamples {
    successes: u64,
    failures: u64,
    times: Vec<f64>,
}

// Caps the up-front allocation for large or unbounded counts.
const MAX_PREALLOCATED_SAMPLES: u64 = 1 << 16;

impl LatencySamples {
    fn with_capacity(count: u64) -> Self {
        Self {
            times: Vec::with_capacity(count.min(MAX_PREALLOCATED_SAMPLES) as usize),
            ..Default::default()
        }
    }

    pub fn record(&mut self, message: &Message) {
        match message.latency() {
            Some(latency) => {
                let millis = latency.as_secs_f64() * 1_000.;
                self.successes += 1;
                self.times.push(millis);
                counters::record_success(ROLE_PUB);
                counters::record_latency(millis);
            }
            None => {
                self.failures += 1;
                counters::record_failure(ROLE_PUB);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn into_result(
        self,
        client_id: &str,
        run_time: Duration,
        stop_reason: StopReason,
    ) -> ClientResult {
        let latency = Distribution::of(&self.times, true);
        ClientResult {
            successes: self.successes,
            failures: self.failures,
            run_time: run_time.as_secs_f64(),
            msg_time_min: latency.min,
            msg_time_max: latency.max,
            msg_time_mean: latency.mean,
            msg_time_std: latency.std,
            ..ClientResult::new(client_id, stop_reason)
        }
    }
}
