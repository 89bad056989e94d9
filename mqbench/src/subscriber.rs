//! Subscriber worker.
//!
//! Message bookkeeping and the stop conditions live in [`SubscriberTracker`], which is driven by
//! discrete [`Event`]s and has no notion of time or I/O. [`Subscriber::run`] feeds it from the
//! broker session and the two timers.
use crate::connect::{self, Session};
use crate::counters::{self, ROLE_SUB};
use crate::error::WorkerError;
use crate::timer::Deadline;
use crate::topics::subscriber_topics;
use mqbench_core::{
    BrokerSession, ClientResult, Connector, ErrorPolicy, RunConfig, StopReason, TopicFilter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Lifecycle of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Connecting,
    Subscribed,
    /// The test duration is over. Waiting for in-flight messages until the idle timer fires.
    Draining,
    Stopped(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Connected,
    Received,
    ReceiveFailed,
    DurationElapsed,
    IdleElapsed,
}

/// What the worker loop should do after an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// (Re)start the idle timer.
    ArmIdle,
    Stop(StopReason),
}

#[derive(Debug)]
pub struct SubscriberTracker {
    expected: u64,
    successes: u64,
    failures: u64,
    state: SubscriberState,
}

impl SubscriberTracker {
    /// `expected` of `0` means the subscriber only stops on its timers.
    pub fn new(expected: u64) -> Self {
        Self {
            expected,
            successes: 0,
            failures: 0,
            state: SubscriberState::Connecting,
        }
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn handle(&mut self, event: Event) -> Action {
        if let SubscriberState::Stopped(_) = self.state {
            return Action::None;
        }

        match event {
            Event::Connected => {
                self.state = SubscriberState::Subscribed;
                Action::None
            }
            Event::Received => {
                self.successes += 1;
                if self.expected > 0 && self.successes >= self.expected {
                    self.stop(StopReason::Completed)
                } else {
                    Action::ArmIdle
                }
            }
            Event::ReceiveFailed => {
                self.failures += 1;
                Action::None
            }
            Event::DurationElapsed => {
                self.state = SubscriberState::Draining;
                Action::ArmIdle
            }
            Event::IdleElapsed => self.stop(StopReason::Idle),
        }
    }

    fn stop(&mut self, reason: StopReason) -> Action {
        self.state = SubscriberState::Stopped(reason);
        Action::Stop(reason)
    }
}

pub struct Subscriber<C> {
    client_id: String,
    filters: Vec<TopicFilter>,
    config: Arc<RunConfig>,
    connector: Arc<C>,
}

impl<C: Connector> Subscriber<C> {
    pub fn new(id: usize, config: Arc<RunConfig>, connector: Arc<C>) -> Self {
        let filters = subscriber_topics(&config.topic_prefix, id, config.clients, config.topics)
            .into_iter()
            .map(|topic| TopicFilter::new(topic, config.qos))
            .collect();

        Self {
            client_id: format!("sub-{id}"),
            filters,
            config,
            connector,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn filters(&self) -> &[TopicFilter] {
        &self.filters
    }

    /// Receive until the expected count arrives, or the broker goes quiet for the idle timeout.
    ///
    /// The idle timer only starts with the first message, so a subscriber that never hears
    /// anything runs until the test duration is over and then waits one more idle period.
    #[instrument(name = "subscriber", skip_all, fields(client = %self.client_id))]
    pub async fn run(self) -> Result<ClientResult, WorkerError> {
        let config = &self.config;
        let mut tracker = SubscriberTracker::new(config.count);

        let Session { session, mut lost } =
            connect::open(self.connector.as_ref(), config, &self.client_id)
                .await
                .map_err(|source| WorkerError::Connect {
                    client_id: self.client_id.clone(),
                    source,
                })?;
        let connected_at = Instant::now();
        tracker.handle(Event::Connected);

        let topics: Vec<&str> = self.filters.iter().map(|f| f.filter.as_str()).collect();
        info!(
            "CLIENT {} is connected to the broker {} and topics {:?}",
            self.client_id, config.broker_url, topics
        );

        let mut deliveries = match session.subscribe(&self.filters).await {
            Ok(deliveries) => Some(deliveries),
            Err(source) if config.error_policy == ErrorPolicy::Abort => {
                session.disconnect().await;
                return Err(WorkerError::Subscribe {
                    client_id: self.client_id.clone(),
                    source,
                });
            }
            Err(source) => {
                error!("CLIENT {} error subscribing: {source}", self.client_id);
                None
            }
        };

        let mut duration = Deadline::after(config.duration);
        let mut idle = Deadline::disarmed();

        let outcome = loop {
            let action = tokio::select! {
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
                        Action::None
                    }
                },

                delivery = recv(&mut deliveries) => match delivery {
                    Some(Ok(message)) => {
                        trace!("Received message on {}", message.topic);
                        counters::record_success(ROLE_SUB);
                        tracker.handle(Event::Received)
                    }
                    Some(Err(error)) => {
                        warn!("CLIENT {} {error}", self.client_id);
                        counters::record_failure(ROLE_SUB);
                        tracker.handle(Event::ReceiveFailed)
                    }
                    None => {
                        debug!("Delivery channel closed");
                        deliveries = None;
                        Action::None
                    }
                },

                _ = duration.fired() => {
                    info!("CLIENT {} test duration is over: {:?}", self.client_id, config.duration);
                    tracker.handle(Event::DurationElapsed)
                }

                _ = idle.fired() => {
                    info!("CLIENT {} idle for {:?}", self.client_id, config.idle_timeout);
                    tracker.handle(Event::IdleElapsed)
                }
            };

            match action {
                Action::None => {}
                Action::ArmIdle => idle.arm(config.idle_timeout),
                Action::Stop(reason) => break Ok(reason),
            }
        };

        if let Ok(StopReason::Completed) = outcome {
            info!(
                "CLIENT {} received {} messages",
                self.client_id,
                tracker.successes()
            );
            if let Err(error) = session.unsubscribe(&self.filters).await {
                warn!("CLIENT {} error unsubscribing: {error}", self.client_id);
            }
        }
        session.disconnect().await;

        let stop_reason = outcome?;
        let mut run_time = connected_at.elapsed();
        if stop_reason == StopReason::Idle {
            run_time = active_time(run_time, config.idle_timeout);
        }

        Ok(ClientResult {
            successes: tracker.successes(),
            failures: tracker.failures(),
            run_time: run_time.as_secs_f64(),
            ..ClientResult::new(&self.client_id, stop_reason)
        })
    }
}

/// Next delivery, or pending forever once there is no subscription.
async fn recv(
    deliveries: &mut Option<mqbench_core::Deliveries>,
) -> Option<mqbench_core::Delivery> {
    match deliveries {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run time with the trailing idle wait removed.
pub(crate) fn active_time(elapsed: Duration, idle_timeout: Duration) -> Duration {
    elapsed.saturating_sub(idle_timeout)
}
