//! In-process broker for exercising the workers without a network.
//!
//! A [`MockBroker`] keeps a registry of subscriptions and routes every publish to the matching
//! subscribers, so publisher and subscriber fleets can run against each other. Each
//! [`MockConnector`] carries a [`Behavior`] for injecting latency and failures.
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use mqbench_core::{
    handshake, BrokerSession, ConnectOptions, Connector, Deliveries, Delivery, Link, Message, Qos,
    SessionError, TopicFilter,
};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

/// Per-subscription buffer. Deliveries beyond it are dropped, like a broker shedding a slow
/// consumer.
pub const DELIVERY_BUFFER: usize = 4096;

#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Time between connecting and the broker accepting the session.
    pub connect_delay: Duration,
    /// Time each publish takes to be acknowledged.
    pub publish_latency: Duration,
    /// Every nth publish of a session is rejected.
    pub fail_publish_every: Option<u64>,
    /// Publishes beyond this rate per session are rejected.
    pub max_publish_rate: Option<NonZeroU32>,
    /// Fail `connect` outright.
    pub refuse_connect: bool,
    /// Accept the connection but fail the handshake.
    pub reject_handshake: bool,
    pub fail_subscribe: bool,
    /// Report a lost connection this long after the handshake. The session keeps working
    /// afterwards, as if the client reconnected.
    pub drop_connection_after: Option<Duration>,
}

#[derive(Debug)]
struct Subscription {
    session: u64,
    filter: String,
    tx: mpsc::Sender<Delivery>,
}

#[derive(Debug, Default)]
struct Inner {
    subscriptions: Mutex<Vec<Subscription>>,
    published: Mutex<HashMap<String, u64>>,
    connections: Mutex<Vec<ConnectOptions>>,
    next_session: AtomicU64,
    changed: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct MockBroker {
    inner: Arc<Inner>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self, behavior: Behavior) -> MockConnector {
        MockConnector {
            broker: self.clone(),
            behavior,
        }
    }

    /// Route a message to every matching subscriber, as if another client had published it.
    pub fn deliver(&self, topic: &str, qos: Qos, payload: &[u8]) {
        self.route(topic, || Ok(Message::received(topic, qos)));
        debug!("MOCK BROKER ___ {} bytes to {topic}", payload.len());
    }

    /// Push a receive error to every matching subscriber.
    pub fn deliver_error(&self, topic: &str, reason: &str) {
        self.route(topic, || Err(SessionError::Delivery(reason.to_string())));
    }

    /// Messages accepted from publishers on `topic`.
    pub fn published(&self, topic: &str) -> u64 {
        let published = self.inner.published.lock().unwrap();
        published.get(topic).copied().unwrap_or(0)
    }

    pub fn total_published(&self) -> u64 {
        self.inner.published.lock().unwrap().values().sum()
    }

    /// Number of sessions with at least one filter matching `topic`.
    pub fn subscribers(&self, topic: &str) -> usize {
        let subs = self.inner.subscriptions.lock().unwrap();
        let mut sessions: Vec<u64> = subs
            .iter()
            .filter(|sub| topic_matches(&sub.filter, topic))
            .map(|sub| sub.session)
            .collect();
        sessions.sort_unstable();
        sessions.dedup();
        sessions.len()
    }

    pub async fn wait_for_subscribers(&self, topic: &str, count: usize) {
        loop {
            let changed = self.inner.changed.notified();
            if self.subscribers(topic) >= count {
                return;
            }
            changed.await;
        }
    }

    /// Options of every accepted `connect`, in order.
    pub fn connections(&self) -> Vec<ConnectOptions> {
        self.inner.connections.lock().unwrap().clone()
    }

    fn route(&self, topic: &str, make: impl Fn() -> Delivery) {
        let subs = self.inner.subscriptions.lock().unwrap();
        let mut reached: Vec<u64> = vec![];
        for sub in subs.iter() {
            if !topic_matches(&sub.filter, topic) || reached.contains(&sub.session) {
                continue;
            }
            reached.push(sub.session);
            if sub.tx.try_send(make()).is_err() {
                debug!("MOCK BROKER ___ DROPPED for session {}", sub.session);
            }
        }
    }

    fn record_publish(&self, topic: &str, qos: Qos, payload: &[u8]) {
        counter!("mock-broker.publishes").increment(1);
        *self
            .inner
            .published
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default() += 1;
        self.deliver(topic, qos, payload);
    }

    fn subscribe(&self, session: u64, filters: &[TopicFilter]) -> Deliveries {
        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);
        {
            let mut subs = self.inner.subscriptions.lock().unwrap();
            subs.extend(filters.iter().map(|f| Subscription {
                session,
                filter: f.filter.clone(),
                tx: tx.clone(),
            }));
        }
        self.inner.changed.notify_waiters();
        rx
    }

    fn unsubscribe(&self, session: u64, filters: Option<&[TopicFilter]>) {
        {
            let mut subs = self.inner.subscriptions.lock().unwrap();
            subs.retain(|sub| {
                let listed = match filters {
                    Some(filters) => filters.iter().any(|f| f.filter == sub.filter),
                    None => true,
                };
                !(sub.session == session && listed)
            });
        }
        self.inner.changed.notify_waiters();
    }
}

/// MQTT topic filter matching. `+` matches one level, a trailing `#` matches the rest.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');
    for part in filter.split('/') {
        match (part, levels.next()) {
            ("#", _) => return true,
            ("+", Some(_)) => {}
            (part, Some(level)) if part == level => {}
            _ => return false,
        }
    }
    levels.next().is_none()
}

#[derive(Debug, Clone)]
pub struct MockConnector {
    broker: MockBroker,
    behavior: Behavior,
}

impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self, options: ConnectOptions) -> Result<Link<MockSession>, SessionError> {
        if self.behavior.refuse_connect {
            return Err(SessionError::Connect("connection refused".to_string()));
        }

        let id = self.broker.inner.next_session.fetch_add(1, Ordering::Relaxed);
        self.broker
            .inner
            .connections
            .lock()
            .unwrap()
            .push(options);

        let (notifier, connected) = handshake();
        let (lost_tx, lost) = mpsc::unbounded_channel();
        let behavior = self.behavior.clone();
        tokio::spawn(async move {
            tokio::time::sleep(behavior.connect_delay).await;
            if behavior.reject_handshake {
                notifier.failed(SessionError::Connect("not authorized".to_string()));
                return;
            }
            notifier.connected();

            if let Some(after) = behavior.drop_connection_after {
                tokio::time::sleep(after).await;
                let _ = lost_tx.send(SessionError::ConnectionLost(
                    "connection reset by peer".to_string(),
                ));
            }
        });

        let limiter = self
            .behavior
            .max_publish_rate
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));

        Ok(Link {
            session: MockSession {
                id,
                broker: self.broker.clone(),
                behavior: self.behavior.clone(),
                limiter,
                publishes: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            },
            connected,
            lost,
        })
    }
}

pub struct MockSession {
    id: u64,
    broker: MockBroker,
    behavior: Behavior,
    limiter: Option<DefaultDirectRateLimiter>,
    publishes: AtomicU64,
    closed: AtomicBool,
}

impl BrokerSession for MockSession {
    async fn publish(&self, topic: &str, qos: Qos, payload: &[u8]) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(SessionError::Closed);
        }

        tokio::time::sleep(self.behavior.publish_latency).await;
        let n = self.publishes.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(every) = self.behavior.fail_publish_every {
            if n % every == 0 {
                return Err(SessionError::Publish("broker rejected message".to_string()));
            }
        }

        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                debug!("MOCK BROKER ___ ERR");
                return Err(SessionError::Publish("quota exceeded".to_string()));
            }
        }

        self.broker.record_publish(topic, qos, payload);
        Ok(())
    }

    async fn subscribe(&self, filters: &[TopicFilter]) -> Result<Deliveries, SessionError> {
        if self.behavior.fail_subscribe {
            return Err(SessionError::Subscribe("not authorized".to_string()));
        }
        Ok(self.broker.subscribe(self.id, filters))
    }

    async fn unsubscribe(&self, filters: &[TopicFilter]) -> Result<(), SessionError> {
        self.broker.unsubscribe(self.id, Some(filters));
        Ok(())
    }

    async fn disconnect(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.broker.unsubscribe(self.id, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards() {
        assert!(topic_matches("/test0", "/test0"));
        assert!(!topic_matches("/test0", "/test1"));
        assert!(topic_matches("/+", "/test1"));
        assert!(topic_matches("#", "/a/b/c"));
        assert!(topic_matches("/a/#", "/a/b/c"));
        assert!(!topic_matches("/a/+", "/a/b/c"));
        assert!(!topic_matches("/a/b/c", "/a/b"));
    }

    #[tokio::test(start_paused = true)]
    async fn publish_reaches_subscriber() {
        let broker = MockBroker::new();
        let connector = broker.connector(Behavior::default());

        let options = |id: &str| ConnectOptions {
            url: "tcp://localhost:1883".to_string(),
            client_id: id.to_string(),
            credentials: None,
            error_policy: Default::default(),
            connect_timeout: Duration::from_secs(1),
        };

        let sub = connector.connect(options("sub")).await.unwrap();
        sub.connected.wait().await.unwrap();
        let mut rx = sub
            .session
            .subscribe(&[TopicFilter::new("/+", Qos::AtMostOnce)])
            .await
            .unwrap();
        assert_eq!(broker.subscribers("/test0"), 1);

        let publ = connector.connect(options("pub")).await.unwrap();
        publ.session
            .publish("/test0", Qos::AtMostOnce, b"hi")
            .await
            .unwrap();
        assert_eq!(broker.published("/test0"), 1);

        let msg = rx.recv().await.unwrap().unwrap();
        assert_eq!(msg.topic, "/test0");

        sub.session.disconnect().await;
        assert_eq!(broker.subscribers("/test0"), 0);
        assert_eq!(broker.connections().len(), 2);
    }
}
