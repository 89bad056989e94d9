//! MQTT sessions backed by `rumqttc`.
//!
//! `rumqttc` splits a connection into an [`AsyncClient`] that queues requests and an
//! [`EventLoop`] that has to be polled to make progress. Each session spawns a task that drives
//! the event loop and translates its events back to the worker: the connect handshake,
//! acknowledgements of outstanding publishes, deliveries and connection losses.
use mqbench_core::{
    handshake, BrokerSession, ConnectNotifier, ConnectOptions, Connector, Deliveries, Delivery,
    ErrorPolicy, Link, Message, Qos, SessionError, TopicFilter, DEFAULT_MQTT_PORT,
};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeFilter, SubscribeReasonCode,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};
use url::Url;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 64;
/// Largest packet MQTT can express.
const MAX_PACKET_SIZE: usize = 268_435_455;
const DELIVERY_BUFFER: usize = 10_000;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type Ack = oneshot::Sender<Result<(), SessionError>>;

/// Opens MQTT sessions over plain TCP.
#[derive(Debug, Clone, Default)]
pub struct MqttConnector;

impl MqttConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Split a `scheme://host:port` broker URL. A missing port defaults to 1883.
pub fn broker_address(broker: &str) -> Result<(String, u16), SessionError> {
    let url = Url::parse(broker).map_err(|e| SessionError::InvalidUrl(format!("{broker}: {e}")))?;

    match url.scheme() {
        "tcp" | "mqtt" => {}
        other => {
            return Err(SessionError::InvalidUrl(format!(
                "{broker}: unsupported scheme {other}"
            )))
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| SessionError::InvalidUrl(format!("{broker}: missing host")))?;
    Ok((host.to_string(), url.port().unwrap_or(DEFAULT_MQTT_PORT)))
}

pub fn to_mqtt_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

pub fn from_mqtt_qos(qos: QoS) -> Qos {
    match qos {
        QoS::AtMostOnce => Qos::AtMostOnce,
        QoS::AtLeastOnce => Qos::AtLeastOnce,
        QoS::ExactlyOnce => Qos::ExactlyOnce,
    }
}

impl Connector for MqttConnector {
    type Session = MqttSession;

    async fn connect(&self, options: ConnectOptions) -> Result<Link<MqttSession>, SessionError> {
        let (host, port) = broker_address(&options.url)?;

        let mut mqtt = MqttOptions::new(options.client_id.clone(), host, port);
        mqtt.set_keep_alive(KEEP_ALIVE)
            .set_clean_session(true)
            .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        if let Some((username, password)) = &options.credentials {
            mqtt.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqtt, REQUEST_CAPACITY);
        let (notifier, connected) = handshake();
        let (lost_tx, lost) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let driver = EventDriver {
            client: client.clone(),
            shared: shared.clone(),
            policy: options.error_policy,
            notifier: Some(notifier),
            lost: lost_tx,
        };
        let task = tokio::spawn(driver.run(eventloop).in_current_span());

        Ok(Link {
            session: MqttSession {
                client,
                shared,
                task,
            },
            connected,
            lost,
        })
    }
}

/// State shared between a session and its event loop task.
#[derive(Default)]
struct Shared {
    /// Publishes queued on the client but not yet written, in request order.
    queued: Mutex<VecDeque<(QoS, Ack)>>,
    /// Written QoS 1/2 publishes waiting for PUBACK/PUBCOMP, by packet id.
    inflight: Mutex<HashMap<u16, Ack>>,
    subscription: Mutex<Option<Subscription>>,
    suback: Mutex<Option<Ack>>,
}

struct Subscription {
    filters: Vec<SubscribeFilter>,
    tx: mpsc::Sender<Delivery>,
}

impl Shared {
    async fn fail_pending(&self, error: SessionError) {
        for (_, ack) in self.queued.lock().await.drain(..) {
            let _ = ack.send(Err(error.clone()));
        }
        for (_, ack) in self.inflight.lock().await.drain() {
            let _ = ack.send(Err(error.clone()));
        }
        if let Some(ack) = self.suback.lock().await.take() {
            let _ = ack.send(Err(error.clone()));
        }
    }

    async fn complete(&self, pkid: u16) {
        if let Some(ack) = self.inflight.lock().await.remove(&pkid) {
            let _ = ack.send(Ok(()));
        }
    }
}

struct EventDriver {
    client: AsyncClient,
    shared: Arc<Shared>,
    policy: ErrorPolicy,
    notifier: Option<ConnectNotifier>,
    lost: mpsc::UnboundedSender<SessionError>,
}

impl EventDriver {
    async fn run(mut self, mut eventloop: EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(packet)) => {
                    if !self.incoming(packet).await {
                        break;
                    }
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => self.written(pkid).await,
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("Disconnected");
                    break;
                }
                Ok(Event::Outgoing(_)) => {}
                Err(err) => {
                    // Never connected: the handshake carries the error in every policy.
                    if let Some(notifier) = self.notifier.take() {
                        notifier.failed(SessionError::Connect(err.to_string()));
                        break;
                    }

                    let error = SessionError::ConnectionLost(err.to_string());
                    let _ = self.lost.send(error.clone());
                    if self.policy == ErrorPolicy::Abort {
                        self.shared.fail_pending(error).await;
                        break;
                    }
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }

        self.shared.fail_pending(SessionError::Closed).await;
        // Closes the delivery channel.
        self.shared.subscription.lock().await.take();
    }

    /// Returns `false` once the session cannot continue.
    async fn incoming(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::ConnAck(ack) if ack.code != ConnectReturnCode::Success => {
                let error = SessionError::Connect(format!("{:?}", ack.code));
                match self.notifier.take() {
                    Some(notifier) => notifier.failed(error),
                    None => {
                        let _ = self.lost.send(error);
                    }
                }
                false
            }
            Packet::ConnAck(ack) => {
                match self.notifier.take() {
                    Some(notifier) => notifier.connected(),
                    None if !ack.session_present => self.resubscribe().await,
                    None => debug!("Reconnected with existing session"),
                }
                true
            }
            Packet::Publish(publish) => {
                let tx = self
                    .shared
                    .subscription
                    .lock()
                    .await
                    .as_ref()
                    .map(|sub| sub.tx.clone());
                if let Some(tx) = tx {
                    let message = Message::received(publish.topic, from_mqtt_qos(publish.qos));
                    let _ = tx.send(Ok(message)).await;
                }
                true
            }
            Packet::PubAck(ack) => {
                self.shared.complete(ack.pkid).await;
                true
            }
            Packet::PubComp(comp) => {
                self.shared.complete(comp.pkid).await;
                true
            }
            Packet::SubAck(ack) => {
                let res = if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    Err(SessionError::Subscribe("rejected by broker".to_string()))
                } else {
                    Ok(())
                };
                if let Some(ack) = self.shared.suback.lock().await.take() {
                    let _ = ack.send(res);
                }
                true
            }
            _ => true,
        }
    }

    /// A publish left the client. QoS 0 is done, higher levels wait for the broker.
    async fn written(&self, pkid: u16) {
        if pkid != 0 && self.shared.inflight.lock().await.contains_key(&pkid) {
            trace!("Retransmitted publish {pkid}");
            return;
        }

        let Some((qos, ack)) = self.shared.queued.lock().await.pop_front() else {
            return;
        };
        match qos {
            QoS::AtMostOnce => {
                let _ = ack.send(Ok(()));
            }
            QoS::AtLeastOnce | QoS::ExactlyOnce => {
                self.shared.inflight.lock().await.insert(pkid, ack);
            }
        }
    }

    async fn resubscribe(&self) {
        let filters = match self.shared.subscription.lock().await.as_ref() {
            Some(sub) => sub.filters.clone(),
            None => return,
        };
        info!("Reconnected, restoring {} subscriptions", filters.len());
        if let Err(err) = self.client.try_subscribe_many(filters) {
            warn!("Error restoring subscriptions: {err}");
        }
    }
}

pub struct MqttSession {
    client: AsyncClient,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl BrokerSession for MqttSession {
    async fn publish(&self, topic: &str, qos: Qos, payload: &[u8]) -> Result<(), SessionError> {
        let qos = to_mqtt_qos(qos);
        let (tx, rx) = oneshot::channel();
        {
            // Held across the request so queue order matches the order packets are written.
            let mut queued = self.shared.queued.lock().await;
            queued.push_back((qos, tx));
            if let Err(err) = self.client.try_publish(topic, qos, false, payload.to_vec()) {
                queued.pop_back();
                return Err(SessionError::Publish(err.to_string()));
            }
        }

        match rx.await {
            Ok(res) => res.map_err(|err| match err {
                SessionError::Publish(_) => err,
                other => SessionError::Publish(other.to_string()),
            }),
            Err(_) => Err(SessionError::Closed),
        }
    }

    async fn subscribe(&self, filters: &[TopicFilter]) -> Result<Deliveries, SessionError> {
        let filters: Vec<SubscribeFilter> = filters
            .iter()
            .map(|f| SubscribeFilter::new(f.filter.clone(), to_mqtt_qos(f.qos)))
            .collect();
        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);
        *self.shared.subscription.lock().await = Some(Subscription {
            filters: filters.clone(),
            tx,
        });

        let (ack_tx, ack_rx) = oneshot::channel();
        *self.shared.suback.lock().await = Some(ack_tx);
        self.client
            .subscribe_many(filters)
            .await
            .map_err(|err| SessionError::Subscribe(err.to_string()))?;

        match ack_rx.await {
            Ok(Ok(())) => Ok(rx),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(SessionError::Closed),
        }
    }

    async fn unsubscribe(&self, filters: &[TopicFilter]) -> Result<(), SessionError> {
        for filter in filters {
            self.client
                .unsubscribe(filter.filter.clone())
                .await
                .map_err(|err| SessionError::Subscribe(err.to_string()))?;
        }
        self.shared.subscription.lock().await.take();
        Ok(())
    }

    async fn disconnect(&self) {
        if let Err(err) = self.client.disconnect().await {
            debug!("Disconnect request not delivered: {err}");
            self.task.abort();
        }
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}
