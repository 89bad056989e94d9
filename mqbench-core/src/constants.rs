use std::time::Duration;

pub const DEFAULT_BROKER_URL: &str = "tcp://localhost:1883";

pub const DEFAULT_MQTT_PORT: u16 = 1883;

pub const DEFAULT_TOPIC_PREFIX: &str = "/test";

pub const DEFAULT_PAYLOAD_SIZE: usize = 100;

pub const DEFAULT_CLIENTS: usize = 10;

/// Maximum length of a test when no message count bounds it.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60 * 60);

/// The default max gap between incoming messages before a subscriber gives up.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub const CLIENT_ID_PREFIX: &str = "mqtt-benchmark";

/// Port of the subscriber readiness endpoint.
pub const DEFAULT_READY_PORT: u16 = 8080;

pub const READY_MAX_RETRIES: usize = 30;

pub const READY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Overall window for all readiness retries.
pub const READY_TIMEOUT: Duration = Duration::from_secs(60);
