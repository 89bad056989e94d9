use crate::report::OutputFormat;
use crate::telemetry::{TelemetryConfig, TelemetryMode};
use clap::Parser;
use mqbench_core::{
    ConfigError, ErrorPolicy, Mode, Qos, RunConfig, CLIENT_ID_PREFIX, DEFAULT_BROKER_URL,
    DEFAULT_CLIENTS, DEFAULT_PAYLOAD_SIZE, DEFAULT_READY_PORT, DEFAULT_TOPIC_PREFIX,
};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Load generator and latency benchmark for MQTT brokers.
#[derive(Parser, Debug, Clone)]
#[command(name = "mqbench", version)]
pub struct BenchCli {
    /// Run the fleet as publishers.
    #[arg(long = "pub")]
    pub publish: bool,

    /// Run the fleet as subscribers.
    #[arg(long = "sub")]
    pub subscribe: bool,

    /// Broker endpoint as scheme://host:port.
    #[arg(long, default_value = DEFAULT_BROKER_URL)]
    pub broker: String,

    /// Topic prefix; the topic index is appended.
    #[arg(long, default_value = DEFAULT_TOPIC_PREFIX)]
    pub topic: String,

    #[arg(long, default_value_t = 1)]
    pub topics: usize,

    #[arg(long, default_value_t = 1)]
    pub qos: u8,

    /// Payload size in bytes.
    #[arg(long, default_value_t = DEFAULT_PAYLOAD_SIZE)]
    pub size: usize,

    /// Messages to send or receive per client. 0 runs for --duration instead.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub count: i64,

    /// Maximum duration of the test.
    #[arg(long, default_value = "60m", value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// Max idle time between incoming messages.
    #[arg(long, alias = "idletimeout", default_value = "30s", value_parser = humantime::parse_duration)]
    pub idle_timeout: Duration,

    #[arg(long, default_value_t = DEFAULT_CLIENTS)]
    pub clients: usize,

    /// Max number of worker threads.
    #[arg(long, default_value_t = 1)]
    pub dop: usize,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    /// Test run id used for reporting. Random if not set.
    #[arg(long, alias = "runId")]
    pub run_id: Option<String>,

    /// Ready endpoint of a subscriber fleet to wait for before publishing.
    #[arg(long, alias = "waitFor")]
    pub wait_for: Option<Url>,

    /// Fail the whole run on any connection or protocol error.
    #[arg(long)]
    pub panic: bool,

    /// Only log warnings and errors.
    #[arg(long)]
    pub quiet: bool,

    /// Per-client publish rate in messages per second.
    #[arg(long)]
    pub rate: Option<NonZeroU32>,

    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub connect_timeout: Duration,

    /// Port of the ready endpoint in subscriber mode.
    #[arg(long, default_value_t = DEFAULT_READY_PORT)]
    pub ready_port: u16,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also write the JSON report to this file.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Instance name reported with the results.
    #[arg(long, env = "HOSTNAME", default_value = "localhost")]
    pub instance: String,

    #[arg(long, value_enum, default_value_t = TelemetryMode::BestEffort)]
    pub telemetry: TelemetryMode,

    #[arg(long, env = "LOGANALYTICS_CUSTOMER_ID", hide_env_values = true)]
    pub customer_id: Option<String>,

    #[arg(long, env = "LOGANALYTICS_SHARED_KEY", hide_env_values = true)]
    pub shared_key: Option<String>,

    #[arg(long, env = "LOGANALYTICS_LOG_NAME")]
    pub log_type: Option<String>,
}

impl BenchCli {
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        let mode = Mode::from_flags(self.publish, self.subscribe)?;
        let count = u64::try_from(self.count).map_err(|_| ConfigError::NegativeCount(self.count))?;

        let mut config = RunConfig::new(mode);
        config.run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        config.broker_url = self.broker.clone();
        config.username = self.username.clone();
        config.password = self.password.clone();
        config.topic_prefix = self.topic.clone();
        config.topics = self.topics;
        config.qos = Qos::try_from(self.qos)?;
        config.payload_size = self.size;
        config.count = count;
        config.duration = self.duration;
        config.idle_timeout = self.idle_timeout;
        config.clients = self.clients;
        config.parallelism = self.dop;
        config.rate = self.rate;
        config.error_policy = if self.panic {
            ErrorPolicy::Abort
        } else {
            ErrorPolicy::Reconnect
        };
        config.connect_timeout = self.connect_timeout;
        // Unique per process so several instances can share a broker.
        config.client_id_prefix = format!(
            "{CLIENT_ID_PREFIX}-{}",
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );

        config.validate()?;
        Ok(config)
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            mode: self.telemetry,
            customer_id: self.customer_id.clone(),
            shared_key: self.shared_key.clone(),
            log_type: self.log_type.clone(),
        }
    }

    /// Default log filter, `RUST_LOG` takes precedence.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            "mqbench=warn,mqbench_runtime=warn"
        } else {
            "mqbench=info,mqbench_runtime=info"
        }
    }
}
