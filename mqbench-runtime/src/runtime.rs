//! Default mqbench runtime.
//!
//! Drives one run end to end: waits for the subscriber fleet if asked to, exposes the ready
//! endpoint for subscriber fleets, runs the client pool against an MQTT broker and reports the
//! results.
use crate::{
    cli::BenchCli,
    error::RuntimeError,
    mqtt::MqttConnector,
    readiness::{wait_for_peer, RetryPolicy},
    report::{OutputFormat, Report},
    server::{self, Readiness},
    telemetry::{TelemetryConfig, TelemetrySink},
};
use clap::Parser;
use mqbench::prelude::*;
use mqbench_core::DEFAULT_READY_PORT;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn, Instrument};
use url::Url;

/// # Example
///
/// ```ignore
/// use mqbench_runtime::BenchRuntime;
///
/// #[tokio::main]
/// async fn main() {
///     BenchRuntime::new()
///         .with_args()
///         .unwrap()
///         .run()
///         .await
///         .unwrap();
/// }
/// ```
pub struct BenchRuntime {
    config: RunConfig,
    instance: String,
    wait_for: Option<Url>,
    ready_port: u16,
    ready_listener: Option<TcpListener>,
    metrics_addr: Option<SocketAddr>,
    format: OutputFormat,
    output: Option<PathBuf>,
    telemetry: TelemetryConfig,
}

impl Default for BenchRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchRuntime {
    pub fn new() -> Self {
        Self {
            config: RunConfig::new(Mode::Publish),
            instance: "localhost".to_string(),
            wait_for: None,
            ready_port: DEFAULT_READY_PORT,
            ready_listener: None,
            metrics_addr: None,
            format: OutputFormat::default(),
            output: None,
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Configure from the command line arguments.
    pub fn with_args(self) -> Result<Self, RuntimeError> {
        self.with_cli(&BenchCli::parse())
    }

    pub fn with_cli(mut self, cli: &BenchCli) -> Result<Self, RuntimeError> {
        self.config = cli.run_config()?;
        self.instance = cli.instance.clone();
        self.wait_for = cli.wait_for.clone();
        self.ready_port = cli.ready_port;
        self.metrics_addr = cli.metrics_addr;
        self.format = cli.format;
        self.output = cli.output.clone();
        self.telemetry = cli.telemetry();
        Ok(self)
    }

    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn ready_port(mut self, port: u16) -> Self {
        self.ready_port = port;
        self
    }

    /// Serve the ready endpoint on an already bound listener instead of `ready_port`.
    pub fn ready_listener(mut self, listener: TcpListener) -> Self {
        self.ready_listener = Some(listener);
        self
    }

    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn worker_threads(&self) -> usize {
        self.config.parallelism.max(1)
    }

    /// Run against the configured MQTT broker and print the report to stdout.
    pub async fn run(self) -> Result<Report, RuntimeError> {
        self.run_with(MqttConnector::new()).await
    }

    #[instrument(name = "mqbench", skip_all, fields(run_id = %self.config.run_id))]
    pub async fn run_with<C: Connector>(self, connector: C) -> Result<Report, RuntimeError> {
        // Required telemetry without credentials fails before any client starts.
        let sink = TelemetrySink::new(self.telemetry)?;
        self.config.validate()?;

        if let Some(addr) = self.metrics_addr {
            install_exporter(addr)?;
        }

        if let (Mode::Publish, Some(url)) = (self.config.mode, &self.wait_for) {
            wait_for_peer(url, RetryPolicy::default()).await?;
        }

        let (started_tx, started_rx) = oneshot::channel();
        let ready = Readiness::default();
        if self.config.mode == Mode::Subscribe {
            let listener = match self.ready_listener {
                Some(listener) => listener,
                None => server::bind(self.ready_port).await?,
            };
            let ready = ready.clone();
            tokio::spawn(
                async move {
                    if let Err(err) = server::server_task(listener, ready).await {
                        error!("{err}");
                    }
                }
                .in_current_span(),
            );
        }
        tokio::spawn(async move {
            if started_rx.await.is_ok() {
                ready.set_ready();
            }
        });

        let meta = RunMetadata::new(&self.config, self.instance.clone());
        let run = ClientPool::new(self.config, connector)
            .on_started(started_tx)
            .run()
            .await?;
        let totals = run.aggregate(&meta)?;
        let report = Report {
            runs: run.results,
            totals,
        };

        report.print(self.format, &mut std::io::stdout().lock())?;
        if let Some(path) = &self.output {
            report.write_json_file(path)?;
            info!("Report written to {}", path.display());
        }

        sink.submit(&report.totals).await?;

        Ok(report)
    }
}

#[cfg(feature = "metrics")]
fn install_exporter(addr: SocketAddr) -> Result<(), RuntimeError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!("Serving metrics on http://{addr}/metrics");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_exporter(_addr: SocketAddr) -> Result<(), RuntimeError> {
    warn!("Built without the metrics feature, --metrics-addr is ignored.");
    Ok(())
}
