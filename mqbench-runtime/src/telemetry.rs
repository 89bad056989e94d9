//! Signed upload of the fleet totals to a Log Analytics workspace.
//!
//! Every request is authorized with a `SharedKey` signature: an HMAC-SHA256, keyed by the
//! base64-decoded workspace key, over a canonical string describing the request.
use base64::Engine;
use hmac::{Hmac, Mac};
use mqbench_core::TotalResult;
use sha2::Sha256;
use thiserror::Error;
use time::{macros::format_description, OffsetDateTime};
#[allow(unused)]
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

const CONTENT_TYPE: &str = "application/json";
const RESOURCE: &str = "/api/logs";
const API_VERSION: &str = "2016-04-01";
const TIME_GENERATED_FIELD: &str = "DateValue";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry is required but LOGANALYTICS_CUSTOMER_ID / LOGANALYTICS_SHARED_KEY are not set")]
    MissingCredentials,

    #[error("shared key is not valid base64: {0}")]
    InvalidKey(#[from] base64::DecodeError),

    #[error("shared key rejected by HMAC")]
    KeyLength(#[from] hmac::digest::InvalidLength),

    #[error("error formatting request date: {0}")]
    Date(#[from] time::error::Format),

    #[error("error serializing results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("workspace answered {0}")]
    Status(reqwest::StatusCode),
}

/// How a run treats the telemetry upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TelemetryMode {
    /// Never upload.
    Disabled,
    /// Upload when credentials are present and log any failure.
    #[default]
    BestEffort,
    /// Missing credentials fail the run before it starts, a failed upload fails it afterwards.
    Required,
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub mode: TelemetryMode,
    pub customer_id: Option<String>,
    pub shared_key: Option<String>,
    pub log_type: Option<String>,
}

struct Credentials {
    customer_id: String,
    key: Vec<u8>,
    log_type: String,
}

pub struct TelemetrySink {
    mode: TelemetryMode,
    credentials: Option<Credentials>,
    endpoint: Option<String>,
    client: reqwest::Client,
}

impl TelemetrySink {
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        let credentials = match config.mode {
            TelemetryMode::Disabled => None,
            mode => match Self::credentials(&config) {
                Ok(credentials) => Some(credentials),
                Err(err) if mode == TelemetryMode::Required => return Err(err),
                Err(TelemetryError::MissingCredentials) => {
                    debug!("No telemetry credentials, results will not be published.");
                    None
                }
                Err(err) => {
                    warn!("Telemetry disabled: {err}");
                    None
                }
            },
        };

        Ok(Self {
            mode: config.mode,
            credentials,
            endpoint: None,
            client: reqwest::Client::new(),
        })
    }

    fn credentials(config: &TelemetryConfig) -> Result<Credentials, TelemetryError> {
        let (Some(customer_id), Some(shared_key)) = (&config.customer_id, &config.shared_key)
        else {
            return Err(TelemetryError::MissingCredentials);
        };
        if customer_id.is_empty() || shared_key.is_empty() {
            return Err(TelemetryError::MissingCredentials);
        }

        Ok(Credentials {
            customer_id: customer_id.clone(),
            key: base64::engine::general_purpose::STANDARD.decode(shared_key)?,
            log_type: config.log_type.clone().unwrap_or_default(),
        })
    }

    /// Send to `endpoint` instead of the workspace's public URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Upload `totals`, applying the configured [`TelemetryMode`] to failures.
    pub async fn submit(&self, totals: &TotalResult) -> Result<(), TelemetryError> {
        if !self.is_enabled() {
            return Ok(());
        }

        info!("Publishing test results...");
        match self.publish(totals).await {
            Ok(()) => {
                info!("Done");
                Ok(())
            }
            Err(err) if self.mode == TelemetryMode::Required => Err(err),
            Err(err) => {
                error!("Error publishing test results to log analytics: {err}");
                Ok(())
            }
        }
    }

    async fn publish(&self, totals: &TotalResult) -> Result<(), TelemetryError> {
        let Some(credentials) = &self.credentials else {
            return Ok(());
        };

        let body = serde_json::to_string(totals)?;
        let date = rfc1123(OffsetDateTime::now_utc())?;
        let signature = sign(&canonical_string(body.len(), &date), &credentials.key)?;

        let url = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "https://{}.ods.opinsights.azure.com{RESOURCE}?api-version={API_VERSION}",
                credentials.customer_id
            ),
        };

        let res = self
            .client
            .post(url)
            .header("Log-Type", &credentials.log_type)
            .header(
                "Authorization",
                format!("SharedKey {}:{signature}", credentials.customer_id),
            )
            .header("Content-Type", CONTENT_TYPE)
            .header("x-ms-date", &date)
            .header("time-generated-field", TIME_GENERATED_FIELD)
            .body(body)
            .send()
            .await?;

        let status = res.status();
        info!("{status}");
        if !status.is_success() {
            return Err(TelemetryError::Status(status));
        }

        Ok(())
    }
}

/// The string covered by the request signature. `content_length` is the body length in bytes.
pub fn canonical_string(content_length: usize, date: &str) -> String {
    format!("POST\n{content_length}\n{CONTENT_TYPE}\nx-ms-date:{date}\n{RESOURCE}")
}

/// Base64 HMAC-SHA256 of `message`.
pub fn sign(message: &str, key: &[u8]) -> Result<String, TelemetryError> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(message.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// RFC 1123 date with a literal `GMT` zone, e.g. `Tue, 05 Mar 2024 07:08:09 GMT`.
pub fn rfc1123(datetime: OffsetDateTime) -> Result<String, time::error::Format> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    datetime
        .to_offset(time::UtcOffset::UTC)
        .format(format)
}
