//! Process-wide logging and metrics setup, plus the per-chat counter the
//! operator bot uses to stop answering unauthorized chats.

use std::{
    collections::HashMap,
    env,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING: OnceCell<()> = OnceCell::new();
static METRICS: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_ABUSE_THRESHOLD: u16 = 5;

/// Observability knobs for one binary, read from `<PREFIX>_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<SocketAddr>,
    abuse_threshold: u16,
}

impl TelemetryConfig {
    /// Reads `<PREFIX>_LOG_FILTER`, `<PREFIX>_METRICS_ADDRESS` and
    /// `<PREFIX>_ABUSE_THRESHOLD`. Unset or blank variables take defaults;
    /// malformed ones are errors. Expects `.env` to be hydrated already.
    pub fn from_env(prefix: &str) -> Result<Self, TelemetryError> {
        let prefix = prefix.trim().to_ascii_uppercase();
        let read = |suffix: &str| {
            env::var(format!("{prefix}_{suffix}"))
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let metrics_address = read("METRICS_ADDRESS")
            .map(|raw| {
                raw.parse::<SocketAddr>()
                    .map_err(|err| TelemetryError::InvalidMetricsAddress {
                        reason: err.to_string(),
                        value: raw,
                    })
            })
            .transpose()?;
        let abuse_threshold = match read("ABUSE_THRESHOLD") {
            None => DEFAULT_ABUSE_THRESHOLD,
            Some(raw) => match raw.parse::<u16>() {
                Ok(threshold) if threshold > 0 => threshold,
                _ => return Err(TelemetryError::InvalidAbuseThreshold(raw)),
            },
        };

        Ok(Self {
            log_filter: read("LOG_FILTER").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            metrics_address,
            abuse_threshold,
        })
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Prometheus scrape endpoint; without one metrics are recorded but not
    /// served.
    pub fn metrics_address(&self) -> Option<SocketAddr> {
        self.metrics_address
    }

    pub fn abuse_threshold(&self) -> u16 {
        self.abuse_threshold
    }
}

/// Installs the tracing subscriber and the Prometheus recorder. Later calls
/// in the same process are no-ops. Needs a tokio runtime when a metrics
/// address is set.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    TRACING
        .get_or_try_init(|| {
            let filter = EnvFilter::try_new(config.log_filter())
                .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .try_init()
                .map_err(|err| TelemetryError::Tracing(err.to_string()))
        })
        .copied()?;

    METRICS
        .get_or_try_init(|| {
            let builder = PrometheusBuilder::new();
            let installed = match config.metrics_address() {
                Some(address) => builder.with_http_listener(address).install(),
                None => builder.install_recorder().map(drop),
            };
            installed.map_err(|err| TelemetryError::Metrics(err.to_string()))
        })
        .copied()
}

/// Per-chat count of unauthorized commands.
#[derive(Debug, Clone)]
pub struct AbuseTracker {
    threshold: u16,
    attempts: Arc<Mutex<HashMap<String, u16>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseSignal {
    /// Below the threshold: refuse politely.
    Refused { attempts: u16 },
    /// At or past the threshold: stop answering.
    Muted { attempts: u16 },
}

impl AbuseTracker {
    pub fn new(threshold: u16) -> Self {
        Self {
            threshold: threshold.max(1),
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn record(&self, chat: &str) -> AbuseSignal {
        let attempts = {
            let mut table = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            let count = table.entry(chat.to_owned()).or_default();
            *count = count.saturating_add(1);
            *count
        };

        if attempts < self.threshold {
            counter!("abuse_events_total", "state" => "refused").increment(1);
            return AbuseSignal::Refused { attempts };
        }
        counter!("abuse_events_total", "state" => "muted").increment(1);
        if attempts == self.threshold {
            warn!(chat, attempts, "unauthorized chat muted");
        }
        AbuseSignal::Muted { attempts }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{value}`: {reason}")]
    InvalidMetricsAddress { value: String, reason: String },
    #[error("abuse threshold must be a positive integer, got `{0}`")]
    InvalidAbuseThreshold(String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
