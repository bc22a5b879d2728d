//! Environment-driven configuration structures shared by all binaries.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_RPC_URL: &str = "https://bsc-dataseed.binance.org";
pub const DEFAULT_RULES_FILE: &str = "config/monitor_rules.json";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_EXPLORER_TX_URL: &str = "https://bscscan.com/tx/";
pub const DEFAULT_NATIVE_SYMBOL: &str = "BNB";

/// Monitor configuration derived from `.env`/process variables. Built once at
/// startup and handed to the worker; nothing downstream reads the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    rpc_url: String,
    rpc_timeout: Duration,
    poll_interval: Duration,
    error_backoff: Duration,
    start_block: Option<u64>,
    exit_after_catchup: bool,
    progress_interval: Option<Duration>,
    rules_file: PathBuf,
    telegram_token: Option<String>,
    telegram_chat_id: Option<String>,
    telegram_api_url: String,
    explorer_tx_url: String,
    native_symbol: String,
}

impl MonitorConfig {
    /// Defaults for everything except the RPC endpoint.
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            rpc_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_secs(3),
            error_backoff: Duration::from_secs(5),
            start_block: None,
            exit_after_catchup: false,
            progress_interval: Some(Duration::from_secs(60)),
            rules_file: PathBuf::from(DEFAULT_RULES_FILE),
            telegram_token: None,
            telegram_chat_id: None,
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            explorer_tx_url: DEFAULT_EXPLORER_TX_URL.to_string(),
            native_symbol: DEFAULT_NATIVE_SYMBOL.to_string(),
        }
    }

    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Malformed entries surface as `ConfigError` so the
    /// binary refuses to start.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let rpc_url = get_optional_var("BSC_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.into());
        let progress_interval = get_duration_var("LOG_PROGRESS_INTERVAL", 60.0)?;

        Ok(Self {
            rpc_url,
            rpc_timeout: get_duration_var("RPC_TIMEOUT", 20.0)?,
            poll_interval: get_duration_var("POLL_INTERVAL", 3.0)?,
            error_backoff: get_duration_var("ERROR_BACKOFF", 5.0)?,
            start_block: get_u64_var("START_BLOCK")?,
            exit_after_catchup: get_bool_var("EXIT_AFTER_CATCHUP", false)?,
            progress_interval: (!progress_interval.is_zero()).then_some(progress_interval),
            rules_file: get_optional_var("BSC_RULES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_FILE)),
            telegram_token: get_optional_var("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: get_optional_var("TELEGRAM_CHAT_ID"),
            telegram_api_url: get_optional_var("TELEGRAM_API_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.into()),
            explorer_tx_url: get_optional_var("EXPLORER_TX_URL")
                .unwrap_or_else(|| DEFAULT_EXPLORER_TX_URL.into()),
            native_symbol: get_optional_var("NATIVE_SYMBOL")
                .unwrap_or_else(|| DEFAULT_NATIVE_SYMBOL.into()),
        })
    }

    pub fn with_start_block(mut self, start_block: Option<u64>) -> Self {
        self.start_block = start_block;
        self
    }

    pub fn with_exit_after_catchup(mut self, exit: bool) -> Self {
        self.exit_after_catchup = exit;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// `None` disables the progress reporter.
    pub fn with_progress_interval(mut self, interval: Option<Duration>) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_telegram(
        mut self,
        api_url: impl Into<String>,
        token: Option<String>,
        chat_id: Option<String>,
    ) -> Self {
        self.telegram_api_url = api_url.into();
        self.telegram_token = token;
        self.telegram_chat_id = chat_id;
        self
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn error_backoff(&self) -> Duration {
        self.error_backoff
    }

    pub fn start_block(&self) -> Option<u64> {
        self.start_block
    }

    pub fn exit_after_catchup(&self) -> bool {
        self.exit_after_catchup
    }

    pub fn progress_interval(&self) -> Option<Duration> {
        self.progress_interval
    }

    pub fn rules_file(&self) -> &Path {
        &self.rules_file
    }

    pub fn telegram_token(&self) -> Option<&str> {
        self.telegram_token.as_deref()
    }

    pub fn telegram_chat_id(&self) -> Option<&str> {
        self.telegram_chat_id.as_deref()
    }

    pub fn telegram_api_url(&self) -> &str {
        &self.telegram_api_url
    }

    pub fn explorer_tx_url(&self) -> &str {
        &self.explorer_tx_url
    }

    pub fn native_symbol(&self) -> &str {
        &self.native_symbol
    }
}

/// Operator bot configuration. Unlike the monitor, the bot cannot degrade
/// without credentials, so both Telegram variables are required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    telegram_token: String,
    telegram_chat_id: String,
    telegram_api_url: String,
    rules_file: PathBuf,
}

impl BotConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            telegram_token: get_required_var("TELEGRAM_BOT_TOKEN")?,
            telegram_chat_id: get_required_var("TELEGRAM_CHAT_ID")?,
            telegram_api_url: get_optional_var("TELEGRAM_API_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.into()),
            rules_file: get_optional_var("BSC_RULES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_FILE)),
        })
    }

    pub fn telegram_token(&self) -> &str {
        &self.telegram_token
    }

    pub fn telegram_chat_id(&self) -> &str {
        &self.telegram_chat_id
    }

    pub fn telegram_api_url(&self) -> &str {
        &self.telegram_api_url
    }

    pub fn rules_file(&self) -> &Path {
        &self.rules_file
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_u64_var(key: &'static str) -> Result<Option<u64>, ConfigError> {
    get_optional_var(key)
        .map(|value| {
            value
                .parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

/// Reads fractional seconds, e.g. `POLL_INTERVAL=1.5`.
fn get_duration_var(key: &'static str, default_secs: f64) -> Result<Duration, ConfigError> {
    let Some(value) = get_optional_var(key) else {
        return Ok(Duration::from_secs_f64(default_secs));
    };
    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or(ConfigError::InvalidDuration { key, value })
}

fn get_bool_var(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = get_optional_var(key) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { key, value }),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("TXWATCH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid duration in `{key}`: `{value}` is not a non-negative number of seconds")]
    InvalidDuration { key: &'static str, value: String },
    #[error("invalid boolean in `{key}`: `{value}`")]
    InvalidBool { key: &'static str, value: String },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
