use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strum_macros::AsRefStr;
use thiserror::Error;
use tracing::warn;
use txwatch_domain::config::MonitorConfig;
use txwatch_domain::model::{format_units, TxMatch, NATIVE_DECIMALS};

use crate::telegram::{TelegramClient, TelegramError};

/// One matched transaction in the context of the block it was found in.
#[derive(Debug, Clone, Copy)]
pub struct Alert<'a> {
    pub block_number: u64,
    pub block_time: Option<DateTime<Utc>>,
    pub tx_match: &'a TxMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Delivery {
    Sent,
    /// No delivery channel is configured.
    Skipped,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Telegram(#[from] TelegramError),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert<'_>) -> Result<Delivery, NotifyError>;
}

#[derive(Debug, Clone)]
pub struct AlertFormatter {
    explorer_tx_url: String,
    native_symbol: String,
}

impl AlertFormatter {
    pub fn new(explorer_tx_url: impl Into<String>, native_symbol: impl Into<String>) -> Self {
        Self {
            explorer_tx_url: explorer_tx_url.into(),
            native_symbol: native_symbol.into(),
        }
    }

    pub fn format(&self, alert: &Alert<'_>) -> String {
        let tx = &alert.tx_match.tx;
        let time = alert
            .block_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let to = tx
            .to
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "contract creation".to_string());

        format!(
            "🔔 Transaction monitor match\n\
             Rules: {rules}\n\
             Block: {block}\n\
             Time: {time}\n\
             Tx: `{hash}`\n\
             Link: {explorer}{hash}\n\
             From: {from}\n\
             To: {to}\n\
             Method: {method}\n\
             Value: {value} {symbol}",
            rules = escape_markdown(&alert.tx_match.describe_reasons()),
            block = alert.block_number,
            hash = tx.hash,
            explorer = self.explorer_tx_url,
            from = tx.from,
            method = alert.tx_match.selector,
            value = format_units(tx.value, NATIVE_DECIMALS),
            symbol = escape_markdown(&self.native_symbol),
        )
    }
}

/// Escapes the characters Telegram's legacy Markdown treats as entity markers.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '[' | '`') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Sends alerts to a Telegram chat, or does nothing when credentials are not
/// configured.
pub struct TelegramNotifier {
    channel: Option<(TelegramClient, String)>,
    formatter: AlertFormatter,
}

impl TelegramNotifier {
    pub fn new(
        client: Option<TelegramClient>,
        chat_id: Option<String>,
        formatter: AlertFormatter,
    ) -> Self {
        Self {
            channel: client.zip(chat_id),
            formatter,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, NotifyError> {
        let formatter = AlertFormatter::new(config.explorer_tx_url(), config.native_symbol());
        let client = match (config.telegram_token(), config.telegram_chat_id()) {
            (Some(token), Some(_)) => Some(TelegramClient::new(
                config.telegram_api_url(),
                token,
                Duration::from_secs(10),
            )?),
            _ => {
                warn!("telegram credentials not set; alerts will only be logged");
                None
            }
        };
        Ok(Self::new(
            client,
            config.telegram_chat_id().map(str::to_owned),
            formatter,
        ))
    }

    pub fn is_configured(&self) -> bool {
        self.channel.is_some()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, alert: &Alert<'_>) -> Result<Delivery, NotifyError> {
        let Some((client, chat_id)) = &self.channel else {
            warn!(
                tx_hash = %alert.tx_match.tx.hash,
                "telegram credentials not set; skipping notification"
            );
            return Ok(Delivery::Skipped);
        };
        let text = self.formatter.format(alert);
        client.send_message(chat_id, &text, Some("Markdown")).await?;
        Ok(Delivery::Sent)
    }
}
