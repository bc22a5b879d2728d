use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use txwatch_domain::config::{BotConfig, ConfigError};
use txwatch_domain::services::telemetry::{
    init_telemetry, AbuseSignal, AbuseTracker, TelemetryConfig, TelemetryError,
};
use txwatch_domain::storage::StorageError;
use txwatch_monitor::telegram::{BotCommand, Update};
use txwatch_monitor::{TelegramClient, TelegramError};
use txwatch_storage::JsonRuleFile;

use crate::{handlers::handle_command, state::BotState};

/// Server-side long-poll window for `getUpdates`.
const POLL_TIMEOUT_SECS: u64 = 30;
/// Client timeout; must outlast the long poll.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(35);
const RETRY_DELAY: Duration = Duration::from_secs(2);

pub const COMMANDS: [BotCommand; 5] = [
    BotCommand {
        command: "add_to",
        description: "Add a to rule: /add_to <address> <method_id> [label]",
    },
    BotCommand {
        command: "add_from",
        description: "Add a from rule: /add_from <address> <method_id> [label]",
    },
    BotCommand {
        command: "list",
        description: "Show the current rules",
    },
    BotCommand {
        command: "remove",
        description: "Remove a rule: /remove <to|from> <index>",
    },
    BotCommand {
        command: "help",
        description: "Show command help",
    },
];

pub async fn run() -> Result<(), BootstrapError> {
    let config = BotConfig::load_from_env()?;
    let telemetry = TelemetryConfig::from_env("BOT")?;
    init_telemetry(&telemetry)?;

    let client = TelegramClient::new(
        config.telegram_api_url(),
        config.telegram_token(),
        CLIENT_TIMEOUT,
    )?;
    let store = JsonRuleFile::builder()
        .path(config.rules_file())
        .create_if_missing(true)
        .build()
        .await?;
    let state = BotState::new(
        store,
        config.telegram_chat_id(),
        AbuseTracker::new(telemetry.abuse_threshold()),
    );

    info!(rules_file = %config.rules_file().display(), "operator bot started");
    if let Err(err) = client.set_my_commands(&COMMANDS).await {
        warn!(error = %err, "failed to register bot commands");
    }

    let mut offset = None;
    loop {
        match client.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    handle_update(&client, &state, update).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch updates; retrying");
                sleep(RETRY_DELAY).await;
            }
        }
    }
}

/// Answers one update. Only the configured chat is served; other chats get a
/// refusal until the abuse tracker mutes them, then nothing.
pub(crate) async fn handle_update(client: &TelegramClient, state: &BotState, update: Update) {
    let Some(message) = update.message else {
        return;
    };
    let chat_id = message.chat.id.to_string();

    let reply = if state.is_authorized(&chat_id) {
        match handle_command(state, message.text.as_deref().unwrap_or_default()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "failed to update rules file");
                "Failed to update rules file.".to_string()
            }
        }
    } else {
        match state.abuse_tracker().record(&chat_id) {
            AbuseSignal::Refused { .. } => "Unauthorized.".to_string(),
            AbuseSignal::Muted { attempts } => {
                debug!(chat_id = %chat_id, attempts, "ignoring muted chat");
                return;
            }
        }
    };

    if let Err(err) = client.send_message(&chat_id, &reply, None).await {
        warn!(chat_id = %chat_id, error = %err, "failed to send reply");
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("telegram error: {0}")]
    Telegram(#[from] TelegramError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
