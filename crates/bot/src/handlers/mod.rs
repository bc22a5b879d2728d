pub mod rules;

use metrics::counter;
use strum_macros::AsRefStr;
use thiserror::Error;
use txwatch_domain::model::RuleSide;
use txwatch_domain::storage::StorageError;

use crate::state::BotState;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    Help,
    List,
    AddTo,
    AddFrom,
    Remove,
    Unknown,
}

impl Command {
    /// Splits a message into its command and arguments. The command token is
    /// lowercased and any `@botname` suffix is dropped. Blank text yields
    /// `None`.
    pub fn parse(text: &str) -> Option<(Command, Vec<&str>)> {
        let mut parts = text.split_whitespace();
        let token = parts.next()?;
        let name = token.split('@').next().unwrap_or(token).to_lowercase();
        let command = match name.as_str() {
            "/start" | "/help" => Command::Help,
            "/list" => Command::List,
            "/add_to" => Command::AddTo,
            "/add_from" => Command::AddFrom,
            "/remove" => Command::Remove,
            _ => Command::Unknown,
        };
        Some((command, parts.collect()))
    }
}

/// Produces the reply for one authorized message, or `None` when there is
/// nothing to answer.
pub async fn handle_command(state: &BotState, text: &str) -> Result<Option<String>, BotError> {
    let Some((command, args)) = Command::parse(text) else {
        return Ok(None);
    };
    counter!("bot_commands_total", "command" => command.as_ref().to_string()).increment(1);

    let reply = match command {
        Command::Help => rules::help_text().to_string(),
        Command::List => rules::list_rules(state.store()).await,
        Command::AddTo => rules::add_rule(state.store(), RuleSide::To, &args).await?,
        Command::AddFrom => rules::add_rule(state.store(), RuleSide::From, &args).await?,
        Command::Remove => rules::remove_rule(state.store(), &args).await?,
        Command::Unknown => "Unknown command. Use /help.".to_string(),
    };
    Ok(Some(reply))
}
