use serde_json::Value;
use tracing::info;
use txwatch_domain::model::{Address, Rule, RuleSide, RuleTarget, Selector};
use txwatch_domain::storage::RuleStore;
use txwatch_storage::JsonRuleFile;

use super::BotError;

const REMOVE_USAGE: &str = "Usage: /remove <to|from> <index>";

pub fn help_text() -> &'static str {
    "Commands:\n\
     /add_to <to_address> <method_id> [label]\n\
     /add_from <from_address> <method_id> [label]\n\
     /list\n\
     /remove <to|from> <index>\n\
     /help"
}

fn add_usage(side: RuleSide) -> String {
    let key = side.address_key();
    format!("Usage: /add_{key} <{key}_address> <method_id> [label]")
}

fn label_of(entry: &Value) -> Option<&str> {
    entry
        .get("label")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|label| !label.is_empty())
}

/// Renders the raw rule lists with the 1-based indices `/remove` expects.
pub async fn list_rules(store: &JsonRuleFile) -> String {
    let document = store.load_document().await;
    let mut lines = Vec::new();
    for side in RuleSide::ALL {
        if side == RuleSide::From {
            lines.push(String::new());
        }
        lines.push(format!("{}:", side.list_key()));
        let entries = document.entries(side);
        if entries.is_empty() {
            lines.push("(empty)".to_string());
            continue;
        }
        for (index, entry) in entries.iter().enumerate() {
            let field = |key: &str| {
                entry
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or("n/a")
                    .to_string()
            };
            let mut line = format!(
                "{}. {} {}",
                index + 1,
                field(side.address_key()),
                field("method_id")
            );
            if let Some(label) = label_of(entry) {
                line.push_str(&format!(" label={label}"));
            }
            lines.push(line);
        }
    }
    lines.join("\n")
}

pub async fn add_rule(
    store: &JsonRuleFile,
    side: RuleSide,
    args: &[&str],
) -> Result<String, BotError> {
    if args.len() < 2 {
        return Ok(add_usage(side));
    }
    let Ok(address) = Address::parse(args[0]) else {
        return Ok("Invalid address.".to_string());
    };
    let Ok(method_id) = Selector::parse(args[1]) else {
        return Ok("Invalid method_id.".to_string());
    };
    let label = (args.len() > 2).then(|| args[2..].join(" "));
    let rule = Rule::new(side, RuleTarget::new(address, method_id, label));

    let mut document = store.load_document().await;
    let key = rule.target().key();
    let exists = document
        .entries(side)
        .iter()
        .filter_map(|entry| Rule::parse(side, entry).ok())
        .any(|existing| existing.target().key() == key);
    if exists {
        return Ok("Rule already exists.".to_string());
    }

    document.entries_mut(side).push(rule.to_value());
    store.save_document(&document).await?;
    info!(
        side = side.address_key(),
        address = %address,
        method_id = %method_id,
        "rule added"
    );
    Ok("Rule added.".to_string())
}

pub async fn remove_rule(store: &JsonRuleFile, args: &[&str]) -> Result<String, BotError> {
    if args.len() < 2 {
        return Ok(REMOVE_USAGE.to_string());
    }
    let Some(side) = RuleSide::parse(args[0]) else {
        return Ok(REMOVE_USAGE.to_string());
    };
    let Ok(index) = args[1].parse::<i64>() else {
        return Ok("Index must be a number.".to_string());
    };

    let mut document = store.load_document().await;
    let entries = document.entries_mut(side);
    let position = match usize::try_from(index) {
        Ok(position) if (1..=entries.len()).contains(&position) => position,
        _ => return Ok("Index out of range.".to_string()),
    };
    let removed = entries.remove(position - 1);
    store.save_document(&document).await?;

    let kind = side.address_key();
    info!(side = kind, index, "rule removed");
    Ok(match label_of(&removed) {
        Some(label) => format!("Removed {kind} rule #{index} ({label})."),
        None => format!("Removed {kind} rule #{index}."),
    })
}
