use std::env;
use std::path::PathBuf;
use std::process;

use thiserror::Error;
use txwatch_domain::config::{hydrate_env_file, ConfigError, DEFAULT_RULES_FILE};
use txwatch_domain::model::{ActiveRuleSet, RuleSide};
use txwatch_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use txwatch_domain::storage::RuleStore;
use txwatch_storage::JsonRuleFile;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("[rules] {err}");
        process::exit(1);
    }
}

async fn run() -> Result<(), CheckError> {
    hydrate_env_file()?;
    init_telemetry(&TelemetryConfig::from_env("RULES")?)?;

    let path = env::args()
        .nth(1)
        .or_else(|| env::var("BSC_RULES_FILE").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_FILE));

    let document = JsonRuleFile::new(&path).load_document().await;
    let active = ActiveRuleSet::from_document(&document);

    println!("Rules file: {}", path.display());
    for side in RuleSide::ALL {
        println!(
            "{}: {} raw, {} active",
            side.list_key(),
            document.entries(side).len(),
            active.rules(side).len()
        );
    }
    println!("{}", serde_json::to_string_pretty(&active.to_document())?);
    Ok(())
}

#[derive(Debug, Error)]
enum CheckError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to render active rules: {0}")]
    Render(#[from] serde_json::Error),
}
