//! Monitor binary that tails a BSC JSON-RPC endpoint for rule matches.

use std::io;

use txwatch_domain::config::MonitorConfig;
use txwatch_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use txwatch_monitor::{run_monitor, MonitorError};

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[monitor] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), MonitorError> {
    let config = MonitorConfig::load_from_env()?;
    init_telemetry(&TelemetryConfig::from_env("MONITOR")?)?;
    run_monitor(config).await
}
