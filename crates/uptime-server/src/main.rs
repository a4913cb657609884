//! Uptime monitor server binary

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use uptime_server::{Config, UptimeServer, setup_tracing};

/// Lightweight HTTP endpoint uptime monitor
#[derive(Debug, Parser)]
#[command(name = "uptime-server", version, about)]
struct Cli {
    /// Configuration file (default: search standard locations)
    #[arg(short, long, env = "UPTIME_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Tracing is not initialized yet; a bad config aborts startup here
    let config = Config::load_from(cli.config.as_deref()).context("Configuration error")?;

    let _telemetry_guard = setup_tracing(&config.logging, &config.telemetry)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to initialize tracing")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoints = config.endpoints.len(),
        "Uptime monitor starting"
    );

    UptimeServer::new(config.to_server_config()).run().await?;

    // Telemetry guard will flush spans on drop
    Ok(())
}
