//! ClipSync client - mirrors a paired computer's clipboard
//!
//! This is the main entry point for the clipsync-client binary.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipsync_client::cli::{Cli, CliHandler};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let handler = CliHandler::new(cli.config.as_deref())?;

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        handler.config().log_level.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("clipsync_client={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("ClipSync client v{}", env!("CARGO_PKG_VERSION"));

    handler.handle_command(cli.command).await?;

    Ok(())
}
