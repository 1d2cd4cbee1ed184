//! mdprov - market data provider entry point

use std::path::Path;

use clap::Parser;
use tracing::{error, info};

use mdprov_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            AppConfig::load(Some(Path::new(path)))?
        }
        None => AppConfig::load(None)?,
    };

    if let Err(e) = CommandDispatcher::execute(cli.command, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
