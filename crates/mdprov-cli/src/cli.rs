//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a provider that answers item requests with a synthetic price feed
    Serve {
        /// Address to accept consumers on, overrides `server.listen`
        #[arg(short, long)]
        listen: Option<String>,

        /// Milliseconds between price updates, overrides `server.update_interval_ms`
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Print the effective configuration
    Config {
        /// Print JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}
