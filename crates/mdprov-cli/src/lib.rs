//! mdprov CLI library
//!
//! Configuration loading, the synthetic price feed and the command handlers
//! behind the `mdprov` binary.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::{FeedClient, LoggingErrorClient, Quote};
pub use cli::{Cli, Commands};
pub use config::{AppConfig, ConfigError, ServerConfig};
pub use error::{CliError, Result};
