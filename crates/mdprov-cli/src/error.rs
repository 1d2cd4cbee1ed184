//! Error handling for the mdprov CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Provider error: {0}")]
    Provider(#[from] mdprov_core::ProviderError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] mdprov_runtime::RuntimeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid listen address {address}: {reason}")]
    ListenAddress { address: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
