//! mdprov CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - built-in defaults
//! - `mdprov.toml` in the working directory, or the file given with `--config`
//! - environment variables (`MDPROV_*`, nested keys separated by `__`, e.g.
//!   `MDPROV_SERVER__LISTEN` or `MDPROV_PROVIDER__SESSION__MAX_SESSIONS`)
//! - command line overrides

use std::net::SocketAddr;
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use mdprov_core::{FieldDictionary, ProviderConfig};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "mdprov.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "MDPROV_";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration of the `mdprov` binary
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Engine configuration handed to the runtime unchanged
    pub provider: ProviderConfig,

    /// Listener and feed settings
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address consumers connect to
    pub listen: String,

    /// Interval between synthetic price updates (in milliseconds)
    pub update_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:14002".to_string(),
            update_interval_ms: 1000,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load defaults, the configuration file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        if path.is_some() && !file.exists() {
            return Err(ConfigError::FileSystem(format!(
                "Configuration file {} does not exist",
                file.display()
            )));
        }

        let figment = Self::defaults()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Load defaults overlaid with TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::extract(Self::defaults().merge(Toml::string(text)))
    }

    /// Apply command line overrides on top of a loaded configuration
    pub fn with_overrides(
        self,
        listen: Option<String>,
        update_interval_ms: Option<u64>,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(self));
        if let Some(listen) = listen {
            figment = figment.merge(("server.listen", listen));
        }
        if let Some(interval) = update_interval_ms {
            figment = figment.merge(("server.update_interval_ms", interval));
        }
        Self::extract(figment)
    }

    fn defaults() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the engine configuration and the server settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.validate().map_err(ConfigError::Validation)?;
        self.listen_addr()?;
        if self.server.update_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Update interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.listen.parse().map_err(|e| {
            ConfigError::Validation(format!(
                "Invalid listen address {}: {}",
                self.server.listen, e
            ))
        })
    }

    /// Built-in field dictionary, used unless `provider.dictionary` names a file
    pub fn builtin_field_dictionary(&self) -> Option<FieldDictionary> {
        self.provider
            .dictionary
            .field_dictionary_path
            .is_none()
            .then(crate::app::builtin_field_dictionary)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
