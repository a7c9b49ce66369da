//! Application configuration
//!
//! Optional `soh-pipeline.toml`, overridden by `SOH_` environment variables
//! with `__` between nested keys (`SOH_SERVER__BIND_ADDRESS`).

use config::{Config, ConfigError, Environment, File};
use pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};

/// Default configuration file name, extension optional
pub const DEFAULT_CONFIG_FILE: &str = "soh-pipeline";

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// One of trace, debug, info, warn, error
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load from the default file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from `path` (missing file is fine) and the environment
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("SOH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
