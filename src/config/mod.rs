//! Configuration management for the downly worker
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! The loaded [`Config`] is an immutable value: it is read once at startup and
//! handed to the dispatcher and broker setup by reference.
//!
//! # Usage
//!
//! ```no_run
//! use downly_worker::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Broker: {}", config.broker.redacted_uri());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `DOWNLY__<section>__<key>`
//!
//! Examples:
//! - `DOWNLY__BROKER__HOST=rabbitmq`
//! - `DOWNLY__BROKER__HEARTBEAT_INTERVAL=30s`
//! - `DOWNLY__SERVICES__COBALT__API_URL=http://cobalt:9000/`
//!
//! Broker credentials can also be supplied through `RABBITMQ_USERNAME` and
//! `RABBITMQ_PASSWORD`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/downly.toml`.
//! This can be overridden using the `DOWNLY_CONFIG` environment variable
//! or the `--config` command line flag.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    BrokerConfig, CobaltConfig, Config, ExchangeType, HttpConfig, ServicesConfig,
    TopologyConfig, WorkerConfig, YtdlConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// `path` takes precedence over `DOWNLY_CONFIG` and the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or
    /// validation fails.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[broker]
host = "rabbitmq"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.broker.host, "rabbitmq");
        assert!(config.services.cobalt.enable);
    }

    #[test]
    fn test_validation_runs_after_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[services.cobalt]
enable = false

[services.ytdl]
enable = false
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::NoBackendsEnabled)
        ));
    }

    #[test]
    fn test_malformed_duration_is_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[broker]\nheartbeat_interval = \"soon\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(result.unwrap_err(), ConfigError::LoadError(_)));
    }

    #[test]
    fn test_rendered_defaults_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let config = Config::default();
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("password"));
        fs::write(&config_path, rendered).unwrap();

        let reloaded = Config::load_from_path(config_path).unwrap();
        assert_eq!(reloaded.topology.event_exchange, config.topology.event_exchange);
        assert_eq!(reloaded.broker.heartbeat_interval, config.broker.heartbeat_interval);
        assert_eq!(reloaded.broker.password, "guest");
        assert_eq!(reloaded.services.ytdl.args, config.services.ytdl.args);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/downly.toml");

        let config = Config::load_from_path(path).unwrap();
        assert_eq!(config.broker.port, 5672);
        assert_eq!(config.services.ytdl.timeout, HumanDuration::from_secs(120));
        assert_eq!(config.topology.event_exchange_type, ExchangeType::Topic);
    }
}
