//! Server Configuration
//!
//! Command-line options for the DuoKV server, parsed with clap.
//! `validate` must pass before anything is started; an invalid setting is
//! reported as a [`ConfigError`] and the server refuses to boot.

use crate::storage::ExpiryConfig;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors in the server configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,

    #[error("invalid log level '{level}': {reason}")]
    InvalidLogLevel { level: String, reason: String },
}

/// DuoKV server options.
#[derive(Parser, Debug, Clone)]
#[command(name = "duokv")]
#[command(about = "In-memory key-value store for strings and dictionaries")]
#[command(version)]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Milliseconds between expiry sweeps
    #[arg(long, default_value_t = 1000)]
    pub sweep_interval_ms: u64,

    /// Never evict expired keys
    #[arg(long)]
    pub disable_ttl: bool,

    /// Log filter used when RUST_LOG is not set (e.g. "info" or "duokv=debug")
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            sweep_interval_ms: 1000,
            disable_ttl: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the sweeper settings, or `None` when expiry is disabled.
    pub fn expiry_config(&self) -> Option<ExpiryConfig> {
        if self.disable_ttl {
            return None;
        }
        Some(ExpiryConfig::new().with_interval(Duration::from_millis(self.sweep_interval_ms)))
    }

    /// Checks the settings for values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.sweep_interval_ms == 0 && !self.disable_ttl {
            return Err(ConfigError::ZeroSweepInterval);
        }
        EnvFilter::try_new(&self.log_level).map_err(|e| ConfigError::InvalidLogLevel {
            level: self.log_level.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["duokv"]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:12345");
        assert_eq!(config.sweep_interval_ms, 1000);
        assert!(!config.disable_ttl);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());

        let default = Config::default();
        assert_eq!(default.bind_address(), config.bind_address());
    }

    #[test]
    fn test_parse_args() {
        let config = Config::try_parse_from([
            "duokv",
            "--host",
            "0.0.0.0",
            "-p",
            "7000",
            "--sweep-interval-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:7000");
        assert_eq!(
            config.expiry_config().unwrap().interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_disable_ttl() {
        let config = Config::try_parse_from(["duokv", "--disable-ttl", "--sweep-interval-ms", "0"])
            .unwrap();
        assert!(config.expiry_config().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port() {
        assert!(Config::try_parse_from(["duokv", "--port", "99999"]).is_err());
    }

    #[test]
    fn test_validate_errors() {
        let mut config = Config {
            host: " ".to_string(),
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyHost));

        config.host = "localhost".to_string();
        config.sweep_interval_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroSweepInterval));

        config.sweep_interval_ms = 10;
        config.log_level = "duokv=loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel { .. })
        ));
    }
}
