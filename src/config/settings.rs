//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all runtime settings.
//! Every section is optional in the TOML file and falls back to defaults.
//!
//! # Example
//!
//! ```no_run
//! use memserve::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("memserve.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use super::logging::LoggingConfig;
use super::monitor::MonitorConfig;
use super::pool::PoolConfig;
use super::startup::StartupConfig;
use crate::error::{ConfigError, Result};

/// Main runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Resource connection pool sizing and health policy.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Performance monitor thresholds and buffer sizes.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Startup pass bounds.
    #[serde(default)]
    pub startup: StartupConfig,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// malformed, or validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Initialize logging from the `[logging]` section.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::InvalidValue {
            field,
            reason: reason.to_string(),
        };

        self.pool.validate()?;

        let monitor = &self.monitor;
        if !(monitor.latency_alert_threshold_ms > 0.0) {
            return Err(invalid("latency_alert_threshold_ms", "must be greater than 0"));
        }
        if !(monitor.error_rate_alert_threshold > 0.0 && monitor.error_rate_alert_threshold <= 1.0)
        {
            return Err(invalid("error_rate_alert_threshold", "must be in (0, 1]"));
        }
        if monitor.max_history == 0 {
            return Err(invalid("max_history", "must be greater than 0"));
        }
        if monitor.recent_window == 0 {
            return Err(invalid("recent_window", "must be greater than 0"));
        }
        if monitor.sample_interval_ms == 0 {
            return Err(invalid("sample_interval_ms", "must be greater than 0"));
        }

        if self.startup.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "must be greater than 0"));
        }

        Ok(())
    }
}
