//! Connection pool configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Sizing and health policy for the resource connection pool.
///
/// These settings bound how many client handles may be alive at once and
/// when idle or misbehaving handles are evicted.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Connections created during warm-up and maintained by the health loop.
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,
    /// Hard cap on live connections (idle + active).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Capacity of the idle queue. Defaults to `max_connections`.
    #[serde(default)]
    pub max_idle_connections: Option<usize>,
    /// Idle duration after which a connection is evicted (milliseconds).
    #[serde(default = "default_max_idle_time_ms")]
    pub max_idle_time_ms: u64,
    /// Reported errors tolerated before a connection is considered unhealthy.
    #[serde(default = "default_max_error_count")]
    pub max_error_count: u32,
    /// Interval between idle sweeps of the health loop (milliseconds).
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
}

const fn default_min_connections() -> usize {
    1
}

const fn default_max_connections() -> usize {
    10
}

const fn default_max_idle_time_ms() -> u64 {
    300_000 // 5 minutes
}

const fn default_max_error_count() -> u32 {
    5
}

const fn default_health_check_interval_ms() -> u64 {
    30_000
}

impl PoolConfig {
    /// Effective idle queue capacity.
    #[must_use]
    pub fn idle_capacity(&self) -> usize {
        self.max_idle_connections.unwrap_or(self.max_connections)
    }

    #[must_use]
    pub fn max_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_idle_time_ms)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Check sizing and timing bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::InvalidValue {
            field,
            reason: reason.to_string(),
        };

        if self.max_connections == 0 {
            return Err(invalid("max_connections", "must be greater than 0"));
        }
        if self.min_connections > self.max_connections {
            return Err(invalid("min_connections", "must be <= max_connections"));
        }
        if self.idle_capacity() == 0 {
            return Err(invalid("max_idle_connections", "must be greater than 0"));
        }
        // Warm-up parks the whole floor in the idle queue.
        if self.idle_capacity() < self.min_connections {
            return Err(invalid("max_idle_connections", "must be >= min_connections"));
        }
        if self.max_idle_time_ms == 0 {
            return Err(invalid("max_idle_time_ms", "must be greater than 0"));
        }
        if self.health_check_interval_ms == 0 {
            return Err(invalid("health_check_interval_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            max_idle_connections: None,
            max_idle_time_ms: default_max_idle_time_ms(),
            max_error_count: default_max_error_count(),
            health_check_interval_ms: default_health_check_interval_ms(),
        }
    }
}
