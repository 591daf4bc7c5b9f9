//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.
//! Avoids each test module defining its own slightly-different defaults.

use crate::config::{Config, LoggingConfig, MonitorConfig, PoolConfig, StartupConfig};

/// Pool config with the given bounds and timings long enough that nothing
/// is evicted unless a test asks for it.
///
/// For tests that need specific timing behavior, override individual fields
/// on the returned struct.
pub fn pool(min_connections: usize, max_connections: usize) -> PoolConfig {
    PoolConfig {
        min_connections,
        max_connections,
        max_idle_connections: None,
        max_idle_time_ms: 60_000,
        max_error_count: 3,
        health_check_interval_ms: 60_000,
    }
}

/// Monitor config with the 50ms latency threshold, small buffers and the
/// background sampler disabled.
pub fn monitor() -> MonitorConfig {
    MonitorConfig {
        latency_alert_threshold_ms: 50.0,
        error_rate_alert_threshold: 0.05,
        max_history: 100,
        recent_window: 10,
        sample_interval_ms: 60_000,
        sampler_enabled: false,
    }
}

/// Full runtime config built from [`pool`] and [`monitor`], with a short
/// startup timeout.
pub fn runtime(min_connections: usize, max_connections: usize) -> Config {
    Config {
        logging: LoggingConfig::default(),
        pool: pool(min_connections, max_connections),
        monitor: monitor(),
        startup: StartupConfig { timeout_secs: 5 },
    }
}
