//! Configuration validation command.

use std::path::Path;

use tracing::debug;

use crate::config::Config;
use crate::error::Result;

/// Load and validate a configuration file, then print a summary.
pub fn execute<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let path = config_path.as_ref();
    println!("Checking configuration: {}", path.display());
    println!();

    let config = Config::load(path)?;
    config.init_logging();
    debug!(path = %path.display(), "Configuration loaded");

    println!("✓ Configuration file is valid");
    println!();
    println!("Summary:");

    let pool = &config.pool;
    println!(
        "  Pool: min {}, max {}, idle capacity {}",
        pool.min_connections,
        pool.max_connections,
        pool.idle_capacity()
    );
    println!(
        "  Eviction: idle > {} ms or errors > {}, swept every {} ms",
        pool.max_idle_time_ms, pool.max_error_count, pool.health_check_interval_ms
    );

    let monitor = &config.monitor;
    println!(
        "  Alerts: latency > {} ms, error rate > {:.1}%",
        monitor.latency_alert_threshold_ms,
        monitor.error_rate_alert_threshold * 100.0
    );
    println!(
        "  History: {} samples per metric, recent window {}",
        monitor.max_history, monitor.recent_window
    );
    if monitor.sampler_enabled {
        println!("  Sampler: every {} ms", monitor.sample_interval_ms);
    } else {
        println!("  Sampler: disabled");
    }

    println!("  Startup timeout: {} s", config.startup.timeout_secs);
    println!(
        "  Logging: {} ({})",
        config.logging.level, config.logging.format
    );
    println!();
    println!("Configuration is ready to use.");

    Ok(())
}
