//! Performance monitor configuration.

use std::time::Duration;

use serde::Deserialize;

/// Alert thresholds and buffer sizes for the performance monitor.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Response time above which a per-sample alert fires (milliseconds).
    #[serde(default = "default_latency_alert_threshold_ms")]
    pub latency_alert_threshold_ms: f64,
    /// Error rate (0.0-1.0] above which the summary scan reports an alert.
    #[serde(default = "default_error_rate_alert_threshold")]
    pub error_rate_alert_threshold: f64,
    /// Samples retained per metric type.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Successful durations retained per operation for the recent average.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    /// Background sampler period (milliseconds).
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Whether the runtime starts the background sampler.
    #[serde(default = "default_sampler_enabled")]
    pub sampler_enabled: bool,
}

const fn default_latency_alert_threshold_ms() -> f64 {
    50.0
}

const fn default_error_rate_alert_threshold() -> f64 {
    0.05
}

const fn default_max_history() -> usize {
    1000
}

const fn default_recent_window() -> usize {
    100
}

const fn default_sample_interval_ms() -> u64 {
    60_000
}

const fn default_sampler_enabled() -> bool {
    true
}

impl MonitorConfig {
    #[must_use]
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            latency_alert_threshold_ms: default_latency_alert_threshold_ms(),
            error_rate_alert_threshold: default_error_rate_alert_threshold(),
            max_history: default_max_history(),
            recent_window: default_recent_window(),
            sample_interval_ms: default_sample_interval_ms(),
            sampler_enabled: default_sampler_enabled(),
        }
    }
}
