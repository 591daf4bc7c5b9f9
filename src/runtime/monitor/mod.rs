//! Performance telemetry: operation timings, scalar metrics and alerts.
//!
//! Call sites report per-operation durations and outcomes through
//! [`PerformanceMonitor::record_operation_time`] (or the
//! [`time_operation`](PerformanceMonitor::time_operation) boundary) and
//! arbitrary scalar samples through [`PerformanceMonitor::record_metric`].
//! Bookkeeping is synchronous and bounded by the configured buffer sizes.
//!
//! Two alerting paths share one [`Alert`] type:
//!
//! - **Per-sample**: a `response_time` sample above the latency threshold is
//!   pushed to every registered handler as it is recorded.
//! - **Summary scan**: [`PerformanceMonitor::get_performance_summary`] checks
//!   each operation's recent average latency and error rate and returns the
//!   breaches with the summary.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

use crate::config::MonitorConfig;
use crate::runtime::panic_message;

mod alert;
mod metric;
mod sampler;
mod stats;

pub use alert::{Alert, AlertHandler, AlertKind};
pub use metric::{Metric, MetricSnapshot, MetricType, Tags};
pub use stats::OperationSnapshot;

use metric::MetricHistory;
use sampler::sampler_task;
use stats::OperationStats;

/// Value read on every sampler tick and recorded as a metric.
type GaugeFn = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Default)]
struct MonitorState {
    metrics: HashMap<MetricType, MetricHistory>,
    operations: HashMap<String, OperationStats>,
    alerts_raised: u64,
}

struct MonitorInner {
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    // Cloned out before invocation; never held while user code runs.
    handlers: Mutex<Vec<AlertHandler>>,
    gauges: Mutex<Vec<(MetricType, GaugeFn)>>,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

/// Collects timings and metrics and raises threshold alerts.
///
/// Cheap to clone; clones share the same statistics.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use memserve::config::MonitorConfig;
/// use memserve::runtime::monitor::PerformanceMonitor;
///
/// let monitor = PerformanceMonitor::new(MonitorConfig::default());
/// monitor.record_operation_time("search", Duration::from_millis(12), true);
/// monitor.record_operation_time("search", Duration::from_millis(400), false);
///
/// let stats = monitor.get_operation_stats("search").unwrap();
/// assert_eq!(stats.total_calls, 2);
/// assert_eq!(stats.error_rate, 0.5);
/// ```
#[derive(Clone)]
pub struct PerformanceMonitor {
    inner: Arc<MonitorInner>,
}

impl PerformanceMonitor {
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                config,
                state: Mutex::new(MonitorState::default()),
                handlers: Mutex::new(Vec::new()),
                gauges: Mutex::new(Vec::new()),
                sampler: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Record a scalar sample.
    ///
    /// `response_time` samples above `latency_alert_threshold_ms` are pushed
    /// to every alert handler before this returns.
    pub fn record_metric(&self, metric_type: MetricType, value: f64, tags: Tags) {
        let threshold = self.inner.config.latency_alert_threshold_ms;
        let alert = (metric_type == MetricType::ResponseTime && value > threshold)
            .then(|| Alert::for_metric(metric_type, value, threshold, tags.clone()));

        {
            let mut state = self.inner.state.lock();
            let capacity = self.inner.config.max_history;
            state
                .metrics
                .entry(metric_type)
                .or_insert_with(|| MetricHistory::new(capacity))
                .push(Metric {
                    metric_type,
                    value,
                    timestamp: Utc::now(),
                    tags,
                });
            if alert.is_some() {
                state.alerts_raised += 1;
            }
        }

        trace!(metric = %metric_type, value, "Recorded metric");

        if let Some(alert) = alert {
            warn!(
                metric = %metric_type,
                value,
                threshold,
                "Response time above alert threshold"
            );
            self.dispatch(&alert);
        }
    }

    /// Record one call of `name`.
    ///
    /// Every call counts toward `total_calls`; only successful calls feed
    /// the timing statistics.
    pub fn record_operation_time(&self, name: &str, duration: Duration, success: bool) {
        let mut state = self.inner.state.lock();
        let window = self.inner.config.recent_window;
        match state.operations.get_mut(name) {
            Some(stats) => stats.record(duration, success),
            None => {
                let mut stats = OperationStats::new(window);
                stats.record(duration, success);
                state.operations.insert(name.to_string(), stats);
            }
        }
    }

    /// Run `operation`, then record its duration and outcome under `name`
    /// along with a `response_time` sample tagged with the operation.
    pub async fn time_operation<T, E, Fut>(&self, name: &str, operation: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = operation.await;
        self.record_timing(name, started.elapsed(), result.is_ok());
        result
    }

    pub(crate) fn record_timing(&self, name: &str, elapsed: Duration, success: bool) {
        self.record_operation_time(name, elapsed, success);

        let mut tags = Tags::new();
        tags.insert("operation".to_string(), name.to_string());
        tags.insert(
            "outcome".to_string(),
            if success { "success" } else { "error" }.to_string(),
        );
        let ms = elapsed.as_nanos() as f64 / 1_000_000.0;
        self.record_metric(MetricType::ResponseTime, ms, tags);
    }

    pub fn get_operation_stats(&self, name: &str) -> Option<OperationSnapshot> {
        let state = self.inner.state.lock();
        state.operations.get(name).map(|stats| stats.snapshot(name))
    }

    pub fn get_all_operation_stats(&self) -> BTreeMap<String, OperationSnapshot> {
        let state = self.inner.state.lock();
        state
            .operations
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot(name)))
            .collect()
    }

    /// Aggregate over the retained samples of one metric type.
    pub fn metric_snapshot(&self, metric_type: MetricType) -> Option<MetricSnapshot> {
        let state = self.inner.state.lock();
        state.metrics.get(&metric_type)?.snapshot()
    }

    /// Up to `limit` most recent samples of one metric type, newest last.
    pub fn recent_metrics(&self, metric_type: MetricType, limit: usize) -> Vec<Metric> {
        let state = self.inner.state.lock();
        state
            .metrics
            .get(&metric_type)
            .map(|history| history.recent(limit))
            .unwrap_or_default()
    }

    /// Statistics for every operation and metric, plus the threshold scan.
    pub fn get_performance_summary(&self) -> PerformanceSummary {
        let (operations, metrics, alerts_raised) = {
            let state = self.inner.state.lock();
            let operations: BTreeMap<String, OperationSnapshot> = state
                .operations
                .iter()
                .map(|(name, stats)| (name.clone(), stats.snapshot(name)))
                .collect();
            let metrics: BTreeMap<MetricType, MetricSnapshot> = state
                .metrics
                .iter()
                .filter_map(|(kind, history)| Some((*kind, history.snapshot()?)))
                .collect();
            (operations, metrics, state.alerts_raised)
        };

        let alerts = self.scan(&operations);
        PerformanceSummary {
            generated_at: Utc::now(),
            operations,
            metrics,
            alerts,
            alerts_raised,
        }
    }

    fn scan(&self, operations: &BTreeMap<String, OperationSnapshot>) -> Vec<Alert> {
        let config = &self.inner.config;
        let mut alerts = Vec::new();
        for (name, stats) in operations {
            if stats.recent_samples > 0 && stats.recent_average_ms > config.latency_alert_threshold_ms
            {
                alerts.push(Alert::for_operation(
                    AlertKind::HighLatency,
                    name,
                    stats.recent_average_ms,
                    config.latency_alert_threshold_ms,
                ));
            }
            if stats.total_calls > 0 && stats.error_rate > config.error_rate_alert_threshold {
                alerts.push(Alert::for_operation(
                    AlertKind::HighErrorRate,
                    name,
                    stats.error_rate,
                    config.error_rate_alert_threshold,
                ));
            }
        }
        alerts
    }

    /// Register a callback for per-sample alerts.
    pub fn add_alert_handler<F>(&self, handler: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.inner.handlers.lock().push(Arc::new(handler));
    }

    /// Register a value read and recorded as `metric_type` on every sampler tick.
    pub fn add_gauge<F>(&self, metric_type: MetricType, read: F)
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.inner.gauges.lock().push((metric_type, Arc::new(read)));
    }

    /// Read every gauge once and record the values. Returns how many were
    /// recorded; a panicking gauge is logged and skipped.
    pub fn sample_gauges(&self) -> usize {
        let gauges = self.inner.gauges.lock().clone();
        let mut recorded = 0;
        for (metric_type, read) in gauges {
            match std::panic::catch_unwind(AssertUnwindSafe(|| read())) {
                Ok(value) => {
                    self.record_metric(metric_type, value, Tags::new());
                    recorded += 1;
                }
                Err(panic) => error!(
                    metric = %metric_type,
                    panic = %panic_message(panic.as_ref()),
                    "Gauge panicked"
                ),
            }
        }
        recorded
    }

    /// Spawn the background sampler. Returns `false` if it is already running.
    pub fn start_sampler(&self) -> bool {
        let mut slot = self.inner.sampler.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }
        let period = self.inner.config.sample_interval();
        info!(
            interval_ms = period.as_millis() as u64,
            "Starting performance sampler"
        );
        *slot = Some(tokio::spawn(sampler_task(Arc::downgrade(&self.inner), period)));
        true
    }

    /// Cancel the sampler and wait for it to stop.
    pub async fn stop_sampler(&self) {
        let task = self.inner.sampler.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            info!("Performance sampler stopped");
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.inner
            .sampler
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn dispatch(&self, alert: &Alert) {
        let handlers = self.inner.handlers.lock().clone();
        for (index, handler) in handlers.iter().enumerate() {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| handler(alert))) {
                error!(
                    handler = index,
                    panic = %panic_message(panic.as_ref()),
                    "Alert handler panicked"
                );
            }
        }
    }
}

/// Point-in-time view of everything the monitor tracks.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub generated_at: DateTime<Utc>,
    pub operations: BTreeMap<String, OperationSnapshot>,
    pub metrics: BTreeMap<MetricType, MetricSnapshot>,
    /// Breaches found by the summary scan.
    pub alerts: Vec<Alert>,
    /// Per-sample alerts pushed to handlers since startup.
    pub alerts_raised: u64,
}
