//! Per-operation timing statistics.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

/// Running statistics for one named operation.
///
/// Only successful calls contribute to timing figures; failures are counted
/// in `error_count` and `total_calls` so the error rate stays meaningful.
#[derive(Debug)]
pub(super) struct OperationStats {
    total_calls: u64,
    success_count: u64,
    error_count: u64,
    total_time: Duration,
    min_time: Option<Duration>,
    max_time: Option<Duration>,
    /// Most recent successful durations, oldest first.
    recent: VecDeque<Duration>,
    window: usize,
}

impl OperationStats {
    pub(super) fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            total_calls: 0,
            success_count: 0,
            error_count: 0,
            total_time: Duration::ZERO,
            min_time: None,
            max_time: None,
            recent: VecDeque::with_capacity(window),
            window,
        }
    }

    pub(super) fn record(&mut self, duration: Duration, success: bool) {
        self.total_calls += 1;
        if !success {
            self.error_count += 1;
            return;
        }

        self.success_count += 1;
        self.total_time += duration;
        self.min_time = Some(self.min_time.map_or(duration, |m| m.min(duration)));
        self.max_time = Some(self.max_time.map_or(duration, |m| m.max(duration)));

        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(duration);
    }

    pub(super) fn snapshot(&self, name: &str) -> OperationSnapshot {
        let calls = self.total_calls as f64;
        let rate = |count: u64| if calls > 0.0 { count as f64 / calls } else { 0.0 };

        let mut sorted: Vec<Duration> = self.recent.iter().copied().collect();
        sorted.sort_unstable();

        OperationSnapshot {
            name: name.to_string(),
            total_calls: self.total_calls,
            success_count: self.success_count,
            error_count: self.error_count,
            total_time_ms: as_ms(self.total_time),
            average_time_ms: mean_ms(self.total_time, self.success_count),
            min_time_ms: self.min_time.map_or(0.0, as_ms),
            max_time_ms: self.max_time.map_or(0.0, as_ms),
            recent_average_ms: mean_ms(sorted.iter().sum(), sorted.len() as u64),
            recent_p95_ms: as_ms(percentile(&sorted, 0.95)),
            recent_samples: sorted.len(),
            success_rate: rate(self.success_count),
            error_rate: rate(self.error_count),
        }
    }
}

fn as_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

fn mean_ms(total: Duration, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        as_ms(total) / count as f64
    }
}

/// Value at percentile `p` (0.0 to 1.0) of a sorted slice.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let index = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Read-only view of an operation's statistics. Durations in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct OperationSnapshot {
    pub name: String,
    pub total_calls: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_time_ms: f64,
    /// Lifetime mean over successful calls.
    pub average_time_ms: f64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,
    /// Mean over the recent window of successful calls.
    pub recent_average_ms: f64,
    pub recent_p95_ms: f64,
    pub recent_samples: usize,
    pub success_rate: f64,
    pub error_rate: f64,
}
