//! Scalar metrics and their bounded history.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kinds of scalar metric the monitor tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Operation latency in milliseconds. Checked against the alert threshold.
    ResponseTime,
    /// Resident memory of the process in megabytes.
    MemoryUsage,
    /// Process CPU usage in percent.
    CpuUsage,
    DatabaseQueryTime,
    VectorSearchTime,
    CacheHitRate,
    ConnectionPoolSize,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResponseTime => "response_time",
            Self::MemoryUsage => "memory_usage",
            Self::CpuUsage => "cpu_usage",
            Self::DatabaseQueryTime => "database_query_time",
            Self::VectorSearchTime => "vector_search_time",
            Self::CacheHitRate => "cache_hit_rate",
            Self::ConnectionPoolSize => "connection_pool_size",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form labels attached to a sample.
pub type Tags = BTreeMap<String, String>;

/// One recorded sample.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub metric_type: MetricType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
}

/// Oldest-evicted-first buffer of samples for a single metric type.
#[derive(Debug)]
pub(super) struct MetricHistory {
    samples: VecDeque<Metric>,
    capacity: usize,
}

impl MetricHistory {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub(super) fn push(&mut self, metric: Metric) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(metric);
    }

    pub(super) fn len(&self) -> usize {
        self.samples.len()
    }

    pub(super) fn snapshot(&self) -> Option<MetricSnapshot> {
        let latest = self.samples.back()?;
        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
        for sample in &self.samples {
            min = min.min(sample.value);
            max = max.max(sample.value);
            sum += sample.value;
        }
        Some(MetricSnapshot {
            count: self.samples.len(),
            latest: latest.value,
            latest_at: latest.timestamp,
            average: sum / self.samples.len() as f64,
            min,
            max,
        })
    }

    /// Most recent samples, newest last.
    pub(super) fn recent(&self, limit: usize) -> Vec<Metric> {
        let skip = self.samples.len().saturating_sub(limit);
        self.samples.iter().skip(skip).cloned().collect()
    }
}

/// Aggregate over the retained history of one metric type.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    /// Samples currently retained.
    pub count: usize,
    pub latest: f64,
    pub latest_at: DateTime<Utc>,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}
