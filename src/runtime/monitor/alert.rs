//! Threshold alerts.
//!
//! One [`Alert`] type serves both alerting paths: the per-sample path pushes
//! alerts to registered handlers as metrics are recorded, and the summary
//! scan returns them alongside the aggregate statistics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::metric::{MetricType, Tags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighLatency,
    HighErrorRate,
}

/// A threshold breach.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    /// Metric that triggered a per-sample alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<MetricType>,
    /// Operation that triggered a summary alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

impl Alert {
    pub(super) fn for_metric(
        metric_type: MetricType,
        value: f64,
        threshold: f64,
        tags: Tags,
    ) -> Self {
        Self {
            kind: AlertKind::HighLatency,
            metric_type: Some(metric_type),
            operation: None,
            value,
            threshold,
            timestamp: Utc::now(),
            tags,
        }
    }

    pub(super) fn for_operation(
        kind: AlertKind,
        operation: &str,
        value: f64,
        threshold: f64,
    ) -> Self {
        Self {
            kind,
            metric_type: None,
            operation: Some(operation.to_string()),
            value,
            threshold,
            timestamp: Utc::now(),
            tags: Tags::new(),
        }
    }
}

/// Callback invoked synchronously for every per-sample alert.
///
/// Handlers run on the recording task and must not block. A panicking
/// handler is logged and skipped.
pub type AlertHandler = Arc<dyn Fn(&Alert) + Send + Sync>;
