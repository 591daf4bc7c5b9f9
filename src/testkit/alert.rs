//! Alert handler that records what it receives.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::runtime::monitor::Alert;

/// Collects every alert pushed to it.
///
/// Register with `monitor.add_alert_handler(recorder.handler())`.
#[derive(Clone, Default)]
pub struct RecordingAlertHandler {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl RecordingAlertHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback to pass to `add_alert_handler`.
    pub fn handler(&self) -> impl Fn(&Alert) + Send + Sync + 'static {
        let alerts = Arc::clone(&self.alerts);
        move |alert: &Alert| alerts.lock().push(alert.clone())
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().len()
    }
}
