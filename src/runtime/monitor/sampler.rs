//! Background sampler for gauges and process resources.

use std::panic::AssertUnwindSafe;
use std::sync::Weak;
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use super::metric::{MetricType, Tags};
use super::{MonitorInner, PerformanceMonitor};
use crate::runtime::panic_message;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Memory and CPU usage of the current process.
pub(super) struct ProcessSampler {
    system: System,
    pid: Pid,
}

impl ProcessSampler {
    /// Returns `None` where the current process cannot be resolved.
    pub(super) fn new() -> Option<Self> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = System::new_with_specifics(
            RefreshKind::nothing().with_processes(ProcessRefreshKind::everything()),
        );
        // CPU usage is a delta; prime the first reading.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        Some(Self { system, pid })
    }

    /// `(memory_mb, cpu_percent)`, or `None` if the process vanished from
    /// the process table.
    pub(super) fn sample(&mut self) -> Option<(f64, f64)> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let process = self.system.process(self.pid)?;
        Some((
            process.memory() as f64 / BYTES_PER_MB,
            f64::from(process.cpu_usage()),
        ))
    }
}

/// Periodically read registered gauges and process resources.
///
/// Ends when the monitor is dropped. A panicking tick is logged and the
/// loop carries on.
pub(super) async fn sampler_task(weak: Weak<MonitorInner>, period: Duration) {
    let mut process = ProcessSampler::new();
    if process.is_none() {
        debug!("Process resource sampling unavailable, recording gauges only");
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        interval.tick().await;

        let Some(inner) = weak.upgrade() else {
            debug!("Monitor dropped, sampler exiting");
            return;
        };
        let monitor = PerformanceMonitor { inner };

        let tick = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let gauges = monitor.sample_gauges();
            let resources = process.as_mut().and_then(ProcessSampler::sample);
            if let Some((memory_mb, cpu_percent)) = resources {
                monitor.record_metric(MetricType::MemoryUsage, memory_mb, Tags::new());
                monitor.record_metric(MetricType::CpuUsage, cpu_percent, Tags::new());
            }
            debug!(gauges, resources = resources.is_some(), "Sampler tick");
        }));

        if let Err(panic) = tick {
            error!(panic = %panic_message(panic.as_ref()), "Sampler tick panicked");
        }
    }
}
