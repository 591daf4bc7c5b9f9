//! Runtime optimization layer.
//!
//! - [`startup`] - Dependency-ordered initialization and reverse teardown
//! - [`pool`] - Bounded pool of reusable resource handles
//! - [`monitor`] - Operation timings, scalar metrics and threshold alerts
//! - [`context`] - Explicitly constructed wiring of the three

pub mod context;
pub mod monitor;
pub mod pool;
pub mod startup;

pub use context::{HealthSnapshot, RuntimeContext};
pub use monitor::PerformanceMonitor;
pub use pool::{ConnectionPool, PooledConnection};
pub use startup::Initializer;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
