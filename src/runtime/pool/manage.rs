//! Pool health task.

use std::panic::AssertUnwindSafe;
use std::sync::Weak;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use super::{ConnectionPool, PoolInner};
use crate::port::ResourceFactory;
use crate::runtime::panic_message;

/// Periodically sweep idle connections and restore the size floor.
///
/// Holds only a weak reference so a dropped pool ends the task. A panicking
/// iteration is logged and the loop carries on.
pub(super) async fn health_task<F: ResourceFactory>(weak: Weak<PoolInner<F>>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    debug!("Pool health task started");

    loop {
        interval.tick().await;

        let Some(inner) = weak.upgrade() else {
            debug!("Pool dropped, health task exiting");
            return;
        };
        let pool = ConnectionPool { inner };

        if let Err(panic) = AssertUnwindSafe(pool.run_health_check())
            .catch_unwind()
            .await
        {
            error!(
                panic = %panic_message(panic.as_ref()),
                "Pool health check panicked"
            );
        }
    }
}
