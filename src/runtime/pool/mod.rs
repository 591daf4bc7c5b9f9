//! Bounded pool of expensive-to-create resource handles.
//!
//! The pool amortizes creation of client handles (for example a vector-store
//! client) across bursty concurrent callers.
//!
//! # Lifecycle
//!
//! Each handle moves `idle -> active` on borrow and back to `idle` on return.
//! Idle handles are evicted when they exceed `max_idle_time`, accumulate
//! more than `max_error_count` reported errors, fail their liveness probe,
//! or are displaced because the idle queue is full.
//!
//! # Saturation
//!
//! The pool fails fast. When every slot is in use [`ConnectionPool::get_connection`]
//! returns [`PoolError::Exhausted`] instead of queuing the caller.
//!
//! # Background maintenance
//!
//! [`ConnectionPool::start_health_monitoring`] spawns a task that periodically
//! sweeps idle handles and tops the pool back up to `min_connections`.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{ConfigError, PoolError};
use crate::port::ResourceFactory;

mod manage;
mod state;

pub use state::{ConnectionStatus, PoolStats};

use manage::health_task;
use state::{Checkout, Shared};

/// Resource pool with idle eviction, error-based eviction and a size floor.
///
/// Cheap to clone; clones share the same connections.
pub struct ConnectionPool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

struct PoolInner<F: ResourceFactory> {
    factory: F,
    shared: Arc<Shared<F::Handle>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl<F: ResourceFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory> ConnectionPool<F> {
    /// Create an empty pool. No handles are created until the first borrow
    /// or [`warm_up`](Self::warm_up).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `config` fails
    /// [`PoolConfig::validate`].
    pub fn new(config: PoolConfig, factory: F) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                shared: Arc::new(Shared::new(config)),
                health_task: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.shared.config
    }

    /// Borrow a handle.
    ///
    /// Reuses a healthy idle handle if one exists, otherwise creates one if
    /// the pool is below `max_connections`. Never waits for a handle to be
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Exhausted`] when every slot is in use
    /// - [`PoolError::ResourceCreation`] when the factory fails
    /// - [`PoolError::Closed`] after [`close_all_connections`](Self::close_all_connections)
    pub async fn get_connection(&self) -> Result<PooledConnection<F::Handle>, PoolError> {
        let started = Instant::now();
        let shared = &self.inner.shared;

        let (id, handle) = match shared.checkout() {
            Checkout::Ready { id, handle } => {
                debug!(connection_id = id, "Reusing idle connection");
                (id, handle)
            }
            Checkout::Create => self.create(ConnectionStatus::Active).await?,
            Checkout::Exhausted => {
                debug!(
                    max = shared.config.max_connections,
                    "Connection pool exhausted"
                );
                return Err(PoolError::Exhausted {
                    max: shared.config.max_connections,
                });
            }
            Checkout::Closed => return Err(PoolError::Closed),
        };

        shared.record_response(started.elapsed());
        Ok(PooledConnection {
            id,
            handle,
            home: Arc::downgrade(shared),
        })
    }

    /// Hand a borrowed handle back to the pool.
    ///
    /// Equivalent to dropping it.
    pub fn return_connection(&self, connection: PooledConnection<F::Handle>) {
        drop(connection);
    }

    /// Count an error against a borrowed handle.
    ///
    /// Once its errors exceed `max_error_count` the handle is marked failed
    /// and is evicted when returned.
    pub fn report_error(&self, connection: &PooledConnection<F::Handle>) {
        self.inner.shared.report_error(connection.id);
    }

    /// Evict idle handles that have exceeded `max_idle_time` or otherwise
    /// fail the health check. Returns the number evicted.
    pub fn cleanup_idle_connections(&self) -> usize {
        let evicted = self.inner.shared.sweep();
        if evicted > 0 {
            info!(evicted, "Evicted idle connections");
        }
        evicted
    }

    /// Create idle handles until the pool holds `min_connections`.
    ///
    /// Returns the number created. Stops at the first factory failure.
    pub async fn warm_up(&self) -> usize {
        let mut created = 0;
        while self.inner.shared.reserve_below_floor() {
            match self.create(ConnectionStatus::Idle).await {
                Ok(_) => created += 1,
                Err(_) => break,
            }
        }
        if created > 0 {
            debug!(created, "Pool topped up to floor");
        }
        created
    }

    /// Spawn the periodic sweep task. Returns `false` if it is already running.
    pub fn start_health_monitoring(&self) -> bool {
        let mut slot = self.inner.health_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }

        let interval = self.config().health_check_interval();
        info!(
            resource = self.inner.factory.name(),
            interval_ms = interval.as_millis() as u64,
            "Starting pool health monitoring"
        );
        *slot = Some(tokio::spawn(health_task(
            Arc::downgrade(&self.inner),
            interval,
        )));
        true
    }

    /// Cancel the sweep task and wait for it to stop.
    pub async fn stop_health_monitoring(&self) {
        let task = self.inner.health_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            info!("Pool health monitoring stopped");
        }
    }

    pub fn is_health_monitoring(&self) -> bool {
        self.inner
            .health_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn get_metrics(&self) -> PoolStats {
        self.inner.shared.stats()
    }

    /// Evict every handle, including borrowed ones, and refuse further
    /// borrows. Returns the number evicted.
    pub fn close_all_connections(&self) -> usize {
        let evicted = self.inner.shared.drain();
        info!(
            resource = self.inner.factory.name(),
            evicted, "Closed all connections"
        );
        evicted
    }

    /// One iteration of the health task.
    async fn run_health_check(&self) {
        let evicted = self.cleanup_idle_connections();
        let created = self.warm_up().await;
        let stats = self.get_metrics();
        debug!(
            evicted,
            created,
            pool_size = stats.pool_size,
            active = stats.active_connections,
            idle = stats.idle_connections,
            "Pool health check"
        );
    }

    /// Call the factory for a reserved slot and publish the result.
    async fn create(
        &self,
        status: ConnectionStatus,
    ) -> Result<(u64, Arc<F::Handle>), PoolError> {
        let reservation = Reservation {
            shared: &self.inner.shared,
            armed: true,
        };

        match self.inner.factory.create().await {
            Ok(handle) => {
                let published = reservation.publish(handle, status);
                published.ok_or(PoolError::Closed)
            }
            Err(e) => {
                reservation.fail();
                let reason = format!("{e:#}");
                warn!(
                    resource = self.inner.factory.name(),
                    error = %reason,
                    "Failed to create resource"
                );
                Err(PoolError::ResourceCreation(reason))
            }
        }
    }
}

/// Slot reserved for an in-flight factory call.
///
/// Released on drop so a cancelled borrow never leaks capacity.
struct Reservation<'a, H> {
    shared: &'a Shared<H>,
    armed: bool,
}

impl<H> Reservation<'_, H> {
    fn publish(mut self, handle: H, status: ConnectionStatus) -> Option<(u64, Arc<H>)> {
        self.armed = false;
        self.shared.publish(handle, status)
    }

    fn fail(mut self) {
        self.armed = false;
        self.shared.cancel_reservation(true);
    }
}

impl<H> Drop for Reservation<'_, H> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.cancel_reservation(false);
        }
    }
}

/// A borrowed handle. Returns itself to the pool when dropped.
pub struct PooledConnection<H> {
    id: u64,
    handle: Arc<H>,
    home: Weak<Shared<H>>,
}

impl<H> PooledConnection<H> {
    /// Pool-unique connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shared reference to the underlying handle, for work that outlives
    /// a borrow of the guard.
    pub fn handle(&self) -> Arc<H> {
        Arc::clone(&self.handle)
    }
}

impl<H> Deref for PooledConnection<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H> fmt::Debug for PooledConnection<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<H> Drop for PooledConnection<H> {
    fn drop(&mut self) {
        if let Some(shared) = self.home.upgrade() {
            shared.release(self.id);
        }
    }
}
