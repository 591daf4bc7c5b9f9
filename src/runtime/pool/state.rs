//! Connection pool bookkeeping.
//!
//! Everything here is synchronous and runs under the pool lock. Factory
//! calls never happen while the lock is held: a caller reserves a slot,
//! creates the handle outside the critical section, then publishes it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::port::Probe;

/// Lifecycle of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Idle,
    Active,
    /// Lent out but exceeded the error threshold; evicted on return.
    Failed,
    Closed,
}

/// Why a record left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EvictReason {
    IdleTimeout,
    TooManyErrors,
    ProbeFailed,
    IdleQueueFull,
    Drained,
}

impl EvictReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::IdleTimeout => "idle_timeout",
            Self::TooManyErrors => "too_many_errors",
            Self::ProbeFailed => "probe_failed",
            Self::IdleQueueFull => "idle_queue_full",
            Self::Drained => "drained",
        }
    }
}

pub(super) struct ConnectionRecord<H> {
    pub(super) id: u64,
    pub(super) handle: Arc<H>,
    pub(super) status: ConnectionStatus,
    pub(super) created_at: Instant,
    pub(super) last_used_at: Instant,
    pub(super) use_count: u64,
    pub(super) error_count: u32,
}

impl<H: Probe> ConnectionRecord<H> {
    /// Health check applied before an idle record is lent out again.
    fn check_health(&self, now: Instant, config: &PoolConfig) -> Option<EvictReason> {
        if now.saturating_duration_since(self.last_used_at) > config.max_idle_time() {
            Some(EvictReason::IdleTimeout)
        } else if self.error_count > config.max_error_count {
            Some(EvictReason::TooManyErrors)
        } else if !self.handle.is_alive() {
            Some(EvictReason::ProbeFailed)
        } else {
            None
        }
    }
}

/// Aggregate counters, updated on every borrow, return, creation and eviction.
#[derive(Debug, Default)]
pub(super) struct PoolMetrics {
    pub(super) total_created: u64,
    pub(super) total_destroyed: u64,
    /// Handles lent out and not yet returned.
    pub(super) current_active: usize,
    pub(super) total_requests: u64,
    /// Reported handle errors plus factory failures.
    pub(super) total_errors: u64,
    pub(super) creation_failures: u64,
    served: u64,
    avg_response_time_ms: f64,
}

impl PoolMetrics {
    /// Fold one successful acquisition into the running average.
    fn record_response(&mut self, elapsed: Duration) {
        self.served += 1;
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.avg_response_time_ms += (sample - self.avg_response_time_ms) / self.served as f64;
    }

    fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.total_errors as f64 / self.total_requests as f64).min(1.0)
        }
    }
}

pub(super) struct PoolState<H> {
    records: HashMap<u64, ConnectionRecord<H>>,
    /// Ids of idle records, most recently returned at the back.
    idle: VecDeque<u64>,
    /// Slots reserved by in-flight factory calls.
    pending: usize,
    next_id: u64,
    metrics: PoolMetrics,
    closed: bool,
}

impl<H> PoolState<H> {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            idle: VecDeque::new(),
            pending: 0,
            next_id: 0,
            metrics: PoolMetrics::default(),
            closed: false,
        }
    }

    /// Live records plus reserved slots; never exceeds `max_connections`.
    fn live(&self) -> usize {
        self.records.len() + self.pending
    }

    fn evict(&mut self, id: u64, reason: EvictReason) {
        let Some(mut record) = self.records.remove(&id) else {
            return;
        };
        record.status = ConnectionStatus::Closed;
        self.metrics.total_destroyed += 1;
        debug!(
            connection_id = record.id,
            reason = reason.as_str(),
            use_count = record.use_count,
            errors = record.error_count,
            age_ms = record.created_at.elapsed().as_millis() as u64,
            "Evicted connection"
        );
    }
}

/// Outcome of the synchronous half of a borrow.
pub(super) enum Checkout<H> {
    Ready { id: u64, handle: Arc<H> },
    /// A slot was reserved; the caller must create a handle or release it.
    Create,
    Exhausted,
    Closed,
}

/// State shared between the pool, its health task and outstanding handles.
pub(super) struct Shared<H> {
    pub(super) config: PoolConfig,
    state: Mutex<PoolState<H>>,
}

impl<H> Shared<H> {
    pub(super) fn new(config: PoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState::new()),
        }
    }

    /// Publish a freshly created handle into a previously reserved slot.
    ///
    /// Returns `None` if the pool was drained while the handle was being
    /// created; the handle is dropped.
    pub(super) fn publish(&self, handle: H, status: ConnectionStatus) -> Option<(u64, Arc<H>)> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.pending = state.pending.saturating_sub(1);
        if state.closed {
            debug!("Pool closed during creation, discarding new connection");
            return None;
        }

        state.next_id += 1;
        let id = state.next_id;
        let now = Instant::now();
        let handle = Arc::new(handle);
        let active = status == ConnectionStatus::Active;

        state.records.insert(
            id,
            ConnectionRecord {
                id,
                handle: Arc::clone(&handle),
                status,
                created_at: now,
                last_used_at: now,
                use_count: u64::from(active),
                error_count: 0,
            },
        );
        state.metrics.total_created += 1;
        if active {
            state.metrics.current_active += 1;
        } else {
            state.idle.push_back(id);
        }

        debug!(connection_id = id, status = ?status, "Created connection");
        Some((id, handle))
    }

    /// Give back a slot reserved for a creation that did not complete.
    pub(super) fn cancel_reservation(&self, failed: bool) {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);
        if failed {
            state.metrics.creation_failures += 1;
            state.metrics.total_errors += 1;
        }
    }

    pub(super) fn record_response(&self, elapsed: Duration) {
        self.state.lock().metrics.record_response(elapsed);
    }

    /// Return a lent-out handle: requeue it, or evict it if it failed or
    /// the idle queue is full.
    pub(super) fn release(&self, id: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let capacity = self.config.idle_capacity();

        let Some(record) = state.records.get_mut(&id) else {
            debug!(connection_id = id, "Returned connection is no longer tracked");
            return;
        };
        if !matches!(
            record.status,
            ConnectionStatus::Active | ConnectionStatus::Failed
        ) {
            warn!(connection_id = id, status = ?record.status, "Connection returned twice");
            return;
        }

        state.metrics.current_active = state.metrics.current_active.saturating_sub(1);
        record.last_used_at = Instant::now();

        let reason = if record.status == ConnectionStatus::Failed
            || record.error_count > self.config.max_error_count
        {
            Some(EvictReason::TooManyErrors)
        } else if state.idle.len() >= capacity {
            Some(EvictReason::IdleQueueFull)
        } else {
            None
        };

        match reason {
            Some(reason) => state.evict(id, reason),
            None => {
                record.status = ConnectionStatus::Idle;
                state.idle.push_back(id);
            }
        }
    }

    /// Count an error against a lent-out handle.
    pub(super) fn report_error(&self, id: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.metrics.total_errors += 1;

        let Some(record) = state.records.get_mut(&id) else {
            return;
        };
        record.error_count += 1;
        if record.error_count > self.config.max_error_count
            && record.status == ConnectionStatus::Active
        {
            record.status = ConnectionStatus::Failed;
            warn!(
                connection_id = id,
                errors = record.error_count,
                "Connection exceeded error threshold, will be evicted on return"
            );
        }
    }

    /// Evict every record and refuse further borrows.
    pub(super) fn drain(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        state.idle.clear();
        let ids: Vec<u64> = state.records.keys().copied().collect();
        for &id in &ids {
            state.evict(id, EvictReason::Drained);
        }
        state.metrics.current_active = 0;
        ids.len()
    }

    pub(super) fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let count = |status| {
            state
                .records
                .values()
                .filter(|r| r.status == status)
                .count()
        };
        PoolStats {
            pool_size: state.records.len(),
            active_connections: state.metrics.current_active,
            idle_connections: state.idle.len(),
            failed_connections: count(ConnectionStatus::Failed),
            pending_creations: state.pending,
            min_connections: self.config.min_connections,
            max_connections: self.config.max_connections,
            total_created: state.metrics.total_created,
            total_destroyed: state.metrics.total_destroyed,
            total_requests: state.metrics.total_requests,
            total_errors: state.metrics.total_errors,
            creation_failures: state.metrics.creation_failures,
            avg_response_time_ms: state.metrics.avg_response_time_ms,
            error_rate: state.metrics.error_rate(),
            closed: state.closed,
        }
    }
}

impl<H: Probe> Shared<H> {
    /// Take a healthy idle record, or reserve a creation slot.
    ///
    /// Unhealthy idle records met along the way are evicted.
    pub(super) fn checkout(&self) -> Checkout<H> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Checkout::Closed;
        }
        state.metrics.total_requests += 1;

        let now = Instant::now();
        while let Some(id) = state.idle.pop_back() {
            let Some(record) = state.records.get_mut(&id) else {
                continue;
            };
            if let Some(reason) = record.check_health(now, &self.config) {
                state.evict(id, reason);
                continue;
            }

            record.status = ConnectionStatus::Active;
            record.last_used_at = now;
            record.use_count += 1;
            state.metrics.current_active += 1;
            return Checkout::Ready {
                id,
                handle: Arc::clone(&record.handle),
            };
        }

        if state.live() < self.config.max_connections {
            state.pending += 1;
            Checkout::Create
        } else {
            Checkout::Exhausted
        }
    }

    /// Evict idle records that fail the health check. Returns how many.
    pub(super) fn sweep(&self) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        let mut expired = Vec::new();
        let records = &state.records;
        state.idle.retain(|id| {
            let reason = records
                .get(id)
                .and_then(|r| r.check_health(now, &self.config));
            match reason {
                Some(reason) => {
                    expired.push((*id, reason));
                    false
                }
                None => records.contains_key(id),
            }
        });

        for &(id, reason) in &expired {
            state.evict(id, reason);
        }
        expired.len()
    }

    /// Reserve a slot if the pool is below its floor and the idle queue has
    /// room for the new handle.
    pub(super) fn reserve_below_floor(&self) -> bool {
        let mut state = self.state.lock();
        let floor = self.config.min_connections.min(self.config.max_connections);
        if state.closed || state.live() >= floor {
            return false;
        }
        // Pending slots may land in the idle queue.
        if state.idle.len() + state.pending >= self.config.idle_capacity() {
            return false;
        }
        state.pending += 1;
        true
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Live connections, idle and lent out.
    pub pool_size: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub failed_connections: usize,
    pub pending_creations: usize,
    pub min_connections: usize,
    pub max_connections: usize,
    pub total_created: u64,
    pub total_destroyed: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub creation_failures: u64,
    /// Mean time callers spent obtaining a handle, creation included.
    pub avg_response_time_ms: f64,
    /// `total_errors / total_requests`, capped at 1.
    pub error_rate: f64,
    pub closed: bool,
}
