//! Scriptable [`ResourceFactory`] for pool tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::port::{Probe, ResourceFactory};

/// Handle produced by [`MockFactory`].
#[derive(Debug)]
pub struct MockHandle {
    serial: u32,
    alive: Arc<AtomicBool>,
}

impl MockHandle {
    /// Creation order, starting at 1.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Make the liveness probe fail from now on.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Probe for MockHandle {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MockState {
    attempts: AtomicU32,
    created: AtomicU32,
    failing: AtomicBool,
    scripted_failures: Mutex<VecDeque<String>>,
    delay: Mutex<Duration>,
    liveness: Mutex<Vec<Arc<AtomicBool>>>,
}

/// Factory with a creation counter, scripted failures, liveness toggles and
/// an optional creation delay.
///
/// Clones share state, so a test can keep one clone for assertions after
/// moving another into the pool.
#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `create` call.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.state.delay.lock() = delay;
        self
    }

    /// Fail the next creation with `reason`. Calls queue up.
    pub fn fail_next(&self, reason: &str) {
        self.state
            .scripted_failures
            .lock()
            .push_back(reason.to_string());
    }

    /// Fail every creation until switched off.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every handle created so far fail its liveness probe.
    pub fn kill_all(&self) {
        for alive in self.state.liveness.lock().iter() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    /// Successful creations.
    pub fn created(&self) -> u32 {
        self.state.created.load(Ordering::SeqCst)
    }

    /// All `create` calls, successful or not.
    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFactory for MockFactory {
    type Handle = MockHandle;

    async fn create(&self) -> anyhow::Result<MockHandle> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = self.state.scripted_failures.lock().pop_front() {
            anyhow::bail!(reason);
        }
        if self.state.failing.load(Ordering::SeqCst) {
            anyhow::bail!("mock factory is failing");
        }

        let serial = self.state.created.fetch_add(1, Ordering::SeqCst) + 1;
        let alive = Arc::new(AtomicBool::new(true));
        self.state.liveness.lock().push(Arc::clone(&alive));
        Ok(MockHandle { serial, alive })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
