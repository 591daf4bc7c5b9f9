//! Dependency-ordered startup and shutdown of runtime components.
//!
//! The [`Initializer`] holds named startup routines with declared
//! dependencies. [`Initializer::initialize_all`] resolves a topological
//! order and runs each routine exactly once, in order, inside a single
//! background pass:
//!
//! - **Single-flight**: concurrent callers await the same pass instead of
//!   starting another one.
//! - **Fail-stop**: the first failing routine aborts the rest of the pass;
//!   components already initialized keep their state.
//! - **Reverse teardown**: [`Initializer::shutdown`] cancels an in-flight
//!   pass, then runs shutdown hooks of initialized components in reverse
//!   order, isolating each hook's failure.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::panic_message;
use crate::error::InitError;

mod component;
mod order;

pub use component::{
    Component, ComponentFuture, ComponentReport, ComponentRoutine, ComponentStatus, StartupStatus,
};

use component::ComponentDescriptor;
use order::resolve_order;

type PassOutcome = Result<(), InitError>;

enum PassState {
    Idle,
    Running {
        outcome: watch::Receiver<Option<PassOutcome>>,
        task: JoinHandle<()>,
    },
    Finished(PassOutcome),
}

#[derive(Default)]
struct Registry {
    components: Vec<ComponentDescriptor>,
    names: HashSet<String>,
    /// Resolved order of the last pass, used for reverse teardown.
    order: Vec<usize>,
    shut_down: bool,
}

struct Inner {
    // Lock order: `pass` before `registry`.
    pass: Mutex<PassState>,
    registry: Mutex<Registry>,
}

/// Orchestrates startup of named components respecting their dependencies.
///
/// Cheap to clone; clones share the same registry and pass.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use memserve::runtime::startup::Initializer;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let init = Initializer::new();
/// init.register("database", &[], || async { Ok(()) }).unwrap();
/// init.register("cache", &["database"], || async { Ok(()) }).unwrap();
///
/// init.initialize_all(Duration::from_secs(5)).await.unwrap();
/// assert!(init.status().completed);
/// # }
/// ```
#[derive(Clone)]
pub struct Initializer {
    inner: Arc<Inner>,
}

impl Initializer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                pass: Mutex::new(PassState::Idle),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Register a startup routine under `name`.
    ///
    /// # Errors
    ///
    /// See [`register_component`](Self::register_component).
    pub fn register<F, Fut>(
        &self,
        name: impl Into<String>,
        dependencies: &[&str],
        routine: F,
    ) -> Result<(), InitError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_component(
            Component::new(name, routine).depends_on(dependencies.iter().copied()),
        )
    }

    /// Register a fully described component, including an optional shutdown hook.
    ///
    /// # Errors
    ///
    /// - [`InitError::DuplicateComponent`] if the name is already registered
    /// - [`InitError::AlreadyStarted`] once a pass has started or shutdown ran
    pub fn register_component(&self, component: Component) -> Result<(), InitError> {
        let pass = self.inner.pass.lock();
        let mut registry = self.inner.registry.lock();

        if !matches!(*pass, PassState::Idle) || registry.shut_down {
            return Err(InitError::AlreadyStarted(component.name));
        }
        if !registry.names.insert(component.name.clone()) {
            return Err(InitError::DuplicateComponent(component.name));
        }

        debug!(
            component = %component.name,
            dependencies = ?component.dependencies,
            "Registered component"
        );
        registry.components.push(component.into());
        Ok(())
    }

    /// Run every registered component in dependency order.
    ///
    /// Returns immediately with the recorded outcome if a pass already
    /// finished. If a pass is running, waits for it rather than starting
    /// another. `timeout` bounds only the wait; a timed-out pass keeps
    /// running in the background until it finishes or [`shutdown`](Self::shutdown)
    /// cancels it.
    ///
    /// # Errors
    ///
    /// - [`InitError::DependencyCycle`] before any routine runs
    /// - [`InitError::ComponentFailed`] for the first failing routine
    /// - [`InitError::Timeout`] if the pass outlives `timeout`
    /// - [`InitError::Cancelled`] if shutdown cancelled the pass
    pub async fn initialize_all(&self, timeout: Duration) -> Result<(), InitError> {
        let mut outcome = {
            let mut pass = self.inner.pass.lock();
            match &*pass {
                PassState::Finished(result) => return result.clone(),
                PassState::Running { outcome, .. } => outcome.clone(),
                PassState::Idle => {
                    let order = {
                        let mut registry = self.inner.registry.lock();
                        if registry.shut_down {
                            return Err(InitError::Cancelled);
                        }
                        let order = resolve_order(&registry.components).map_err(|e| {
                            error!(error = %e, "Cannot resolve startup order");
                            e
                        })?;
                        registry.order.clone_from(&order);
                        order
                    };

                    let (tx, rx) = watch::channel(None);
                    let task = tokio::spawn(run_pass(Arc::clone(&self.inner), order, tx));
                    *pass = PassState::Running {
                        outcome: rx.clone(),
                        task,
                    };
                    rx
                }
            }
        };

        let wait = async move {
            match outcome.wait_for(Option::is_some).await {
                Ok(result) => (*result).clone().unwrap_or(Err(InitError::Cancelled)),
                Err(_) => Err(InitError::Cancelled),
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Initialization still running after timeout"
                );
                Err(InitError::Timeout { waited: timeout })
            }
        }
    }

    /// Snapshot of overall completion and per-component state.
    #[must_use]
    pub fn status(&self) -> StartupStatus {
        let (completed, in_progress) = match &*self.inner.pass.lock() {
            PassState::Idle => (false, false),
            PassState::Running { .. } => (false, true),
            PassState::Finished(result) => (result.is_ok(), false),
        };
        let registry = self.inner.registry.lock();
        StartupStatus {
            completed,
            in_progress,
            components: registry
                .components
                .iter()
                .map(ComponentDescriptor::report)
                .collect(),
        }
    }

    /// Whether the last pass initialized every component.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.pass.lock(), PassState::Finished(Ok(())))
    }

    /// Cancel any in-flight pass, then run shutdown hooks in reverse order.
    ///
    /// Hooks run only for components that reached `Initialized`. A failing
    /// or panicking hook is logged and does not prevent the others from
    /// running. Subsequent calls are no-ops.
    pub async fn shutdown(&self) {
        let in_flight = {
            let mut pass = self.inner.pass.lock();
            match std::mem::replace(&mut *pass, PassState::Finished(Err(InitError::Cancelled))) {
                PassState::Running { task, .. } => Some(task),
                PassState::Finished(result) => {
                    *pass = PassState::Finished(result);
                    None
                }
                PassState::Idle => None,
            }
        };

        if let Some(task) = in_flight {
            info!("Cancelling in-flight initialization");
            task.abort();
            // Resolves once the pass is dropped; the JoinError is expected.
            let _ = task.await;
        }

        let hooks: Vec<(String, ComponentRoutine)> = {
            let mut registry = self.inner.registry.lock();
            if registry.shut_down {
                return;
            }
            registry.shut_down = true;
            registry
                .order
                .iter()
                .rev()
                .map(|&i| &registry.components[i])
                .filter(|c| c.status == ComponentStatus::Initialized)
                .filter_map(|c| c.shutdown.clone().map(|hook| (c.name.clone(), hook)))
                .collect()
        };

        info!(hooks = hooks.len(), "Shutting down components");

        for (name, hook) in hooks {
            let started = Instant::now();
            match AssertUnwindSafe(async { hook().await })
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => info!(
                    component = %name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Component shut down"
                ),
                Ok(Err(e)) => {
                    let reason = format!("{e:#}");
                    error!(component = %name, error = %reason, "Shutdown hook failed");
                }
                Err(panic) => error!(
                    component = %name,
                    panic = %panic_message(panic.as_ref()),
                    "Shutdown hook panicked"
                ),
            }
        }
    }
}

impl Default for Initializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Background body of a pass. Owns the outcome sender; dropping it without
/// sending (abort) tells waiters the pass was cancelled.
async fn run_pass(inner: Arc<Inner>, order: Vec<usize>, tx: watch::Sender<Option<PassOutcome>>) {
    let outcome = execute(&inner, &order).await;
    if record_outcome(&inner, &outcome) {
        tx.send_replace(Some(outcome));
    } else {
        debug!("Pass finished after shutdown, outcome discarded");
    }
}

/// Move a running pass to `Finished`. Returns `false`, leaving the state
/// untouched, if shutdown already settled it.
fn record_outcome(inner: &Inner, outcome: &PassOutcome) -> bool {
    let mut pass = inner.pass.lock();
    if !matches!(*pass, PassState::Running { .. }) {
        return false;
    }
    *pass = PassState::Finished(outcome.clone());
    true
}

async fn execute(inner: &Inner, order: &[usize]) -> PassOutcome {
    let pass_started = Instant::now();
    info!(components = order.len(), "Starting initialization");

    for &index in order {
        let (name, routine) = {
            let mut registry = inner.registry.lock();
            let component = &mut registry.components[index];
            if !component.transition(ComponentStatus::Initializing) {
                continue;
            }
            component.started_at = Some(Utc::now());
            (component.name.clone(), Arc::clone(&component.routine))
        };

        info!(component = %name, "Initializing component");
        let started = Instant::now();
        let result = AssertUnwindSafe(async { routine().await })
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
        };

        {
            let mut registry = inner.registry.lock();
            let component = &mut registry.components[index];
            component.finished_at = Some(Utc::now());
            component.elapsed = Some(elapsed);
            let next = if failure.is_some() {
                ComponentStatus::Failed
            } else {
                ComponentStatus::Initialized
            };
            component.transition(next);
            component.error.clone_from(&failure);
        }

        if let Some(reason) = failure {
            error!(
                component = %name,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %reason,
                "Component failed to initialize"
            );
            return Err(InitError::ComponentFailed {
                component: name,
                reason,
            });
        }

        info!(
            component = %name,
            elapsed_ms = elapsed.as_millis() as u64,
            "Component initialized"
        );
    }

    info!(
        components = order.len(),
        elapsed_ms = pass_started.elapsed().as_millis() as u64,
        "Initialization complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests;
