//! Component descriptors and status reporting types.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;

/// Future returned by startup routines and shutdown hooks.
pub type ComponentFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Startup routine or shutdown hook, invoked at most once per pass.
pub type ComponentRoutine = Arc<dyn Fn() -> ComponentFuture + Send + Sync>;

/// Lifecycle of a registered component.
///
/// Transitions strictly `Pending -> Initializing -> {Initialized | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Pending,
    Initializing,
    Initialized,
    Failed,
}

impl ComponentStatus {
    /// Whether moving from `self` to `next` respects the lifecycle.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Initializing)
                | (Self::Initializing, Self::Initialized)
                | (Self::Initializing, Self::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Initialized | Self::Failed)
    }
}

/// A named startup routine plus its declared dependencies.
///
/// Built by the host and handed to
/// [`Initializer::register_component`](super::Initializer::register_component).
///
/// ```
/// use memserve::runtime::startup::Component;
///
/// let component = Component::new("cache", || async { Ok(()) })
///     .depends_on(["connection_pool"])
///     .on_shutdown(|| async { Ok(()) });
/// assert_eq!(component.name(), "cache");
/// ```
pub struct Component {
    pub(super) name: String,
    pub(super) dependencies: Vec<String>,
    pub(super) routine: ComponentRoutine,
    pub(super) shutdown: Option<ComponentRoutine>,
}

impl Component {
    pub fn new<F, Fut>(name: impl Into<String>, routine: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            routine: boxed(routine),
            shutdown: None,
        }
    }

    /// Declare components that must be initialized first.
    #[must_use]
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Hook run during shutdown if this component reached `Initialized`.
    #[must_use]
    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.shutdown = Some(boxed(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

fn boxed<F, Fut>(f: F) -> ComponentRoutine
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || -> ComponentFuture { Box::pin(f()) })
}

/// Registered component plus the state mutated by an initialization pass.
pub(super) struct ComponentDescriptor {
    pub(super) name: String,
    pub(super) dependencies: Vec<String>,
    pub(super) routine: ComponentRoutine,
    pub(super) shutdown: Option<ComponentRoutine>,
    pub(super) status: ComponentStatus,
    pub(super) started_at: Option<DateTime<Utc>>,
    pub(super) finished_at: Option<DateTime<Utc>>,
    pub(super) elapsed: Option<Duration>,
    pub(super) error: Option<String>,
}

impl ComponentDescriptor {
    pub(super) fn transition(&mut self, next: ComponentStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                component = %self.name,
                from = ?self.status,
                to = ?next,
                "Rejected invalid component status transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    pub(super) fn report(&self) -> ComponentReport {
        ComponentReport {
            name: self.name.clone(),
            status: self.status,
            dependencies: self.dependencies.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: self.elapsed.map(|d| d.as_secs_f64() * 1000.0),
            error: self.error.clone(),
        }
    }
}

impl From<Component> for ComponentDescriptor {
    fn from(component: Component) -> Self {
        Self {
            name: component.name,
            dependencies: component.dependencies,
            routine: component.routine,
            shutdown: component.shutdown,
            status: ComponentStatus::Pending,
            started_at: None,
            finished_at: None,
            elapsed: None,
            error: None,
        }
    }
}

/// Point-in-time view of a single component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub name: String,
    pub status: ComponentStatus,
    pub dependencies: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    pub error: Option<String>,
}

/// Point-in-time view of the whole startup layer.
#[derive(Debug, Clone, Serialize)]
pub struct StartupStatus {
    /// True once a pass finished with every component initialized.
    pub completed: bool,
    /// True while a pass is running.
    pub in_progress: bool,
    /// Components in registration order.
    pub components: Vec<ComponentReport>,
}

impl StartupStatus {
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&ComponentReport> {
        self.components.iter().find(|c| c.name == name)
    }
}
