//! Runtime context wiring the initializer, pool and monitor together.
//!
//! A [`RuntimeContext`] is built once at process start and handed to the
//! collaborators that need it. It registers three built-in components:
//!
//! | Component         | Depends on        | Startup                    | Shutdown             |
//! |-------------------|-------------------|----------------------------|----------------------|
//! | `telemetry`       |                   | start sampler (if enabled) | stop sampler         |
//! | `connection_pool` | `telemetry`       | warm up to the floor       | close every handle   |
//! | `pool_health`     | `connection_pool` | start health monitoring    | stop health monitoring |
//!
//! Hosts add their own components through [`RuntimeContext::initializer`]
//! before calling [`RuntimeContext::start`].

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use super::monitor::{MetricType, PerformanceMonitor, PerformanceSummary, Tags};
use super::pool::{ConnectionPool, PoolStats};
use super::startup::{Component, Initializer, StartupStatus};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::port::ResourceFactory;

pub const TELEMETRY: &str = "telemetry";
pub const CONNECTION_POOL: &str = "connection_pool";
pub const POOL_HEALTH: &str = "pool_health";

/// Owns the runtime layer for one process.
pub struct RuntimeContext<F: ResourceFactory> {
    config: Config,
    initializer: Initializer,
    pool: ConnectionPool<F>,
    monitor: PerformanceMonitor,
}

impl<F: ResourceFactory> RuntimeContext<F> {
    /// Build the layer and register the built-in components.
    ///
    /// Nothing runs until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config, factory: F) -> Result<Self> {
        config.validate()?;

        let pool = ConnectionPool::new(config.pool.clone(), factory)?;
        let monitor = PerformanceMonitor::new(config.monitor.clone());
        let initializer = Initializer::new();

        {
            let pool = pool.clone();
            monitor.add_gauge(MetricType::ConnectionPoolSize, move || {
                pool.get_metrics().pool_size as f64
            });
        }

        let context = Self {
            config,
            initializer,
            pool,
            monitor,
        };
        context.register_builtins()?;
        Ok(context)
    }

    fn register_builtins(&self) -> Result<()> {
        let sampler_enabled = self.config.monitor.sampler_enabled;
        let (start, stop) = (self.monitor.clone(), self.monitor.clone());
        self.initializer.register_component(
            Component::new(TELEMETRY, move || {
                let monitor = start.clone();
                async move {
                    if sampler_enabled {
                        monitor.start_sampler();
                    }
                    Ok(())
                }
            })
            .on_shutdown(move || {
                let monitor = stop.clone();
                async move {
                    monitor.stop_sampler().await;
                    Ok(())
                }
            }),
        )?;

        let (start, stop) = (self.pool.clone(), self.pool.clone());
        let monitor = self.monitor.clone();
        self.initializer.register_component(
            Component::new(CONNECTION_POOL, move || {
                let (pool, monitor) = (start.clone(), monitor.clone());
                async move {
                    pool.warm_up().await;
                    let stats = pool.get_metrics();
                    monitor.record_metric(
                        MetricType::ConnectionPoolSize,
                        stats.pool_size as f64,
                        Tags::new(),
                    );
                    anyhow::ensure!(
                        stats.pool_size >= stats.min_connections,
                        "warm-up created {} of {} connections",
                        stats.pool_size,
                        stats.min_connections
                    );
                    Ok(())
                }
            })
            .depends_on([TELEMETRY])
            .on_shutdown(move || {
                let pool = stop.clone();
                async move {
                    pool.close_all_connections();
                    Ok(())
                }
            }),
        )?;

        let (start, stop) = (self.pool.clone(), self.pool.clone());
        self.initializer.register_component(
            Component::new(POOL_HEALTH, move || {
                let pool = start.clone();
                async move {
                    pool.start_health_monitoring();
                    Ok(())
                }
            })
            .depends_on([CONNECTION_POOL])
            .on_shutdown(move || {
                let pool = stop.clone();
                async move {
                    pool.stop_health_monitoring().await;
                    Ok(())
                }
            }),
        )?;

        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register host components here before [`start`](Self::start).
    pub fn initializer(&self) -> &Initializer {
        &self.initializer
    }

    pub fn pool(&self) -> &ConnectionPool<F> {
        &self.pool
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Run every registered component, bounded by `startup.timeout_secs`.
    ///
    /// # Errors
    ///
    /// Returns the initializer's error if any component fails, the graph
    /// has a cycle, or the pass outlives the timeout.
    pub async fn start(&self) -> Result<()> {
        let started = Instant::now();
        self.initializer
            .initialize_all(self.config.startup.timeout())
            .await?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Runtime started"
        );
        Ok(())
    }

    /// Cancel any in-flight startup and tear components down in reverse order.
    pub async fn shutdown(&self) {
        self.initializer.shutdown().await;
        info!("Runtime stopped");
    }

    /// Borrow a handle, run `op` with it, return the handle and record the
    /// operation's duration and outcome under `operation`.
    ///
    /// A failing `op` counts an error against the handle.
    ///
    /// # Errors
    ///
    /// - [`Error::Pool`] if no handle is available
    /// - [`Error::Operation`] if `op` fails
    pub async fn with_connection<T, Op, Fut>(&self, operation: &str, op: Op) -> Result<T>
    where
        Op: FnOnce(Arc<F::Handle>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let started = Instant::now();
        let connection = match self.pool.get_connection().await {
            Ok(connection) => connection,
            Err(e) => {
                self.monitor
                    .record_timing(operation, started.elapsed(), false);
                return Err(e.into());
            }
        };

        let result = op(connection.handle()).await;
        if result.is_err() {
            self.pool.report_error(&connection);
        }
        self.pool.return_connection(connection);
        self.monitor
            .record_timing(operation, started.elapsed(), result.is_ok());

        result.map_err(|e| Error::Operation {
            operation: operation.to_string(),
            reason: format!("{e:#}"),
        })
    }

    /// Startup, pool and performance snapshots in one structure.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        let startup = self.initializer.status();
        HealthSnapshot {
            ready: startup.completed,
            startup,
            pool: self.pool.get_metrics(),
            performance: self.monitor.get_performance_summary(),
        }
    }

    /// [`health_snapshot`](Self::health_snapshot) rendered as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn health_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.health_snapshot())?)
    }
}

/// Combined view for a health or observability endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub ready: bool,
    pub startup: StartupStatus,
    pub pool: PoolStats,
    pub performance: PerformanceSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::runtime::startup::ComponentStatus;
    use crate::testkit;
    use crate::testkit::factory::MockFactory;

    fn context(min: usize, max: usize) -> (RuntimeContext<MockFactory>, MockFactory) {
        let factory = MockFactory::new();
        let context =
            RuntimeContext::new(testkit::config::runtime(min, max), factory.clone()).unwrap();
        (context, factory)
    }

    #[tokio::test]
    async fn test_start_runs_builtins_in_order() {
        let (ctx, factory) = context(2, 4);

        ctx.start().await.unwrap();

        let status = ctx.initializer().status();
        assert!(status.completed);
        for name in [TELEMETRY, CONNECTION_POOL, POOL_HEALTH] {
            assert_eq!(
                status.component(name).map(|c| c.status),
                Some(ComponentStatus::Initialized)
            );
        }
        assert_eq!(factory.created(), 2);
        assert!(ctx.pool().is_health_monitoring());
        assert_eq!(
            ctx.monitor()
                .metric_snapshot(MetricType::ConnectionPoolSize)
                .map(|s| s.latest),
            Some(2.0)
        );

        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_warm_up_fails_startup() {
        let (ctx, factory) = context(1, 2);
        factory.set_failing(true);

        let err = ctx.start().await.unwrap_err();

        assert!(err.to_string().contains(CONNECTION_POOL));
        let status = ctx.initializer().status();
        assert_eq!(
            status.component(POOL_HEALTH).map(|c| c.status),
            Some(ComponentStatus::Pending)
        );
        assert!(!ctx.pool().is_health_monitoring());
    }

    #[tokio::test]
    async fn test_shutdown_stops_tasks_and_drains_pool() {
        let (ctx, _factory) = context(1, 2);
        ctx.start().await.unwrap();

        ctx.shutdown().await;

        assert!(!ctx.pool().is_health_monitoring());
        let stats = ctx.pool().get_metrics();
        assert!(stats.closed);
        assert_eq!(stats.pool_size, 0);
    }

    #[tokio::test]
    async fn test_with_connection_records_outcome() {
        let (ctx, _factory) = context(1, 1);
        ctx.start().await.unwrap();

        let serial = ctx
            .with_connection("get_memory", |handle| async move { Ok(handle.serial()) })
            .await
            .unwrap();
        assert_eq!(serial, 1);

        let err = ctx
            .with_connection("get_memory", |_handle| async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                anyhow::Result::<()>::Err(anyhow::anyhow!("not found"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Operation { ref reason, .. } if reason == "not found"));

        let stats = ctx.monitor().get_operation_stats("get_memory").unwrap();
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(ctx.pool().get_metrics().total_errors, 1);
        assert_eq!(ctx.pool().get_metrics().active_connections, 0);

        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_json_contains_every_section() {
        let (ctx, _factory) = context(1, 2);
        ctx.start().await.unwrap();

        let json: serde_json::Value = serde_json::from_str(&ctx.health_json().unwrap()).unwrap();
        assert_eq!(json["ready"], true);
        assert_eq!(json["pool"]["pool_size"], 1);
        assert_eq!(json["startup"]["components"][0]["name"], TELEMETRY);
        assert!(json["performance"]["operations"].is_object());

        ctx.shutdown().await;
    }
}
