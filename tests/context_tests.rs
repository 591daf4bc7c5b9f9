//! Integration tests for the runtime context: built-in components, host
//! components and the combined health snapshot.

use std::sync::Arc;
use std::time::Duration;

use memserve::error::{Error, InitError, PoolError};
use memserve::runtime::context::{CONNECTION_POOL, POOL_HEALTH, TELEMETRY};
use memserve::runtime::startup::{Component, ComponentStatus};
use memserve::runtime::RuntimeContext;
use memserve::testkit;
use memserve::testkit::alert::RecordingAlertHandler;
use memserve::testkit::factory::MockFactory;

fn context(min: usize, max: usize) -> (Arc<RuntimeContext<MockFactory>>, MockFactory) {
    let factory = MockFactory::new();
    let context = RuntimeContext::new(testkit::config::runtime(min, max), factory.clone())
        .expect("valid test config");
    (Arc::new(context), factory)
}

#[tokio::test]
async fn invalid_config_is_rejected_at_construction() {
    let config = testkit::config::runtime(5, 2);

    let result = RuntimeContext::new(config, MockFactory::new());

    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn host_component_runs_after_the_pool_is_warm() {
    let (ctx, factory) = context(2, 4);
    let observed = Arc::new(std::sync::atomic::AtomicU32::new(0));
    {
        let (factory, observed) = (factory.clone(), Arc::clone(&observed));
        ctx.initializer()
            .register_component(
                Component::new("memory_api", move || {
                    let (factory, observed) = (factory.clone(), Arc::clone(&observed));
                    async move {
                        observed.store(factory.created(), std::sync::atomic::Ordering::SeqCst);
                        Ok(())
                    }
                })
                .depends_on([POOL_HEALTH]),
            )
            .unwrap();
    }

    ctx.start().await.unwrap();

    assert_eq!(observed.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert!(ctx.initializer().is_ready());
    ctx.shutdown().await;
}

#[tokio::test]
async fn start_is_idempotent() {
    let (ctx, factory) = context(1, 2);

    ctx.start().await.unwrap();
    ctx.start().await.unwrap();

    assert_eq!(factory.created(), 1);
    ctx.shutdown().await;
}

#[tokio::test]
async fn registering_after_start_is_rejected() {
    let (ctx, _factory) = context(1, 2);
    ctx.start().await.unwrap();

    let err = ctx
        .initializer()
        .register("late", &[], || async { Ok(()) })
        .unwrap_err();

    assert_eq!(err, InitError::AlreadyStarted("late".to_string()));
    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn saturated_pool_surfaces_as_pool_error() {
    let (ctx, _factory) = context(0, 1);
    ctx.start().await.unwrap();

    let held = ctx.pool().get_connection().await.unwrap();
    let err = ctx
        .with_connection("get_memory", |_handle| async { Ok(()) })
        .await
        .unwrap_err();
    drop(held);

    assert!(matches!(err, Error::Pool(PoolError::Exhausted { max: 1 })));
    let stats = ctx.monitor().get_operation_stats("get_memory").unwrap();
    assert_eq!(stats.error_count, 1);
    ctx.shutdown().await;
}

#[tokio::test]
async fn slow_operation_raises_latency_alert() {
    let (ctx, _factory) = context(1, 1);
    let recorder = RecordingAlertHandler::new();
    ctx.monitor().add_alert_handler(recorder.handler());
    ctx.start().await.unwrap();

    ctx.with_connection("search_memories", |_handle| async {
        tokio::time::sleep(Duration::from_millis(70)).await;
        Ok(())
    })
    .await
    .unwrap();

    let alerts = recorder.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(
        alerts[0].tags.get("operation").map(String::as_str),
        Some("search_memories")
    );
    assert!(alerts[0].value > 50.0);
    ctx.shutdown().await;
}

#[tokio::test]
async fn health_snapshot_before_start_is_not_ready() {
    let (ctx, _factory) = context(1, 2);

    let snapshot = ctx.health_snapshot();

    assert!(!snapshot.ready);
    assert!(!snapshot.startup.in_progress);
    for name in [TELEMETRY, CONNECTION_POOL, POOL_HEALTH] {
        assert_eq!(
            snapshot.startup.component(name).map(|c| c.status),
            Some(ComponentStatus::Pending)
        );
    }
    assert_eq!(snapshot.pool.pool_size, 0);
}
