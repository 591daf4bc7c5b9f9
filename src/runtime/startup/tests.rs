use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

// -- Helpers --------------------------------------------------------------

const TIMEOUT: Duration = Duration::from_secs(5);

/// Shared log of component events, in the order they happened.
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Component that records its name in the journal when initialized and
/// `stop:<name>` when shut down.
fn journaled(journal: &Journal, name: &'static str, deps: &[&str]) -> Component {
    let start = journal.clone();
    let stop = journal.clone();
    Component::new(name, move || {
        let journal = start.clone();
        async move {
            journal.push(name);
            Ok(())
        }
    })
    .depends_on(deps.iter().copied())
    .on_shutdown(move || {
        let journal = stop.clone();
        async move {
            journal.push(format!("stop:{name}"));
            Ok(())
        }
    })
}

async fn fail(reason: &'static str) -> anyhow::Result<()> {
    Err(anyhow::anyhow!(reason))
}

async fn explode(message: &'static str) -> anyhow::Result<()> {
    panic!("{message}")
}

fn status_of(init: &Initializer, name: &str) -> ComponentStatus {
    init.status()
        .component(name)
        .map(|c| c.status)
        .unwrap_or_else(|| panic!("component {name} not registered"))
}

// -- Ordering -------------------------------------------------------------

#[tokio::test]
async fn test_runs_chain_in_dependency_order() {
    let journal = Journal::default();
    let init = Initializer::new();
    init.register_component(journaled(&journal, "c", &["b"])).unwrap();
    init.register_component(journaled(&journal, "a", &[])).unwrap();
    init.register_component(journaled(&journal, "b", &["a"])).unwrap();

    init.initialize_all(TIMEOUT).await.unwrap();

    assert_eq!(journal.entries(), ["a", "b", "c"]);
    let status = init.status();
    assert!(status.completed);
    assert!(!status.in_progress);
    assert!(status
        .components
        .iter()
        .all(|c| c.status == ComponentStatus::Initialized && c.duration_ms.is_some()));
}

#[tokio::test]
async fn test_each_routine_runs_once_after_dependencies_initialized() {
    let init = Initializer::new();
    let runs = Arc::new(AtomicUsize::new(0));

    init.register("base", &[], {
        let runs = Arc::clone(&runs);
        move || {
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    })
    .unwrap();

    let observer = init.clone();
    init.register("dependent", &["base"], move || {
        let observer = observer.clone();
        async move {
            let base = observer.status().component("base").map(|c| c.status);
            anyhow::ensure!(
                base == Some(ComponentStatus::Initialized),
                "base not ready: {base:?}"
            );
            Ok(())
        }
    })
    .unwrap();

    init.initialize_all(TIMEOUT).await.unwrap();
    init.initialize_all(TIMEOUT).await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(status_of(&init, "dependent"), ComponentStatus::Initialized);
}

// -- Failure --------------------------------------------------------------

#[tokio::test]
async fn test_cycle_fails_before_any_routine_runs() {
    let journal = Journal::default();
    let init = Initializer::new();
    init.register_component(journaled(&journal, "a", &["b"])).unwrap();
    init.register_component(journaled(&journal, "b", &["a"])).unwrap();

    let err = init.initialize_all(TIMEOUT).await.unwrap_err();

    assert!(matches!(err, InitError::DependencyCycle { .. }));
    assert!(journal.entries().is_empty());
    assert_eq!(status_of(&init, "a"), ComponentStatus::Pending);
    assert_eq!(status_of(&init, "b"), ComponentStatus::Pending);
    assert!(!init.status().completed);
}

#[tokio::test]
async fn test_failure_aborts_remaining_components() {
    let journal = Journal::default();
    let init = Initializer::new();
    init.register_component(journaled(&journal, "a", &[])).unwrap();
    init.register("b", &["a"], || fail("index unavailable")).unwrap();
    init.register_component(journaled(&journal, "c", &["b"])).unwrap();

    let err = init.initialize_all(TIMEOUT).await.unwrap_err();

    assert_eq!(
        err,
        InitError::ComponentFailed {
            component: "b".into(),
            reason: "index unavailable".into(),
        }
    );
    assert_eq!(journal.entries(), ["a"]);
    assert_eq!(status_of(&init, "a"), ComponentStatus::Initialized);
    assert_eq!(status_of(&init, "b"), ComponentStatus::Failed);
    assert_eq!(status_of(&init, "c"), ComponentStatus::Pending);

    let status = init.status();
    assert!(!status.completed);
    assert_eq!(
        status.component("b").and_then(|c| c.error.clone()).as_deref(),
        Some("index unavailable")
    );
}

#[tokio::test]
async fn test_finished_pass_is_not_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let init = Initializer::new();
    init.register("flaky", &[], {
        let attempts = Arc::clone(&attempts);
        move || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                fail("boom").await
            }
        }
    })
    .unwrap();

    assert!(init.initialize_all(TIMEOUT).await.is_err());
    assert!(init.initialize_all(TIMEOUT).await.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_routine_is_recorded_as_failure() {
    let init = Initializer::new();
    init.register("explodes", &[], || explode("bad state")).unwrap();

    let err = init.initialize_all(TIMEOUT).await.unwrap_err();

    match err {
        InitError::ComponentFailed { component, reason } => {
            assert_eq!(component, "explodes");
            assert!(reason.contains("bad state"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(status_of(&init, "explodes"), ComponentStatus::Failed);
}

// -- Registration ---------------------------------------------------------

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let init = Initializer::new();
    init.register("db", &[], || async { Ok(()) }).unwrap();
    let err = init.register("db", &[], || async { Ok(()) }).unwrap_err();
    assert_eq!(err, InitError::DuplicateComponent("db".into()));
}

#[tokio::test]
async fn test_registration_after_start_is_rejected() {
    let init = Initializer::new();
    init.register("db", &[], || async { Ok(()) }).unwrap();
    init.initialize_all(TIMEOUT).await.unwrap();

    let err = init.register("late", &[], || async { Ok(()) }).unwrap_err();
    assert_eq!(err, InitError::AlreadyStarted("late".into()));
}

// -- Single-flight & timeout ----------------------------------------------

#[tokio::test]
async fn test_concurrent_callers_share_one_pass() {
    let runs = Arc::new(AtomicUsize::new(0));
    let init = Initializer::new();
    init.register("slow", &[], {
        let runs = Arc::clone(&runs);
        move || {
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            }
        }
    })
    .unwrap();

    let (first, second, third) = tokio::join!(
        init.initialize_all(TIMEOUT),
        init.initialize_all(TIMEOUT),
        init.initialize_all(TIMEOUT),
    );

    assert!(first.is_ok() && second.is_ok() && third.is_ok());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_leaves_pass_running_detached() {
    let init = Initializer::new();
    init.register("slow", &[], || async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    })
    .unwrap();

    let err = init
        .initialize_all(Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(err, InitError::Timeout { .. }));
    assert!(init.status().in_progress);

    // A later caller observes the same pass completing.
    init.initialize_all(TIMEOUT).await.unwrap();
    assert!(init.is_ready());
}

// -- Shutdown -------------------------------------------------------------

#[tokio::test]
async fn test_shutdown_runs_hooks_in_reverse_order() {
    let journal = Journal::default();
    let init = Initializer::new();
    init.register_component(journaled(&journal, "a", &[])).unwrap();
    init.register_component(journaled(&journal, "b", &["a"])).unwrap();
    init.register_component(journaled(&journal, "c", &["b"])).unwrap();

    init.initialize_all(TIMEOUT).await.unwrap();
    init.shutdown().await;
    init.shutdown().await;

    assert_eq!(
        journal.entries(),
        ["a", "b", "c", "stop:c", "stop:b", "stop:a"]
    );
}

#[tokio::test]
async fn test_failing_hook_does_not_block_others() {
    let journal = Journal::default();
    let init = Initializer::new();
    init.register_component(journaled(&journal, "a", &[])).unwrap();
    init.register_component(
        Component::new("b", || async { Ok(()) })
            .depends_on(["a"])
            .on_shutdown(|| fail("flush failed")),
    )
    .unwrap();
    init.register_component(
        Component::new("c", || async { Ok(()) })
            .depends_on(["b"])
            .on_shutdown(|| explode("hook exploded")),
    )
    .unwrap();

    init.initialize_all(TIMEOUT).await.unwrap();
    init.shutdown().await;

    assert_eq!(journal.entries(), ["a", "stop:a"]);
}

#[tokio::test]
async fn test_shutdown_skips_components_that_never_initialized() {
    let journal = Journal::default();
    let init = Initializer::new();
    init.register_component(journaled(&journal, "a", &[])).unwrap();
    init.register_component(
        Component::new("b", || fail("nope"))
            .depends_on(["a"])
            .on_shutdown({
                let journal = journal.clone();
                move || {
                    let journal = journal.clone();
                    async move {
                        journal.push("stop:b");
                        Ok(())
                    }
                }
            }),
    )
    .unwrap();
    init.register_component(journaled(&journal, "c", &["b"])).unwrap();

    assert!(init.initialize_all(TIMEOUT).await.is_err());
    init.shutdown().await;

    assert_eq!(journal.entries(), ["a", "stop:a"]);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_pass() {
    let journal = Journal::default();
    let init = Initializer::new();
    init.register_component(journaled(&journal, "fast", &[])).unwrap();
    init.register("stuck", &["fast"], || async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    })
    .unwrap();

    let waiter = {
        let init = init.clone();
        tokio::spawn(async move { init.initialize_all(TIMEOUT).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    init.shutdown().await;

    assert_eq!(waiter.await.unwrap(), Err(InitError::Cancelled));
    assert_eq!(journal.entries(), ["fast", "stop:fast"]);
    // Interrupted routine is left mid-flight.
    assert_eq!(status_of(&init, "stuck"), ComponentStatus::Initializing);
    assert_eq!(
        init.initialize_all(TIMEOUT).await,
        Err(InitError::Cancelled)
    );
}

#[tokio::test]
async fn test_late_outcome_does_not_overwrite_shutdown() {
    let init = Initializer::new();
    init.register("store", &[], || async { Ok(()) }).unwrap();
    init.shutdown().await;

    // A pass that finishes after shutdown settled the state.
    assert!(!record_outcome(&init.inner, &Ok(())));

    assert!(!init.status().completed);
    assert!(!init.is_ready());
    assert_eq!(
        init.initialize_all(TIMEOUT).await,
        Err(InitError::Cancelled)
    );
}

#[tokio::test]
async fn test_running_pass_records_its_outcome() {
    let init = Initializer::new();
    let (_tx, rx) = watch::channel(None);
    *init.inner.pass.lock() = PassState::Running {
        outcome: rx,
        task: tokio::spawn(async {}),
    };

    assert!(record_outcome(&init.inner, &Ok(())));
    assert!(init.is_ready());
}
