//! Simulated workload against the full runtime layer.
//!
//! Useful for sizing the pool and tuning alert thresholds before wiring in
//! a real resource: handles take `create_ms` to open, each operation takes
//! roughly `latency_ms` (with jitter) and fails with probability
//! `failure_rate`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio::signal;
use tracing::{info, warn};

use super::{resolve_config_path, SimulateArgs};
use crate::config::Config;
use crate::error::{ConfigError, Error, Result};
use crate::port::{Probe, ResourceFactory};
use crate::runtime::RuntimeContext;

/// Operation name recorded for every simulated request.
pub const OPERATION: &str = "simulated_request";

/// In-process stand-in for a memory-store client.
#[derive(Debug)]
pub struct SimulatedHandle {
    latency: Duration,
    failure_rate: f64,
}

impl SimulatedHandle {
    /// Sleep for a jittered latency, then succeed or fail at random.
    pub async fn serve(&self) -> anyhow::Result<()> {
        let (delay, fail) = {
            let mut rng = rand::thread_rng();
            let jitter: f64 = rng.gen_range(0.5..1.5);
            (
                self.latency.mul_f64(jitter),
                rng.gen_bool(self.failure_rate),
            )
        };
        tokio::time::sleep(delay).await;
        if fail {
            anyhow::bail!("simulated failure");
        }
        Ok(())
    }
}

impl Probe for SimulatedHandle {
    fn is_alive(&self) -> bool {
        true
    }
}

pub struct SimulatedFactory {
    create_latency: Duration,
    latency: Duration,
    failure_rate: f64,
}

#[async_trait]
impl ResourceFactory for SimulatedFactory {
    type Handle = SimulatedHandle;

    async fn create(&self) -> anyhow::Result<SimulatedHandle> {
        tokio::time::sleep(self.create_latency).await;
        Ok(SimulatedHandle {
            latency: self.latency,
            failure_rate: self.failure_rate,
        })
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[derive(Debug, Default)]
struct Tally {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    rejected: AtomicUsize,
}

/// Run the simulation and print the health snapshot as JSON on stdout.
pub async fn execute(args: SimulateArgs) -> Result<()> {
    validate(&args)?;
    let config = load_config(&args)?;
    config.init_logging();

    let factory = SimulatedFactory {
        create_latency: Duration::from_millis(args.create_ms),
        latency: Duration::from_millis(args.latency_ms),
        failure_rate: args.failure_rate,
    };
    let context = Arc::new(RuntimeContext::new(config, factory)?);
    context.start().await?;

    let outcome = tokio::select! {
        tally = run_workload(Arc::clone(&context), &args) => Some(tally),
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            None
        }
    };

    if let Some((tally, elapsed)) = outcome {
        eprintln!(
            "Simulated {} requests in {:.2}s: {} succeeded, {} failed, {} rejected",
            args.requests,
            elapsed.as_secs_f64(),
            tally.succeeded.load(Ordering::Relaxed),
            tally.failed.load(Ordering::Relaxed),
            tally.rejected.load(Ordering::Relaxed),
        );
        println!("{}", context.health_json()?);
    }

    context.shutdown().await;
    Ok(())
}

fn validate(args: &SimulateArgs) -> std::result::Result<(), ConfigError> {
    if args.concurrency == 0 {
        return Err(ConfigError::InvalidValue {
            field: "concurrency",
            reason: "must be greater than 0".into(),
        });
    }
    if !(0.0..=1.0).contains(&args.failure_rate) {
        return Err(ConfigError::InvalidValue {
            field: "failure_rate",
            reason: "must be in [0, 1]".into(),
        });
    }
    Ok(())
}

/// An explicit or environment-supplied path must exist; the fallback file
/// is optional.
fn load_config(args: &SimulateArgs) -> Result<Config> {
    let path = resolve_config_path(args.config.as_ref());
    let explicit = args.config.is_some() || std::env::var_os(super::CONFIG_ENV).is_some();
    if explicit || path.exists() {
        Config::load(&path)
    } else {
        Ok(Config::default())
    }
}

async fn run_workload(
    context: Arc<RuntimeContext<SimulatedFactory>>,
    args: &SimulateArgs,
) -> (Arc<Tally>, Duration) {
    let started = Instant::now();
    let next = Arc::new(AtomicUsize::new(0));
    let tally = Arc::new(Tally::default());
    let total = args.requests;

    let workers: Vec<_> = (0..args.concurrency)
        .map(|_| {
            let (context, next, tally) =
                (Arc::clone(&context), Arc::clone(&next), Arc::clone(&tally));
            tokio::spawn(async move {
                while next.fetch_add(1, Ordering::Relaxed) < total {
                    let result = context
                        .with_connection(OPERATION, |handle| async move { handle.serve().await })
                        .await;
                    let counter = match result {
                        Ok(()) => &tally.succeeded,
                        Err(Error::Pool(_)) => &tally.rejected,
                        Err(_) => &tally.failed,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Simulation worker ended abnormally");
        }
    }

    (tally, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SimulateArgs {
        SimulateArgs {
            config: None,
            requests: 10,
            concurrency: 2,
            latency_ms: 0,
            create_ms: 0,
            failure_rate: 0.0,
        }
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let args = SimulateArgs {
            concurrency: 0,
            ..args()
        };
        assert!(matches!(
            validate(&args),
            Err(ConfigError::InvalidValue {
                field: "concurrency",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_accepts_boundary_failure_rates() {
        for failure_rate in [0.0, 1.0] {
            let args = SimulateArgs {
                failure_rate,
                ..args()
            };
            assert!(validate(&args).is_ok());
        }
    }

    #[tokio::test]
    async fn test_certain_failure_always_fails() {
        let factory = SimulatedFactory {
            create_latency: Duration::ZERO,
            latency: Duration::ZERO,
            failure_rate: 1.0,
        };

        let handle = factory.create().await.unwrap();

        assert!(handle.is_alive());
        assert!(handle.serve().await.is_err());
    }
}
