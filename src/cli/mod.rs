//! Command-line interface definitions.

pub mod check;
pub mod simulate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Environment variable naming the default configuration file.
pub const CONFIG_ENV: &str = "MEMSERVE_CONFIG";

/// Fallback configuration file name.
pub const DEFAULT_CONFIG: &str = "memserve.toml";

/// Memserve - runtime layer for a memory-serving backend.
#[derive(Parser, Debug)]
#[command(name = "memserve")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a configuration file and print a summary
    Check(ConfigPathArg),

    /// Run the runtime layer against a simulated resource and print its health snapshot
    Simulate(SimulateArgs),
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to configuration file [default: $MEMSERVE_CONFIG or memserve.toml]
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl ConfigPathArg {
    /// Explicit path, else `$MEMSERVE_CONFIG`, else `memserve.toml`.
    pub fn resolve(&self) -> PathBuf {
        resolve_config_path(self.config.as_ref())
    }
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Path to configuration file; built-in defaults are used when omitted
    /// and no default file exists
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Total number of simulated requests
    #[arg(long, default_value_t = 200)]
    pub requests: usize,

    /// Requests in flight at once
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Mean latency of one simulated operation (ms)
    #[arg(long, default_value_t = 5)]
    pub latency_ms: u64,

    /// Time to create one simulated handle (ms)
    #[arg(long, default_value_t = 20)]
    pub create_ms: u64,

    /// Fraction of operations that fail (0.0-1.0)
    #[arg(long, default_value_t = 0.0)]
    pub failure_rate: f64,
}

pub(crate) fn resolve_config_path(explicit: Option<&PathBuf>) -> PathBuf {
    explicit.cloned().unwrap_or_else(|| {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    })
}
