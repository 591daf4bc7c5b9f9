//! Memserve - Runtime optimization layer for a memory-serving backend.
//!
//! The crate bundles three cooperating services that a memory API process
//! builds once at startup:
//!
//! - **Startup initializer** - named components with declared dependencies,
//!   started once in dependency order and torn down in reverse
//! - **Connection pool** - a bounded set of reusable handles produced by a
//!   caller-supplied [`port::ResourceFactory`], with idle and error-based
//!   eviction and a background health sweep
//! - **Performance monitor** - per-operation timing statistics, bounded
//!   scalar metric histories and threshold alerts
//!
//! [`runtime::RuntimeContext`] wires the three together and exposes a single
//! health snapshot.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with validation and logging setup
//! - [`error`] - Error types for the crate
//! - [`port`] - Traits the host implements for its resource handles
//! - [`runtime`] - Initializer, pool, monitor and the context that owns them
//! - [`cli`] - `memserve` command-line interface
//!
//! # Features
//!
//! - `testkit` - Mock factories, recording alert handlers and config helpers
//!   for tests
//!
//! # Example
//!
//! ```no_run
//! use memserve::config::Config;
//!
//! let config = Config::load("memserve.toml").expect("Failed to load config");
//! config.init_logging();
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod port;
pub mod runtime;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
