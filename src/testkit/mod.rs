//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`factory`] - [`MockFactory`](factory::MockFactory), a scriptable
//!   [`ResourceFactory`](crate::port::ResourceFactory) with a creation counter.
//! - [`alert`] - [`RecordingAlertHandler`](alert::RecordingAlertHandler).
//! - [`config`] - Canonical test configurations (pool, monitor, runtime).

pub mod alert;
pub mod config;
pub mod factory;
