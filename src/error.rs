use std::time::Duration;

use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Startup orchestration errors.
///
/// `Clone` because every caller awaiting a shared initialization pass
/// receives the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("component '{component}' failed to initialize: {reason}")]
    ComponentFailed { component: String, reason: String },

    #[error("component '{0}' is already registered")]
    DuplicateComponent(String),

    #[error("cannot register '{0}': initialization has already started")]
    AlreadyStarted(String),

    #[error("initialization did not finish within {waited:?}")]
    Timeout { waited: Duration },

    #[error("initialization was cancelled")]
    Cancelled,
}

/// Reasons a pooled handle is unavailable.
///
/// The pool never blocks under saturation; callers receive one of these
/// and decide their own backpressure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("connection pool exhausted ({max} connections in use)")]
    Exhausted { max: usize },

    #[error("failed to create resource: {0}")]
    ResourceCreation(String),

    #[error("connection pool is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("operation '{operation}' failed: {reason}")]
    Operation { operation: String, reason: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_names_every_component_in_order() {
        let err = InitError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn pool_error_converts_into_umbrella_error() {
        let err: Error = PoolError::Exhausted { max: 2 }.into();
        assert!(matches!(err, Error::Pool(PoolError::Exhausted { max: 2 })));
        assert_eq!(err.to_string(), "connection pool exhausted (2 connections in use)");
    }
}
