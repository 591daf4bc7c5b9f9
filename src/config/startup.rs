//! Startup orchestration configuration.

use std::time::Duration;

use serde::Deserialize;

/// Bounds on the startup pass.
#[derive(Debug, Clone, Deserialize)]
pub struct StartupConfig {
    /// Maximum time a caller waits for the whole initialization pass.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    30
}

impl StartupConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}
