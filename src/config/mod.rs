//! Runtime configuration modules.

pub mod logging;
pub mod monitor;
pub mod pool;
pub mod settings;
pub mod startup;

pub use logging::LoggingConfig;
pub use monitor::MonitorConfig;
pub use pool::PoolConfig;
pub use settings::Config;
pub use startup::StartupConfig;
