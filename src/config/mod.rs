pub mod cli;
#[allow(clippy::module_inception)]
pub mod config;
pub mod servers;
pub mod types;

pub use config::{Config, ConfigError, HeartbeatSettings, TlsSettings};
pub use servers::ServerRecord;
pub use types::{LogLevel, TargetMode};
