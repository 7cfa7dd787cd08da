use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::heartbeat::HeartbeatError;
use crate::tls::TlsError;

// -----------------------------------------------------------------------------
// ----- RelayError ------------------------------------------------------------

/// Startup failures. Once the relay is listening nothing else is fatal.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("tls setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("heartbeat setup failed: {0}")]
    Heartbeat(#[from] HeartbeatError),

    #[error("invalid log filter '{0}'")]
    LogFilter(String),

    #[error("listener: {0}")]
    Io(#[from] io::Error),
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
