//! Top-level error type.

use crate::config::ConfigError;
use crate::listener::ListenError;
use crate::logging::LoggingError;
use crate::preflight::PreflightError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors that abort a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error("Preflight check failed: {0}")]
    Preflight(#[from] PreflightError),

    #[error("{0}")]
    Listen(#[from] ListenError),

    #[error("Failed to get recent blockhash: {0}")]
    Blockhash(TransportError),
}
