//! memobench
//!
//! Measures how long transactions take to land on a Solana network.
//!
//! A run sends a fixed batch of memo transactions through a token-bucket rate
//! limiter and watches a `logsSubscribe` stream for their confirmations. Each
//! confirmation is correlated with its send by signature, and the run reports
//! landing-time percentiles plus a histogram of transactions per slot.
//!
//! # Architecture
//!
//! - **Ledger**: the single lock-protected aggregate of send/confirm state
//! - **TransactionEmitter**: one task per transaction, start-aligned and rate-limited
//! - **ConfirmationListener**: single-threaded stream consumer and stop state machine
//! - **RunController**: wires the two together and owns the forced-stop deadline
//! - **BenchReport**: final statistics and the per-slot histogram
//!
//! # Example
//!
//! ```ignore
//! use memobench::{RunConfig, RunController};
//!
//! let config = RunConfig::default();
//! let controller = RunController::new(rpc, submitter, subscriber, payer, run_id, config);
//! let report = controller.run().await?;
//! report.log();
//! ```

pub mod client;
pub mod config;
pub mod deadline;
pub mod emitter;
pub mod error;
pub mod ledger;
pub mod listener;
pub mod logging;
pub mod preflight;
pub mod rate_limiter;
pub mod report;
pub mod runner;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{BenchConfig, ConfigError, ConfigOutcome};
pub use deadline::Deadline;
pub use emitter::{EmissionSummary, EmitterConfig, StartAlignment, TransactionEmitter};
pub use error::BenchError;
pub use ledger::{Confirmation, Ledger, LedgerSnapshot, PendingSend, SharedLedger};
pub use listener::{ConfirmationListener, ListenError, ListenerHandle, ListenerState, StopReason};
pub use logging::{LoggingError, LoggingGuard};
pub use preflight::PreflightError;
pub use rate_limiter::{AcquireError, RateLimitConfig, RateLimiter};
pub use report::{BenchReport, LandingStats};
pub use runner::{RunConfig, RunController};
pub use transport::{
    ChainRpc, LogEvent, LogStream, LogSubscriber, TransactionSubmitter, TransportError,
};
