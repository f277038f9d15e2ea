//! Forced-stop deadline.
//!
//! A transaction signed against a blockhash can only land while that
//! blockhash is recent, so the run is bounded by the blockhash lifetime.

use crate::listener::{ListenerHandle, StopReason};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Number of blocks a blockhash remains valid for.
pub const BLOCKHASH_VALIDITY_BLOCKS: u32 = 160;

/// Nominal block time in milliseconds.
pub const BLOCK_TIME_MS: u64 = 400;

/// Default run deadline, measured from the blockhash fetch.
pub const DEFAULT_DEADLINE: Duration =
    Duration::from_millis(BLOCKHASH_VALIDITY_BLOCKS as u64 * BLOCK_TIME_MS);

/// One-shot timer that stops the run when it fires.
///
/// Dropping the deadline cancels it.
pub struct Deadline {
    cancel: CancellationToken,
    task: Option<JoinHandle<bool>>,
}

impl Deadline {
    /// Arm a timer that calls `handle.stop(StopReason::Deadline)` after `after`.
    pub fn arm(after: Duration, handle: ListenerHandle) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let run = handle.token();

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    let stopped = handle.stop(StopReason::Deadline);
                    if stopped {
                        info!(after = ?after, "Deadline reached, stopping run");
                    }
                    stopped
                }
                _ = token.cancelled() => false,
                _ = run.cancelled() => false,
            }
        });

        debug!(after = ?after, "Deadline armed");
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Disarm the timer and wait for its task.
    ///
    /// Returns `true` if the deadline fired and stopped the run.
    pub async fn cancel(mut self) -> bool {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => task.await.unwrap_or(false),
            None => false,
        }
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
