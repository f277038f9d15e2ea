//! Confirmation listener.
//!
//! Consumes the log subscription one event at a time, correlates benchmark
//! memos with pending sends, and owns the run's stop state machine:
//!
//! ```text
//! Idle ──subscribe──► Listening ──stop──► Stopped
//!   └────────────────────stop─────────────────┘
//! ```
//!
//! `stop` may be called from the listener itself (natural completion), from
//! the deadline task and from the signal handler, possibly at the same time.
//! The first call wins; the others are no-ops.

use crate::ledger::SharedLedger;
use crate::transport::{LogEvent, LogStream, LogSubscriber, TransportError};
use memobench_types::{parse_log_line, RunId};
use parking_lot::Mutex;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not yet subscribed.
    Idle,
    /// Subscription open, consuming events.
    Listening,
    /// Terminal.
    Stopped,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every submitted transaction was confirmed.
    Completed,
    /// The blockhash-expiry deadline passed.
    Deadline,
    /// Operator interrupt.
    Interrupted,
    /// The subscription stream ended.
    StreamClosed,
    /// Setup failed after subscribing.
    Aborted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Completed => "all transactions landed",
            StopReason::Deadline => "deadline reached",
            StopReason::Interrupted => "interrupted",
            StopReason::StreamClosed => "subscription closed",
            StopReason::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct HandleState {
    state: ListenerState,
    reason: Option<StopReason>,
}

#[derive(Debug)]
struct HandleInner {
    state: Mutex<HandleState>,
    token: CancellationToken,
}

/// Cloneable control handle for the listener's state machine.
///
/// Stopping cancels the run's [`CancellationToken`], which ends the listen
/// loop and aborts emitter tasks that are still waiting.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    inner: Arc<HandleInner>,
}

impl ListenerHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                state: Mutex::new(HandleState {
                    state: ListenerState::Idle,
                    reason: None,
                }),
                token: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> ListenerState {
        self.inner.state.lock().state
    }

    pub fn is_listening(&self) -> bool {
        self.state() == ListenerState::Listening
    }

    /// The reason recorded by the winning `stop` call.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.inner.state.lock().reason
    }

    /// Token cancelled when the run stops.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Stop the run.
    ///
    /// Returns `true` for the call that performed the transition and `false`
    /// if the run was already stopped.
    pub fn stop(&self, reason: StopReason) -> bool {
        {
            let mut guard = self.inner.state.lock();
            if guard.state == ListenerState::Stopped {
                return false;
            }
            guard.state = ListenerState::Stopped;
            guard.reason = Some(reason);
        }
        self.inner.token.cancel();
        true
    }

    /// Idle -> Listening. Fails if the run was stopped first.
    fn mark_listening(&self) -> bool {
        let mut guard = self.inner.state.lock();
        if guard.state != ListenerState::Idle {
            return false;
        }
        guard.state = ListenerState::Listening;
        true
    }
}

impl Default for ListenerHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors opening the subscription.
#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("Failed to subscribe to logs: {0}")]
    Subscribe(#[from] TransportError),

    #[error("Run stopped before the subscription opened")]
    Stopped,
}

/// Correlates confirmation events with pending sends.
pub struct ConfirmationListener {
    run_id: RunId,
    ledger: SharedLedger,
    handle: ListenerHandle,
}

impl ConfirmationListener {
    pub fn new(run_id: RunId, ledger: SharedLedger, handle: ListenerHandle) -> Self {
        Self {
            run_id,
            ledger,
            handle,
        }
    }

    pub fn handle(&self) -> &ListenerHandle {
        &self.handle
    }

    /// Open the log subscription for `account` and enter `Listening`.
    pub async fn subscribe<S: LogSubscriber>(
        &self,
        subscriber: &S,
        account: &Pubkey,
    ) -> Result<S::Stream, ListenError> {
        if self.handle.state() != ListenerState::Idle {
            return Err(ListenError::Stopped);
        }

        let mut stream = subscriber
            .subscribe_mentions(account, CommitmentConfig::processed())
            .await?;

        if !self.handle.mark_listening() {
            // Stopped while the subscription was being opened.
            if let Err(e) = stream.unsubscribe().await {
                warn!(error = %e, "Failed to unsubscribe");
            }
            return Err(ListenError::Stopped);
        }

        info!("Listening for transactions...");
        Ok(stream)
    }

    /// Consume events until the run stops. Unsubscribes exactly once on exit.
    ///
    /// `emission_done` fires when the emitter has finished every send; the
    /// completion check runs then as well as after each matched event.
    pub async fn listen<L: LogStream>(
        &self,
        stream: &mut L,
        mut emission_done: oneshot::Receiver<()>,
    ) -> StopReason {
        let token = self.handle.token();
        let mut emission_finished = false;

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                _ = &mut emission_done, if !emission_finished => {
                    emission_finished = true;
                    self.check_completion();
                }

                event = stream.next_event() => match event {
                    None => {
                        warn!("Log subscription ended");
                        self.handle.stop(StopReason::StreamClosed);
                    }
                    Some(Err(e)) => error!(error = %e, "Log subscription error"),
                    Some(Ok(event)) => {
                        if self.handle_event(&event) {
                            self.check_completion();
                        }
                    }
                },
            }
        }

        info!("Stopping listening for log events...");
        if let Err(e) = stream.unsubscribe().await {
            warn!(error = %e, "Failed to unsubscribe");
        }

        self.handle.stop_reason().unwrap_or(StopReason::Aborted)
    }

    /// Process one event. Returns `true` if it matched a pending send.
    pub fn handle_event(&self, event: &LogEvent) -> bool {
        if let Some(err) = &event.err {
            debug!(sig = %event.signature, ?err, "Skipping failed transaction");
            return false;
        }

        for line in &event.logs {
            let Some(record) = parse_log_line(line) else {
                continue;
            };

            if !self.run_id.matches(&record.run_id) {
                warn!(
                    num = ?record.sequence,
                    id = %record.run_id,
                    sig = %event.signature,
                    "Received unexpected run ID"
                );
                continue;
            }

            let confirmation = self.ledger.lock().record_confirmation(
                &event.signature,
                event.slot,
                Instant::now(),
            );

            let Some(c) = confirmation else {
                // Not one of ours, or already counted.
                debug!(num = ?record.sequence, sig = %event.signature, "Unmatched confirmation");
                return false;
            };

            if record.sequence != Some(c.sequence) {
                warn!(
                    recorded = c.sequence,
                    logged = ?record.sequence,
                    sig = %event.signature,
                    "Sequence in memo differs from the one sent"
                );
            }

            info!(
                num = c.sequence,
                sig = %event.signature,
                slot = %event.slot,
                delta = ?truncate_millis(c.delta),
                landed = %format!("{}/{}", c.processed, c.sent),
                "Tx processed"
            );
            return true;
        }

        false
    }

    /// Stop with `Completed` if nothing remains outstanding.
    fn check_completion(&self) {
        let complete = self.ledger.lock().is_complete();
        if complete && self.handle.stop(StopReason::Completed) {
            debug!("All submitted transactions confirmed");
        }
    }
}

/// Drop sub-millisecond precision for display.
pub(crate) fn truncate_millis(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}
