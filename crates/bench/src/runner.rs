//! Run controller.
//!
//! Drives one benchmark run:
//!
//! 1. subscribe to logs mentioning the wallet
//! 2. fetch the blockhash every transaction is built on
//! 3. arm the deadline
//! 4. spawn the emitter and listen until the run stops
//! 5. join the emitter and build the report

use crate::deadline::{Deadline, DEFAULT_DEADLINE};
use crate::emitter::{EmissionSummary, EmitterConfig, TransactionEmitter};
use crate::error::BenchError;
use crate::ledger::{Ledger, SharedLedger};
use crate::listener::{ConfirmationListener, ListenerHandle, StopReason};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::report::BenchReport;
use crate::transport::{ChainRpc, LogStream, LogSubscriber, TransactionSubmitter};
use memobench_types::RunId;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub emitter: EmitterConfig,
    pub rate_limit: RateLimitConfig,
    /// Forced stop, measured from the blockhash fetch.
    pub deadline: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            emitter: EmitterConfig::default(),
            rate_limit: RateLimitConfig::default(),
            deadline: DEFAULT_DEADLINE,
        }
    }
}

impl RunConfig {
    pub fn with_emitter(mut self, emitter: EmitterConfig) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Runs a benchmark against one set of endpoints.
pub struct RunController<R, T, L> {
    rpc: Arc<R>,
    submitter: Arc<T>,
    subscriber: L,
    payer: Keypair,
    run_id: RunId,
    config: RunConfig,
    ledger: SharedLedger,
    handle: ListenerHandle,
}

impl<R, T, L> RunController<R, T, L>
where
    R: ChainRpc,
    T: TransactionSubmitter + 'static,
    L: LogSubscriber,
{
    pub fn new(
        rpc: Arc<R>,
        submitter: Arc<T>,
        subscriber: L,
        payer: Keypair,
        run_id: RunId,
        config: RunConfig,
    ) -> Self {
        Self {
            rpc,
            submitter,
            subscriber,
            payer,
            run_id,
            config,
            ledger: Ledger::shared(),
            handle: ListenerHandle::new(),
        }
    }

    /// Handle for stopping the run from outside (signal handler).
    pub fn handle(&self) -> ListenerHandle {
        self.handle.clone()
    }

    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Execute the run to completion.
    pub async fn run(self) -> Result<BenchReport, BenchError> {
        let started = Instant::now();
        let listener =
            ConfirmationListener::new(self.run_id, self.ledger.clone(), self.handle.clone());
        let mut stream = listener
            .subscribe(&self.subscriber, &self.payer.pubkey())
            .await?;

        let blockhash = match TransactionEmitter::<T>::fetch_blockhash(self.rpc.as_ref()).await {
            Ok(blockhash) => blockhash,
            Err(e) => {
                error!(error = %e, "Failed to get recent blockhash");
                self.handle.stop(StopReason::Aborted);
                if let Err(e) = stream.unsubscribe().await {
                    warn!(error = %e, "Failed to unsubscribe");
                }
                return Err(BenchError::Blockhash(e));
            }
        };

        let deadline = Deadline::arm(self.config.deadline, self.handle.clone());

        let emitter = TransactionEmitter::new(
            self.submitter,
            self.payer,
            self.run_id,
            self.ledger.clone(),
            Arc::new(RateLimiter::new(self.config.rate_limit)),
            self.config.emitter,
        );
        let (done_tx, done_rx) = oneshot::channel();
        let emission = tokio::spawn(emitter.run(blockhash, self.handle.token(), done_tx));

        let reason = listener.listen(&mut stream, done_rx).await;
        deadline.cancel().await;
        info!(%reason, "Run stopped");

        let emission = match emission.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Emitter task failed");
                EmissionSummary::default()
            }
        };

        let snapshot = self.ledger.lock().snapshot();
        Ok(BenchReport::new(
            self.run_id,
            reason,
            emission,
            snapshot,
            started.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ListenerState;
    use crate::testing::{ChannelSubscriber, MockRpc, MockSubmitter};
    use memobench_types::Slot;
    use solana_sdk::hash::Hash;
    use solana_sdk::signature::keypair_from_seed;
    use std::collections::BTreeMap;

    fn payer() -> Keypair {
        keypair_from_seed(&[42u8; 32]).unwrap()
    }

    fn blockhash() -> Hash {
        Hash::new_from_array([5; 32])
    }

    fn run_config(tx_count: u64) -> RunConfig {
        RunConfig::default()
            .with_emitter(
                EmitterConfig::default()
                    .with_tx_count(tx_count)
                    .with_alignment(None),
            )
            .with_rate_limit(RateLimitConfig::new(100, 100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_when_all_land() {
        let (subscriber, events) = ChannelSubscriber::new();
        let submitter = [10, 10, 11, 10, 11]
            .into_iter()
            .enumerate()
            .fold(MockSubmitter::new().with_events(events), |s, (i, slot)| {
                s.with_slot(i as u64 + 1, slot)
            });
        let rpc = Arc::new(MockRpc::new(blockhash()));

        let controller = RunController::new(
            rpc.clone(),
            Arc::new(submitter),
            subscriber,
            payer(),
            RunId::from_bytes([1, 2, 3, 4]),
            run_config(5),
        );
        let handle = controller.handle();
        let report = controller.run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Completed);
        assert_eq!(report.ledger.sent, 5);
        assert_eq!(report.ledger.processed, 5);
        assert_eq!(report.ledger.deltas.len(), 5);
        assert_eq!(
            report.ledger.block_counts,
            BTreeMap::from([(Slot(10), 3), (Slot(11), 2)])
        );
        assert_eq!(report.emission.submitted, 5);
        assert_eq!(rpc.blockhash_calls(), 1);
        assert_eq!(handle.state(), ListenerState::Stopped);

        let stats = report.stats.unwrap();
        assert_eq!(stats.min, Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_at_deadline() {
        let (subscriber, events) = ChannelSubscriber::new();
        // Confirmation never arrives within the deadline.
        let submitter = MockSubmitter::new()
            .with_events(events)
            .with_latency(Duration::from_secs(120));

        let controller = RunController::new(
            Arc::new(MockRpc::new(blockhash())),
            Arc::new(submitter),
            subscriber,
            payer(),
            RunId::from_bytes([1, 2, 3, 4]),
            run_config(3),
        );
        let started = Instant::now();
        let report = controller.run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Deadline);
        assert_eq!(report.ledger.sent, 3);
        assert_eq!(report.ledger.processed, 0);
        assert_eq!(report.ledger.unconfirmed, 3);
        assert!(report.stats.is_none());
        assert!(started.elapsed() >= DEFAULT_DEADLINE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_all_sends_failing_finishes_immediately() {
        let (subscriber, events) = ChannelSubscriber::new();
        let submitter = MockSubmitter::new()
            .with_events(events)
            .fail_sequence(1)
            .fail_sequence(2);

        let controller = RunController::new(
            Arc::new(MockRpc::new(blockhash())),
            Arc::new(submitter),
            subscriber,
            payer(),
            RunId::from_bytes([1, 2, 3, 4]),
            run_config(2),
        );
        let started = Instant::now();
        let report = controller.run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Completed);
        assert_eq!(report.emission.failed, 2);
        assert_eq!(report.ledger.sent, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(report
            .summary_lines()
            .contains(&"Transactions Landed    : 0/0 (0.0%)".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_stops_run() {
        let (subscriber, events) = ChannelSubscriber::new();
        let submitter = MockSubmitter::new()
            .with_events(events)
            .with_latency(Duration::from_secs(30));

        let controller = RunController::new(
            Arc::new(MockRpc::new(blockhash())),
            Arc::new(submitter),
            subscriber,
            payer(),
            RunId::from_bytes([1, 2, 3, 4]),
            run_config(2),
        );
        let handle = controller.handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            assert!(handle.is_listening());
            handle.stop(StopReason::Interrupted);
        });

        let report = controller.run().await.unwrap();
        assert_eq!(report.stop_reason, StopReason::Interrupted);
        assert_eq!(report.ledger.processed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blockhash_failure_unsubscribes() {
        let (subscriber, _events) = ChannelSubscriber::new();
        let subscriber = Arc::new(subscriber);

        struct Shared(Arc<ChannelSubscriber>);

        #[async_trait::async_trait]
        impl LogSubscriber for Shared {
            type Stream = crate::testing::ChannelLogStream;

            async fn subscribe_mentions(
                &self,
                account: &solana_sdk::pubkey::Pubkey,
                commitment: solana_sdk::commitment_config::CommitmentConfig,
            ) -> Result<Self::Stream, crate::transport::TransportError> {
                self.0.subscribe_mentions(account, commitment).await
            }
        }

        let controller = RunController::new(
            Arc::new(MockRpc::new(Hash::default()).with_blockhash_failure()),
            Arc::new(MockSubmitter::new()),
            Shared(subscriber.clone()),
            payer(),
            RunId::from_bytes([1, 2, 3, 4]),
            run_config(2),
        );
        let handle = controller.handle();

        let result = controller.run().await;
        assert!(matches!(result, Err(BenchError::Blockhash(_))));
        assert_eq!(handle.stop_reason(), Some(StopReason::Aborted));
        assert_eq!(subscriber.unsubscribe_count(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_fatal() {
        let controller = RunController::new(
            Arc::new(MockRpc::new(Hash::default())),
            Arc::new(MockSubmitter::new()),
            ChannelSubscriber::failing(),
            payer(),
            RunId::from_bytes([1, 2, 3, 4]),
            run_config(2),
        );
        assert!(matches!(
            controller.run().await,
            Err(BenchError::Listen(_))
        ));
    }
}
