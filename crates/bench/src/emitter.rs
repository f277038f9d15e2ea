//! Transaction emitter.
//!
//! Sends the run's batch of memo transactions. Every transaction gets its own
//! task; all tasks share one blockhash, wait for a common wall-clock start
//! boundary, and then go through the rate limiter before submitting.

use crate::client::send_config;
use crate::ledger::SharedLedger;
use crate::rate_limiter::RateLimiter;
use crate::transport::{ChainRpc, TransactionSubmitter, TransportError};
use memobench_types::{memo_text, memo_transaction, RunId};
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::SignerError;
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Micro-lamports per lamport.
const MICRO_LAMPORTS_PER_LAMPORT: f64 = 1_000_000.0;

/// Wall-clock grid the first send is aligned to.
///
/// Sends start at `truncate(now, interval) + offset`, so independent runs
/// started within the same interval begin together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartAlignment {
    pub interval: Duration,
    pub offset: Duration,
}

impl Default for StartAlignment {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            offset: Duration::from_secs(10),
        }
    }
}

impl StartAlignment {
    /// Time from `now` until the next start boundary.
    pub fn delay_from(&self, now: SystemTime) -> Duration {
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
        let interval = self.interval.as_nanos().max(1);
        let into_interval = since_epoch.as_nanos() % interval;
        let truncated = since_epoch - Duration::from_nanos(into_interval as u64);
        (truncated + self.offset).saturating_sub(since_epoch)
    }
}

/// Emitter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterConfig {
    /// Number of transactions to send.
    pub tx_count: u64,
    /// Priority fee in lamports per compute unit; 0 disables compute-budget
    /// instructions.
    pub prio_fee: f64,
    /// `maxRetries` passed to the node.
    pub node_retries: usize,
    /// Start boundary; `None` starts immediately.
    pub alignment: Option<StartAlignment>,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            tx_count: 100,
            prio_fee: 0.0,
            node_retries: 0,
            alignment: Some(StartAlignment::default()),
        }
    }
}

impl EmitterConfig {
    pub fn with_tx_count(mut self, tx_count: u64) -> Self {
        self.tx_count = tx_count;
        self
    }

    pub fn with_prio_fee(mut self, prio_fee: f64) -> Self {
        self.prio_fee = prio_fee;
        self
    }

    pub fn with_node_retries(mut self, node_retries: usize) -> Self {
        self.node_retries = node_retries;
        self
    }

    pub fn with_alignment(mut self, alignment: Option<StartAlignment>) -> Self {
        self.alignment = alignment;
        self
    }

    fn rpc_send_config(&self) -> RpcSendTransactionConfig {
        send_config(self.node_retries)
    }
}

/// Per-run send counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmissionSummary {
    /// Tasks spawned.
    pub attempted: u64,
    /// Sends the node accepted.
    pub submitted: u64,
    /// Sends that failed to build or were rejected.
    pub failed: u64,
    /// Tasks abandoned because the run stopped.
    pub cancelled: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendOutcome {
    Submitted,
    Failed,
    Cancelled,
}

/// State shared by all send tasks of a run.
struct EmitContext<T> {
    submitter: Arc<T>,
    payer: Keypair,
    run_id: RunId,
    ledger: SharedLedger,
    limiter: Arc<RateLimiter>,
    prio_fee: f64,
    send_config: RpcSendTransactionConfig,
}

/// Sends the run's transactions.
pub struct TransactionEmitter<T> {
    submitter: Arc<T>,
    payer: Keypair,
    run_id: RunId,
    ledger: SharedLedger,
    limiter: Arc<RateLimiter>,
    config: EmitterConfig,
}

impl<T: TransactionSubmitter + 'static> TransactionEmitter<T> {
    pub fn new(
        submitter: Arc<T>,
        payer: Keypair,
        run_id: RunId,
        ledger: SharedLedger,
        limiter: Arc<RateLimiter>,
        config: EmitterConfig,
    ) -> Self {
        Self {
            submitter,
            payer,
            run_id,
            ledger,
            limiter,
            config,
        }
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Fetch the finalized blockhash every transaction of the run is built on.
    pub async fn fetch_blockhash<R: ChainRpc + ?Sized>(rpc: &R) -> Result<Hash, TransportError> {
        let blockhash = rpc.latest_blockhash(CommitmentConfig::finalized()).await?;
        debug!(%blockhash, "Fetched blockhash");
        Ok(blockhash)
    }

    /// Send every transaction, then mark emission complete and fire
    /// `emission_done`.
    ///
    /// Tasks still waiting when `cancel` fires are abandoned.
    pub async fn run(
        self,
        blockhash: Hash,
        cancel: CancellationToken,
        emission_done: oneshot::Sender<()>,
    ) -> EmissionSummary {
        let start_at = match self.config.alignment {
            Some(alignment) => {
                let delay = alignment.delay_from(SystemTime::now());
                info!(delay = ?delay, "Waiting for start boundary");
                Instant::now() + delay
            }
            None => Instant::now(),
        };

        let ctx = Arc::new(EmitContext {
            submitter: self.submitter,
            payer: self.payer,
            run_id: self.run_id,
            ledger: self.ledger,
            limiter: self.limiter,
            prio_fee: self.config.prio_fee,
            send_config: self.config.rpc_send_config(),
        });

        let mut summary = EmissionSummary::default();
        let mut tasks = JoinSet::new();
        for sequence in 1..=self.config.tx_count {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { emit_one(&ctx, sequence, blockhash, start_at, &cancel).await });
            summary.attempted += 1;
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(SendOutcome::Submitted) => summary.submitted += 1,
                Ok(SendOutcome::Failed) => summary.failed += 1,
                Ok(SendOutcome::Cancelled) => summary.cancelled += 1,
                Err(e) => {
                    error!(error = %e, "Send task panicked");
                    summary.failed += 1;
                }
            }
        }

        ctx.ledger.lock().finish_emission();
        let _ = emission_done.send(());

        info!(
            attempted = summary.attempted,
            submitted = summary.submitted,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Emission finished"
        );
        summary
    }
}

/// Build and sign transaction `sequence` of the run.
///
/// `prio_fee` is in lamports per compute unit.
pub fn build_transaction(
    sequence: u64,
    run_id: &RunId,
    payer: &Keypair,
    blockhash: Hash,
    prio_fee: f64,
) -> Result<Transaction, SignerError> {
    let micro_lamports = (prio_fee.max(0.0) * MICRO_LAMPORTS_PER_LAMPORT) as u64;
    memo_transaction(&memo_text(sequence, run_id), payer, blockhash, micro_lamports)
}

async fn emit_one<T: TransactionSubmitter>(
    ctx: &EmitContext<T>,
    sequence: u64,
    blockhash: Hash,
    start_at: Instant,
    cancel: &CancellationToken,
) -> SendOutcome {
    let tx = match build_transaction(sequence, &ctx.run_id, &ctx.payer, blockhash, ctx.prio_fee) {
        Ok(tx) => tx,
        Err(e) => {
            error!(num = sequence, error = %e, "Failed to build transaction");
            return SendOutcome::Failed;
        }
    };

    tokio::select! {
        _ = tokio::time::sleep_until(start_at) => {}
        _ = cancel.cancelled() => return SendOutcome::Cancelled,
    }

    match ctx.limiter.acquire(cancel).await {
        Ok(waited) if !waited.is_zero() => {
            debug!(num = sequence, waited = ?waited, "Throttled by rate limiter");
        }
        Ok(_) => {}
        Err(_) => return SendOutcome::Cancelled,
    }

    let expected = tx.signatures[0];
    info!(num = sequence, sig = %expected, "Sending tx");
    let result = tokio::select! {
        result = ctx.submitter.send_transaction(&tx, ctx.send_config.clone()) => result,
        _ = cancel.cancelled() => return SendOutcome::Cancelled,
    };

    match result {
        Ok(signature) => {
            if signature != expected {
                warn!(num = sequence, %expected, got = %signature, "Node returned a different signature");
            }
            let recorded = ctx
                .ledger
                .lock()
                .record_send(signature, sequence, Instant::now());
            if !recorded {
                warn!(num = sequence, sig = %signature, "Duplicate signature, not counted again");
            }
            SendOutcome::Submitted
        }
        Err(TransportError::Rpc(e)) => {
            error!(num = sequence, "Received RPC error: {}", e);
            SendOutcome::Failed
        }
        Err(e) => {
            error!(num = sequence, error = %e, "Failed to send transaction");
            SendOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::rate_limiter::RateLimitConfig;
    use crate::testing::{MockRpc, MockSubmitter};
    use memobench_types::{parse_log_line, transaction_memo, COMPUTE_UNIT_LIMIT};
    use solana_sdk::compute_budget::{self, ComputeBudgetInstruction};
    use solana_sdk::signature::keypair_from_seed;
    use solana_sdk::signer::Signer;

    fn payer() -> Keypair {
        keypair_from_seed(&[7u8; 32]).unwrap()
    }

    fn run_id() -> RunId {
        RunId::from_bytes([0xde, 0xad, 0xbe, 0xef])
    }

    fn blockhash(n: u8) -> Hash {
        Hash::new_from_array([n; 32])
    }

    fn emitter(
        submitter: Arc<MockSubmitter>,
        ledger: SharedLedger,
        config: EmitterConfig,
    ) -> TransactionEmitter<MockSubmitter> {
        TransactionEmitter::new(
            submitter,
            payer(),
            run_id(),
            ledger,
            Arc::new(RateLimiter::new(RateLimitConfig::new(100, 100))),
            config,
        )
    }

    #[test]
    fn test_alignment_delay() {
        let alignment = StartAlignment::default();

        // 12.3s past the epoch truncates to 10s; the boundary is 20s.
        let now = UNIX_EPOCH + Duration::from_millis(12_300);
        assert_eq!(alignment.delay_from(now), Duration::from_millis(7_700));

        // Exactly on the grid waits the full offset.
        let now = UNIX_EPOCH + Duration::from_secs(15);
        assert_eq!(alignment.delay_from(now), Duration::from_secs(10));
    }

    #[test]
    fn test_transaction_without_fee_has_only_memo() {
        let tx = build_transaction(3, &run_id(), &payer(), blockhash(9), 0.0).unwrap();

        assert_eq!(tx.message.instructions.len(), 1);
        assert_eq!(transaction_memo(&tx), Some("memobench: Test 3 [deadbeef]"));
        assert!(tx.verify().is_ok());
        assert_eq!(tx.message.account_keys[0], payer().pubkey());
        assert!(!tx.message.account_keys.contains(&compute_budget::id()));
    }

    #[test]
    fn test_transaction_with_fee_prepends_compute_budget() {
        let tx = build_transaction(1, &run_id(), &payer(), blockhash(9), 0.5).unwrap();
        let keys = &tx.message.account_keys;
        let ixs = &tx.message.instructions;

        assert_eq!(ixs.len(), 3);
        assert_eq!(keys[ixs[0].program_id_index as usize], compute_budget::id());
        assert_eq!(
            ixs[0].data,
            ComputeBudgetInstruction::set_compute_unit_price(500_000).data
        );
        assert_eq!(
            ixs[1].data,
            ComputeBudgetInstruction::set_compute_unit_limit(COMPUTE_UNIT_LIMIT).data
        );
        assert_eq!(keys[ixs[2].program_id_index as usize], spl_memo::id());
    }

    #[tokio::test]
    async fn test_fetch_blockhash_uses_rpc() {
        let rpc = MockRpc::new(blockhash(4));
        let fetched = TransactionEmitter::<MockSubmitter>::fetch_blockhash(&rpc)
            .await
            .unwrap();
        assert_eq!(fetched, blockhash(4));

        let failing = MockRpc::new(Hash::default()).with_blockhash_failure();
        assert!(TransactionEmitter::<MockSubmitter>::fetch_blockhash(&failing)
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_every_sequence() {
        let submitter = Arc::new(MockSubmitter::new());
        let ledger = Ledger::shared();
        let (done_tx, done_rx) = oneshot::channel();

        let summary = emitter(
            submitter.clone(),
            ledger.clone(),
            EmitterConfig::default().with_tx_count(10).with_alignment(None),
        )
        .run(blockhash(1), CancellationToken::new(), done_tx)
        .await;

        assert_eq!(
            summary,
            EmissionSummary {
                attempted: 10,
                submitted: 10,
                failed: 0,
                cancelled: 0,
            }
        );
        assert!(done_rx.await.is_ok());

        let ledger = ledger.lock();
        assert_eq!(ledger.sent(), 10);
        assert!(ledger.emission_complete());

        let mut sequences: Vec<u64> = submitter
            .submitted()
            .iter()
            .filter_map(|tx| parse_log_line(transaction_memo(tx)?)?.sequence)
            .collect();
        sequences.sort();
        assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_carry_node_retries() {
        let submitter = Arc::new(MockSubmitter::new());
        let (done_tx, _done_rx) = oneshot::channel();

        emitter(
            submitter.clone(),
            Ledger::shared(),
            EmitterConfig::default()
                .with_tx_count(3)
                .with_node_retries(4)
                .with_alignment(None),
        )
        .run(blockhash(1), CancellationToken::new(), done_tx)
        .await;

        let configs = submitter.send_configs();
        assert_eq!(configs.len(), 3);
        for config in configs {
            assert!(config.skip_preflight);
            assert_eq!(config.max_retries, Some(4));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sends_are_not_recorded() {
        let submitter = Arc::new(MockSubmitter::new().fail_sequence(2).fail_sequence(4));
        let ledger = Ledger::shared();
        let (done_tx, _done_rx) = oneshot::channel();

        let summary = emitter(
            submitter,
            ledger.clone(),
            EmitterConfig::default().with_tx_count(5).with_alignment(None),
        )
        .run(blockhash(1), CancellationToken::new(), done_tx)
        .await;

        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(ledger.lock().sent(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_start_boundary() {
        let submitter = Arc::new(MockSubmitter::new());
        let ledger = Ledger::shared();
        let (done_tx, _done_rx) = oneshot::channel();
        let started = Instant::now();

        emitter(
            submitter,
            ledger,
            EmitterConfig::default().with_tx_count(2),
        )
        .run(blockhash(1), CancellationToken::new(), done_tx)
        .await;

        // truncate(now, 5s) + 10s is always more than 5s away.
        assert!(started.elapsed() > Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_waiting_tasks() {
        let submitter = Arc::new(MockSubmitter::new());
        let ledger = Ledger::shared();
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();

        let run = tokio::spawn(
            emitter(
                submitter.clone(),
                ledger.clone(),
                EmitterConfig::default().with_tx_count(4),
            )
            .run(blockhash(1), cancel.clone(), done_tx),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let summary = run.await.unwrap();
        assert_eq!(summary.cancelled, 4);
        assert!(submitter.submitted().is_empty());
        assert!(done_rx.await.is_ok());
        assert!(ledger.lock().is_complete());
    }
}
