//! Shared send/confirm state for one run.
//!
//! The ledger is the only state shared between emitter tasks and the
//! listener. It sits behind a single coarse lock: every mutation, and the
//! completion check, runs as one critical section.

use memobench_types::Slot;
use parking_lot::Mutex;
use solana_sdk::signature::Signature;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Ledger shared by all tasks of a run.
pub type SharedLedger = Arc<Mutex<Ledger>>;

/// A submitted transaction awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSend {
    /// Sequence number the transaction was built with.
    pub sequence: u64,
    /// When the node accepted the submission.
    pub sent_at: Instant,
}

/// Result of matching a confirmation against a pending send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Sequence number recorded at send time.
    pub sequence: u64,
    /// Landing latency.
    pub delta: Duration,
    /// `processed` after this confirmation.
    pub processed: u64,
    /// `sent` at the time of this confirmation.
    pub sent: u64,
}

/// Send/confirm aggregate for one run.
#[derive(Debug, Default)]
pub struct Ledger {
    /// Successfully submitted transactions.
    sent: u64,
    /// Confirmed transactions.
    processed: u64,
    /// Outstanding sends keyed by signature.
    pending: HashMap<Signature, PendingSend>,
    /// Landing latencies, in confirmation order.
    deltas: Vec<Duration>,
    /// Confirmations per slot.
    block_counts: BTreeMap<Slot, u64>,
    /// Set once every emitter task has finished.
    emission_complete: bool,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty ledger wrapped for sharing.
    pub fn shared() -> SharedLedger {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Record a successful submission.
    ///
    /// Returns `false` if the signature is already pending; the original send
    /// time is kept and `sent` is not incremented again.
    pub fn record_send(&mut self, signature: Signature, sequence: u64, sent_at: Instant) -> bool {
        if self.pending.contains_key(&signature) {
            return false;
        }
        self.pending
            .insert(signature, PendingSend { sequence, sent_at });
        self.sent += 1;
        true
    }

    /// Match a confirmation for `signature` landed in `slot`.
    ///
    /// Consumes the pending entry. Returns `None`, without touching any
    /// counter, if the signature is unknown or already matched.
    pub fn record_confirmation(
        &mut self,
        signature: &Signature,
        slot: Slot,
        now: Instant,
    ) -> Option<Confirmation> {
        let pending = self.pending.remove(signature)?;
        let delta = now.saturating_duration_since(pending.sent_at);

        self.processed += 1;
        self.deltas.push(delta);
        *self.block_counts.entry(slot).or_insert(0) += 1;

        Some(Confirmation {
            sequence: pending.sequence,
            delta,
            processed: self.processed,
            sent: self.sent,
        })
    }

    /// Mark that no further sends will be recorded.
    pub fn finish_emission(&mut self) {
        self.emission_complete = true;
    }

    /// Whether the run has nothing left to wait for.
    pub fn is_complete(&self) -> bool {
        self.emission_complete && self.processed >= self.sent
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Number of sends still awaiting confirmation.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn emission_complete(&self) -> bool {
        self.emission_complete
    }

    /// Copy out the data the report needs.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            sent: self.sent,
            processed: self.processed,
            unconfirmed: self.pending.len() as u64,
            deltas: self.deltas.clone(),
            block_counts: self.block_counts.clone(),
        }
    }
}

/// Immutable copy of the ledger taken when the run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub sent: u64,
    pub processed: u64,
    /// Sends that never saw a confirmation.
    pub unconfirmed: u64,
    pub deltas: Vec<Duration>,
    pub block_counts: BTreeMap<Slot, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(n: u8) -> Signature {
        Signature::from([n; 64])
    }

    #[test]
    fn test_send_then_confirm() {
        let t0 = Instant::now();
        let mut ledger = Ledger::new();

        assert!(ledger.record_send(sig(1), 1, t0));
        assert_eq!(ledger.sent(), 1);
        assert_eq!(ledger.pending_len(), 1);

        let confirmation = ledger
            .record_confirmation(&sig(1), Slot(10), t0 + Duration::from_millis(750))
            .unwrap();
        assert_eq!(
            confirmation,
            Confirmation {
                sequence: 1,
                delta: Duration::from_millis(750),
                processed: 1,
                sent: 1,
            }
        );
        assert_eq!(ledger.pending_len(), 0);
    }

    #[test]
    fn test_unknown_signature_does_not_count() {
        let t0 = Instant::now();
        let mut ledger = Ledger::new();
        ledger.record_send(sig(1), 1, t0);

        assert!(ledger.record_confirmation(&sig(2), Slot(10), t0).is_none());

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.processed, 0);
        assert!(snapshot.deltas.is_empty());
        assert!(snapshot.block_counts.is_empty());
    }

    #[test]
    fn test_confirmation_consumed_once() {
        let t0 = Instant::now();
        let mut ledger = Ledger::new();
        ledger.record_send(sig(1), 1, t0);

        assert!(ledger.record_confirmation(&sig(1), Slot(10), t0).is_some());
        assert!(ledger.record_confirmation(&sig(1), Slot(10), t0).is_none());

        assert_eq!(ledger.processed(), 1);
        assert_eq!(ledger.snapshot().block_counts.get(&Slot(10)), Some(&1));
    }

    #[test]
    fn test_duplicate_send_counted_once() {
        let t0 = Instant::now();
        let mut ledger = Ledger::new();

        assert!(ledger.record_send(sig(1), 1, t0));
        assert!(!ledger.record_send(sig(1), 1, t0 + Duration::from_secs(1)));
        assert_eq!(ledger.sent(), 1);

        // Latency is measured from the first send.
        let c = ledger
            .record_confirmation(&sig(1), Slot(3), t0 + Duration::from_secs(2))
            .unwrap();
        assert_eq!(c.delta, Duration::from_secs(2));
    }

    #[test]
    fn test_completion_requires_finished_emission() {
        let t0 = Instant::now();
        let mut ledger = Ledger::new();
        ledger.record_send(sig(1), 1, t0);
        ledger.record_confirmation(&sig(1), Slot(1), t0);

        // processed == sent, but more sends may still arrive
        assert!(!ledger.is_complete());

        ledger.finish_emission();
        assert!(ledger.is_complete());
    }

    #[test]
    fn test_empty_run_completes_on_emission_end() {
        let mut ledger = Ledger::new();
        assert!(!ledger.is_complete());
        ledger.finish_emission();
        assert!(ledger.is_complete());
    }

    #[test]
    fn test_invariants_hold_across_mixed_operations() {
        let t0 = Instant::now();
        let mut ledger = Ledger::new();

        for n in 1..=20u8 {
            ledger.record_send(sig(n), n as u64, t0);
            if n % 3 == 0 {
                ledger.record_confirmation(&sig(n - 1), Slot(n as u64 / 4), t0);
                ledger.record_confirmation(&sig(200), Slot(0), t0);
            }
            assert!(ledger.processed() <= ledger.sent());
        }

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.deltas.len() as u64, snapshot.processed);
        assert_eq!(snapshot.block_counts.values().sum::<u64>(), snapshot.processed);
        assert_eq!(snapshot.unconfirmed, snapshot.sent - snapshot.processed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_and_confirmations_keep_invariants() {
        let ledger = Ledger::shared();
        let mut tasks = tokio::task::JoinSet::new();

        for n in 0..200u8 {
            let sender = ledger.clone();
            tasks.spawn(async move {
                tokio::task::yield_now().await;
                sender.lock().record_send(sig(n), n as u64, Instant::now());
            });

            // Confirmations race the sends; early ones find nothing pending.
            let listener = ledger.clone();
            tasks.spawn(async move {
                for _ in 0..3 {
                    {
                        let mut ledger = listener.lock();
                        ledger.record_confirmation(&sig(n), Slot(n as u64 % 7), Instant::now());
                        assert!(ledger.processed() <= ledger.sent());
                    }
                    tokio::task::yield_now().await;
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }

        let mut ledger = ledger.lock();
        ledger.finish_emission();
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.sent, 200);
        assert!(snapshot.processed <= snapshot.sent);
        assert_eq!(snapshot.deltas.len() as u64, snapshot.processed);
        assert_eq!(snapshot.block_counts.values().sum::<u64>(), snapshot.processed);
        assert_eq!(snapshot.unconfirmed, snapshot.sent - snapshot.processed);
        assert_eq!(ledger.pending_len() as u64, snapshot.unconfirmed);
    }
}
