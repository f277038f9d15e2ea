//! In-memory chain for tests.
//!
//! [`MockSubmitter`] accepts transactions and, when wired to a
//! [`ChannelSubscriber`], delivers a confirmation event for each one after a
//! configurable delay. Slots and failures are scripted per sequence number.

use crate::transport::{
    ChainRpc, LogEvent, LogStream, LogSubscriber, TransactionSubmitter, TransportError,
};
use async_trait::async_trait;
use memobench_types::{parse_log_line, transaction_memo, Slot};
use parking_lot::Mutex;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// An RPC failure as the node client reports it.
fn rpc_error(message: impl Into<String>) -> TransportError {
    TransportError::Rpc(ClientError::from(ClientErrorKind::Custom(message.into())))
}

/// Scripted read-side RPC.
pub struct MockRpc {
    blockhash: Hash,
    balance: u64,
    fail_blockhash: bool,
    blockhash_calls: AtomicUsize,
}

impl MockRpc {
    pub fn new(blockhash: Hash) -> Self {
        Self {
            blockhash,
            balance: u64::MAX,
            fail_blockhash: false,
            blockhash_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_balance(mut self, balance: u64) -> Self {
        self.balance = balance;
        self
    }

    /// Make `latest_blockhash` fail with an RPC error.
    pub fn with_blockhash_failure(mut self) -> Self {
        self.fail_blockhash = true;
        self
    }

    pub fn blockhash_calls(&self) -> usize {
        self.blockhash_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn latest_blockhash(&self, _commitment: CommitmentConfig) -> Result<Hash, TransportError> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_blockhash {
            return Err(rpc_error("Node is behind"));
        }
        Ok(self.blockhash)
    }

    async fn balance(
        &self,
        _account: &Pubkey,
        _commitment: CommitmentConfig,
    ) -> Result<u64, TransportError> {
        Ok(self.balance)
    }
}

/// Accepts transactions and optionally confirms them.
pub struct MockSubmitter {
    events: Option<mpsc::UnboundedSender<LogEvent>>,
    failing: HashSet<u64>,
    slots: HashMap<u64, Slot>,
    default_slot: Slot,
    latency: Duration,
    submitted: Mutex<Vec<Transaction>>,
    send_configs: Mutex<Vec<RpcSendTransactionConfig>>,
}

impl MockSubmitter {
    pub fn new() -> Self {
        Self {
            events: None,
            failing: HashSet::new(),
            slots: HashMap::new(),
            default_slot: Slot(1),
            latency: Duration::from_millis(400),
            submitted: Mutex::new(Vec::new()),
            send_configs: Mutex::new(Vec::new()),
        }
    }

    /// Deliver a confirmation for every accepted transaction into `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<LogEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Reject the transaction with this sequence number.
    pub fn fail_sequence(mut self, sequence: u64) -> Self {
        self.failing.insert(sequence);
        self
    }

    /// Land the transaction with this sequence number in `slot`.
    pub fn with_slot(mut self, sequence: u64, slot: u64) -> Self {
        self.slots.insert(sequence, Slot(slot));
        self
    }

    /// Delay between acceptance and confirmation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Transactions accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<Transaction> {
        self.submitted.lock().clone()
    }

    /// Send configs of every call, accepted or not.
    pub fn send_configs(&self) -> Vec<RpcSendTransactionConfig> {
        self.send_configs.lock().clone()
    }
}

impl Default for MockSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Program logs the memo program writes for `memo`.
pub fn memo_logs(memo: &str) -> Vec<String> {
    vec![
        "Program MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr invoke [1]".to_string(),
        format!("Program log: Memo (len {}): \"{}\"", memo.len(), memo),
        "Program MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr success".to_string(),
    ]
}

#[async_trait]
impl TransactionSubmitter for MockSubmitter {
    async fn send_transaction(
        &self,
        tx: &Transaction,
        config: RpcSendTransactionConfig,
    ) -> Result<Signature, TransportError> {
        self.send_configs.lock().push(config);

        let memo = transaction_memo(tx).ok_or_else(|| rpc_error("transaction has no memo"))?;
        let sequence = parse_log_line(memo)
            .and_then(|record| record.sequence)
            .ok_or_else(|| rpc_error("unrecognised memo"))?;

        if self.failing.contains(&sequence) {
            return Err(rpc_error(format!("Transaction {} rejected", sequence)));
        }

        self.submitted.lock().push(tx.clone());
        let signature = tx.signatures[0];

        if let Some(events) = &self.events {
            let event = LogEvent {
                slot: self.slots.get(&sequence).copied().unwrap_or(self.default_slot),
                signature,
                err: None,
                logs: memo_logs(memo),
            };
            let events = events.clone();
            let latency = self.latency;
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                let _ = events.send(event);
            });
        }

        Ok(signature)
    }
}

/// Hands out one in-memory log stream fed by a channel.
pub struct ChannelSubscriber {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<LogEvent>>>,
    unsubscribes: Arc<AtomicUsize>,
    fail: bool,
}

impl ChannelSubscriber {
    /// Returns the subscriber and the sender that feeds its stream.
    pub fn new() -> (Self, mpsc::UnboundedSender<LogEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Self {
            receiver: Mutex::new(Some(rx)),
            unsubscribes: Arc::new(AtomicUsize::new(0)),
            fail: false,
        };
        (subscriber, tx)
    }

    /// A subscriber whose subscribe call is rejected.
    pub fn failing() -> Self {
        Self {
            receiver: Mutex::new(None),
            unsubscribes: Arc::new(AtomicUsize::new(0)),
            fail: true,
        }
    }

    /// Unsubscribe calls made on streams from this subscriber.
    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSubscriber for ChannelSubscriber {
    type Stream = ChannelLogStream;

    async fn subscribe_mentions(
        &self,
        _account: &Pubkey,
        _commitment: CommitmentConfig,
    ) -> Result<Self::Stream, TransportError> {
        if self.fail {
            return Err(TransportError::Closed);
        }
        let receiver = self.receiver.lock().take().ok_or(TransportError::Closed)?;
        Ok(ChannelLogStream {
            receiver,
            unsubscribes: self.unsubscribes.clone(),
        })
    }
}

/// In-memory log stream.
pub struct ChannelLogStream {
    receiver: mpsc::UnboundedReceiver<LogEvent>,
    unsubscribes: Arc<AtomicUsize>,
}

impl ChannelLogStream {
    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogStream for ChannelLogStream {
    async fn next_event(&mut self) -> Option<Result<LogEvent, TransportError>> {
        self.receiver.recv().await.map(Ok)
    }

    async fn unsubscribe(&mut self) -> Result<(), TransportError> {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.receiver.close();
        Ok(())
    }
}
