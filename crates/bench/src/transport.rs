//! Transport boundary.
//!
//! The engine only talks to the network through these traits. The concrete
//! RPC and pubsub clients live in [`crate::client`]; tests use the in-memory
//! chain from `testing`.

use async_trait::async_trait;
use memobench_types::Slot;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::pubsub_client::PubsubClientError;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_response::{Response, RpcLogsResponse};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};
use thiserror::Error;

/// One `logsNotification` for a transaction mentioning the subscribed account.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// Slot the transaction was processed in.
    pub slot: Slot,
    /// Transaction signature.
    pub signature: Signature,
    /// Execution error reported by the node, if the transaction failed.
    pub err: Option<TransactionError>,
    /// Program log lines.
    pub logs: Vec<String>,
}

impl TryFrom<Response<RpcLogsResponse>> for LogEvent {
    type Error = TransportError;

    fn try_from(response: Response<RpcLogsResponse>) -> Result<Self, Self::Error> {
        let signature = response
            .value
            .signature
            .parse()
            .map_err(|e| TransportError::Decode(format!("signature: {}", e)))?;
        Ok(Self {
            slot: Slot(response.context.slot),
            signature,
            err: response.value.err,
            logs: response.value.logs,
        })
    }
}

/// Errors from the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// RPC request failed or the node rejected it.
    #[error("RPC error: {0}")]
    Rpc(#[from] ClientError),

    /// Pubsub connection or subscription failed.
    #[error("Pubsub error: {0}")]
    Pubsub(#[from] PubsubClientError),

    /// Notification could not be decoded.
    #[error("Invalid notification: {0}")]
    Decode(String),

    /// Subscription stream closed.
    #[error("Subscription closed")]
    Closed,
}

/// Read-side RPC calls used during setup.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Fetch a recent blockhash.
    async fn latest_blockhash(&self, commitment: CommitmentConfig) -> Result<Hash, TransportError>;

    /// Fetch an account balance in lamports.
    async fn balance(
        &self,
        account: &Pubkey,
        commitment: CommitmentConfig,
    ) -> Result<u64, TransportError>;
}

/// Submits signed transactions.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Submit a transaction, returning the signature the node reports.
    async fn send_transaction(
        &self,
        tx: &Transaction,
        config: RpcSendTransactionConfig,
    ) -> Result<Signature, TransportError>;
}

/// An open log subscription.
#[async_trait]
pub trait LogStream: Send {
    /// Wait for the next event.
    ///
    /// `None` means the stream ended and no further events will arrive.
    /// `Some(Err(_))` is a per-event error; the stream stays usable.
    async fn next_event(&mut self) -> Option<Result<LogEvent, TransportError>>;

    /// Cancel the subscription.
    async fn unsubscribe(&mut self) -> Result<(), TransportError>;
}

/// Opens log subscriptions.
#[async_trait]
pub trait LogSubscriber: Send + Sync {
    type Stream: LogStream + 'static;

    /// Subscribe to logs of transactions mentioning `account`.
    async fn subscribe_mentions(
        &self,
        account: &Pubkey,
        commitment: CommitmentConfig,
    ) -> Result<Self::Stream, TransportError>;
}
