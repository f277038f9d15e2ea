//! HTTP JSON-RPC client.

use crate::transport::{ChainRpc, TransactionSubmitter, TransportError};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::UiTransactionEncoding;
use std::time::Duration;
use tracing::debug;

/// Default request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `sendTransaction` settings for benchmark sends.
///
/// Preflight is skipped so the node forwards immediately, and the node
/// rebroadcasts at most `max_retries` times.
pub fn send_config(max_retries: usize) -> RpcSendTransactionConfig {
    RpcSendTransactionConfig {
        skip_preflight: true,
        max_retries: Some(max_retries),
        encoding: Some(UiTransactionEncoding::Base64),
        ..Default::default()
    }
}

/// RPC client for a single node endpoint.
pub struct NodeRpc {
    client: RpcClient,
}

impl NodeRpc {
    /// Create a client for `url` with the default request timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, REQUEST_TIMEOUT)
    }

    /// Create a client for `url` with a custom request timeout.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout(url.into(), timeout),
        }
    }

    /// The endpoint URL.
    pub fn url(&self) -> String {
        self.client.url()
    }
}

#[async_trait]
impl ChainRpc for NodeRpc {
    async fn latest_blockhash(&self, commitment: CommitmentConfig) -> Result<Hash, TransportError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(commitment)
            .await?;
        debug!(%blockhash, last_valid_block_height, "Fetched latest blockhash");
        Ok(blockhash)
    }

    async fn balance(
        &self,
        account: &Pubkey,
        commitment: CommitmentConfig,
    ) -> Result<u64, TransportError> {
        let response = self
            .client
            .get_balance_with_commitment(account, commitment)
            .await?;
        Ok(response.value)
    }
}

#[async_trait]
impl TransactionSubmitter for NodeRpc {
    async fn send_transaction(
        &self,
        tx: &Transaction,
        config: RpcSendTransactionConfig,
    ) -> Result<Signature, TransportError> {
        Ok(self.client.send_transaction_with_config(tx, config).await?)
    }
}
