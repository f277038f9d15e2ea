//! Checks run before any transaction is sent.

use crate::config::{BenchConfig, LAMPORTS_PER_SOL};
use crate::transport::{ChainRpc, TransportError};
use memobench_types::{keypair_from_base58, KeyError};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Invalid private key: {0}")]
    Key(#[from] KeyError),

    #[error("Failed to get test wallet balance: {0}")]
    Balance(#[from] TransportError),

    #[error("Insufficient balance in test wallet: balance {} SOL, required {} SOL", sol(.balance), sol(.required))]
    InsufficientBalance { balance: u64, required: u64 },
}

fn sol(lamports: &u64) -> String {
    format!("{:.6}", *lamports as f64 / LAMPORTS_PER_SOL as f64)
}

/// Decode the wallet keypair from the config.
pub fn resolve_keypair(config: &BenchConfig) -> Result<Keypair, PreflightError> {
    Ok(keypair_from_base58(&config.private_key)?)
}

/// Lamports the run may spend at most.
pub fn total_cost(config: &BenchConfig) -> u64 {
    config.tx_count.saturating_mul(config.cost_per_tx())
}

/// Fail if the wallet holds less than half the worst-case cost of the run.
pub async fn assert_sufficient_balance<R: ChainRpc + ?Sized>(
    rpc: &R,
    wallet: &Pubkey,
    config: &BenchConfig,
) -> Result<u64, PreflightError> {
    let balance = rpc.balance(wallet, CommitmentConfig::finalized()).await?;
    let required = total_cost(config);

    if balance < required / 2 {
        return Err(PreflightError::InsufficientBalance { balance, required });
    }

    info!(balance = %format!("{} SOL", sol(&balance)), "Test wallet balance OK");
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRpc;
    use solana_sdk::hash::Hash;
    use solana_sdk::signature::keypair_from_seed;
    use solana_sdk::signer::Signer;

    fn wallet_keypair() -> Keypair {
        keypair_from_seed(&[3; 32]).unwrap()
    }

    fn config(tx_count: u64, prio_fee: f64) -> BenchConfig {
        BenchConfig {
            private_key: wallet_keypair().to_base58_string(),
            tx_count,
            prio_fee,
            ..BenchConfig::default()
        }
    }

    #[test]
    fn test_resolve_keypair() {
        let config = config(1, 0.0);
        let keypair = resolve_keypair(&config).unwrap();
        assert_eq!(keypair.pubkey(), wallet_keypair().pubkey());

        let bad = BenchConfig {
            private_key: "0OIl".into(),
            ..config
        };
        assert!(matches!(resolve_keypair(&bad), Err(PreflightError::Key(_))));
    }

    #[tokio::test]
    async fn test_balance_threshold_is_half_of_cost() {
        // 100 tx at 5_000 lamports: cost 500_000, threshold 250_000
        let config = config(100, 0.0);
        let wallet = wallet_keypair().pubkey();

        let rpc = MockRpc::new(Hash::default()).with_balance(250_000);
        assert_eq!(
            assert_sufficient_balance(&rpc, &wallet, &config).await.unwrap(),
            250_000
        );

        let rpc = MockRpc::new(Hash::default()).with_balance(249_999);
        let err = assert_sufficient_balance(&rpc, &wallet, &config)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PreflightError::InsufficientBalance {
                balance: 249_999,
                required: 500_000
            }
        ));
        assert_eq!(
            err.to_string(),
            "Insufficient balance in test wallet: balance 0.000250 SOL, required 0.000500 SOL"
        );
    }

    #[tokio::test]
    async fn test_priority_fee_raises_cost() {
        // 10 tx at 1 lamport/CU: (30_000 + 5_000) * 10 = 350_000
        let config = config(10, 1.0);
        let wallet = wallet_keypair().pubkey();
        assert_eq!(total_cost(&config), 350_000);

        let rpc = MockRpc::new(Hash::default()).with_balance(174_999);
        assert!(assert_sufficient_balance(&rpc, &wallet, &config).await.is_err());
    }
}
