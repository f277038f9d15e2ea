//! Wallet key import.

use solana_sdk::signature::{keypair_from_seed, Keypair};
use solana_sdk::signer::Signer;
use thiserror::Error;

/// Length of an exported keypair: secret half then public half.
const KEYPAIR_BYTES: usize = 64;

/// Errors decoding an exported keypair.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid base58 encoding: {0}")]
    InvalidBase58(#[from] bs58::decode::Error),

    #[error("Invalid length: expected {KEYPAIR_BYTES} bytes, got {0}")]
    InvalidLength(usize),

    #[error("Public key does not match secret key")]
    MismatchedKeypair,
}

/// Decode a wallet keypair from its base58 export.
///
/// The public half must be the one derived from the secret half.
pub fn keypair_from_base58(s: &str) -> Result<Keypair, KeyError> {
    let bytes = bs58::decode(s.trim()).into_vec()?;
    if bytes.len() != KEYPAIR_BYTES {
        return Err(KeyError::InvalidLength(bytes.len()));
    }

    let (secret, public) = bytes.split_at(KEYPAIR_BYTES / 2);
    let keypair = keypair_from_seed(secret).map_err(|_| KeyError::MismatchedKeypair)?;
    if keypair.pubkey().as_ref() != public {
        return Err(KeyError::MismatchedKeypair);
    }
    Ok(keypair)
}
