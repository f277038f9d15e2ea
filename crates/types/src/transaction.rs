//! Benchmark memo transactions.
//!
//! Every transaction has a single fee payer that also signs the memo. A
//! non-zero priority fee prepends `SetComputeUnitPrice` and
//! `SetComputeUnitLimit`.

use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::{Signer, SignerError};
use solana_sdk::transaction::Transaction;

/// Compute units requested when a priority fee is paid.
pub const COMPUTE_UNIT_LIMIT: u32 = 30_000;

/// Instruction list for one memo transaction.
///
/// `micro_lamports` is the compute-unit price; 0 leaves the compute budget
/// at the network default.
pub fn memo_instructions(memo: &str, payer: &Pubkey, micro_lamports: u64) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(3);
    if micro_lamports > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            micro_lamports,
        ));
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
            COMPUTE_UNIT_LIMIT,
        ));
    }
    instructions.push(spl_memo::build_memo(memo.as_bytes(), &[payer]));
    instructions
}

/// Build and sign a memo transaction paid for by `payer`.
pub fn memo_transaction(
    memo: &str,
    payer: &Keypair,
    blockhash: Hash,
    micro_lamports: u64,
) -> Result<Transaction, SignerError> {
    let payer_key = payer.pubkey();
    let instructions = memo_instructions(memo, &payer_key, micro_lamports);
    let mut tx = Transaction::new_with_payer(&instructions, Some(&payer_key));
    tx.try_sign(&[payer], blockhash)?;
    Ok(tx)
}

/// The memo text carried by `tx`, if it has a memo instruction.
pub fn transaction_memo(tx: &Transaction) -> Option<&str> {
    let keys = &tx.message.account_keys;
    tx.message
        .instructions
        .iter()
        .find(|ix| keys.get(ix.program_id_index as usize) == Some(&spl_memo::id()))
        .and_then(|ix| std::str::from_utf8(&ix.data).ok())
}
