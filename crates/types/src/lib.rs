//! Core types for memobench.
//!
//! Primitives shared by the benchmark engine:
//!
//! - **Identifiers**: the per-run [`RunId`] and ledger [`Slot`] numbers
//! - **Keys**: wallet keypair import from the base58 export format
//! - **Memo format**: the payload embedded in every benchmark transaction and
//!   the parser that recognises it in program logs
//! - **Transactions**: memo transactions with optional compute-budget
//!   instructions, built on `solana-sdk`

mod identifiers;
mod keys;
mod memo;
mod transaction;

pub use identifiers::{RunId, Slot};
pub use keys::{keypair_from_base58, KeyError};
pub use memo::{memo_text, parse_log_line, MemoRecord, MEMO_MARKER};
pub use transaction::{memo_instructions, memo_transaction, transaction_memo, COMPUTE_UNIT_LIMIT};
