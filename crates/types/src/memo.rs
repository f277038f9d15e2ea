//! Memo payload format and log-line parser.
//!
//! Every benchmark transaction carries the memo
//! `memobench: Test <sequence> [<run-id>]`. The memo program echoes it into the
//! transaction's program logs, e.g.
//!
//! ```text
//! Program log: Memo (len 29): "memobench: Test 12 [a1b2c3d4]"
//! ```
//!
//! The parser accepts any line of the shape
//! `memobench:<anything><digits><anything>[<id>]`: the sequence is the first
//! run of ASCII digits after the marker, and the id sits inside the last pair
//! of brackets following that number. A digit run too long for `u64` still
//! matches; the record then carries no sequence.

use crate::RunId;

/// Marker that prefixes every benchmark memo.
pub const MEMO_MARKER: &str = "memobench:";

/// Build the memo text for a transaction.
pub fn memo_text(sequence: u64, run_id: &RunId) -> String {
    format!("{} Test {} [{}]", MEMO_MARKER, sequence, run_id)
}

/// A benchmark memo recovered from a program log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoRecord {
    /// Sequence number of the transaction within its run, when it fits in
    /// a `u64`.
    pub sequence: Option<u64>,
    /// Run id as written in the log. May belong to another run.
    pub run_id: String,
}

/// Parse one program log line.
///
/// Returns `None` for lines that do not carry a benchmark memo.
pub fn parse_log_line(line: &str) -> Option<MemoRecord> {
    let start = line.find(MEMO_MARKER)? + MEMO_MARKER.len();
    let rest = &line[start..];

    let digits_start = rest.find(|c: char| c.is_ascii_digit())?;
    let number = &rest[digits_start..];
    let digits_len = number
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(number.len());
    let sequence = number[..digits_len].parse().ok();

    let tail = &number[digits_len..];
    let (open, close) = tail.match_indices('[').rev().find_map(|(i, _)| {
        tail[i + 1..]
            .find(']')
            .map(|len| (i + 1, i + 1 + len))
    })?;

    Some(MemoRecord {
        sequence,
        run_id: tail[open..close].to_string(),
    })
}
