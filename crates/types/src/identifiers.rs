//! Domain-specific identifier types.

use rand::RngCore;
use std::fmt;

/// Per-execution identifier embedded in every benchmark transaction.
///
/// Confirmations carrying a different run id belong to a previous run that
/// used the same account and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId([u8; 4]);

impl RunId {
    /// Size of a run id in bytes.
    pub const BYTES: usize = 4;

    /// Generate a fresh random run id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create a run id from raw bytes.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Convert to the hex form used in memos and log file names.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Check whether a textual id taken from a log line names this run.
    ///
    /// Comparison is against the exact lowercase hex form written into memos.
    pub fn matches(&self, text: &str) -> bool {
        text == self.to_hex()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Slot number a transaction landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(pub u64);

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_hex_is_fixed_width() {
        let id = RunId::from_bytes([0x00, 0x0a, 0xff, 0x10]);
        assert_eq!(id.to_hex(), "000aff10");
        assert_eq!(id.to_string().len(), 8);
    }

    #[test]
    fn test_run_id_matches() {
        let id = RunId::from_bytes([0xde, 0xad, 0xbe, 0xef]);
        assert!(id.matches("deadbeef"));
        assert!(!id.matches("DEADBEEF"));
        assert!(!id.matches("deadbee0"));
        assert!(!id.matches("previous-run"));
    }

    #[test]
    fn test_generated_run_ids_differ() {
        // 32 random bits.
        assert_ne!(RunId::generate(), RunId::generate());
    }
}
