//! Audit hash chain for automation run records.
//!
//! Lives in `core` so the writer, the repository and the verification
//! endpoint all compute hashes identically.

use crate::hashing;

/// Known seed value for the first entry in the chain.
const CHAIN_SEED: &str = "AUTOMATION_AUDIT_CHAIN_SEED_V1";

/// Compute the integrity hash for an audit entry.
///
/// `prev_hash` is the hash of the previous entry, or `None` for the first
/// entry (which chains from a fixed seed).
pub fn compute_integrity_hash(prev_hash: Option<&str>, entry_data: &str) -> String {
    let prev = prev_hash.unwrap_or(CHAIN_SEED);
    hashing::sha256_hex(format!("{prev}|{entry_data}").as_bytes())
}

/// Result of re-walking a chain.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChainVerification {
    pub entries_checked: usize,
    /// Position (0-based) of the first entry whose stored hash does not match.
    pub first_broken_at: Option<usize>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.first_broken_at.is_none()
    }
}

/// Verify a chain given `(entry_data, stored_hash)` pairs in insertion order.
///
/// `anchor` is the hash preceding the first pair (`None` when the slice
/// starts at the beginning of the chain).
pub fn verify_chain<'a, I>(anchor: Option<&str>, entries: I) -> ChainVerification
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut prev = anchor.map(str::to_string);
    let mut checked = 0;
    for (idx, (data, stored)) in entries.into_iter().enumerate() {
        checked += 1;
        let expected = compute_integrity_hash(prev.as_deref(), data);
        if expected != stored {
            return ChainVerification {
                entries_checked: checked,
                first_broken_at: Some(idx),
            };
        }
        prev = Some(expected);
    }
    ChainVerification {
        entries_checked: checked,
        first_broken_at: None,
    }
}
