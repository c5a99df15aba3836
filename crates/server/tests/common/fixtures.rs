//! Test data helpers.

use frkb_core::collection_hash;

/// Deterministic synthetic fingerprint: 64 hex chars.
pub fn fp(i: u64) -> String {
    format!("{i:016x}").repeat(4)
}

/// A range of synthetic fingerprints.
pub fn fps(range: std::ops::Range<u64>) -> Vec<String> {
    range.map(fp).collect()
}

/// Collection hash of a set, sorting first like a client would.
pub fn sorted_hash(mut set: Vec<String>) -> String {
    set.sort_unstable();
    collection_hash(&set)
}

/// The raw admin token matching `AdminConfig::for_testing()`.
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";
