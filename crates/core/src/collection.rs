//! Collection hash: the canonical digest of a user's fingerprint set.
//!
//! The hash is SHA-256 over the ASCII concatenation of the lexicographically
//! sorted fingerprints, no separators. Two sets with the same membership
//! always hash identically, which is what makes the `check` fast path sound.

use sha2::{Digest, Sha256};

/// Incremental collection hasher.
///
/// Callers feed fingerprints in sorted order; the hasher never materializes
/// the concatenated string, so hashing a 200k-element set stays flat in
/// memory.
pub struct CollectionHasher(Sha256);

impl CollectionHasher {
    /// Create a hasher. Finalizing immediately yields the empty-set hash
    /// (SHA-256 of the empty string).
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// Feed one fingerprint. The caller guarantees sorted order.
    pub fn update(&mut self, fingerprint: &str) {
        self.0.update(fingerprint.as_bytes());
    }

    /// Finalize and return the lowercase hex digest.
    pub fn finalize(self) -> String {
        hex::encode(self.0.finalize())
    }
}

impl Default for CollectionHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash an already-sorted sequence of fingerprints.
pub fn collection_hash<I, S>(sorted: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = CollectionHasher::new();
    for fp in sorted {
        hasher.update(fp.as_ref());
    }
    hasher.finalize()
}
