//! Per-user bloom filter for approximate fingerprint membership.
//!
//! A "definitely absent" answer is trustworthy for the snapshot the filter
//! was built from; a "possibly present" answer must be verified against the
//! fingerprint store. The filter uses FNV-1a with double hashing so that
//! identical inputs always map to identical bit positions regardless of
//! process or platform.

use crate::error::Error;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Minimum allowed false-positive rate (prevents `ln(0)`).
const MIN_FP_RATE: f64 = 0.0001;

/// Above this rate the filter answers "maybe" for nearly everything.
const MAX_FP_RATE: f64 = 0.5;

/// Floor on the bit array so tiny sets still get a usable filter.
const MIN_NUM_BITS: usize = 64;

const MIN_NUM_HASHES: u8 = 1;
const MAX_NUM_HASHES: u8 = 16;

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Approximate-membership filter over fingerprint strings.
#[derive(Clone, Debug, PartialEq)]
pub struct FingerprintBloomFilter {
    bits: Vec<u8>,
    num_bits: usize,
    num_hashes: u8,
    item_count: usize,
}

/// Serialized envelope persisted into the user-meta record. The meta store
/// treats the whole thing as an opaque blob; only this crate interprets it.
#[derive(Serialize, Deserialize)]
struct BloomEnvelope {
    bits: String,
    num_bits: usize,
    num_hashes: u8,
    item_count: usize,
}

impl FingerprintBloomFilter {
    /// Create a filter sized for `expected_items` at the target
    /// false-positive rate (clamped to a sane range).
    ///
    /// Sizing uses the standard formulas `m = -n·ln(p) / ln²(2)` and
    /// `k = (m/n)·ln(2)`.
    pub fn with_capacity(expected_items: usize, fp_rate: f64) -> Self {
        let fp_rate = if fp_rate.is_nan() {
            0.01
        } else {
            fp_rate.clamp(MIN_FP_RATE, MAX_FP_RATE)
        };

        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let num_bits = if expected_items == 0 {
            MIN_NUM_BITS
        } else {
            let m = -(expected_items as f64) * fp_rate.ln() / ln2_sq;
            (m.ceil() as usize).max(MIN_NUM_BITS)
        };

        let num_hashes = if expected_items == 0 {
            4
        } else {
            let k = (num_bits as f64 / expected_items as f64) * std::f64::consts::LN_2;
            (k.ceil() as u8).clamp(MIN_NUM_HASHES, MAX_NUM_HASHES)
        };

        Self {
            bits: vec![0; num_bits.div_ceil(8)],
            num_bits,
            num_hashes,
            item_count: 0,
        }
    }

    fn hash_fnv1a(data: &[u8]) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        for byte in data {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    /// Two base hashes for double hashing; position `i` is
    /// `h1 + i·h2 (mod num_bits)`.
    fn base_hashes(fingerprint: &str) -> (u64, u64) {
        let bytes = fingerprint.as_bytes();
        let h1 = Self::hash_fnv1a(bytes);
        // Derive the second hash from the first instead of re-walking the
        // input with a sentinel; 64 input bytes make re-hashing measurable
        // at 200k inserts.
        let h2 = Self::hash_fnv1a(&h1.to_le_bytes()) | 1;
        (h1, h2)
    }

    fn position(&self, h1: u64, h2: u64, i: u64) -> usize {
        (h1.wrapping_add(i.wrapping_mul(h2)) as usize) % self.num_bits
    }

    /// Insert a fingerprint. No-op on a structurally invalid filter.
    pub fn insert(&mut self, fingerprint: &str) {
        if !self.is_valid() {
            return;
        }
        let (h1, h2) = Self::base_hashes(fingerprint);
        for i in 0..u64::from(self.num_hashes) {
            let pos = self.position(h1, h2, i);
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
        self.item_count += 1;
    }

    /// `false` means the fingerprint was definitely absent from the snapshot
    /// the filter was built from; `true` means "possibly present".
    pub fn might_contain(&self, fingerprint: &str) -> bool {
        if !self.is_valid() {
            // An unusable filter must not produce false "definitely absent"
            // answers; degrade to "maybe".
            return true;
        }
        let (h1, h2) = Self::base_hashes(fingerprint);
        for i in 0..u64::from(self.num_hashes) {
            let pos = self.position(h1, h2, i);
            if self.bits[pos / 8] & (1 << (pos % 8)) == 0 {
                return false;
            }
        }
        true
    }

    /// Number of fingerprints inserted.
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Size of the bit array in bits.
    pub fn bit_count(&self) -> usize {
        self.num_bits
    }

    /// Number of hash functions.
    pub fn hash_count(&self) -> u8 {
        self.num_hashes
    }

    /// Heap footprint of the bit array.
    pub fn memory_bytes(&self) -> usize {
        self.bits.len()
    }

    /// Current estimated false-positive rate: `(1 - e^(-k·n/m))^k`.
    pub fn estimated_fp_rate(&self) -> f64 {
        if self.item_count == 0 {
            return 0.0;
        }
        let k = f64::from(self.num_hashes);
        let n = self.item_count as f64;
        let m = self.num_bits as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    /// Structural consistency check. Constructors always produce valid
    /// filters; deserialized blobs may not.
    pub fn is_valid(&self) -> bool {
        self.num_bits != 0
            && self.num_hashes != 0
            && self.bits.len() >= self.num_bits.div_ceil(8)
    }

    /// Serialize into the opaque blob stored in user meta.
    pub fn to_blob(&self) -> String {
        let envelope = BloomEnvelope {
            bits: base64::engine::general_purpose::STANDARD.encode(&self.bits),
            num_bits: self.num_bits,
            num_hashes: self.num_hashes,
            item_count: self.item_count,
        };
        serde_json::to_string(&envelope).expect("bloom envelope serialization cannot fail")
    }

    /// Restore from a persisted blob. Structural validation runs after
    /// decoding; a hostile or truncated blob yields an error, never a
    /// filter that lies about absence.
    pub fn from_blob(blob: &str) -> crate::Result<Self> {
        let envelope: BloomEnvelope = serde_json::from_str(blob)
            .map_err(|e| Error::InvalidBloomFilter(format!("bad envelope: {e}")))?;
        let bits = base64::engine::general_purpose::STANDARD
            .decode(&envelope.bits)
            .map_err(|e| Error::InvalidBloomFilter(format!("bad bit array: {e}")))?;
        let filter = Self {
            bits,
            num_bits: envelope.num_bits,
            num_hashes: envelope.num_hashes,
            item_count: envelope.item_count,
        };
        if !filter.is_valid() {
            return Err(Error::InvalidBloomFilter(
                "structurally inconsistent filter".to_string(),
            ));
        }
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(i: u64) -> String {
        // Deterministic synthetic fingerprints: 64 hex chars.
        format!("{i:016x}").repeat(4)
    }

    #[test]
    fn insert_then_contains() {
        let mut filter = FingerprintBloomFilter::with_capacity(100, 0.01);
        assert!(!filter.might_contain(&fp(1)));
        filter.insert(&fp(1));
        filter.insert(&fp(2));
        assert!(filter.might_contain(&fp(1)));
        assert!(filter.might_contain(&fp(2)));
        assert_eq!(filter.item_count(), 2);
    }

    #[test]
    fn absent_answers_hold_at_target_rate() {
        let n = 1000;
        let mut filter = FingerprintBloomFilter::with_capacity(n, 0.01);
        for i in 0..n as u64 {
            filter.insert(&fp(i));
        }
        let probes = 10_000u64;
        let false_positives = (n as u64..n as u64 + probes)
            .filter(|i| filter.might_contain(&fp(*i)))
            .count();
        let rate = false_positives as f64 / probes as f64;
        assert!(rate < 0.03, "observed fp rate {rate} too high");
    }

    #[test]
    fn fp_rate_clamping_never_panics() {
        for rate in [f64::NAN, f64::INFINITY, -1.0, 0.0, 1.0] {
            let filter = FingerprintBloomFilter::with_capacity(100, rate);
            assert!(filter.is_valid());
        }
    }

    #[test]
    fn blob_roundtrip() {
        let mut filter = FingerprintBloomFilter::with_capacity(50, 0.01);
        filter.insert(&fp(7));
        filter.insert(&fp(8));

        let restored = FingerprintBloomFilter::from_blob(&filter.to_blob()).unwrap();
        assert_eq!(filter, restored);
        assert!(restored.might_contain(&fp(7)));
        assert!(!restored.might_contain(&fp(9999)));
    }

    #[test]
    fn hostile_blob_is_rejected() {
        assert!(FingerprintBloomFilter::from_blob("not json").is_err());

        // Claims a million bits but carries one byte.
        let lying = serde_json::json!({
            "bits": base64::engine::general_purpose::STANDARD.encode([0u8]),
            "num_bits": 1_000_000,
            "num_hashes": 4,
            "item_count": 0,
        });
        assert!(FingerprintBloomFilter::from_blob(&lying.to_string()).is_err());
    }

    #[test]
    fn estimated_rate_grows_with_load() {
        let mut filter = FingerprintBloomFilter::with_capacity(100, 0.01);
        assert_eq!(filter.estimated_fp_rate(), 0.0);
        for i in 0..50 {
            filter.insert(&fp(i));
        }
        let estimate = filter.estimated_fp_rate();
        assert!(estimate > 0.0 && estimate < 0.1);
    }
}
