//! Core domain types and shared logic for the FRKB fingerprint sync server.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Fingerprint and user-key identifiers with their validation contracts
//! - The collection hash (canonical digest of a user's fingerprint set)
//! - The per-user bloom filter and its serialized envelope
//! - Configuration types

pub mod bloom;
pub mod collection;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod user_key;

pub use bloom::FingerprintBloomFilter;
pub use collection::{collection_hash, CollectionHasher};
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use user_key::UserKey;

/// Maximum elements per write-path batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default page size for paginated diff delivery.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default diff-session time-to-live in seconds.
pub const DEFAULT_DIFF_SESSION_TTL_SECS: u64 = 300;

/// Hard cap on the client payload of a whole-set diff.
pub const MAX_ANALYZE_FINGERPRINTS: usize = 100_000;

/// Default per-user fingerprint limit.
pub const DEFAULT_FINGERPRINT_LIMIT: u64 = 200_000;
