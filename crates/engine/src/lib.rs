//! Sync engine for the FRKB fingerprint sync server.
//!
//! This crate owns the synchronization semantics:
//! - The eight core operations (check, bidirectional diff, analyze,
//!   paginated pull, batch add, reset, status, service stats)
//! - Per-user sync locks with stale reclamation
//! - The per-user bloom filter cache
//! - The ephemeral LRU cache over read-mostly snapshots
//! - The periodic maintenance task

pub mod bloom_cache;
pub mod cache;
pub mod engine;
pub mod error;
pub mod locks;
pub mod maintenance;
pub mod types;

pub use bloom_cache::{BloomAnswer, BloomBatchSummary, BloomFilterCache, BloomSource, BloomStats};
pub use cache::{CacheStats, EphemeralCache};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use locks::{SyncLockTable, SyncOperation, FORCE_RECLAIM_AFTER};
pub use maintenance::{spawn_maintenance, MaintenanceHandle, DEFAULT_MAINTENANCE_INTERVAL};
