//! User meta repository.

use crate::error::MetadataResult;
use crate::models::UserMetaRow;
use async_trait::async_trait;
use frkb_core::CollectionHasher;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for per-user aggregate state.
#[async_trait]
pub trait UserMetaRepo: Send + Sync {
    /// Fetch the meta record, creating the zero state on first touch.
    ///
    /// First-create never enumerates the fingerprint store: a fresh record
    /// gets `total_count = 0` and an empty `collection_hash` sentinel, to be
    /// reconciled by the first mutation's refresh.
    async fn get_or_create_meta(
        &self,
        user_key: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<UserMetaRow>;

    /// Fetch the meta record without creating it.
    async fn get_meta(&self, user_key: Uuid) -> MetadataResult<Option<UserMetaRow>>;

    /// Re-enumerate the user's fingerprints, recompute `total_count` and
    /// `collection_hash` against live storage, write them back, and return
    /// the fresh row.
    async fn refresh_meta(
        &self,
        user_key: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<UserMetaRow>;

    /// Record a completed sync: bump `total_syncs`, set `last_sync_added`,
    /// `last_sync_duration_ms` and `last_sync_at`, and refresh the
    /// count/hash in the same logical step.
    async fn apply_sync_delta(
        &self,
        user_key: Uuid,
        added: u64,
        duration_ms: u64,
        now: OffsetDateTime,
    ) -> MetadataResult<UserMetaRow>;

    /// Persist the serialized bloom filter blob. The store does not
    /// interpret it.
    async fn store_bloom_blob(
        &self,
        user_key: Uuid,
        blob: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Load the serialized bloom filter blob, if any.
    async fn load_bloom_blob(&self, user_key: Uuid) -> MetadataResult<Option<String>>;

    /// Delete the meta record. Returns the number of rows removed (0 or 1).
    async fn delete_meta(&self, user_key: Uuid) -> MetadataResult<u64>;
}

/// Compute `(total_count, collection_hash)` from a sorted enumeration.
/// Shared by both store backends so the hash contract lives in one place.
pub(crate) fn collection_state(sorted_fingerprints: &[String]) -> (i64, String) {
    let mut hasher = CollectionHasher::new();
    for fp in sorted_fingerprints {
        hasher.update(fp);
    }
    (sorted_fingerprints.len() as i64, hasher.finalize())
}
