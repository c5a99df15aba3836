//! Fingerprint repository.

use crate::error::MetadataResult;
use crate::models::BatchInsertOutcome;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for the per-user fingerprint sets.
///
/// All fingerprint arguments are assumed pre-validated and lowercased by the
/// caller; the store only guarantees the uniqueness of `(user_key,
/// fingerprint)`.
#[async_trait]
pub trait FingerprintRepo: Send + Sync {
    /// Count a user's stored fingerprints.
    async fn count_fingerprints(&self, user_key: Uuid) -> MetadataResult<u64>;

    /// Return the subset of `candidates` that is already stored for the
    /// user. Callers deduplicate candidates first.
    async fn existing_fingerprints(
        &self,
        user_key: Uuid,
        candidates: &[String],
    ) -> MetadataResult<Vec<String>>;

    /// Full enumeration of a user's fingerprints in lexicographic order.
    /// The storage layer performs the sort; callers rely on the ordering for
    /// collection hashing and whole-set diffs.
    async fn list_fingerprints(&self, user_key: Uuid) -> MetadataResult<Vec<String>>;

    /// Conflict-tolerant batch insert.
    ///
    /// Elements already present (or repeated within the batch) land on the
    /// unique index, are silently skipped, and are counted as duplicates.
    /// The non-duplicate subset always succeeds; partial failure would break
    /// the idempotent-add contract.
    async fn insert_fingerprints(
        &self,
        user_key: Uuid,
        fingerprints: &[String],
        now: OffsetDateTime,
    ) -> MetadataResult<BatchInsertOutcome>;

    /// Delete every fingerprint for the user. Returns the number removed.
    async fn purge_user_fingerprints(&self, user_key: Uuid) -> MetadataResult<u64>;
}
