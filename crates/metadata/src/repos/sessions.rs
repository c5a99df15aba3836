//! Diff-session repository.

use crate::error::MetadataResult;
use crate::models::DiffSessionRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for durable diff sessions.
///
/// Expiry is part of the read contract: `find_session` never returns a row
/// whose `expires_at` has passed, so callers cannot act on a dead session
/// even before physical reclamation runs.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Persist a new session. The caller stamps `expires_at = created_at +
    /// TTL` before the write.
    async fn create_session(&self, session: &DiffSessionRow) -> MetadataResult<()>;

    /// Fetch a live session. Rows with `expires_at <= now` are treated as
    /// absent.
    async fn find_session(
        &self,
        session_id: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<DiffSessionRow>>;

    /// Idempotent upsert of the precomputed sorted projection. Call sites
    /// treat failure as best-effort (log and continue).
    async fn record_sorted_view(
        &self,
        session_id: &str,
        sorted_json: &str,
    ) -> MetadataResult<()>;

    /// Delete all of a user's sessions. Returns the number removed.
    async fn delete_sessions_for_user(&self, user_key: Uuid) -> MetadataResult<u64>;

    /// Physically reclaim expired rows. Driven by the `expires_at` index;
    /// invoked from periodic maintenance.
    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> MetadataResult<u64>;

    /// Count sessions that are still live at `now`.
    async fn count_active_sessions(&self, now: OffsetDateTime) -> MetadataResult<u64>;
}
