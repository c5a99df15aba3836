//! User-key whitelist repository.

use crate::error::MetadataResult;
use crate::models::UserKeyRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for the user-key whitelist.
#[async_trait]
pub trait UserKeyRepo: Send + Sync {
    /// Create a user-key record. Fails with `AlreadyExists` on collision.
    async fn create_user_key(&self, row: &UserKeyRow) -> MetadataResult<()>;

    /// Fetch a user-key record.
    async fn get_user_key(&self, user_key: Uuid) -> MetadataResult<Option<UserKeyRow>>;

    /// List all user-key records, newest first.
    async fn list_user_keys(&self) -> MetadataResult<Vec<UserKeyRow>>;

    /// Activate or deactivate a key.
    async fn set_user_key_active(
        &self,
        user_key: Uuid,
        active: bool,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Bump the request counter and `last_used_at`. These counters survive a
    /// user-data reset.
    async fn record_user_key_usage(
        &self,
        user_key: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete a user-key record. Returns the number of rows removed.
    async fn delete_user_key(&self, user_key: Uuid) -> MetadataResult<u64>;
}
