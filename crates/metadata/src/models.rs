//! Database models mapping to the metadata schema.

use crate::error::MetadataResult;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Fingerprints
// =============================================================================

/// Outcome of a conflict-tolerant batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchInsertOutcome {
    /// Rows actually written.
    pub inserted: u64,
    /// Elements that collided with the unique index (already stored).
    pub duplicates: u64,
}

// =============================================================================
// User meta
// =============================================================================

/// Per-user aggregate record.
///
/// `collection_hash` is the SHA-256 of the sorted fingerprint concatenation;
/// the empty string is the "never computed" sentinel written at first touch.
#[derive(Debug, Clone, FromRow)]
pub struct UserMetaRow {
    pub user_key: Uuid,
    pub total_count: i64,
    pub collection_hash: String,
    pub last_sync_at: Option<OffsetDateTime>,
    pub total_syncs: i64,
    pub last_sync_added: i64,
    pub last_sync_duration_ms: i64,
    /// Serialized bloom filter. Opaque to this crate.
    pub bloom_filter: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// Diff sessions
// =============================================================================

/// Durable diff-session record.
///
/// The missing-fingerprint projections are JSON arrays in TEXT columns;
/// sessions are written once and never mutated except for the lazily
/// materialized sorted projection.
#[derive(Debug, Clone, FromRow)]
pub struct DiffSessionRow {
    pub session_id: String,
    pub user_key: Uuid,
    pub missing_in_client: String,
    pub missing_in_server: String,
    pub sorted_missing_in_client: Option<String>,
    pub total_client: i64,
    pub total_server: i64,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl DiffSessionRow {
    /// Decode the `missing_in_client` JSON column.
    pub fn missing_in_client_list(&self) -> MetadataResult<Vec<String>> {
        Ok(serde_json::from_str(&self.missing_in_client)?)
    }

    /// Decode the `missing_in_server` JSON column.
    pub fn missing_in_server_list(&self) -> MetadataResult<Vec<String>> {
        Ok(serde_json::from_str(&self.missing_in_server)?)
    }

    /// Decode the sorted projection, if it has been materialized.
    pub fn sorted_missing_in_client_list(&self) -> MetadataResult<Option<Vec<String>>> {
        match &self.sorted_missing_in_client {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }
}

// =============================================================================
// User keys
// =============================================================================

/// External user-key whitelist record. The sync core only reads these;
/// creation and revocation belong to the admin surface.
#[derive(Debug, Clone, FromRow)]
pub struct UserKeyRow {
    pub user_key: Uuid,
    pub is_active: bool,
    /// Maximum stored fingerprints for this user. Zero disables enforcement.
    pub fingerprint_limit: i64,
    pub total_requests: i64,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
}
