//! Operation outcome types returned by the sync engine.
//!
//! These serialize with camelCase names so the HTTP layer can embed them
//! directly into response envelopes.

use crate::bloom_cache::{BloomBatchSummary, BloomStats};
use crate::cache::CacheStats;
use serde::Serialize;
use time::OffsetDateTime;

/// Why `check` decided the way it did. Serialized as the wire `reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckReason {
    SyncInProgress,
    BothEmpty,
    ServerEmpty,
    ClientEmpty,
    CountMismatch,
    AlreadySynced,
    HashMismatch,
}

impl CheckReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncInProgress => "sync_in_progress",
            Self::BothEmpty => "both_empty",
            Self::ServerEmpty => "server_empty",
            Self::ClientEmpty => "client_empty",
            Self::CountMismatch => "count_mismatch",
            Self::AlreadySynced => "already_synced",
            Self::HashMismatch => "hash_mismatch",
        }
    }
}

/// Outcome of the `check` fast path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub need_sync: bool,
    pub reason: CheckReason,
    pub server_count: u64,
    pub server_hash: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync_at: Option<OffsetDateTime>,
    pub limit: u64,
}

/// Element counts for one bidirectional-diff batch.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDiffCounts {
    pub submitted: usize,
    pub missing_in_server: usize,
    pub existing_on_server: usize,
}

/// Advisory session opened by batch 0 of a bidirectional diff.
///
/// Carries no missing-in-client data; the definitive pull set comes from
/// `analyze_difference`, which the hint points at.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorySessionInfo {
    pub session_id: String,
    pub server_count: u64,
    pub hint: &'static str,
}

/// Outcome of one bidirectional-diff batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDiffOutcome {
    pub batch_index: u64,
    pub batch_size: usize,
    pub server_missing_fingerprints: Vec<String>,
    pub server_existing_fingerprints: Vec<String>,
    pub counts: BatchDiffCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_info: Option<AdvisorySessionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bloom_filter_stats: Option<BloomBatchSummary>,
}

/// Aggregate numbers for a whole-set diff.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    pub client_missing_count: usize,
    pub server_missing_count: usize,
    pub total_pages: u64,
    pub page_size: usize,
}

/// Informational sync-direction hint.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub mode: RecommendationMode,
    pub priority: RecommendationPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMode {
    PushOnly,
    PullOnly,
    Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    Normal,
    High,
}

/// Server-side set statistics attached to analyze responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSetStats {
    pub total_count: u64,
    pub collection_hash: String,
}

/// Outcome of `analyze_difference`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOutcome {
    pub diff_session_id: String,
    pub diff_stats: DiffStats,
    pub recommendations: Recommendation,
    pub server_stats: ServerSetStats,
}

/// Pagination envelope for a pulled diff page.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u64,
    pub page_size: usize,
    pub total_pages: u64,
    pub has_more: bool,
    pub total_count: usize,
}

/// Outcome of `pull_diff_page`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOutcome {
    pub session_id: String,
    pub missing_fingerprints: Vec<String>,
    pub page_info: PageInfo,
}

/// Outcome of `batch_add_fingerprints`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOutcome {
    pub added_count: u64,
    pub duplicate_count: u64,
    pub total_requested: usize,
    pub duration_ms: u64,
}

/// Pre-reset counts reported back to the caller.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetSnapshot {
    pub fingerprint_count: u64,
    pub meta_count: u64,
}

/// Outcome of `reset_user_data`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    pub before: ResetSnapshot,
    pub cleared_fingerprints: u64,
    pub cleared_metas: u64,
    pub deleted_sessions: u64,
    pub cleared_cache: bool,
}

/// Snapshot of a held sync lock for status responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub operation: &'static str,
    pub lock_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub acquired_at: OffsetDateTime,
}

/// Per-user meta snapshot for status responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetaStatus {
    pub total_count: u64,
    pub collection_hash: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync_at: Option<OffsetDateTime>,
    pub total_syncs: u64,
    pub last_sync_added: u64,
    pub last_sync_duration_ms: u64,
}

/// Outcome of `sync_status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub sync_in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_meta: Option<UserMetaStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bloom_filter_stats: Option<BloomStats>,
}

/// Outcome of `service_stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub active_sessions: u64,
    pub tracked_sessions: usize,
    pub sync_locks: usize,
    pub cache: CacheStats,
    pub bloom_filters: usize,
    pub bloom_memory_bytes: usize,
}
