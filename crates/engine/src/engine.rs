//! The sync engine: orchestrates the diff protocol over the durable stores,
//! the per-user lock table, the bloom filter cache, and the ephemeral cache.

use crate::bloom_cache::BloomFilterCache;
use crate::cache::EphemeralCache;
use crate::error::{SyncError, SyncResult};
use crate::locks::{SyncLockTable, SyncOperation};
use crate::types::*;
use dashmap::DashMap;
use frkb_core::config::{AppConfig, SyncConfig};
use frkb_core::{Fingerprint, UserKey};
use frkb_metadata::models::{DiffSessionRow, UserMetaRow};
use frkb_metadata::MetadataStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// In-memory record of a session created by this process. Feeds service
/// stats and the maintenance sweep; the durable row stays authoritative.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub user_key: UserKey,
    pub created_at: OffsetDateTime,
}

/// The sync engine. One instance per process, shared across handlers.
pub struct SyncEngine {
    store: Arc<dyn MetadataStore>,
    locks: SyncLockTable,
    bloom: BloomFilterCache,
    cache: EphemeralCache,
    registry: DashMap<String, SessionHandle>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn MetadataStore>, config: &AppConfig) -> Self {
        Self {
            bloom: BloomFilterCache::new(config.bloom.clone(), store.clone()),
            cache: EphemeralCache::new(&config.cache),
            locks: SyncLockTable::new(),
            registry: DashMap::new(),
            config: config.sync.clone(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn sync_config(&self) -> &SyncConfig {
        &self.config
    }

    /// The per-user sync lock table.
    pub fn locks(&self) -> &SyncLockTable {
        &self.locks
    }

    // =========================================================================
    // Validation helpers
    // =========================================================================

    /// Validate a write/diff batch: bounded, canonical hex, no repeats.
    fn validate_batch(&self, raw: &[String], max: usize) -> SyncResult<Vec<String>> {
        if raw.is_empty() {
            return Err(SyncError::Validation(
                "fingerprint batch must not be empty".to_string(),
            ));
        }
        if raw.len() > max {
            return Err(SyncError::TooLarge(format!(
                "batch of {} exceeds maximum of {max}",
                raw.len()
            )));
        }

        let mut seen = HashSet::with_capacity(raw.len());
        let mut canonical = Vec::with_capacity(raw.len());
        for (i, s) in raw.iter().enumerate() {
            let fp = Fingerprint::parse(s)
                .map_err(|e| SyncError::InvalidFingerprint(format!("element {i}: {e}")))?;
            let fp = fp.into_string();
            if !seen.insert(fp.clone()) {
                return Err(SyncError::Validation(format!(
                    "duplicate fingerprint in batch at index {i}"
                )));
            }
            canonical.push(fp);
        }
        Ok(canonical)
    }

    fn session_ttl(&self) -> Duration {
        Duration::seconds(self.config.diff_session_ttl_secs as i64)
    }

    fn generate_session_id(now: OffsetDateTime) -> String {
        format!(
            "diff_{}_{}",
            now.unix_timestamp(),
            Uuid::new_v4().simple()
        )
    }

    fn total_pages(&self, count: usize) -> u64 {
        count.div_ceil(self.config.page_size) as u64
    }

    /// Meta snapshot through the ephemeral cache, auto-creating the zero
    /// state on first touch.
    async fn load_meta(&self, user: UserKey) -> SyncResult<Arc<UserMetaRow>> {
        if let Some(meta) = self.cache.get_meta(user) {
            return Ok(meta);
        }
        let meta = self
            .store
            .get_or_create_meta(user.as_uuid(), OffsetDateTime::now_utc())
            .await?;
        self.cache.put_meta(user, meta.clone());
        Ok(Arc::new(meta))
    }

    /// Effective fingerprint limit for a user. Zero disables enforcement.
    async fn fingerprint_limit(&self, user: UserKey) -> SyncResult<u64> {
        match self.store.get_user_key(user.as_uuid()).await? {
            Some(row) => Ok(row.fingerprint_limit.max(0) as u64),
            None => Ok(self.config.default_fingerprint_limit),
        }
    }

    // =========================================================================
    // check
    // =========================================================================

    /// Fast-path sync decision from the client's locally computed count and
    /// collection hash.
    pub async fn check(
        &self,
        user: UserKey,
        client_count: u64,
        client_hash: &str,
    ) -> SyncResult<CheckOutcome> {
        let limit = self.fingerprint_limit(user).await?;
        let meta = self.load_meta(user).await?;

        let outcome = |need_sync: bool, reason: CheckReason, meta: &UserMetaRow| CheckOutcome {
            need_sync,
            reason,
            server_count: meta.total_count.max(0) as u64,
            server_hash: meta.collection_hash.clone(),
            last_sync_at: meta.last_sync_at,
            limit,
        };

        // Decision table: first match wins.
        if self.locks.peek(user).is_some() {
            return Ok(outcome(false, CheckReason::SyncInProgress, &meta));
        }
        let server_count = meta.total_count.max(0) as u64;
        if server_count == 0 && client_count == 0 {
            return Ok(outcome(false, CheckReason::BothEmpty, &meta));
        }
        if server_count == 0 {
            return Ok(outcome(true, CheckReason::ServerEmpty, &meta));
        }
        if client_count == 0 {
            return Ok(outcome(true, CheckReason::ClientEmpty, &meta));
        }
        if server_count != client_count {
            return Ok(outcome(true, CheckReason::CountMismatch, &meta));
        }
        if meta.collection_hash == client_hash {
            return Ok(outcome(false, CheckReason::AlreadySynced, &meta));
        }

        // Counts equal, hashes differ. The cached meta may lag a concurrent
        // insert; recompute against live storage before declaring divergence.
        // The refresh mutates meta, so it serializes like any other
        // write-path step; losing the race degrades to sync_in_progress.
        let _guard = match self.locks.acquire(user, SyncOperation::MetaRefresh) {
            Ok(guard) => guard,
            Err(SyncError::SyncInProgress { .. }) => {
                return Ok(outcome(false, CheckReason::SyncInProgress, &meta));
            }
            Err(e) => return Err(e),
        };
        let fresh = self
            .store
            .refresh_meta(user.as_uuid(), OffsetDateTime::now_utc())
            .await?;
        self.cache.clear_user(user);
        self.cache.put_meta(user, fresh.clone());

        if fresh.collection_hash == client_hash {
            Ok(outcome(false, CheckReason::AlreadySynced, &fresh))
        } else {
            Ok(outcome(true, CheckReason::HashMismatch, &fresh))
        }
    }

    // =========================================================================
    // bidirectional diff
    // =========================================================================

    /// One batch of the incremental round-trip diff. Read-only; does not
    /// take the sync lock.
    pub async fn bidirectional_diff(
        &self,
        user: UserKey,
        client_batch: &[String],
        batch_index: u64,
        declared_batch_size: usize,
    ) -> SyncResult<BatchDiffOutcome> {
        let batch = self.validate_batch(client_batch, self.config.batch_size)?;

        // Advisory prefilter; kept for response stats. The store probe below
        // stays authoritative for correctness.
        let bloom_stats = if self.bloom.enabled() {
            let (_, summary) = self.bloom.batch_might_contain(user, &batch).await?;
            Some(summary)
        } else {
            None
        };

        let present: HashSet<String> = self
            .store
            .existing_fingerprints(user.as_uuid(), &batch)
            .await?
            .into_iter()
            .collect();

        let mut server_missing = Vec::new();
        let mut server_existing = Vec::new();
        for fp in &batch {
            if present.contains(fp) {
                server_existing.push(fp.clone());
            } else {
                server_missing.push(fp.clone());
            }
        }

        // Batch 0 may open an advisory session when the server plausibly
        // holds more than the client is sending. It carries no pull data;
        // analyze_difference is the definitive source for missing-in-client.
        let session_info = if batch_index == 0 {
            let server_count = self.store.count_fingerprints(user.as_uuid()).await?;
            let estimated_client_total = declared_batch_size.max(batch.len()) as u64;
            if server_count > estimated_client_total {
                let now = OffsetDateTime::now_utc();
                let session_id = Self::generate_session_id(now);
                let row = DiffSessionRow {
                    session_id: session_id.clone(),
                    user_key: user.as_uuid(),
                    missing_in_client: "[]".to_string(),
                    missing_in_server: "[]".to_string(),
                    sorted_missing_in_client: None,
                    total_client: batch.len() as i64,
                    total_server: server_count as i64,
                    created_at: now,
                    expires_at: now + self.session_ttl(),
                };
                self.store.create_session(&row).await?;
                self.registry.insert(
                    session_id.clone(),
                    SessionHandle {
                        user_key: user,
                        created_at: now,
                    },
                );
                Some(AdvisorySessionInfo {
                    session_id,
                    server_count,
                    hint: "server holds fingerprints the client may be missing; run analyze-diff to pull them",
                })
            } else {
                None
            }
        } else {
            None
        };

        Ok(BatchDiffOutcome {
            batch_index,
            batch_size: declared_batch_size,
            counts: BatchDiffCounts {
                submitted: batch.len(),
                missing_in_server: server_missing.len(),
                existing_on_server: server_existing.len(),
            },
            server_missing_fingerprints: server_missing,
            server_existing_fingerprints: server_existing,
            session_info,
            bloom_filter_stats: bloom_stats,
        })
    }

    // =========================================================================
    // analyze difference
    // =========================================================================

    /// Whole-set diff: compare the client's entire fingerprint set against
    /// the server's and open a paginated session for the pull direction.
    /// An empty client set means "pull everything".
    pub async fn analyze_difference(
        &self,
        user: UserKey,
        client_fingerprints: &[String],
    ) -> SyncResult<AnalyzeOutcome> {
        if client_fingerprints.len() > self.config.max_analyze_fingerprints {
            return Err(SyncError::TooLarge(format!(
                "{} client fingerprints exceed the analyze cap of {}",
                client_fingerprints.len(),
                self.config.max_analyze_fingerprints
            )));
        }

        // Empty input is legal here; elements still validate one by one.
        let mut client_set: HashSet<String> = HashSet::with_capacity(client_fingerprints.len());
        for (i, s) in client_fingerprints.iter().enumerate() {
            let fp = Fingerprint::parse(s)
                .map_err(|e| SyncError::InvalidFingerprint(format!("element {i}: {e}")))?;
            client_set.insert(fp.into_string());
        }

        let server_list = self.store.list_fingerprints(user.as_uuid()).await?;
        let server_set: HashSet<&str> = server_list.iter().map(String::as_str).collect();

        // server_list is sorted, so missing_in_client inherits the order.
        let missing_in_client: Vec<String> = server_list
            .iter()
            .filter(|fp| !client_set.contains(*fp))
            .cloned()
            .collect();
        let missing_in_server: Vec<String> = client_set
            .iter()
            .filter(|fp| !server_set.contains(fp.as_str()))
            .cloned()
            .collect();

        let now = OffsetDateTime::now_utc();
        let session_id = Self::generate_session_id(now);
        let row = DiffSessionRow {
            session_id: session_id.clone(),
            user_key: user.as_uuid(),
            missing_in_client: serde_json::to_string(&missing_in_client)
                .map_err(frkb_metadata::MetadataError::from)?,
            missing_in_server: serde_json::to_string(&missing_in_server)
                .map_err(frkb_metadata::MetadataError::from)?,
            sorted_missing_in_client: None,
            total_client: client_set.len() as i64,
            total_server: server_list.len() as i64,
            created_at: now,
            expires_at: now + self.session_ttl(),
        };
        self.store.create_session(&row).await?;
        self.registry.insert(
            session_id.clone(),
            SessionHandle {
                user_key: user,
                created_at: now,
            },
        );

        if missing_in_client.is_empty() && missing_in_server.is_empty() {
            // Converged: refresh meta so the next check answers
            // already_synced immediately. Best-effort; a failed refresh
            // self-heals through the check tie-break.
            if let Err(e) = self.store.refresh_meta(user.as_uuid(), now).await {
                tracing::warn!(
                    user_key = %user,
                    error = %e,
                    "Post-analyze meta refresh failed"
                );
            }
            self.cache.clear_user(user);
        }

        let mode = if missing_in_client.is_empty() && !missing_in_server.is_empty() {
            RecommendationMode::PushOnly
        } else if missing_in_server.is_empty() && !missing_in_client.is_empty() {
            RecommendationMode::PullOnly
        } else {
            RecommendationMode::Bidirectional
        };
        let priority = if missing_in_client.len() > 10_000 || missing_in_server.len() > 10_000 {
            RecommendationPriority::High
        } else {
            RecommendationPriority::Normal
        };

        let server_hash = frkb_core::collection_hash(&server_list);
        Ok(AnalyzeOutcome {
            diff_session_id: session_id,
            diff_stats: DiffStats {
                client_missing_count: missing_in_client.len(),
                server_missing_count: missing_in_server.len(),
                total_pages: self.total_pages(missing_in_client.len()),
                page_size: self.config.page_size,
            },
            recommendations: Recommendation { mode, priority },
            server_stats: ServerSetStats {
                total_count: server_list.len() as u64,
                collection_hash: server_hash,
            },
        })
    }

    // =========================================================================
    // pull diff page
    // =========================================================================

    /// Pull one page of a diff session's missing-in-client set, in stable
    /// sorted order.
    pub async fn pull_diff_page(
        &self,
        user: UserKey,
        session_id: &str,
        page_index: u64,
    ) -> SyncResult<PageOutcome> {
        let now = OffsetDateTime::now_utc();

        let session = match self.cache.get_session(session_id) {
            Some(session) => session,
            None => {
                let row = self
                    .store
                    .find_session(session_id, now)
                    .await?
                    .ok_or(SyncError::SessionNotFound {
                        retry_after_secs: self.config.diff_session_ttl_secs,
                    })?;
                let remaining = (row.expires_at - now)
                    .try_into()
                    .unwrap_or(std::time::Duration::ZERO);
                self.cache.put_session(row.clone(), remaining);
                Arc::new(row)
            }
        };

        if session.user_key != user.as_uuid() {
            return Err(SyncError::SessionUserMismatch);
        }

        let missing = session.missing_in_client_list()?;
        let sorted = match session.sorted_missing_in_client_list()? {
            Some(sorted) if sorted.len() == missing.len() => sorted,
            _ => {
                // First page to arrive materializes the sorted projection.
                // Persisting it is best-effort; later pages just re-sort.
                let mut sorted: Vec<String> = missing
                    .iter()
                    .map(|fp| fp.to_ascii_lowercase())
                    .collect();
                sorted.sort_unstable();

                match serde_json::to_string(&sorted) {
                    Ok(json) => {
                        if let Err(e) = self.store.record_sorted_view(session_id, &json).await {
                            tracing::warn!(
                                session_id = %session_id,
                                error = %e,
                                "Failed to persist sorted diff projection"
                            );
                        } else {
                            let mut updated = (*session).clone();
                            updated.sorted_missing_in_client = Some(json);
                            let remaining = (updated.expires_at - now)
                                .try_into()
                                .unwrap_or(std::time::Duration::ZERO);
                            self.cache.put_session(updated, remaining);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            session_id = %session_id,
                            error = %e,
                            "Failed to serialize sorted diff projection"
                        );
                    }
                }
                sorted
            }
        };

        let total_count = sorted.len();
        let page_size = self.config.page_size;
        let total_pages = self.total_pages(total_count);

        let current_page = if total_pages == 0 {
            0
        } else {
            page_index.min(total_pages - 1)
        };
        let start = (current_page as usize) * page_size;
        let end = (start + page_size).min(total_count);
        let page = if start < end {
            sorted[start..end].to_vec()
        } else {
            Vec::new()
        };

        Ok(PageOutcome {
            session_id: session.session_id.clone(),
            missing_fingerprints: page,
            page_info: PageInfo {
                current_page,
                page_size,
                total_pages,
                has_more: current_page + 1 < total_pages,
                total_count,
            },
        })
    }

    // =========================================================================
    // batch add
    // =========================================================================

    /// Idempotent union append. Serializes on the per-user sync lock.
    pub async fn batch_add_fingerprints(
        &self,
        user: UserKey,
        fingerprints: &[String],
    ) -> SyncResult<AddOutcome> {
        let started = Instant::now();
        let batch = self.validate_batch(fingerprints, self.config.batch_size)?;

        let _guard = self.locks.acquire(user, SyncOperation::BatchAdd)?;
        let now = OffsetDateTime::now_utc();

        // Limit enforcement with a precise probe: only genuinely new
        // elements count toward the cap, so an all-duplicate resubmission of
        // a full set still succeeds.
        let limit = self.fingerprint_limit(user).await?;
        if limit > 0 {
            let current = self.store.count_fingerprints(user.as_uuid()).await?;
            let present = self
                .store
                .existing_fingerprints(user.as_uuid(), &batch)
                .await?;
            let new_count = (batch.len() - present.len()) as u64;
            if current + new_count > limit {
                return Err(SyncError::LimitExceeded {
                    limit,
                    current,
                    attempted: new_count,
                });
            }
        }

        let inserted = self
            .store
            .insert_fingerprints(user.as_uuid(), &batch, now)
            .await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        let meta = self
            .store
            .apply_sync_delta(user.as_uuid(), inserted.inserted, duration_ms, now)
            .await?;

        if self.bloom.enabled() && inserted.inserted > 0 {
            // The filter is idempotent; adding duplicates is harmless.
            self.bloom.add_fingerprints(user, &batch);
        }

        self.cache.clear_user(user);
        self.cache.put_meta(user, meta);

        Ok(AddOutcome {
            added_count: inserted.inserted,
            duplicate_count: inserted.duplicates,
            total_requested: batch.len(),
            duration_ms,
        })
    }

    // =========================================================================
    // reset
    // =========================================================================

    /// Wipe a user's fingerprints, meta, and sessions. Usage counters on the
    /// user-key record are untouched. Steps run independently so an early
    /// failure never blocks later cleanup.
    pub async fn reset_user_data(&self, user: UserKey) -> SyncResult<ResetOutcome> {
        let _guard = self.locks.acquire(user, SyncOperation::Reset)?;

        let before = ResetSnapshot {
            fingerprint_count: self.store.count_fingerprints(user.as_uuid()).await?,
            meta_count: if self.store.get_meta(user.as_uuid()).await?.is_some() {
                1
            } else {
                0
            },
        };

        let mut first_error: Option<SyncError> = None;
        let note_error = |step: &'static str, e: SyncError, first: &mut Option<SyncError>| {
            tracing::error!(user_key = %user, step, error = %e, "Reset step failed");
            if first.is_none() {
                *first = Some(e);
            }
        };

        let cleared_fingerprints = match self.store.purge_user_fingerprints(user.as_uuid()).await {
            Ok(n) => n,
            Err(e) => {
                note_error("purge_fingerprints", e.into(), &mut first_error);
                0
            }
        };
        let cleared_metas = match self.store.delete_meta(user.as_uuid()).await {
            Ok(n) => n,
            Err(e) => {
                note_error("delete_meta", e.into(), &mut first_error);
                0
            }
        };
        let deleted_sessions = match self.store.delete_sessions_for_user(user.as_uuid()).await {
            Ok(n) => n,
            Err(e) => {
                note_error("delete_sessions", e.into(), &mut first_error);
                0
            }
        };

        self.registry.retain(|_, handle| handle.user_key != user);
        self.bloom.clear(user);
        self.cache.clear_user(user);

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(ResetOutcome {
            before,
            cleared_fingerprints,
            cleared_metas,
            deleted_sessions,
            cleared_cache: true,
        })
    }

    // =========================================================================
    // status & stats
    // =========================================================================

    /// Current sync status for a user. Side-effect free.
    pub async fn sync_status(&self, user: UserKey) -> SyncResult<SyncStatus> {
        let lock = self.locks.peek(user).map(|info| LockStatus {
            operation: info.operation.as_str(),
            lock_id: info.lock_id.to_string(),
            acquired_at: info.acquired_at,
        });

        let user_meta = self
            .store
            .get_meta(user.as_uuid())
            .await?
            .map(|meta| UserMetaStatus {
                total_count: meta.total_count.max(0) as u64,
                collection_hash: meta.collection_hash,
                last_sync_at: meta.last_sync_at,
                total_syncs: meta.total_syncs.max(0) as u64,
                last_sync_added: meta.last_sync_added.max(0) as u64,
                last_sync_duration_ms: meta.last_sync_duration_ms.max(0) as u64,
            });

        Ok(SyncStatus {
            sync_in_progress: lock.is_some(),
            lock,
            user_meta,
            bloom_filter_stats: self.bloom.stats(user),
        })
    }

    /// Whole-service aggregates. Side-effect free.
    pub async fn service_stats(&self) -> SyncResult<ServiceStats> {
        let active_sessions = self
            .store
            .count_active_sessions(OffsetDateTime::now_utc())
            .await?;
        Ok(ServiceStats {
            active_sessions,
            tracked_sessions: self.registry.len(),
            sync_locks: self.locks.len(),
            cache: self.cache.stats(),
            bloom_filters: self.bloom.filter_count(),
            bloom_memory_bytes: self.bloom.total_memory_bytes(),
        })
    }

    // =========================================================================
    // administrative & maintenance entry points
    // =========================================================================

    /// Force-release a user's sync lock. Returns whether one was held.
    pub fn force_release_lock(&self, user: UserKey) -> bool {
        self.locks.force_release(user)
    }

    /// Drop the user's bloom filter and ephemeral cache entries.
    pub fn clear_user_caches(&self, user: UserKey) {
        self.bloom.clear(user);
        self.cache.clear_user(user);
    }

    /// One maintenance pass: release stale locks, forget old in-memory
    /// session handles, reclaim expired session rows.
    pub async fn maintenance_sweep(&self) {
        let now = OffsetDateTime::now_utc();

        let released = self.locks.sweep(Duration::minutes(10), now);
        if released > 0 {
            tracing::warn!(released, "Maintenance released stale sync locks");
        }

        let cutoff = now - Duration::hours(1);
        let before = self.registry.len();
        self.registry.retain(|_, handle| handle.created_at > cutoff);
        let dropped = before - self.registry.len();
        if dropped > 0 {
            tracing::debug!(dropped, "Maintenance dropped aged session handles");
        }

        match self.store.delete_expired_sessions(now).await {
            Ok(0) => {}
            Ok(reclaimed) => {
                tracing::debug!(reclaimed, "Maintenance reclaimed expired diff sessions");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reclaim expired diff sessions");
            }
        }
    }
}
