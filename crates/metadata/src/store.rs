//! Metadata store trait and the SQLite implementation.

use crate::error::MetadataResult;
use crate::repos::{FingerprintRepo, SessionRepo, UserKeyRepo, UserMetaRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    FingerprintRepo + UserMetaRepo + SessionRepo + UserKeyRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
///
/// Recommended for tests and single-node deployments. SQLite permits limited
/// write concurrency; a single pooled connection avoids persistent "database
/// is locked" failures under concurrent handlers.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::error::MetadataError;
    use crate::models::*;
    use crate::repos::meta::collection_state;
    use time::OffsetDateTime;
    use uuid::Uuid;

    /// SQLite caps bound parameters near 999; IN-clause probes are chunked
    /// below that.
    const IN_CLAUSE_BATCH: usize = 900;

    #[async_trait]
    impl FingerprintRepo for SqliteStore {
        async fn count_fingerprints(&self, user_key: Uuid) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM user_fingerprints WHERE user_key = ?")
                    .bind(user_key)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        }

        async fn existing_fingerprints(
            &self,
            user_key: Uuid,
            candidates: &[String],
        ) -> MetadataResult<Vec<String>> {
            if candidates.is_empty() {
                return Ok(Vec::new());
            }

            let mut present = Vec::new();
            for batch in candidates.chunks(IN_CLAUSE_BATCH) {
                let placeholders: Vec<&str> = batch.iter().map(|_| "?").collect();
                let query = format!(
                    "SELECT fingerprint FROM user_fingerprints WHERE user_key = ? AND fingerprint IN ({})",
                    placeholders.join(", ")
                );

                let mut query_builder = sqlx::query_scalar::<_, String>(&query).bind(user_key);
                for fp in batch {
                    query_builder = query_builder.bind(fp);
                }

                present.extend(query_builder.fetch_all(&self.pool).await?);
            }

            Ok(present)
        }

        async fn list_fingerprints(&self, user_key: Uuid) -> MetadataResult<Vec<String>> {
            let rows: Vec<String> = sqlx::query_scalar(
                "SELECT fingerprint FROM user_fingerprints WHERE user_key = ? ORDER BY fingerprint",
            )
            .bind(user_key)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn insert_fingerprints(
            &self,
            user_key: Uuid,
            fingerprints: &[String],
            now: OffsetDateTime,
        ) -> MetadataResult<BatchInsertOutcome> {
            if fingerprints.is_empty() {
                return Ok(BatchInsertOutcome::default());
            }

            // One transaction for the whole batch. Collisions with the
            // unique index are skipped row-by-row and counted; the
            // non-duplicate subset always lands.
            let mut tx = self.pool.begin().await?;
            let mut inserted = 0u64;
            for fp in fingerprints {
                let result = sqlx::query(
                    "INSERT OR IGNORE INTO user_fingerprints (user_key, fingerprint, created_at, updated_at) VALUES (?, ?, ?, ?)",
                )
                .bind(user_key)
                .bind(fp)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                inserted += result.rows_affected();
            }
            tx.commit().await?;

            Ok(BatchInsertOutcome {
                inserted,
                duplicates: fingerprints.len() as u64 - inserted,
            })
        }

        async fn purge_user_fingerprints(&self, user_key: Uuid) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM user_fingerprints WHERE user_key = ?")
                .bind(user_key)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl UserMetaRepo for SqliteStore {
        async fn get_or_create_meta(
            &self,
            user_key: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<UserMetaRow> {
            // Zero state on first touch; the first mutation's refresh
            // reconciles against storage.
            sqlx::query(
                "INSERT OR IGNORE INTO user_meta (user_key, total_count, collection_hash, created_at, updated_at) VALUES (?, 0, '', ?, ?)",
            )
            .bind(user_key)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            let row = sqlx::query_as::<_, UserMetaRow>("SELECT * FROM user_meta WHERE user_key = ?")
                .bind(user_key)
                .fetch_one(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_meta(&self, user_key: Uuid) -> MetadataResult<Option<UserMetaRow>> {
            let row = sqlx::query_as::<_, UserMetaRow>("SELECT * FROM user_meta WHERE user_key = ?")
                .bind(user_key)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn refresh_meta(
            &self,
            user_key: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<UserMetaRow> {
            let fingerprints = self.list_fingerprints(user_key).await?;
            let (total_count, collection_hash) = collection_state(&fingerprints);

            sqlx::query(
                "INSERT OR IGNORE INTO user_meta (user_key, total_count, collection_hash, created_at, updated_at) VALUES (?, 0, '', ?, ?)",
            )
            .bind(user_key)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "UPDATE user_meta SET total_count = ?, collection_hash = ?, updated_at = ? WHERE user_key = ?",
            )
            .bind(total_count)
            .bind(&collection_hash)
            .bind(now)
            .bind(user_key)
            .execute(&self.pool)
            .await?;

            let row = sqlx::query_as::<_, UserMetaRow>("SELECT * FROM user_meta WHERE user_key = ?")
                .bind(user_key)
                .fetch_one(&self.pool)
                .await?;
            Ok(row)
        }

        async fn apply_sync_delta(
            &self,
            user_key: Uuid,
            added: u64,
            duration_ms: u64,
            now: OffsetDateTime,
        ) -> MetadataResult<UserMetaRow> {
            // Refresh first so the stat row always carries the
            // post-mutation count and hash.
            self.refresh_meta(user_key, now).await?;

            sqlx::query(
                "UPDATE user_meta SET total_syncs = total_syncs + 1, last_sync_added = ?, last_sync_duration_ms = ?, last_sync_at = ?, updated_at = ? WHERE user_key = ?",
            )
            .bind(added as i64)
            .bind(duration_ms as i64)
            .bind(now)
            .bind(now)
            .bind(user_key)
            .execute(&self.pool)
            .await?;

            let row = sqlx::query_as::<_, UserMetaRow>("SELECT * FROM user_meta WHERE user_key = ?")
                .bind(user_key)
                .fetch_one(&self.pool)
                .await?;
            Ok(row)
        }

        async fn store_bloom_blob(
            &self,
            user_key: Uuid,
            blob: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE user_meta SET bloom_filter = ?, updated_at = ? WHERE user_key = ?",
            )
            .bind(blob)
            .bind(now)
            .bind(user_key)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "user_meta for {user_key} not found"
                )));
            }
            Ok(())
        }

        async fn load_bloom_blob(&self, user_key: Uuid) -> MetadataResult<Option<String>> {
            let blob: Option<Option<String>> =
                sqlx::query_scalar("SELECT bloom_filter FROM user_meta WHERE user_key = ?")
                    .bind(user_key)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(blob.flatten())
        }

        async fn delete_meta(&self, user_key: Uuid) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM user_meta WHERE user_key = ?")
                .bind(user_key)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl SessionRepo for SqliteStore {
        async fn create_session(&self, session: &DiffSessionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO diff_sessions (
                    session_id, user_key, missing_in_client, missing_in_server,
                    sorted_missing_in_client, total_client, total_server,
                    created_at, expires_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&session.session_id)
            .bind(session.user_key)
            .bind(&session.missing_in_client)
            .bind(&session.missing_in_server)
            .bind(&session.sorted_missing_in_client)
            .bind(session.total_client)
            .bind(session.total_server)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn find_session(
            &self,
            session_id: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<DiffSessionRow>> {
            // Liveness is part of the query: expired rows are invisible even
            // before physical reclamation runs.
            let row = sqlx::query_as::<_, DiffSessionRow>(
                "SELECT * FROM diff_sessions WHERE session_id = ? AND expires_at > ?",
            )
            .bind(session_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn record_sorted_view(
            &self,
            session_id: &str,
            sorted_json: &str,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE diff_sessions SET sorted_missing_in_client = ? WHERE session_id = ?",
            )
            .bind(sorted_json)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn delete_sessions_for_user(&self, user_key: Uuid) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM diff_sessions WHERE user_key = ?")
                .bind(user_key)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }

        async fn delete_expired_sessions(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM diff_sessions WHERE expires_at <= ?")
                .bind(now)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }

        async fn count_active_sessions(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM diff_sessions WHERE expires_at > ?")
                    .bind(now)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        }
    }

    #[async_trait]
    impl UserKeyRepo for SqliteStore {
        async fn create_user_key(&self, row: &UserKeyRow) -> MetadataResult<()> {
            // Let the primary key arbitrate concurrent creations; a lost
            // race reports AlreadyExists instead of a constraint error.
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO user_keys (
                    user_key, is_active, fingerprint_limit, total_requests,
                    description, created_at, updated_at, last_used_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.user_key)
            .bind(row.is_active)
            .bind(row.fingerprint_limit)
            .bind(row.total_requests)
            .bind(&row.description)
            .bind(row.created_at)
            .bind(row.updated_at)
            .bind(row.last_used_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::AlreadyExists(format!(
                    "user key {} already exists",
                    row.user_key
                )));
            }
            Ok(())
        }

        async fn get_user_key(&self, user_key: Uuid) -> MetadataResult<Option<UserKeyRow>> {
            let row = sqlx::query_as::<_, UserKeyRow>("SELECT * FROM user_keys WHERE user_key = ?")
                .bind(user_key)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_user_keys(&self) -> MetadataResult<Vec<UserKeyRow>> {
            let rows = sqlx::query_as::<_, UserKeyRow>(
                "SELECT * FROM user_keys ORDER BY created_at DESC",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn set_user_key_active(
            &self,
            user_key: Uuid,
            active: bool,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result =
                sqlx::query("UPDATE user_keys SET is_active = ?, updated_at = ? WHERE user_key = ?")
                    .bind(active)
                    .bind(now)
                    .bind(user_key)
                    .execute(&self.pool)
                    .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "user key {user_key} not found"
                )));
            }
            Ok(())
        }

        async fn record_user_key_usage(
            &self,
            user_key: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE user_keys SET total_requests = total_requests + 1, last_used_at = ? WHERE user_key = ?",
            )
            .bind(now)
            .bind(user_key)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn delete_user_key(&self, user_key: Uuid) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM user_keys WHERE user_key = ?")
                .bind(user_key)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Per-user fingerprint sets.
-- The composite primary key IS the uniqueness contract: duplicate inserts
-- collide here, which is what makes batch-add idempotent and race-safe.
CREATE TABLE IF NOT EXISTS user_fingerprints (
    user_key BLOB NOT NULL,
    fingerprint TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_key, fingerprint)
);

-- Per-user aggregate state
CREATE TABLE IF NOT EXISTS user_meta (
    user_key BLOB PRIMARY KEY,
    total_count INTEGER NOT NULL DEFAULT 0,
    collection_hash TEXT NOT NULL DEFAULT '',
    last_sync_at TEXT,
    total_syncs INTEGER NOT NULL DEFAULT 0,
    last_sync_added INTEGER NOT NULL DEFAULT 0,
    last_sync_duration_ms INTEGER NOT NULL DEFAULT 0,
    bloom_filter TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Diff sessions. The expires_at index drives both the liveness predicate in
-- find_session and physical reclamation.
CREATE TABLE IF NOT EXISTS diff_sessions (
    session_id TEXT PRIMARY KEY,
    user_key BLOB NOT NULL,
    missing_in_client TEXT NOT NULL,
    missing_in_server TEXT NOT NULL,
    sorted_missing_in_client TEXT,
    total_client INTEGER NOT NULL,
    total_server INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_diff_sessions_expires ON diff_sessions(expires_at);
CREATE INDEX IF NOT EXISTS idx_diff_sessions_user ON diff_sessions(user_key);

-- User-key whitelist
CREATE TABLE IF NOT EXISTS user_keys (
    user_key BLOB PRIMARY KEY,
    is_active INTEGER NOT NULL DEFAULT 1,
    fingerprint_limit INTEGER NOT NULL DEFAULT 200000,
    total_requests INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_used_at TEXT
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetadataError;
    use crate::models::{DiffSessionRow, UserKeyRow};
    use crate::repos::{FingerprintRepo, SessionRepo, UserKeyRepo, UserMetaRepo};
    use frkb_core::collection_hash;
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    async fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("metadata.db"))
            .await
            .unwrap();
        (temp, store)
    }

    fn fp(i: u64) -> String {
        format!("{i:016x}").repeat(4)
    }

    #[tokio::test]
    async fn insert_counts_duplicates_within_and_across_batches() {
        let (_temp, store) = test_store().await;
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let batch: Vec<String> = (0..10).map(fp).collect();
        let first = store.insert_fingerprints(user, &batch, now).await.unwrap();
        assert_eq!(first.inserted, 10);
        assert_eq!(first.duplicates, 0);

        // Same batch again: all duplicates, no partial failure.
        let second = store.insert_fingerprints(user, &batch, now).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 10);

        // Mixed batch with an in-batch repeat.
        let mixed = vec![fp(9), fp(10), fp(10)];
        let third = store.insert_fingerprints(user, &mixed, now).await.unwrap();
        assert_eq!(third.inserted, 1);
        assert_eq!(third.duplicates, 2);

        assert_eq!(store.count_fingerprints(user).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn existing_returns_stored_subset() {
        let (_temp, store) = test_store().await;
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let stored: Vec<String> = (0..5).map(fp).collect();
        store.insert_fingerprints(user, &stored, now).await.unwrap();

        let candidates = vec![fp(3), fp(4), fp(100)];
        let mut present = store
            .existing_fingerprints(user, &candidates)
            .await
            .unwrap();
        present.sort();
        assert_eq!(present, vec![fp(3), fp(4)]);
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let (_temp, store) = test_store().await;
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let batch = vec![fp(30), fp(1), fp(20)];
        store.insert_fingerprints(user, &batch, now).await.unwrap();

        let listed = store.list_fingerprints(user).await.unwrap();
        let mut expected = batch.clone();
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn meta_first_create_is_zero_state() {
        let (_temp, store) = test_store().await;
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        // Fingerprints exist, but first touch must not enumerate them.
        store
            .insert_fingerprints(user, &[fp(1)], now)
            .await
            .unwrap();

        let meta = store.get_or_create_meta(user, now).await.unwrap();
        assert_eq!(meta.total_count, 0);
        assert_eq!(meta.collection_hash, "");
        assert!(meta.last_sync_at.is_none());

        // Refresh reconciles against storage.
        let refreshed = store.refresh_meta(user, now).await.unwrap();
        assert_eq!(refreshed.total_count, 1);
        assert_eq!(refreshed.collection_hash, collection_hash([fp(1)]));
    }

    #[tokio::test]
    async fn apply_sync_delta_bumps_stats_and_refreshes() {
        let (_temp, store) = test_store().await;
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let batch: Vec<String> = (0..3).map(fp).collect();
        store.insert_fingerprints(user, &batch, now).await.unwrap();

        let meta = store.apply_sync_delta(user, 3, 42, now).await.unwrap();
        assert_eq!(meta.total_count, 3);
        assert_eq!(meta.total_syncs, 1);
        assert_eq!(meta.last_sync_added, 3);
        assert_eq!(meta.last_sync_duration_ms, 42);
        assert!(meta.last_sync_at.is_some());

        let mut sorted = batch.clone();
        sorted.sort();
        assert_eq!(meta.collection_hash, collection_hash(&sorted));
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible() {
        let (_temp, store) = test_store().await;
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let session = DiffSessionRow {
            session_id: "diff_123_abc".to_string(),
            user_key: user,
            missing_in_client: "[]".to_string(),
            missing_in_server: "[]".to_string(),
            sorted_missing_in_client: None,
            total_client: 0,
            total_server: 0,
            created_at: now,
            expires_at: now + Duration::seconds(300),
        };
        store.create_session(&session).await.unwrap();

        assert!(store
            .find_session("diff_123_abc", now)
            .await
            .unwrap()
            .is_some());

        // One second past expiry: gone from the read path.
        let late = now + Duration::seconds(301);
        assert!(store.find_session("diff_123_abc", late).await.unwrap().is_none());

        // And physically reclaimable.
        assert_eq!(store.delete_expired_sessions(late).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sorted_view_upsert_is_idempotent() {
        let (_temp, store) = test_store().await;
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let session = DiffSessionRow {
            session_id: "diff_456_def".to_string(),
            user_key: user,
            missing_in_client: serde_json::to_string(&[fp(2), fp(1)]).unwrap(),
            missing_in_server: "[]".to_string(),
            sorted_missing_in_client: None,
            total_client: 0,
            total_server: 2,
            created_at: now,
            expires_at: now + Duration::seconds(300),
        };
        store.create_session(&session).await.unwrap();

        let sorted = serde_json::to_string(&[fp(1), fp(2)]).unwrap();
        store
            .record_sorted_view("diff_456_def", &sorted)
            .await
            .unwrap();
        store
            .record_sorted_view("diff_456_def", &sorted)
            .await
            .unwrap();

        let found = store
            .find_session("diff_456_def", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            found.sorted_missing_in_client_list().unwrap().unwrap(),
            vec![fp(1), fp(2)]
        );
    }

    #[tokio::test]
    async fn user_key_lifecycle() {
        let (_temp, store) = test_store().await;
        let now = OffsetDateTime::now_utc();

        let row = UserKeyRow {
            user_key: Uuid::new_v4(),
            is_active: true,
            fingerprint_limit: 200_000,
            total_requests: 0,
            description: Some("test key".to_string()),
            created_at: now,
            updated_at: now,
            last_used_at: None,
        };
        store.create_user_key(&row).await.unwrap();

        // Duplicate creation is rejected.
        assert!(matches!(
            store.create_user_key(&row).await,
            Err(MetadataError::AlreadyExists(_))
        ));

        store
            .record_user_key_usage(row.user_key, now)
            .await
            .unwrap();
        let fetched = store.get_user_key(row.user_key).await.unwrap().unwrap();
        assert_eq!(fetched.total_requests, 1);
        assert!(fetched.last_used_at.is_some());

        store
            .set_user_key_active(row.user_key, false, now)
            .await
            .unwrap();
        let fetched = store.get_user_key(row.user_key).await.unwrap().unwrap();
        assert!(!fetched.is_active);
    }
}
