//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::meta::collection_state;
use crate::repos::{FingerprintRepo, SessionRepo, UserKeyRepo, UserMetaRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL and run
    /// migrations.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::from_str(url)?;

        // Server-side statement timeout prevents hung queries from pinning
        // pool connections.
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared
        // statement, so the schema is split and executed one at a time.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl FingerprintRepo for PostgresStore {
    async fn count_fingerprints(&self, user_key: Uuid) -> MetadataResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_fingerprints WHERE user_key = $1")
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

        // Postgres takes the whole candidate set as one array bind.
        let present: Vec<String> = sqlx::query_scalar(
            "SELECT fingerprint FROM user_fingerprints WHERE user_key = $1 AND fingerprint = ANY($2)",
        )
        .bind(user_key)
        .bind(candidates)
        .fetch_all(&self.pool)
        .await?;
        Ok(present)
    }

    async fn list_fingerprints(&self, user_key: Uuid) -> MetadataResult<Vec<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT fingerprint FROM user_fingerprints WHERE user_key = $1 ORDER BY fingerprint",
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

        // Single set-based statement: unnest the batch, let the primary key
        // absorb collisions, count what actually landed.
        let result = sqlx::query(
            r#"
            INSERT INTO user_fingerprints (user_key, fingerprint, created_at, updated_at)
            SELECT $1, fp, $3, $3 FROM UNNEST($2::text[]) AS fp
            ON CONFLICT (user_key, fingerprint) DO NOTHING
            "#,
        )
        .bind(user_key)
        .bind(fingerprints)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected();
        Ok(BatchInsertOutcome {
            inserted,
            duplicates: fingerprints.len() as u64 - inserted,
        })
    }

    async fn purge_user_fingerprints(&self, user_key: Uuid) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM user_fingerprints WHERE user_key = $1")
            .bind(user_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserMetaRepo for PostgresStore {
    async fn get_or_create_meta(
        &self,
        user_key: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<UserMetaRow> {
        sqlx::query(
            r#"
            INSERT INTO user_meta (user_key, total_count, collection_hash, created_at, updated_at)
            VALUES ($1, 0, '', $2, $2)
            ON CONFLICT (user_key) DO NOTHING
            "#,
        )
        .bind(user_key)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, UserMetaRow>("SELECT * FROM user_meta WHERE user_key = $1")
            .bind(user_key)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_meta(&self, user_key: Uuid) -> MetadataResult<Option<UserMetaRow>> {
        let row = sqlx::query_as::<_, UserMetaRow>("SELECT * FROM user_meta WHERE user_key = $1")
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

        let row = sqlx::query_as::<_, UserMetaRow>(
            r#"
            INSERT INTO user_meta (user_key, total_count, collection_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (user_key) DO UPDATE
            SET total_count = EXCLUDED.total_count,
                collection_hash = EXCLUDED.collection_hash,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(user_key)
        .bind(total_count)
        .bind(&collection_hash)
        .bind(now)
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
        self.refresh_meta(user_key, now).await?;

        let row = sqlx::query_as::<_, UserMetaRow>(
            r#"
            UPDATE user_meta
            SET total_syncs = total_syncs + 1,
                last_sync_added = $2,
                last_sync_duration_ms = $3,
                last_sync_at = $4,
                updated_at = $4
            WHERE user_key = $1
            RETURNING *
            "#,
        )
        .bind(user_key)
        .bind(added as i64)
        .bind(duration_ms as i64)
        .bind(now)
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
            "UPDATE user_meta SET bloom_filter = $2, updated_at = $3 WHERE user_key = $1",
        )
        .bind(user_key)
        .bind(blob)
        .bind(now)
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
            sqlx::query_scalar("SELECT bloom_filter FROM user_meta WHERE user_key = $1")
                .bind(user_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(blob.flatten())
    }

    async fn delete_meta(&self, user_key: Uuid) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM user_meta WHERE user_key = $1")
            .bind(user_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionRepo for PostgresStore {
    async fn create_session(&self, session: &DiffSessionRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO diff_sessions (
                session_id, user_key, missing_in_client, missing_in_server,
                sorted_missing_in_client, total_client, total_server,
                created_at, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        let row = sqlx::query_as::<_, DiffSessionRow>(
            "SELECT * FROM diff_sessions WHERE session_id = $1 AND expires_at > $2",
        )
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn record_sorted_view(&self, session_id: &str, sorted_json: &str) -> MetadataResult<()> {
        sqlx::query("UPDATE diff_sessions SET sorted_missing_in_client = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(sorted_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_key: Uuid) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM diff_sessions WHERE user_key = $1")
            .bind(user_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM diff_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_active_sessions(&self, now: OffsetDateTime) -> MetadataResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM diff_sessions WHERE expires_at > $1")
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl UserKeyRepo for PostgresStore {
    async fn create_user_key(&self, row: &UserKeyRow) -> MetadataResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_keys (
                user_key, is_active, fingerprint_limit, total_requests,
                description, created_at, updated_at, last_used_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_key) DO NOTHING
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
        let row = sqlx::query_as::<_, UserKeyRow>("SELECT * FROM user_keys WHERE user_key = $1")
            .bind(user_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_user_keys(&self) -> MetadataResult<Vec<UserKeyRow>> {
        let rows =
            sqlx::query_as::<_, UserKeyRow>("SELECT * FROM user_keys ORDER BY created_at DESC")
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
            sqlx::query("UPDATE user_keys SET is_active = $2, updated_at = $3 WHERE user_key = $1")
                .bind(user_key)
                .bind(active)
                .bind(now)
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
            "UPDATE user_keys SET total_requests = total_requests + 1, last_used_at = $2 WHERE user_key = $1",
        )
        .bind(user_key)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_user_key(&self, user_key: Uuid) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM user_keys WHERE user_key = $1")
            .bind(user_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_splits_into_nonempty_statements() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        assert!(statements.len() >= 5);
        for statement in statements {
            assert!(!statement.trim().is_empty());
        }
    }
}
