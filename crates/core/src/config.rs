//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub bloom: BloomConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub admin: AdminConfig,
}

impl AppConfig {
    /// Configuration for tests: in-temp SQLite, default tuning, a
    /// deterministic admin token hash.
    ///
    /// **For testing only.**
    pub fn for_testing(db_path: PathBuf) -> Self {
        Self {
            server: ServerConfig::default(),
            metadata: MetadataConfig::Sqlite { path: db_path },
            sync: SyncConfig::default(),
            bloom: BloomConfig::default(),
            cache: CacheConfig::default(),
            admin: AdminConfig::for_testing(),
        }
    }
}

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8320").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping.
    /// When enabled, restrict the endpoint to scraper IPs at the
    /// infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8320".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (tests and single-node deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL (production).
    Postgres {
        /// Connection URL (postgres://…).
        url: String,
        /// Maximum pool connections.
        #[serde(default = "default_pg_max_connections")]
        max_connections: u32,
        /// Server-side statement timeout in milliseconds.
        #[serde(default)]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_pg_max_connections() -> u32 {
    10
}

/// Sync engine tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum elements per write-path batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Page size for paginated diff delivery.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Diff-session time-to-live in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub diff_session_ttl_secs: u64,
    /// Hard cap on the client payload of a whole-set diff.
    #[serde(default = "default_max_analyze")]
    pub max_analyze_fingerprints: usize,
    /// Fingerprint limit applied to newly created user keys.
    /// Zero disables enforcement.
    #[serde(default = "default_fingerprint_limit")]
    pub default_fingerprint_limit: u64,
}

fn default_batch_size() -> usize {
    crate::DEFAULT_BATCH_SIZE
}

fn default_page_size() -> usize {
    crate::DEFAULT_PAGE_SIZE
}

fn default_session_ttl_secs() -> u64 {
    crate::DEFAULT_DIFF_SESSION_TTL_SECS
}

fn default_max_analyze() -> usize {
    crate::MAX_ANALYZE_FINGERPRINTS
}

fn default_fingerprint_limit() -> u64 {
    crate::DEFAULT_FINGERPRINT_LIMIT
}

impl SyncConfig {
    /// Session TTL as a Duration.
    pub fn diff_session_ttl(&self) -> Duration {
        Duration::from_secs(self.diff_session_ttl_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            diff_session_ttl_secs: default_session_ttl_secs(),
            max_analyze_fingerprints: default_max_analyze(),
            default_fingerprint_limit: default_fingerprint_limit(),
        }
    }
}

/// Bloom filter tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BloomConfig {
    #[serde(default = "default_bloom_enabled")]
    pub enabled: bool,
    /// Target false-positive rate for freshly built filters.
    #[serde(default = "default_bloom_fp_rate")]
    pub false_positive_rate: f64,
    /// Floor on filter capacity so small sets leave growth headroom.
    #[serde(default = "default_bloom_min_capacity")]
    pub min_capacity: usize,
    /// Capacity headroom over the current fingerprint count.
    #[serde(default = "default_bloom_multiplier")]
    pub capacity_multiplier: f64,
}

fn default_bloom_enabled() -> bool {
    true
}

fn default_bloom_fp_rate() -> f64 {
    0.01
}

fn default_bloom_min_capacity() -> usize {
    50_000
}

fn default_bloom_multiplier() -> f64 {
    1.2
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            enabled: default_bloom_enabled(),
            false_positive_rate: default_bloom_fp_rate(),
            min_capacity: default_bloom_min_capacity(),
            capacity_multiplier: default_bloom_multiplier(),
        }
    }
}

/// Ephemeral (in-process LRU) cache tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Maximum entries before LRU eviction.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// Lifetime of cached user-meta snapshots in seconds.
    #[serde(default = "default_cache_meta_ttl_secs")]
    pub meta_ttl_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_cache_meta_ttl_secs() -> u64 {
    3600
}

impl CacheConfig {
    /// Meta snapshot TTL as a Duration.
    pub fn meta_ttl(&self) -> Duration {
        Duration::from_secs(self.meta_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_entries: default_cache_max_entries(),
            meta_ttl_secs: default_cache_meta_ttl_secs(),
        }
    }
}

/// Admin token configuration.
///
/// The admin token gates force-unlock, cache reset, and user-key
/// management. Only its SHA-256 hash is configured.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin token (SHA-256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
}

impl AdminConfig {
    /// Test configuration with a deterministic token hash.
    ///
    /// **For testing only.** The hash is SHA-256 of "test-admin-token".
    pub fn for_testing() -> Self {
        Self {
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
        }
    }
}
