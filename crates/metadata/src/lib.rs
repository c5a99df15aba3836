//! Durable stores for the FRKB fingerprint sync server.
//!
//! This crate provides the persistence layer behind the sync engine:
//! - Per-user fingerprint sets with a storage-enforced uniqueness contract
//! - Per-user aggregate meta (count, collection hash, sync stats, bloom blob)
//! - TTL-bounded diff sessions
//! - The user-key whitelist consumed by authentication

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use postgres::PostgresStore;
pub use store::{MetadataStore, SqliteStore};

use frkb_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataConfig::Postgres {
            url,
            max_connections,
            statement_timeout_ms,
        } => {
            tracing::info!("Connecting to PostgreSQL metadata store");
            let store =
                PostgresStore::from_url(url, *max_connections, *statement_timeout_ms).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
