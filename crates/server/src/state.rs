//! Application state shared across handlers.

use frkb_core::config::AppConfig;
use frkb_engine::SyncEngine;
use frkb_metadata::MetadataStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store (fingerprints, meta, sessions, user keys).
    pub store: Arc<dyn MetadataStore>,
    /// The sync engine.
    pub engine: Arc<SyncEngine>,
}

impl AppState {
    /// Create a new application state wiring the engine onto the store.
    pub fn new(config: AppConfig, store: Arc<dyn MetadataStore>) -> Self {
        let engine = Arc::new(SyncEngine::new(store.clone(), &config));
        Self {
            config: Arc::new(config),
            store,
            engine,
        }
    }
}
