//! Server test harness.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use frkb_core::config::AppConfig;
use frkb_core::UserKey;
use frkb_metadata::models::UserKeyRow;
use frkb_metadata::{MetadataStore, SqliteStore};
use frkb_server::{create_router, AppState};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server over a temp-file SQLite store.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with configuration tweaks applied before the
    /// engine is constructed.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("metadata.db");

        let mut config = AppConfig::for_testing(db_path.clone());
        modifier(&mut config);

        let store: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let state = AppState::new(config, store);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Access to the underlying store.
    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.state.store.clone()
    }

    /// Register an active user key and return it.
    pub async fn create_user(&self, fingerprint_limit: i64) -> UserKey {
        let user = UserKey::generate();
        let now = OffsetDateTime::now_utc();
        self.state
            .store
            .create_user_key(&UserKeyRow {
                user_key: user.as_uuid(),
                is_active: true,
                fingerprint_limit,
                total_requests: 0,
                description: Some("test key".to_string()),
                created_at: now,
                updated_at: now,
                last_used_at: None,
            })
            .await
            .expect("Failed to create user key");
        user
    }
}

/// Make a JSON request against the router with optional headers.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}
