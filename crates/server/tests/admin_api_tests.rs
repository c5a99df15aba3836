//! Tests for admin endpoints, health, and metrics.

mod common;

use axum::http::StatusCode;
use common::{fps, json_request, TestServer, TEST_ADMIN_TOKEN};
use serde_json::json;

const BASE: &str = "/frkbapi/v1/fingerprint-sync";
const ADMIN: &str = "/frkbapi/v1/admin";

#[tokio::test]
async fn health_check_is_unauthenticated() {
    let server = TestServer::new().await;
    let (status, body) = json_request(&server.router, "GET", "/healthz", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn metrics_endpoint_follows_config() {
    frkb_server::metrics::register_metrics();

    let server = TestServer::new().await;
    let (status, _) = json_request(&server.router, "GET", "/metrics", None, &[]).await;
    assert_eq!(status, StatusCode::OK);

    let server = TestServer::with_config(|c| c.server.metrics_enabled = false).await;
    let (status, _) = json_request(&server.router, "GET", "/metrics", None, &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_key_management_requires_admin_token() {
    let server = TestServer::new().await;

    // No token.
    let (status, _) = json_request(
        &server.router,
        "POST",
        &format!("{ADMIN}/user-keys"),
        Some(json!({})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Wrong token.
    let (status, _) = json_request(
        &server.router,
        "POST",
        &format!("{ADMIN}/user-keys"),
        Some(json!({})),
        &[("x-admin-token", "wrong")],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Valid token: create, list, revoke.
    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{ADMIN}/user-keys"),
        Some(json!({"description": "new client", "fingerprintLimit": 1234})),
        &[("x-admin-token", TEST_ADMIN_TOKEN)],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let user_key = body["key"]["userKey"].as_str().unwrap().to_string();
    assert_eq!(body["key"]["fingerprintLimit"], json!(1234));

    let (status, body) = json_request(
        &server.router,
        "GET",
        &format!("{ADMIN}/user-keys"),
        None,
        &[("x-admin-token", TEST_ADMIN_TOKEN)],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keys"].as_array().unwrap().len(), 1);

    let (status, body) = json_request(
        &server.router,
        "PUT",
        &format!("{ADMIN}/user-keys/{user_key}"),
        Some(json!({"isActive": false})),
        &[("x-admin-token", TEST_ADMIN_TOKEN)],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isActive"], json!(false));

    // The revoked key can no longer authenticate.
    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{BASE}/check"),
        Some(json!({"userKey": user_key, "count": 0, "hash": ""})),
        &[("x-api-key", &user_key)],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("USER_KEY_INACTIVE"));
}

#[tokio::test]
async fn duplicate_user_key_creation_conflicts() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{ADMIN}/user-keys"),
        Some(json!({"userKey": user.to_string()})),
        &[("x-admin-token", TEST_ADMIN_TOKEN)],
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("ALREADY_EXISTS"));
}

#[tokio::test]
async fn force_unlock_is_admin_only() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;

    // The owner cannot force-unlock.
    let (status, _) = json_request(
        &server.router,
        "DELETE",
        &format!("{BASE}/lock/{user}"),
        None,
        &[("x-api-key", &user.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Admin can; with no lock held it reports released = false.
    let (status, body) = json_request(
        &server.router,
        "DELETE",
        &format!("{BASE}/lock/{user}"),
        None,
        &[("x-admin-token", TEST_ADMIN_TOKEN)],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], json!(false));

    // Hold a lock through the engine, then release it over the wire.
    let guard = server
        .state
        .engine
        .locks()
        .acquire(user, frkb_engine::SyncOperation::BatchAdd)
        .unwrap();
    let (status, body) = json_request(
        &server.router,
        "DELETE",
        &format!("{BASE}/lock/{user}"),
        None,
        &[("x-admin-token", TEST_ADMIN_TOKEN)],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], json!(true));
    drop(guard);
}

#[tokio::test]
async fn cache_clear_allowed_for_owner() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;

    json_request(
        &server.router,
        "POST",
        &format!("{BASE}/add"),
        Some(json!({"userKey": user.to_string(), "addFingerprints": fps(0..5)})),
        &[("x-api-key", &user.to_string())],
    )
    .await;

    let (status, body) = json_request(
        &server.router,
        "DELETE",
        &format!("{BASE}/cache/{user}"),
        None,
        &[("x-api-key", &user.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], json!(true));
}

#[tokio::test]
async fn service_stats_requires_admin() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;

    let (status, _) = json_request(
        &server.router,
        "GET",
        &format!("{BASE}/service-stats"),
        None,
        &[("x-api-key", &user.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = json_request(
        &server.router,
        "GET",
        &format!("{BASE}/service-stats"),
        None,
        &[("x-admin-token", TEST_ADMIN_TOKEN)],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert!(body["syncLocks"].is_u64());
    assert!(body["cache"]["hits"].is_u64());
}
