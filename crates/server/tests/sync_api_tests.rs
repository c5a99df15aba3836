//! End-to-end tests for the fingerprint-sync HTTP API.

mod common;

use axum::http::StatusCode;
use common::{fp, fps, json_request, sorted_hash, TestServer};
use frkb_core::UserKey;
use serde_json::json;

const BASE: &str = "/frkbapi/v1/fingerprint-sync";

async fn check(
    server: &TestServer,
    user: UserKey,
    count: u64,
    hash: &str,
) -> (StatusCode, serde_json::Value) {
    json_request(
        &server.router,
        "POST",
        &format!("{BASE}/check"),
        Some(json!({"userKey": user.to_string(), "count": count, "hash": hash})),
        &[("x-api-key", &user.to_string())],
    )
    .await
}

async fn add(
    server: &TestServer,
    user: UserKey,
    fingerprints: &[String],
) -> (StatusCode, serde_json::Value) {
    json_request(
        &server.router,
        "POST",
        &format!("{BASE}/add"),
        Some(json!({"userKey": user.to_string(), "addFingerprints": fingerprints})),
        &[("x-api-key", &user.to_string())],
    )
    .await
}

#[tokio::test]
async fn first_upload_scenario() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;

    let all: Vec<String> = fps(0..2500);
    let batches = [&all[0..1000], &all[1000..2000], &all[2000..2500]];

    // Three batch adds; check after each batch reflects progress.
    let mut uploaded = 0usize;
    for (i, batch) in batches.iter().enumerate() {
        let (status, body) = add(&server, user, batch).await;
        assert_eq!(status, StatusCode::OK, "batch {i}: {body}");
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["addedCount"], json!(batch.len()));
        assert_eq!(body["duplicateCount"], json!(0));
        assert!(body["performance"]["durationMs"].is_u64());
        assert!(body["timestamp"].is_string());
        uploaded += batch.len();

        // The client's full local set is 2500 throughout the upload.
        let (status, body) = check(&server, user, 2500, &sorted_hash(all.clone())).await;
        assert_eq!(status, StatusCode::OK);
        if uploaded < 2500 {
            assert_eq!(body["needSync"], json!(true));
            assert_eq!(body["reason"], json!("count_mismatch"));
        } else {
            assert_eq!(body["needSync"], json!(false));
            assert_eq!(body["reason"], json!("already_synced"));
        }
        assert_eq!(body["serverCount"], json!(uploaded));
    }
}

#[tokio::test]
async fn idempotent_readd_scenario() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;
    let all: Vec<String> = fps(0..2500);

    for batch in [&all[0..1000], &all[1000..2000], &all[2000..2500]] {
        let (status, _) = add(&server, user, batch).await;
        assert_eq!(status, StatusCode::OK);
    }

    // Resubmitting the identical set yields only duplicates.
    let mut added = 0u64;
    let mut duplicates = 0u64;
    for batch in [&all[0..1000], &all[1000..2000], &all[2000..2500]] {
        let (status, body) = add(&server, user, batch).await;
        assert_eq!(status, StatusCode::OK);
        added += body["addedCount"].as_u64().unwrap();
        duplicates += body["duplicateCount"].as_u64().unwrap();
    }
    assert_eq!(added, 0);
    assert_eq!(duplicates, 2500);

    let (_, body) = check(&server, user, 2500, &sorted_hash(all)).await;
    assert_eq!(body["serverCount"], json!(2500));
    assert_eq!(body["reason"], json!("already_synced"));
}

#[tokio::test]
async fn whole_set_diff_and_pagination_scenario() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;
    let all: Vec<String> = fps(0..2500);

    for batch in [&all[0..1000], &all[1000..2000], &all[2000..2500]] {
        add(&server, user, batch).await;
    }

    // Empty client: pull everything.
    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{BASE}/analyze-diff"),
        Some(json!({"userKey": user.to_string(), "clientFingerprints": []})),
        &[("x-api-key", &user.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["diffStats"]["clientMissingCount"], json!(2500));
    assert_eq!(body["diffStats"]["serverMissingCount"], json!(0));
    assert_eq!(body["diffStats"]["totalPages"], json!(3));
    assert_eq!(body["recommendations"]["mode"], json!("pull_only"));
    let session_id = body["diffSessionId"].as_str().unwrap().to_string();
    assert!(session_id.starts_with("diff_"));

    let mut pulled: Vec<String> = Vec::new();
    for page_index in 0..3 {
        let (status, body) = json_request(
            &server.router,
            "POST",
            &format!("{BASE}/pull-diff-page"),
            Some(json!({
                "userKey": user.to_string(),
                "diffSessionId": session_id,
                "pageIndex": page_index,
            })),
            &[("x-api-key", &user.to_string())],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let page: Vec<String> = body["missingFingerprints"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        let expected_len = if page_index < 2 { 1000 } else { 500 };
        assert_eq!(page.len(), expected_len);
        assert_eq!(body["pageInfo"]["hasMore"], json!(page_index < 2));
        pulled.extend(page);
    }

    let mut expected = all.clone();
    expected.sort_unstable();
    assert_eq!(pulled, expected);
}

#[tokio::test]
async fn expired_session_returns_not_found_with_retry_hint() {
    let server = TestServer::with_config(|c| c.sync.diff_session_ttl_secs = 0).await;
    let user = server.create_user(200_000).await;
    add(&server, user, &fps(0..10)).await;

    let (_, body) = json_request(
        &server.router,
        "POST",
        &format!("{BASE}/analyze-diff"),
        Some(json!({"userKey": user.to_string(), "clientFingerprints": []})),
        &[("x-api-key", &user.to_string())],
    )
    .await;
    let session_id = body["diffSessionId"].as_str().unwrap().to_string();

    // TTL 0: the session is already past expiry.
    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{BASE}/pull-diff-page"),
        Some(json!({
            "userKey": user.to_string(),
            "diffSessionId": session_id,
            "pageIndex": 0,
        })),
        &[("x-api-key", &user.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("DIFF_SESSION_NOT_FOUND"));
    assert!(body["details"]["retryAfter"].is_u64());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn overlapping_adds_converge_to_the_union() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;

    // A = 0..1000, B = 700..1700, overlap 300.
    let a = fps(0..1000);
    let b = fps(700..1700);

    let (_, body_a) = add(&server, user, &a).await;
    let (_, body_b) = add(&server, user, &b).await;

    let added_a = body_a["addedCount"].as_u64().unwrap();
    let added_b = body_b["addedCount"].as_u64().unwrap();
    let dup_b = body_b["duplicateCount"].as_u64().unwrap();
    assert_eq!(added_a + added_b, 1700);
    assert_eq!(added_b + dup_b, 1000);

    let mut union = a;
    union.extend(b);
    union.sort_unstable();
    union.dedup();
    let (_, body) = check(&server, user, 1700, &sorted_hash(union)).await;
    assert_eq!(body["serverCount"], json!(1700));
    assert_eq!(body["reason"], json!("already_synced"));
}

#[tokio::test]
async fn bidirectional_diff_roundtrip() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;
    add(&server, user, &fps(0..50)).await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{BASE}/bidirectional-diff"),
        Some(json!({
            "userKey": user.to_string(),
            "clientFingerprints": [fp(0), fp(1), fp(999)],
            "batchIndex": 0,
            "batchSize": 3,
        })),
        &[("x-api-key", &user.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["batchIndex"], json!(0));
    assert_eq!(
        body["serverMissingFingerprints"],
        json!([fp(999)])
    );
    assert_eq!(body["counts"]["existingOnServer"], json!(2));
    // Server holds 50 > declared 3: an advisory session is announced.
    assert!(body["sessionInfo"]["sessionId"].is_string());
}

#[tokio::test]
async fn validation_failures_map_to_wire_codes() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;

    // Non-hex fingerprint.
    let (status, body) = add(&server, user, &["zz".repeat(32)]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("INVALID_FINGERPRINT_FORMAT"));

    // Within-batch duplicate.
    let (status, body) = add(&server, user, &[fp(1), fp(1)]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("VALIDATION_ERROR"));

    // Oversized batch.
    let (status, body) = add(&server, user, &fps(0..1001)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("REQUEST_TOO_LARGE"));

    // Uppercase hex is tolerated and canonicalized, not rejected.
    let upper = fp(7).to_ascii_uppercase();
    let (status, body) = add(&server, user, &[upper]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["addedCount"], json!(1));
}

#[tokio::test]
async fn auth_failures_map_to_wire_codes() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;

    // Missing API key.
    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{BASE}/check"),
        Some(json!({"userKey": user.to_string(), "count": 0, "hash": ""})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("INVALID_USER_KEY"));

    // Unknown API key.
    let stranger = UserKey::generate();
    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{BASE}/check"),
        Some(json!({"userKey": stranger.to_string(), "count": 0, "hash": ""})),
        &[("x-api-key", &stranger.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("USER_KEY_NOT_FOUND"));

    // Acting on someone else's set.
    let other = server.create_user(200_000).await;
    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{BASE}/check"),
        Some(json!({"userKey": other.to_string(), "count": 0, "hash": ""})),
        &[("x-api-key", &user.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("USER_KEY_MISMATCH"));

    // Revoked key.
    server
        .store()
        .set_user_key_active(user.as_uuid(), false, time::OffsetDateTime::now_utc())
        .await
        .unwrap();
    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{BASE}/check"),
        Some(json!({"userKey": user.to_string(), "count": 0, "hash": ""})),
        &[("x-api-key", &user.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("USER_KEY_INACTIVE"));
}

#[tokio::test]
async fn limit_exceeded_maps_to_forbidden() {
    let server = TestServer::new().await;
    let user = server.create_user(5).await;

    let (status, _) = add(&server, user, &fps(0..5)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = add(&server, user, &fps(5..7)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("FINGERPRINT_LIMIT_EXCEEDED"));
    assert_eq!(body["details"]["limit"], json!(5));
}

#[tokio::test]
async fn reset_reports_before_and_after() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;
    add(&server, user, &fps(0..25)).await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("{BASE}/reset"),
        Some(json!({"userKey": user.to_string(), "notes": "test wipe"})),
        &[("x-api-key", &user.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["before"]["fingerprintCount"], json!(25));
    assert_eq!(body["result"]["clearedFingerprints"], json!(25));
    assert_eq!(body["result"]["clearedMetas"], json!(1));

    // Usage counters on the key survive the reset.
    let row = server
        .store()
        .get_user_key(user.as_uuid())
        .await
        .unwrap()
        .unwrap();
    assert!(row.total_requests > 0);

    let (_, body) = check(&server, user, 0, "").await;
    assert_eq!(body["reason"], json!("both_empty"));
}

#[tokio::test]
async fn status_reports_meta_and_lock_state() {
    let server = TestServer::new().await;
    let user = server.create_user(200_000).await;
    add(&server, user, &fps(0..12)).await;

    let (status, body) = json_request(
        &server.router,
        "GET",
        &format!("{BASE}/status?userKey={user}"),
        None,
        &[("x-api-key", &user.to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["syncInProgress"], json!(false));
    assert_eq!(body["userMeta"]["totalCount"], json!(12));
    assert_eq!(body["userMeta"]["totalSyncs"], json!(1));
}
