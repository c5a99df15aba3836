//! Fingerprint-sync endpoint handlers.
//!
//! Handlers stay thin: parse and authorize, delegate to the engine, wrap
//! the outcome in the `{success, …, performance, timestamp}` envelope.

use crate::auth::{ensure_caller_owns, is_admin, AuthenticatedUser};
use crate::error::ApiResult;
use crate::handlers::common::{
    parse_user_key, performance, read_json, timestamp, Performance, MAX_ANALYZE_BODY_SIZE,
    MAX_BODY_SIZE,
};
use crate::metrics;
use crate::state::AppState;
use axum::extract::{Query, Request, State};
use axum::Json;
use frkb_engine::types::{
    AddOutcome, AnalyzeOutcome, BatchDiffOutcome, CheckOutcome, PageOutcome, ResetSnapshot,
    ServiceStats, SyncStatus,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

fn caller(req: &Request) -> (Option<AuthenticatedUser>, bool) {
    (
        req.extensions().get::<AuthenticatedUser>().cloned(),
        is_admin(req),
    )
}

// =============================================================================
// POST /check
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub user_key: String,
    pub count: u64,
    pub hash: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: CheckOutcome,
    pub performance: Performance,
    pub timestamp: String,
}

#[tracing::instrument(skip(state, req))]
pub async fn check(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<CheckResponse>> {
    let started = Instant::now();
    let (auth, admin) = caller(&req);
    let body: CheckRequest = read_json(req, MAX_BODY_SIZE).await?;
    let user = parse_user_key(&body.user_key)?;
    ensure_caller_owns(auth.as_ref(), admin, user)?;

    let outcome = state.engine.check(user, body.count, &body.hash).await?;

    metrics::CHECKS_TOTAL
        .with_label_values(&[outcome.reason.as_str()])
        .inc();
    metrics::CHECK_DURATION.observe(started.elapsed().as_secs_f64());

    Ok(Json(CheckResponse {
        success: true,
        outcome,
        performance: performance(started),
        timestamp: timestamp(),
    }))
}

// =============================================================================
// POST /bidirectional-diff
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidirectionalDiffRequest {
    pub user_key: String,
    pub client_fingerprints: Vec<String>,
    #[serde(default)]
    pub batch_index: u64,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidirectionalDiffResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: BatchDiffOutcome,
    pub performance: Performance,
    pub timestamp: String,
}

#[tracing::instrument(skip(state, req))]
pub async fn bidirectional_diff(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<BidirectionalDiffResponse>> {
    let started = Instant::now();
    let (auth, admin) = caller(&req);
    let body: BidirectionalDiffRequest = read_json(req, MAX_BODY_SIZE).await?;
    let user = parse_user_key(&body.user_key)?;
    ensure_caller_owns(auth.as_ref(), admin, user)?;

    let declared = body.batch_size.unwrap_or(body.client_fingerprints.len());
    let outcome = state
        .engine
        .bidirectional_diff(user, &body.client_fingerprints, body.batch_index, declared)
        .await?;

    metrics::DIFF_BATCHES_TOTAL.inc();

    Ok(Json(BidirectionalDiffResponse {
        success: true,
        outcome,
        performance: performance(started),
        timestamp: timestamp(),
    }))
}

// =============================================================================
// POST /add
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    pub user_key: String,
    pub add_fingerprints: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResponse {
    pub success: bool,
    pub added_count: u64,
    pub duplicate_count: u64,
    pub total_requested: usize,
    pub batch_result: AddOutcome,
    pub performance: Performance,
    pub timestamp: String,
}

#[tracing::instrument(skip(state, req))]
pub async fn add_fingerprints(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<AddResponse>> {
    let started = Instant::now();
    let (auth, admin) = caller(&req);
    let body: AddRequest = read_json(req, MAX_BODY_SIZE).await?;
    let user = parse_user_key(&body.user_key)?;
    ensure_caller_owns(auth.as_ref(), admin, user)?;

    let outcome = state
        .engine
        .batch_add_fingerprints(user, &body.add_fingerprints)
        .await?;

    metrics::ADDS_TOTAL.inc();
    metrics::FINGERPRINTS_ADDED_TOTAL.inc_by(outcome.added_count);
    metrics::FINGERPRINTS_DUPLICATE_TOTAL.inc_by(outcome.duplicate_count);
    metrics::ADD_DURATION.observe(started.elapsed().as_secs_f64());

    Ok(Json(AddResponse {
        success: true,
        added_count: outcome.added_count,
        duplicate_count: outcome.duplicate_count,
        total_requested: outcome.total_requested,
        batch_result: outcome,
        performance: performance(started),
        timestamp: timestamp(),
    }))
}

// =============================================================================
// POST /analyze-diff
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub user_key: String,
    #[serde(default)]
    pub client_fingerprints: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: AnalyzeOutcome,
    pub performance: Performance,
    pub timestamp: String,
}

#[tracing::instrument(skip(state, req))]
pub async fn analyze_diff(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<AnalyzeResponse>> {
    let started = Instant::now();
    let (auth, admin) = caller(&req);
    let body: AnalyzeRequest = read_json(req, MAX_ANALYZE_BODY_SIZE).await?;
    let user = parse_user_key(&body.user_key)?;
    ensure_caller_owns(auth.as_ref(), admin, user)?;

    let outcome = state
        .engine
        .analyze_difference(user, &body.client_fingerprints)
        .await?;

    metrics::ANALYZE_TOTAL.inc();
    metrics::ANALYZE_DURATION.observe(started.elapsed().as_secs_f64());

    Ok(Json(AnalyzeResponse {
        success: true,
        outcome,
        performance: performance(started),
        timestamp: timestamp(),
    }))
}

// =============================================================================
// POST /pull-diff-page
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullDiffPageRequest {
    pub user_key: String,
    pub diff_session_id: String,
    #[serde(default)]
    pub page_index: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullDiffPageResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: PageOutcome,
    pub performance: Performance,
    pub timestamp: String,
}

#[tracing::instrument(skip(state, req))]
pub async fn pull_diff_page(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<PullDiffPageResponse>> {
    let started = Instant::now();
    let (auth, admin) = caller(&req);
    let body: PullDiffPageRequest = read_json(req, MAX_BODY_SIZE).await?;
    let user = parse_user_key(&body.user_key)?;
    ensure_caller_owns(auth.as_ref(), admin, user)?;

    let outcome = state
        .engine
        .pull_diff_page(user, &body.diff_session_id, body.page_index)
        .await?;

    metrics::PAGES_PULLED_TOTAL.inc();

    Ok(Json(PullDiffPageResponse {
        success: true,
        outcome,
        performance: performance(started),
        timestamp: timestamp(),
    }))
}

// =============================================================================
// POST /reset
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    pub user_key: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResult {
    pub cleared_fingerprints: u64,
    pub cleared_metas: u64,
    pub deleted_sessions: u64,
    pub cleared_cache: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
    pub before: ResetSnapshot,
    pub result: ResetResult,
    pub timestamp: String,
}

#[tracing::instrument(skip(state, req))]
pub async fn reset_user(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ResetResponse>> {
    let (auth, admin) = caller(&req);
    let body: ResetRequest = read_json(req, MAX_BODY_SIZE).await?;
    let user = parse_user_key(&body.user_key)?;
    ensure_caller_owns(auth.as_ref(), admin, user)?;

    if let Some(notes) = &body.notes {
        tracing::info!(user_key = %user, notes, "User data reset requested");
    }

    let outcome = state.engine.reset_user_data(user).await?;
    metrics::RESETS_TOTAL.inc();

    Ok(Json(ResetResponse {
        success: true,
        message: format!(
            "cleared {} fingerprints for user {user}",
            outcome.cleared_fingerprints
        ),
        before: outcome.before,
        result: ResetResult {
            cleared_fingerprints: outcome.cleared_fingerprints,
            cleared_metas: outcome.cleared_metas,
            deleted_sessions: outcome.deleted_sessions,
            cleared_cache: outcome.cleared_cache,
        },
        timestamp: timestamp(),
    }))
}

// =============================================================================
// GET /status
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub user_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub user_key: String,
    #[serde(flatten)]
    pub status: SyncStatus,
    pub timestamp: String,
}

#[tracing::instrument(skip(state, req, query))]
pub async fn sync_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
    req: Request,
) -> ApiResult<Json<StatusResponse>> {
    let (auth, admin) = caller(&req);
    let user = parse_user_key(&query.user_key)?;
    ensure_caller_owns(auth.as_ref(), admin, user)?;

    let status = state.engine.sync_status(user).await?;

    Ok(Json(StatusResponse {
        success: true,
        user_key: user.to_string(),
        status,
        timestamp: timestamp(),
    }))
}

// =============================================================================
// GET /service-stats
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub stats: ServiceStats,
    pub timestamp: String,
}

#[tracing::instrument(skip(state, req))]
pub async fn service_stats(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ServiceStatsResponse>> {
    crate::auth::require_admin(&req)?;
    let stats = state.engine.service_stats().await?;
    Ok(Json(ServiceStatsResponse {
        success: true,
        stats,
        timestamp: timestamp(),
    }))
}
