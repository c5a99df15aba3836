//! Administrative handlers: lock/cache overrides and user-key management.

use crate::auth::{ensure_caller_owns, is_admin, require_admin, AuthenticatedUser};
use crate::error::ApiResult;
use crate::handlers::common::{parse_user_key, read_json, timestamp, MAX_BODY_SIZE};
use crate::state::AppState;
use axum::extract::{Path, Request, State};
use axum::Json;
use frkb_core::UserKey;
use frkb_metadata::models::UserKeyRow;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

// =============================================================================
// DELETE /lock/{userKey}
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceUnlockResponse {
    pub success: bool,
    pub user_key: String,
    pub released: bool,
    pub timestamp: String,
}

/// Force-release a user's sync lock. Admin only; meant for operator
/// intervention when a client died mid-operation.
#[tracing::instrument(skip(state, req))]
pub async fn force_unlock(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
    req: Request,
) -> ApiResult<Json<ForceUnlockResponse>> {
    require_admin(&req)?;
    let user = parse_user_key(&user_key)?;

    let released = state.engine.force_release_lock(user);
    if released {
        tracing::warn!(user_key = %user, "Sync lock force-released by admin");
    }

    Ok(Json(ForceUnlockResponse {
        success: true,
        user_key: user.to_string(),
        released,
        timestamp: timestamp(),
    }))
}

// =============================================================================
// DELETE /cache/{userKey}
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearCacheResponse {
    pub success: bool,
    pub user_key: String,
    pub cleared: bool,
    pub timestamp: String,
}

/// Drop a user's bloom filter and ephemeral cache entries. Allowed for the
/// key owner or the admin token.
#[tracing::instrument(skip(state, req))]
pub async fn clear_caches(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
    req: Request,
) -> ApiResult<Json<ClearCacheResponse>> {
    let auth = req.extensions().get::<AuthenticatedUser>().cloned();
    let user = parse_user_key(&user_key)?;
    ensure_caller_owns(auth.as_ref(), is_admin(&req), user)?;

    state.engine.clear_user_caches(user);

    Ok(Json(ClearCacheResponse {
        success: true,
        user_key: user.to_string(),
        cleared: true,
        timestamp: timestamp(),
    }))
}

// =============================================================================
// User-key management
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserKeyRequest {
    /// Explicit key to register; a fresh one is generated when omitted.
    #[serde(default)]
    pub user_key: Option<String>,
    #[serde(default)]
    pub fingerprint_limit: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserKeyView {
    pub user_key: String,
    pub is_active: bool,
    pub fingerprint_limit: u64,
    pub total_requests: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
}

impl From<UserKeyRow> for UserKeyView {
    fn from(row: UserKeyRow) -> Self {
        let fmt = |t: OffsetDateTime| t.format(&Rfc3339).unwrap_or_default();
        Self {
            user_key: UserKey::from_uuid(row.user_key).to_string(),
            is_active: row.is_active,
            fingerprint_limit: row.fingerprint_limit.max(0) as u64,
            total_requests: row.total_requests.max(0) as u64,
            description: row.description,
            created_at: fmt(row.created_at),
            last_used_at: row.last_used_at.map(fmt),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserKeyResponse {
    pub success: bool,
    pub key: UserKeyView,
    pub timestamp: String,
}

/// POST /user-keys - register a user key. Admin only.
#[tracing::instrument(skip(state, req))]
pub async fn create_user_key(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<CreateUserKeyResponse>> {
    require_admin(&req)?;
    let body: CreateUserKeyRequest = read_json(req, MAX_BODY_SIZE).await?;

    let user = match &body.user_key {
        Some(raw) => parse_user_key(raw)?,
        None => UserKey::generate(),
    };
    let limit = body
        .fingerprint_limit
        .unwrap_or(state.config.sync.default_fingerprint_limit);

    let now = OffsetDateTime::now_utc();
    let row = UserKeyRow {
        user_key: user.as_uuid(),
        is_active: true,
        fingerprint_limit: limit.min(i64::MAX as u64) as i64,
        total_requests: 0,
        description: body.description,
        created_at: now,
        updated_at: now,
        last_used_at: None,
    };
    state.store.create_user_key(&row).await?;

    tracing::info!(user_key = %user, fingerprint_limit = limit, "User key created");

    Ok(Json(CreateUserKeyResponse {
        success: true,
        key: row.into(),
        timestamp: timestamp(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUserKeysResponse {
    pub success: bool,
    pub keys: Vec<UserKeyView>,
    pub timestamp: String,
}

/// GET /user-keys - list registered keys. Admin only.
#[tracing::instrument(skip(state, req))]
pub async fn list_user_keys(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ListUserKeysResponse>> {
    require_admin(&req)?;
    let keys = state
        .store
        .list_user_keys()
        .await?
        .into_iter()
        .map(UserKeyView::from)
        .collect();
    Ok(Json(ListUserKeysResponse {
        success: true,
        keys,
        timestamp: timestamp(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserKeyRequest {
    pub is_active: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserKeyResponse {
    pub success: bool,
    pub user_key: String,
    pub is_active: bool,
    pub timestamp: String,
}

/// PUT /user-keys/{userKey} - activate or revoke a key. Admin only.
#[tracing::instrument(skip(state, req))]
pub async fn update_user_key(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
    req: Request,
) -> ApiResult<Json<UpdateUserKeyResponse>> {
    require_admin(&req)?;
    let user = parse_user_key(&user_key)?;
    let body: UpdateUserKeyRequest = read_json(req, MAX_BODY_SIZE).await?;

    state
        .store
        .set_user_key_active(user.as_uuid(), body.is_active, OffsetDateTime::now_utc())
        .await?;

    tracing::info!(user_key = %user, is_active = body.is_active, "User key updated");

    Ok(Json(UpdateUserKeyResponse {
        success: true,
        user_key: user.to_string(),
        is_active: body.is_active,
        timestamp: timestamp(),
    }))
}
