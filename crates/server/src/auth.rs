//! Authentication middleware.
//!
//! Two credentials exist:
//! - `X-API-Key`: the caller's user key (a UUID). Resolved against the
//!   user-key whitelist; the validated row rides the request as an
//!   extension.
//! - `X-Admin-Token`: the operator token, compared by SHA-256 hash against
//!   configuration. Gates admin routes and may act on any user.
//!
//! The middleware validates whatever credentials are present and leaves
//! enforcement to the handlers, so unauthenticated endpoints (health,
//! metrics) pass through untouched.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use frkb_core::UserKey;
use frkb_metadata::models::UserKeyRow;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Header carrying the caller's user key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the operator token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Authenticated caller extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    /// The resolved whitelist row.
    pub key: UserKeyRow,
}

impl AuthenticatedUser {
    pub fn user_key(&self) -> UserKey {
        UserKey::from_uuid(self.key.user_key)
    }
}

/// Marker extension present when a valid admin token accompanied the
/// request.
#[derive(Clone, Copy, Debug)]
pub struct AdminAuth;

/// Hash a token for comparison against the configured hash.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn header_value<'r>(req: &'r Request, name: &str) -> Option<&'r str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Authentication middleware. Validates present credentials and attaches
/// extensions; rejects malformed or revoked ones outright.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(raw_key) = header_value(&req, API_KEY_HEADER) {
        let user = UserKey::parse(raw_key)
            .map_err(|e| ApiError::InvalidUserKey(e.to_string()))?;

        let row = state
            .store
            .get_user_key(user.as_uuid())
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .ok_or(ApiError::UserKeyNotFound)?;

        if !row.is_active {
            return Err(ApiError::UserKeyInactive);
        }

        // Usage counters are telemetry; a failed bump must not fail the
        // request.
        if let Err(e) = state
            .store
            .record_user_key_usage(user.as_uuid(), OffsetDateTime::now_utc())
            .await
        {
            tracing::warn!(user_key = %user, error = %e, "Failed to record user key usage");
        }

        req.extensions_mut().insert(AuthenticatedUser { key: row });
    }

    if let Some(token) = header_value(&req, ADMIN_TOKEN_HEADER) {
        if hash_token(token) != state.config.admin.token_hash {
            return Err(ApiError::Unauthorized("invalid admin token".to_string()));
        }
        req.extensions_mut().insert(AdminAuth);
    }

    Ok(next.run(req).await)
}

/// Fetch the authenticated caller or fail.
pub fn require_auth(req: &Request) -> ApiResult<&AuthenticatedUser> {
    req.extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::InvalidUserKey("missing X-API-Key header".to_string()))
}

/// Whether a valid admin token accompanied the request.
pub fn is_admin(req: &Request) -> bool {
    req.extensions().get::<AdminAuth>().is_some()
}

/// Require the admin token.
pub fn require_admin(req: &Request) -> ApiResult<()> {
    if is_admin(req) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized(
            "admin token required".to_string(),
        ))
    }
}

/// Verify that the `userKey` named in a request body belongs to the caller.
/// The admin token may act on any user.
pub fn ensure_caller_owns(
    authenticated: Option<&AuthenticatedUser>,
    admin: bool,
    requested: UserKey,
) -> ApiResult<()> {
    if admin {
        return Ok(());
    }
    match authenticated {
        Some(auth) if auth.user_key() == requested => Ok(()),
        Some(_) => Err(ApiError::UserKeyMismatch),
        None => Err(ApiError::InvalidUserKey(
            "missing X-API-Key header".to_string(),
        )),
    }
}
