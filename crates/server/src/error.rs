//! API error taxonomy.
//!
//! One variant per wire error code. The response body is always
//! `{error, message, details?, timestamp}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use frkb_engine::SyncError;
use frkb_metadata::MetadataError;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Wire error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured context (e.g. retryAfter).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// RFC 3339 response time.
    pub timestamp: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid user key: {0}")]
    InvalidUserKey(String),

    #[error("user key not found")]
    UserKeyNotFound,

    #[error("user key is inactive")]
    UserKeyInactive,

    #[error("user key does not match the authenticated caller")]
    UserKeyMismatch,

    #[error("invalid fingerprint format: {0}")]
    InvalidFingerprintFormat(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("request too large: {0}")]
    RequestTooLarge(String),

    #[error("diff session not found or expired")]
    DiffSessionNotFound { retry_after_secs: u64 },

    #[error("diff session belongs to a different user")]
    DiffSessionUserMismatch,

    #[error("sync already in progress: {operation}")]
    SyncInProgress {
        operation: &'static str,
        held_for_secs: u64,
    },

    #[error("fingerprint limit exceeded: limit {limit}, stored {current}, {attempted} new requested")]
    FingerprintLimitExceeded {
        limit: u64,
        current: u64,
        attempted: u64,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUserKey(_) => "INVALID_USER_KEY",
            Self::UserKeyNotFound => "USER_KEY_NOT_FOUND",
            Self::UserKeyInactive => "USER_KEY_INACTIVE",
            Self::UserKeyMismatch => "USER_KEY_MISMATCH",
            Self::InvalidFingerprintFormat(_) => "INVALID_FINGERPRINT_FORMAT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RequestTooLarge(_) => "REQUEST_TOO_LARGE",
            Self::DiffSessionNotFound { .. } => "DIFF_SESSION_NOT_FOUND",
            Self::DiffSessionUserMismatch => "DIFF_SESSION_USER_MISMATCH",
            Self::SyncInProgress { .. } => "SYNC_IN_PROGRESS",
            Self::FingerprintLimitExceeded { .. } => "FINGERPRINT_LIMIT_EXCEEDED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidUserKey(_)
            | Self::InvalidFingerprintFormat(_)
            | Self::Validation(_)
            | Self::RequestTooLarge(_) => StatusCode::BAD_REQUEST,
            Self::UserKeyNotFound | Self::DiffSessionNotFound { .. } | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::UserKeyInactive
            | Self::UserKeyMismatch
            | Self::DiffSessionUserMismatch
            | Self::FingerprintLimitExceeded { .. } => StatusCode::FORBIDDEN,
            Self::SyncInProgress { .. } | Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured details for the response body, where the code calls for
    /// them.
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::DiffSessionNotFound { retry_after_secs } => {
                Some(serde_json::json!({ "retryAfter": retry_after_secs }))
            }
            Self::SyncInProgress {
                operation,
                held_for_secs,
            } => Some(serde_json::json!({
                "operation": operation,
                "heldForSeconds": held_for_secs,
            })),
            Self::FingerprintLimitExceeded {
                limit,
                current,
                attempted,
            } => Some(serde_json::json!({
                "limit": limit,
                "current": current,
                "attempted": attempted,
            })),
            _ => None,
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Validation(msg) => Self::Validation(msg),
            SyncError::InvalidFingerprint(msg) => Self::InvalidFingerprintFormat(msg),
            SyncError::TooLarge(msg) => Self::RequestTooLarge(msg),
            SyncError::SyncInProgress {
                operation,
                held_for_secs,
            } => Self::SyncInProgress {
                operation,
                held_for_secs,
            },
            SyncError::SessionNotFound { retry_after_secs } => {
                Self::DiffSessionNotFound { retry_after_secs }
            }
            SyncError::SessionUserMismatch => Self::DiffSessionUserMismatch,
            SyncError::LimitExceeded {
                limit,
                current,
                attempted,
            } => Self::FingerprintLimitExceeded {
                limit,
                current,
                attempted,
            },
            SyncError::UserKeyNotFound => Self::UserKeyNotFound,
            // Storage failures surface as internal errors; recoverable
            // constraint collisions were already consumed further down.
            SyncError::Metadata(e) => Self::Internal(e.to_string()),
            SyncError::Core(e) => match e {
                frkb_core::Error::InvalidFingerprint(msg) => Self::InvalidFingerprintFormat(msg),
                frkb_core::Error::InvalidUserKey(msg) => Self::InvalidUserKey(msg),
                other => Self::Internal(other.to_string()),
            },
        }
    }
}

impl From<MetadataError> for ApiError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotFound(msg) => Self::NotFound(msg),
            MetadataError::AlreadyExists(msg) => Self::AlreadyExists(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<frkb_core::Error> for ApiError {
    fn from(e: frkb_core::Error) -> Self {
        match e {
            frkb_core::Error::InvalidFingerprint(msg) => Self::InvalidFingerprintFormat(msg),
            frkb_core::Error::InvalidUserKey(msg) => Self::InvalidUserKey(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            details: self.details(),
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
