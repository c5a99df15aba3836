//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::extract::Request;
use frkb_core::UserKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Body cap for ordinary requests: a full batch of 1000 fingerprints plus
/// JSON overhead fits in well under 2 MiB.
pub const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Body cap for analyze-diff: 100k fingerprints at ~67 bytes each.
pub const MAX_ANALYZE_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Read and parse a JSON request body with a size cap.
pub async fn read_json<T: DeserializeOwned>(req: Request, cap: usize) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), cap)
        .await
        .map_err(|e| ApiError::RequestTooLarge(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::Validation(format!("invalid JSON body: {e}")))
}

/// Request timing block attached to success envelopes.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub duration_ms: u64,
}

pub fn performance(started: Instant) -> Performance {
    Performance {
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// RFC 3339 timestamp for response envelopes.
pub fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

pub fn parse_user_key(raw: &str) -> ApiResult<UserKey> {
    UserKey::parse(raw).map_err(|e| ApiError::InvalidUserKey(e.to_string()))
}
