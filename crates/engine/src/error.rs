//! Sync engine error types.

use frkb_metadata::MetadataError;
use thiserror::Error;

/// Errors produced by the sync engine.
///
/// The HTTP layer maps each variant onto a wire error code; storage errors
/// stay wrapped so they surface as internal errors rather than leaking
/// driver details.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid fingerprint format: {0}")]
    InvalidFingerprint(String),

    #[error("request too large: {0}")]
    TooLarge(String),

    #[error("sync already in progress: {operation} held for {held_for_secs}s")]
    SyncInProgress {
        operation: &'static str,
        held_for_secs: u64,
    },

    #[error("diff session not found or expired")]
    SessionNotFound { retry_after_secs: u64 },

    #[error("diff session belongs to a different user")]
    SessionUserMismatch,

    #[error("fingerprint limit exceeded: limit {limit}, stored {current}, {attempted} new requested")]
    LimitExceeded {
        limit: u64,
        current: u64,
        attempted: u64,
    },

    #[error("user key not found")]
    UserKeyNotFound,

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("core error: {0}")]
    Core(#[from] frkb_core::Error),
}

/// Result type for engine operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
