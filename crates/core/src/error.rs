//! Core error types.

use thiserror::Error;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("invalid user key: {0}")]
    InvalidUserKey(String),

    #[error("invalid bloom filter: {0}")]
    InvalidBloomFilter(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
