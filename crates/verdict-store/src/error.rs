//! Error types for verdict-store

use thiserror::Error;

/// Errors produced by artifact and baseline storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No artifact stored under the requested key
    #[error("artifact not found: {key}")]
    NotFound { key: String },

    /// Key contains characters that cannot be mapped onto a storage path
    #[error("invalid artifact key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Digest string is not 64 hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Stored bytes no longer match the recorded digest
    #[error("digest mismatch for {key}: expected {expected}, got {actual}")]
    DigestMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking filesystem task panicked or was cancelled
    #[error("storage task failed: {0}")]
    Task(String),

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),
}
