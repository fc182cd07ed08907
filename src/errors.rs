//! Crate-wide error types.
//!
//! Internal components propagate `SyncError` with `?`; the facade converts
//! failures at its boundary into logged events plus safe default return
//! values, so consumers never see storage or transport errors escape.

use thiserror::Error;

/// Errors produced by the synchronization core.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("storage error: {0}")]
    StorageError(#[from] std::io::Error),

    #[error("encryption failed: {0}")]
    EncryptionError(String),

    #[error("decryption failed: {0}")]
    DecryptionError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Convenience alias used throughout the crate.
pub type SyncResult<T> = Result<T, SyncError>;
