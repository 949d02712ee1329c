//! Error types for storage operations

/// Errors from storage backends and entry (de)serialization.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable")]
    Unavailable,

    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
