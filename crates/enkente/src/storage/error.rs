//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The bucket was never created.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// Bucket names become directory names.
    #[error("invalid bucket name: {0}")]
    InvalidBucket(String),

    /// Empty or too long for a file name once encoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
