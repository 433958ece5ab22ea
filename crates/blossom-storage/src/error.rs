//! Storage error types

use blossom_core::{Digest, ErrorKind};
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(Digest),

    #[error("Size mismatch: declared {declared} bytes, received {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },

    #[error("Blob too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            StorageError::DigestMismatch { .. } => ErrorKind::DigestMismatch,
            StorageError::TooLarge { .. } => ErrorKind::TooLarge,
            StorageError::UnsupportedMediaType(_) => ErrorKind::UnsupportedMediaType,
            StorageError::Io(_) | StorageError::Index(_) | StorageError::Database(_) => {
                ErrorKind::StorageIO
            }
        }
    }
}
