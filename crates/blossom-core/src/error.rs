//! Core error types

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}
