//! Auth error types

use blossom_core::ErrorKind;
use thiserror::Error;

use crate::capability::Verb;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization required")]
    MissingToken,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Wrong event kind: expected {expected}, got {found}")]
    WrongClaimKind { expected: u32, found: u32 },

    #[error("Token outside its validity window: {0}")]
    ExpiredOrNotYetValid(String),

    #[error("Capability signature invalid")]
    InvalidSignature,

    #[error("Token does not grant {0}")]
    ScopeMismatch(Verb),

    #[error("Token is not bound to this digest: {0}")]
    TargetMismatch(String),

    #[error("Token issuer does not own this resource")]
    IssuerMismatch,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::MissingToken => ErrorKind::MissingToken,
            AuthError::MalformedToken(_) => ErrorKind::MalformedToken,
            AuthError::WrongClaimKind { .. } => ErrorKind::WrongClaimKind,
            AuthError::ExpiredOrNotYetValid(_) => ErrorKind::ExpiredOrNotYetValid,
            AuthError::InvalidSignature => ErrorKind::InvalidSignature,
            AuthError::ScopeMismatch(_) => ErrorKind::ScopeMismatch,
            AuthError::TargetMismatch(_) => ErrorKind::TargetMismatch,
            AuthError::IssuerMismatch => ErrorKind::IssuerMismatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_is_authorization() {
        let errors = [
            AuthError::MissingToken,
            AuthError::MalformedToken("x".into()),
            AuthError::WrongClaimKind {
                expected: 24242,
                found: 1,
            },
            AuthError::ExpiredOrNotYetValid("x".into()),
            AuthError::InvalidSignature,
            AuthError::ScopeMismatch(Verb::Get),
            AuthError::TargetMismatch("x".into()),
            AuthError::IssuerMismatch,
        ];
        for e in errors {
            assert!(e.kind().is_authorization(), "{e}");
            assert!(!e.kind().is_retryable());
        }
    }
}
