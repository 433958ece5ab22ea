//! Transport-neutral failure classification
//!
//! Storage and auth errors each map onto one `ErrorKind`. Transports choose
//! status codes from the kind; the core never sees HTTP vocabulary.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    SizeMismatch,
    DigestMismatch,
    TooLarge,
    UnsupportedMediaType,
    MissingToken,
    MalformedToken,
    WrongClaimKind,
    ExpiredOrNotYetValid,
    InvalidSignature,
    ScopeMismatch,
    TargetMismatch,
    IssuerMismatch,
    MirrorFetchFailed,
    StorageIO,
}

impl ErrorKind {
    /// Stable identifier, suitable for logs and response bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::SizeMismatch => "size_mismatch",
            ErrorKind::DigestMismatch => "digest_mismatch",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::UnsupportedMediaType => "unsupported_media_type",
            ErrorKind::MissingToken => "missing_token",
            ErrorKind::MalformedToken => "malformed_token",
            ErrorKind::WrongClaimKind => "wrong_claim_kind",
            ErrorKind::ExpiredOrNotYetValid => "expired_or_not_yet_valid",
            ErrorKind::InvalidSignature => "invalid_signature",
            ErrorKind::ScopeMismatch => "scope_mismatch",
            ErrorKind::TargetMismatch => "target_mismatch",
            ErrorKind::IssuerMismatch => "issuer_mismatch",
            ErrorKind::MirrorFetchFailed => "mirror_fetch_failed",
            ErrorKind::StorageIO => "storage_io",
        }
    }

    /// Whether the caller may retry the whole request unchanged.
    ///
    /// Only underlying I/O faults qualify. Authorization failures are final
    /// for the token that produced them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::StorageIO)
    }

    /// Whether the failure came from token verification or policy
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingToken
                | ErrorKind::MalformedToken
                | ErrorKind::WrongClaimKind
                | ErrorKind::ExpiredOrNotYetValid
                | ErrorKind::InvalidSignature
                | ErrorKind::ScopeMismatch
                | ErrorKind::TargetMismatch
                | ErrorKind::IssuerMismatch
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_io_is_retryable() {
        assert!(ErrorKind::StorageIO.is_retryable());
        assert!(!ErrorKind::InvalidSignature.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
    }

    #[test]
    fn test_authorization_classification() {
        assert!(ErrorKind::ScopeMismatch.is_authorization());
        assert!(!ErrorKind::DigestMismatch.is_authorization());
    }
}
