use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, HeaderMap};
use axum::http::request::Parts;
use blossom_auth::{Authorization, Operation};

use crate::error::ServerResult;
use crate::state::Runtime;

/// Raw `Authorization` header value, if any
///
/// Verification is left to the handler, which knows the operation and the
/// digest it targets.
#[derive(Clone, Debug, Default)]
pub struct AuthHeader(pub Option<String>);

impl AuthHeader {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self(
            headers
                .get(AUTHORIZATION)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
        )
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthHeader {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// Run the gate for one operation against a runtime snapshot
pub fn authorize(
    runtime: &Runtime,
    header: &AuthHeader,
    operation: &Operation,
) -> ServerResult<Authorization> {
    Ok(runtime.gate.authorize(header.as_deref(), operation)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_missing_header() {
        assert!(AuthHeader::from_headers(&HeaderMap::new()).as_deref().is_none());
    }

    #[test]
    fn test_header_passed_through_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Nostr abc="));
        assert_eq!(AuthHeader::from_headers(&headers).as_deref(), Some("Nostr abc="));
    }
}
