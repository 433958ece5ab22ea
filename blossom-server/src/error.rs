use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use blossom_auth::AuthError;
use blossom_core::ErrorKind;
use blossom_storage::StorageError;
use serde_json::json;
use thiserror::Error;

use crate::mirror::MirrorError;

/// Header carrying a one-line, ASCII-only failure reason
pub const REASON_HEADER: &str = "x-reason";

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServerError::Storage(e) => Some(e.kind()),
            ServerError::Auth(e) => Some(e.kind()),
            ServerError::Mirror(e) => Some(e.kind()),
            ServerError::BadRequest(_) => None,
            ServerError::Internal(_) => Some(ErrorKind::StorageIO),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            None => StatusCode::BAD_REQUEST,
            Some(kind) => status_for(kind),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::SizeMismatch => StatusCode::BAD_REQUEST,
        ErrorKind::DigestMismatch => StatusCode::CONFLICT,
        ErrorKind::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorKind::MissingToken
        | ErrorKind::MalformedToken
        | ErrorKind::WrongClaimKind
        | ErrorKind::ExpiredOrNotYetValid
        | ErrorKind::InvalidSignature => StatusCode::UNAUTHORIZED,
        ErrorKind::ScopeMismatch | ErrorKind::TargetMismatch | ErrorKind::IssuerMismatch => {
            StatusCode::FORBIDDEN
        }
        ErrorKind::MirrorFetchFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::StorageIO => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let kind = self.kind().map(|k| k.as_str()).unwrap_or("bad_request");
        let mut response = (status, Json(json!({ "error": message, "kind": kind }))).into_response();
        if let Ok(reason) = HeaderValue::from_str(&sanitize_reason(&message)) {
            response.headers_mut().insert(REASON_HEADER, reason);
        }
        response
    }
}

/// Printable ASCII only, bounded length
fn sanitize_reason(message: &str) -> String {
    message
        .chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { ' ' })
        .take(256)
        .collect()
}

pub type ServerResult<T> = Result<T, ServerError>;
