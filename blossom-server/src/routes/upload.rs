//! `PUT /upload` and its `HEAD` preflight

use std::io;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{
        HeaderMap, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
};
use blossom_auth::{AuthError, Authorization, Operation};
use blossom_core::Digest;
use blossom_storage::{SaveRequest, StorageError};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use super::{BlobResponse, X_CONTENT_LENGTH, X_CONTENT_TYPE, X_SHA_256, digest_header, header_str, u64_header};
use crate::error::ServerResult;
use crate::middleware::{AuthHeader, authorize};
use crate::state::AppState;

/// Stream the request body into the store
pub async fn upload_blob(
    State(state): State<AppState>,
    auth: AuthHeader,
    headers: HeaderMap,
    body: Body,
) -> ServerResult<Json<BlobResponse>> {
    let runtime = state.runtime();
    let announced = digest_header(&headers, X_SHA_256)?;
    let authorization = authorize(&runtime, &auth, &Operation::Upload { expected: announced })?;

    // Without an announced digest, a token bound to exactly one blob pins it
    let pinned = match announced {
        Some(_) => None,
        None => single_target(&authorization),
    };

    let mut request = SaveRequest::new();
    if let Some(digest) = announced.or(pinned) {
        request = request.expect_digest(digest);
    }
    if let Some(size) = u64_header(&headers, CONTENT_LENGTH.as_str())? {
        request = request.declared_size(size);
    }
    if let Some(media_type) = header_str(&headers, CONTENT_TYPE.as_str()) {
        request = request.media_type(media_type);
    }
    if let Some(owner) = authorization.issuer() {
        request = request.owner(owner);
    }
    let request = runtime.upload_policy.apply(request)?;

    let mut reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let descriptor = match state.store.save(&mut reader, request).await {
        Err(StorageError::DigestMismatch { actual, .. }) if pinned.is_some() => {
            return Err(AuthError::TargetMismatch(actual.to_hex()).into());
        }
        result => result?,
    };

    Ok(Json(BlobResponse::new(&descriptor, &runtime.public_url)))
}

/// Would an upload with these properties be accepted?
pub async fn preflight_upload(
    State(state): State<AppState>,
    auth: AuthHeader,
    headers: HeaderMap,
) -> ServerResult<StatusCode> {
    let runtime = state.runtime();
    let expected = digest_header(&headers, X_SHA_256)?;
    authorize(&runtime, &auth, &Operation::Upload { expected })?;

    runtime.upload_policy.preflight(
        header_str(&headers, X_CONTENT_TYPE),
        u64_header(&headers, X_CONTENT_LENGTH)?,
    )?;
    Ok(StatusCode::OK)
}

fn single_target(authorization: &Authorization) -> Option<Digest> {
    match authorization.claim()?.target_digests.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}
