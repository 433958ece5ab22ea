//! `GET`, `HEAD` and `DELETE /<sha256>[.ext]`

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use blossom_auth::Operation;
use blossom_core::Digest;
use blossom_storage::BlobDescriptor;
use tokio_util::io::ReaderStream;

use crate::error::{ServerError, ServerResult};
use crate::middleware::{AuthHeader, authorize};
use crate::state::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// `<hex>` or `<hex>.<ext>`; the extension is cosmetic
pub fn parse_blob_path(segment: &str) -> ServerResult<Digest> {
    let hex = segment.split_once('.').map_or(segment, |(hex, _)| hex);
    Digest::parse_hex(hex)
        .map_err(|e| ServerError::BadRequest(format!("invalid blob path '{segment}': {e}")))
}

pub async fn get_blob(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    auth: AuthHeader,
) -> ServerResult<Response> {
    let digest = parse_blob_path(&segment)?;
    let runtime = state.runtime();
    authorize(&runtime, &auth, &Operation::Get(digest))?;

    let (reader, descriptor) = state.store.get(&digest).await?;
    let body = Body::from_stream(ReaderStream::new(reader));
    Ok((blob_headers(&descriptor), body).into_response())
}

pub async fn head_blob(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    auth: AuthHeader,
) -> ServerResult<HeaderMap> {
    let digest = parse_blob_path(&segment)?;
    let runtime = state.runtime();
    authorize(&runtime, &auth, &Operation::Exists(digest))?;

    let descriptor = state.store.stat(&digest).await?;
    Ok(blob_headers(&descriptor))
}

pub async fn delete_blob(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    auth: AuthHeader,
) -> ServerResult<StatusCode> {
    let digest = parse_blob_path(&segment)?;
    let runtime = state.runtime();
    let authorization = authorize(&runtime, &auth, &Operation::Delete(digest))?;

    let descriptor = state.store.stat(&digest).await?;
    runtime
        .gate
        .authorize_owner(&authorization, descriptor.owner.as_ref())?;

    state.store.delete(&digest).await?;
    Ok(StatusCode::OK)
}

fn blob_headers(descriptor: &BlobDescriptor) -> HeaderMap {
    let content_type = descriptor
        .media_type
        .as_deref()
        .and_then(|t| HeaderValue::from_str(t).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(descriptor.size));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", descriptor.digest)) {
        headers.insert(header::ETAG, etag);
    }
    headers
}
