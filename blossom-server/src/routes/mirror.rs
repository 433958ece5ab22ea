use axum::{Json, extract::State};
use blossom_auth::{AuthError, Operation};
use blossom_storage::SaveRequest;
use serde::Deserialize;

use super::BlobResponse;
use crate::error::ServerResult;
use crate::middleware::{AuthHeader, authorize};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MirrorRequest {
    pub url: String,
}

/// Fetch a remote blob and store it as if it had been uploaded
pub async fn mirror_blob(
    State(state): State<AppState>,
    auth: AuthHeader,
    Json(body): Json<MirrorRequest>,
) -> ServerResult<Json<BlobResponse>> {
    let runtime = state.runtime();
    let authorization = authorize(&runtime, &auth, &Operation::Mirror)?;

    let mut blob = runtime
        .mirror
        .fetch(&body.url, &runtime.upload_policy)
        .await?;

    // Digest only known now; a bound token must name it
    if let Some(claim) = authorization.claim() {
        if !claim.covers(&blob.digest) {
            return Err(AuthError::TargetMismatch(blob.digest.to_hex()).into());
        }
    }

    let mut request = SaveRequest::new()
        .expect_digest(blob.digest)
        .declared_size(blob.size);
    if let Some(media_type) = blob.media_type.take() {
        request = request.media_type(media_type);
    }
    if let Some(owner) = authorization.issuer() {
        request = request.owner(owner);
    }
    let request = runtime.upload_policy.apply(request)?;

    let descriptor = state.store.save(&mut blob.file, request).await?;
    Ok(Json(BlobResponse::new(&descriptor, &runtime.public_url)))
}
