use axum::{
    Json,
    extract::{Path, Query, State},
};
use blossom_auth::Operation;
use blossom_core::PublicKey;
use blossom_storage::TimeRange;
use futures::TryStreamExt;
use serde::Deserialize;

use super::BlobResponse;
use crate::error::{ServerError, ServerResult};
use crate::middleware::{AuthHeader, authorize};
use crate::state::AppState;

/// Inclusive bounds on upload time, unix seconds
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub since: Option<u64>,
    pub until: Option<u64>,
}

pub async fn list_blobs(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
    Query(query): Query<ListQuery>,
    auth: AuthHeader,
) -> ServerResult<Json<Vec<BlobResponse>>> {
    let owner = PublicKey::from_hex(&pubkey)
        .map_err(|e| ServerError::BadRequest(format!("invalid public key '{pubkey}': {e}")))?;
    let runtime = state.runtime();
    authorize(&runtime, &auth, &Operation::List(owner))?;

    let range = TimeRange::new(query.since, query.until);
    let blobs = state
        .store
        .list_by_owner(&owner, range)
        .map_ok(|descriptor| BlobResponse::new(&descriptor, &runtime.public_url))
        .try_collect::<Vec<_>>()
        .await?;
    Ok(Json(blobs))
}
