use axum::{
    Router,
    http::HeaderMap,
    routing::{get, put},
};
use blossom_core::Digest;
use blossom_storage::BlobDescriptor;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

mod blobs;
mod health;
mod list;
mod mirror;
mod upload;

pub const X_SHA_256: &str = "x-sha-256";
pub const X_CONTENT_TYPE: &str = "x-content-type";
pub const X_CONTENT_LENGTH: &str = "x-content-length";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/upload",
            put(upload::upload_blob).head(upload::preflight_upload),
        )
        .route("/mirror", put(mirror::mirror_blob))
        .route("/list/{pubkey}", get(list::list_blobs))
        .route(
            "/{blob}",
            get(blobs::get_blob)
                .head(blobs::head_blob)
                .delete(blobs::delete_blob),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Descriptor as returned to clients
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobResponse {
    pub sha256: String,
    pub url: String,
    pub size: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub uploaded: u64,
}

impl BlobResponse {
    pub fn new(descriptor: &BlobDescriptor, public_url: &str) -> Self {
        Self {
            sha256: descriptor.digest.to_hex(),
            url: format!("{public_url}{}", descriptor.location),
            size: descriptor.size,
            media_type: descriptor.media_type.clone(),
            uploaded: descriptor.stored_at,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn digest_header(headers: &HeaderMap, name: &str) -> ServerResult<Option<Digest>> {
    header_str(headers, name)
        .map(|v| {
            Digest::parse_hex(v).map_err(|e| ServerError::BadRequest(format!("invalid {name}: {e}")))
        })
        .transpose()
}

fn u64_header(headers: &HeaderMap, name: &str) -> ServerResult<Option<u64>> {
    header_str(headers, name)
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| ServerError::BadRequest(format!("invalid {name}: '{v}'")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_descriptor_json_shape() {
        let d = Digest::of(b"shape");
        let desc = BlobDescriptor::new(d, 5, Some("text/plain".into()), None, 1_700_000_000);
        let json = serde_json::to_value(BlobResponse::new(&desc, "https://cdn.example.com")).unwrap();

        assert_eq!(json["sha256"], d.to_hex());
        assert_eq!(json["url"], format!("https://cdn.example.com/{}", d.to_hex()));
        assert_eq!(json["size"], 5);
        assert_eq!(json["type"], "text/plain");
        assert_eq!(json["uploaded"], 1_700_000_000u64);
    }

    #[test]
    fn test_digest_header() {
        let d = Digest::of(b"h");
        let mut headers = HeaderMap::new();
        assert_eq!(digest_header(&headers, X_SHA_256).unwrap(), None);

        headers.insert(X_SHA_256, HeaderValue::from_str(&d.to_hex()).unwrap());
        assert_eq!(digest_header(&headers, X_SHA_256).unwrap(), Some(d));

        headers.insert(X_SHA_256, HeaderValue::from_static("zz"));
        assert!(matches!(
            digest_header(&headers, X_SHA_256),
            Err(ServerError::BadRequest(_))
        ));
    }
}
