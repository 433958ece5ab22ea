//! Remote fetch for `PUT /mirror`
//!
//! The response body is spooled to an anonymous temp file while it is
//! hashed, so memory stays flat and the digest is known before anything
//! reaches the store. The spool is unlinked from the start and disappears
//! with the handle.

use std::io::{self, SeekFrom};
use std::time::Duration;

use blossom_core::{Digest, ErrorKind, Telemetry, copy_and_digest};
use blossom_storage::{StorageError, UploadPolicy};
use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::StreamReader;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Invalid mirror URL: {0}")]
    InvalidUrl(String),

    #[error("Mirror source unreachable: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Mirror source answered {0}")]
    Status(u16),

    #[error("Mirror transfer interrupted: {0}")]
    Transfer(io::Error),

    #[error("Mirrored blob too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("Mirror spool failed: {0}")]
    Spool(io::Error),

    #[error(transparent)]
    Rejected(#[from] StorageError),
}

impl MirrorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::TooLarge { .. } => ErrorKind::TooLarge,
            MirrorError::Spool(_) => ErrorKind::StorageIO,
            MirrorError::Rejected(e) => e.kind(),
            _ => ErrorKind::MirrorFetchFailed,
        }
    }
}

/// Fully fetched remote content, rewound and ready to save
#[derive(Debug)]
pub struct MirroredBlob {
    pub file: File,
    pub digest: Digest,
    pub size: u64,
    pub media_type: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MirrorClient {
    http: reqwest::Client,
    telemetry: Telemetry,
}

impl MirrorClient {
    /// `timeout` bounds the whole exchange, body included
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("blossom-server/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            telemetry: Telemetry::inherit(),
        })
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Download `url`, refusing sources `policy` would not accept as an
    /// upload. The announced type and length are checked before any of the
    /// body is read.
    pub async fn fetch(&self, url: &str, policy: &UploadPolicy) -> Result<MirroredBlob, MirrorError> {
        let result = self.fetch_inner(url, policy);
        let result = self.telemetry.scope(result).await;
        self.telemetry.in_scope(|| match &result {
            Ok(blob) => info!(url, digest = %blob.digest, size = blob.size, "Mirrored remote blob"),
            Err(e) => warn!(url, reason = %e.kind(), error = %e, "Mirror fetch failed"),
        });
        result
    }

    async fn fetch_inner(&self, url: &str, policy: &UploadPolicy) -> Result<MirroredBlob, MirrorError> {
        let url = reqwest::Url::parse(url).map_err(|e| MirrorError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MirrorError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::Status(status.as_u16()));
        }
        let max_size = policy.max_size();
        if let (Some(max), Some(len)) = (max_size, response.content_length()) {
            if len > max {
                return Err(MirrorError::TooLarge { size: len, max });
            }
        }
        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        policy.check_media_type(media_type.as_deref())?;

        let body = response.bytes_stream().map_err(io::Error::other);
        let limit = max_size.map_or(u64::MAX, |max| max.saturating_add(1));
        let mut reader = StreamReader::new(Box::pin(body)).take(limit);

        let spool = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(|e| MirrorError::Spool(io::Error::other(e)))?
            .map_err(MirrorError::Spool)?;
        let mut file = File::from_std(spool);

        let (digest, size) = copy_and_digest(&mut reader, &mut file)
            .await
            .map_err(MirrorError::Transfer)?;
        if let Some(max) = max_size {
            if size > max {
                return Err(MirrorError::TooLarge { size, max });
            }
        }

        file.seek(SeekFrom::Start(0))
            .await
            .map_err(MirrorError::Spool)?;

        Ok(MirroredBlob {
            file,
            digest,
            size,
            media_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MirrorClient {
        MirrorClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_non_http_schemes() {
        for url in ["file:///etc/passwd", "ftp://example.com/blob", "not a url"] {
            let err = client()
                .fetch(url, &UploadPolicy::permissive())
                .await
                .unwrap_err();
            assert!(matches!(err, MirrorError::InvalidUrl(_)), "{url}: {err}");
            assert_eq!(err.kind(), ErrorKind::MirrorFetchFailed);
        }
    }

    #[tokio::test]
    async fn test_unreachable_source() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client()
            .fetch(&format!("http://{addr}/blob"), &UploadPolicy::permissive())
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Request(_)));
        assert_eq!(err.kind(), ErrorKind::MirrorFetchFailed);
    }
}
