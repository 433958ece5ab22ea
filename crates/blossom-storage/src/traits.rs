//! Storage trait definitions

use async_trait::async_trait;
use blossom_core::{Digest, PublicKey};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::{StorageError, StorageResult};

/// Readable blob content handed back by [`BlobStore::get`]
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Lazy, finite sequence of descriptors from [`BlobStore::list_by_owner`]
pub type BlobStream = BoxStream<'static, StorageResult<BlobDescriptor>>;

/// Metadata about a stored blob
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDescriptor {
    pub digest: Digest,
    pub size: u64,
    pub media_type: Option<String>,
    pub owner: Option<PublicKey>,
    /// Unix seconds at which the content first became durable
    pub stored_at: u64,
    /// Path component a transport appends to its public base URL
    pub location: String,
}

impl BlobDescriptor {
    pub fn new(
        digest: Digest,
        size: u64,
        media_type: Option<String>,
        owner: Option<PublicKey>,
        stored_at: u64,
    ) -> Self {
        Self {
            digest,
            size,
            media_type,
            owner,
            stored_at,
            location: format!("/{digest}"),
        }
    }
}

/// Caller expectations for a save
///
/// Every field is optional. Set fields are checked against what was actually
/// read; the first violated expectation fails the save.
#[derive(Clone, Debug, Default)]
pub struct SaveRequest {
    pub expected_digest: Option<Digest>,
    pub declared_size: Option<u64>,
    pub media_type: Option<String>,
    pub owner: Option<PublicKey>,
    /// Abort once more than this many bytes have been read
    pub max_size: Option<u64>,
}

impl SaveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_digest(mut self, digest: Digest) -> Self {
        self.expected_digest = Some(digest);
        self
    }

    pub fn declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn owner(mut self, owner: PublicKey) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn max_size(mut self, max: u64) -> Self {
        self.max_size = Some(max);
        self
    }

    /// Check what was read against the declared size and expected digest
    pub fn check(&self, actual: Digest, size: u64) -> StorageResult<()> {
        if let Some(declared) = self.declared_size {
            if declared != size {
                return Err(StorageError::SizeMismatch {
                    declared,
                    actual: size,
                });
            }
        }
        if let Some(expected) = self.expected_digest {
            if expected != actual {
                return Err(StorageError::DigestMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

/// Inclusive bounds on `stored_at`; `None` leaves that side open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub since: Option<u64>,
    pub until: Option<u64>,
}

impl TimeRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(since: Option<u64>, until: Option<u64>) -> Self {
        Self { since, until }
    }

    pub fn contains(&self, t: u64) -> bool {
        self.since.map_or(true, |s| t >= s) && self.until.map_or(true, |u| t <= u)
    }
}

/// Content-addressed blob storage
///
/// Implementations must be:
/// - Thread-safe (Send + Sync)
/// - Idempotent on save (same content = same digest = one object)
/// - All-or-nothing: a failed save leaves no visible content
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream `data` into the store, hashing as it is read
    ///
    /// If content with the same digest already exists, the stored
    /// descriptor is returned unchanged and the new bytes are discarded.
    async fn save(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
        request: SaveRequest,
    ) -> StorageResult<BlobDescriptor>;

    /// Open a blob for reading
    async fn get(&self, digest: &Digest) -> StorageResult<(BlobReader, BlobDescriptor)>;

    /// Descriptor without opening the content
    async fn stat(&self, digest: &Digest) -> StorageResult<BlobDescriptor>;

    /// Check if a blob exists
    async fn exists(&self, digest: &Digest) -> StorageResult<bool>;

    /// Remove a blob and its index entry
    async fn delete(&self, digest: &Digest) -> StorageResult<()>;

    /// Blobs recorded for `owner`, ordered by `stored_at` then digest
    fn list_by_owner(&self, owner: &PublicKey, range: TimeRange) -> BlobStream;

    /// Convenience wrapper for in-memory content
    async fn save_bytes(&self, data: &[u8], request: SaveRequest) -> StorageResult<BlobDescriptor> {
        let mut reader = data;
        self.save(&mut reader, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_is_digest_path() {
        let d = Digest::of(b"hello");
        let desc = BlobDescriptor::new(d, 5, None, None, 0);
        assert_eq!(desc.location, format!("/{}", d.to_hex()));
    }

    #[test]
    fn test_check_reports_size_before_digest() {
        let actual = Digest::of(b"abc");
        let req = SaveRequest::new()
            .declared_size(10)
            .expect_digest(Digest::of(b"other"));
        assert!(matches!(
            req.check(actual, 3),
            Err(StorageError::SizeMismatch {
                declared: 10,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_check_passes_when_unset() {
        assert!(SaveRequest::new().check(Digest::of(b""), 0).is_ok());
    }

    #[test]
    fn test_time_range_bounds_are_inclusive() {
        let range = TimeRange::new(Some(10), Some(20));
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(9));
        assert!(!range.contains(21));
        assert!(TimeRange::unbounded().contains(0));
    }
}
