//! In-memory storage backend (for testing)

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::Cursor;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use blossom_core::{Clock, Digest, PublicKey, SystemClock, Telemetry};
use futures::{StreamExt, stream};
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::ingest::ingest;
use crate::traits::{BlobDescriptor, BlobReader, BlobStore, BlobStream, SaveRequest, TimeRange};

struct StoredBlob {
    data: Arc<[u8]>,
    descriptor: BlobDescriptor,
}

/// In-memory storage for unit tests
///
/// Thread-safe via `RwLock`. Not persistent: data is lost on drop.
pub struct InMemoryStore {
    blobs: RwLock<HashMap<Digest, StoredBlob>>,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            blobs: RwLock::default(),
            clock: Arc::new(SystemClock),
            telemetry: Telemetry::inherit(),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Digest, StoredBlob>> {
        self.blobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Digest, StoredBlob>> {
        self.blobs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes stored
    pub fn total_size(&self) -> usize {
        self.read().values().map(|b| b.data.len()).sum()
    }

    /// Clear all stored blobs
    pub fn clear(&self) {
        self.write().clear();
    }
}

#[async_trait]
impl BlobStore for InMemoryStore {
    async fn save(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
        request: SaveRequest,
    ) -> StorageResult<BlobDescriptor> {
        let mut buf = Vec::new();
        let (digest, size) = self
            .telemetry
            .scope(ingest(data, &mut buf, &request))
            .await?;

        let mut blobs = self.write();
        let descriptor = match blobs.entry(digest) {
            Entry::Occupied(existing) => {
                self.telemetry.in_scope(|| {
                    debug!(%digest, "Blob already stored, discarding duplicate upload")
                });
                existing.get().descriptor.clone()
            }
            Entry::Vacant(slot) => {
                let descriptor = BlobDescriptor::new(
                    digest,
                    size,
                    request.media_type,
                    request.owner,
                    self.clock.now(),
                );
                slot.insert(StoredBlob {
                    data: buf.into(),
                    descriptor: descriptor.clone(),
                });
                self.telemetry.in_scope(|| {
                    info!(%digest, size, owner = ?descriptor.owner, "Stored blob")
                });
                descriptor
            }
        };
        Ok(descriptor)
    }

    async fn get(&self, digest: &Digest) -> StorageResult<(BlobReader, BlobDescriptor)> {
        let blobs = self.read();
        let blob = blobs.get(digest).ok_or(StorageError::NotFound(*digest))?;
        let reader: BlobReader = Box::new(Cursor::new(blob.data.clone()));
        Ok((reader, blob.descriptor.clone()))
    }

    async fn stat(&self, digest: &Digest) -> StorageResult<BlobDescriptor> {
        self.read()
            .get(digest)
            .map(|b| b.descriptor.clone())
            .ok_or(StorageError::NotFound(*digest))
    }

    async fn exists(&self, digest: &Digest) -> StorageResult<bool> {
        Ok(self.read().contains_key(digest))
    }

    async fn delete(&self, digest: &Digest) -> StorageResult<()> {
        self.write()
            .remove(digest)
            .ok_or(StorageError::NotFound(*digest))?;
        self.telemetry.in_scope(|| info!(%digest, "Deleted blob"));
        Ok(())
    }

    fn list_by_owner(&self, owner: &PublicKey, range: TimeRange) -> BlobStream {
        let mut matching: Vec<BlobDescriptor> = self
            .read()
            .values()
            .map(|b| &b.descriptor)
            .filter(|d| d.owner.as_ref() == Some(owner) && range.contains(d.stored_at))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (a.stored_at, a.digest).cmp(&(b.stored_at, b.digest)));
        stream::iter(matching.into_iter().map(Ok)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blossom_core::FixedClock;
    use futures::TryStreamExt;
    use tokio::io::AsyncReadExt;

    async fn read_all(store: &InMemoryStore, digest: &Digest) -> Vec<u8> {
        let (mut reader, _) = store.get(digest).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let store = InMemoryStore::new();
        let data = b"Hello, storage!";

        let desc = store.save_bytes(data, SaveRequest::new()).await.unwrap();
        assert_eq!(desc.digest, Digest::of(data));
        assert_eq!(desc.size, data.len() as u64);
        assert_eq!(read_all(&store, &desc.digest).await, data);
    }

    #[tokio::test]
    async fn test_digest_mismatch() {
        let store = InMemoryStore::new();
        let request = SaveRequest::new().expect_digest(Digest::of(b"Wrong"));

        let result = store.save_bytes(b"Hello", request).await;
        assert!(matches!(result, Err(StorageError::DigestMismatch { .. })));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = InMemoryStore::new();
        let digest = Digest::of(b"nonexistent");

        assert!(matches!(store.get(&digest).await, Err(StorageError::NotFound(_))));
        assert!(matches!(store.delete(&digest).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_dedup_keeps_first_descriptor() {
        let clock = Arc::new(FixedClock::new(100));
        let store = InMemoryStore::new().with_clock(clock.clone());
        let alice = PublicKey::from_bytes([1; 32]);
        let bob = PublicKey::from_bytes([2; 32]);

        let first = store
            .save_bytes(b"shared", SaveRequest::new().owner(alice))
            .await
            .unwrap();
        clock.advance(50);
        let second = store
            .save_bytes(b"shared", SaveRequest::new().owner(bob))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_logs_through_injected_telemetry() {
        let (telemetry, capture) = Telemetry::capturing();
        let store = InMemoryStore::new().with_telemetry(telemetry);

        let desc = store.save_bytes(b"logged", SaveRequest::new()).await.unwrap();
        assert!(capture.contains("Stored blob"));
        assert!(capture.contains(&desc.digest.to_hex()));

        store.delete(&desc.digest).await.unwrap();
        assert!(capture.contains("Deleted blob"));
    }

    #[tokio::test]
    async fn test_too_large() {
        let store = InMemoryStore::new();
        let result = store
            .save_bytes(&[0u8; 11], SaveRequest::new().max_size(10))
            .await;
        assert!(matches!(result, Err(StorageError::TooLarge { max: 10, .. })));

        store
            .save_bytes(&[0u8; 10], SaveRequest::new().max_size(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_by_owner() {
        let clock = Arc::new(FixedClock::new(10));
        let store = InMemoryStore::new().with_clock(clock.clone());
        let alice = PublicKey::from_bytes([1; 32]);

        store.save_bytes(b"one", SaveRequest::new().owner(alice)).await.unwrap();
        clock.set(20);
        store.save_bytes(b"two", SaveRequest::new().owner(alice)).await.unwrap();
        store.save_bytes(b"anon", SaveRequest::new()).await.unwrap();

        let all: Vec<_> = store
            .list_by_owner(&alice, TimeRange::unbounded())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].stored_at, 10);

        let late: Vec<_> = store
            .list_by_owner(&alice, TimeRange::new(Some(15), None))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].digest, Digest::of(b"two"));
    }
}
