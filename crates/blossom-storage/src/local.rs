//! Local filesystem storage backend

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use blossom_core::{Clock, Digest, PublicKey, SystemClock, Telemetry};
use futures::{StreamExt, TryStreamExt, stream};
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::ingest::ingest;
use crate::locks::DigestLocks;
use crate::sqlite::{IndexCursor, SqliteIndex};
use crate::traits::{BlobDescriptor, BlobReader, BlobStore, BlobStream, SaveRequest, TimeRange};

const BLOBS_DIR: &str = "blobs";
const TMP_DIR: &str = "tmp";
const INDEX_FILE: &str = "index.sqlite3";

/// Rows fetched per index round-trip while listing
const LIST_PAGE_SIZE: usize = 256;

/// Local filesystem storage
///
/// Stores blobs as files named by their lowercase hex digest, sharded by the
/// first byte. Structure:
///
/// ```text
/// {root}/blobs/{hex[0..2]}/{hex}
/// {root}/tmp/{uuid}.part
/// {root}/index.sqlite3
/// ```
///
/// A blob is written under `tmp/`, fsynced, verified and then renamed into
/// place, so a reader never observes partial content.
pub struct FilesystemStore {
    root: Arc<PathBuf>,
    index: Arc<SqliteIndex>,
    locks: DigestLocks,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
}

impl FilesystemStore {
    /// Open storage at the given root directory
    ///
    /// Creates the directory structure if it doesn't exist and removes any
    /// temporary files left behind by an interrupted save.
    pub async fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(BLOBS_DIR)).await?;
        fs::create_dir_all(root.join(TMP_DIR)).await?;

        let swept = sweep_temp_dir(&root.join(TMP_DIR)).await?;
        if swept > 0 {
            info!(count = swept, root = %root.display(), "Removed abandoned temporary files");
        }

        let index = SqliteIndex::open(root.join(INDEX_FILE))?;
        Ok(Self {
            root: Arc::new(root),
            index: Arc::new(index),
            locks: DigestLocks::new(),
            clock: Arc::new(SystemClock),
            telemetry: Telemetry::inherit(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn temp_path(&self) -> PathBuf {
        self.root
            .join(TMP_DIR)
            .join(format!("{}.part", uuid::Uuid::new_v4()))
    }

    /// Number of content objects on disk
    pub async fn object_count(&self) -> StorageResult<u64> {
        let mut count = 0;
        let mut shards = fs::read_dir(self.root.join(BLOBS_DIR)).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry
                    .file_name()
                    .to_str()
                    .is_some_and(|n| Digest::parse_hex(n).is_ok())
                {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Number of secondary index rows
    pub fn index_count(&self) -> StorageResult<u64> {
        self.index.count()
    }

    async fn save_inner(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
        request: SaveRequest,
    ) -> StorageResult<BlobDescriptor> {
        let temp = TempFile::new(self.temp_path());
        let mut file = fs::File::create(temp.path()).await?;
        let (digest, size) = ingest(data, &mut file, &request).await?;
        file.sync_all().await?;
        drop(file);

        let guard = self.locks.acquire(digest).await;
        let final_path = blob_path(&self.root, &digest);

        if fs::try_exists(&final_path).await? {
            debug!(%digest, "Blob already stored, discarding duplicate upload");
            return self.existing_descriptor(digest, &final_path, request).await;
        }

        let descriptor = BlobDescriptor::new(
            digest,
            size,
            request.media_type,
            request.owner,
            self.clock.now(),
        );

        // The blocking task owns the lock, so dropping this future cannot
        // leave a renamed blob without its index row
        let index = Arc::clone(&self.index);
        let record = descriptor.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            promote(temp, &final_path, &index, &record)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        info!(%digest, size, owner = ?descriptor.owner, "Stored blob");
        Ok(descriptor)
    }

    /// Descriptor for content that is already in place. Restores a missing
    /// index row from the current request's metadata.
    async fn existing_descriptor(
        &self,
        digest: Digest,
        path: &Path,
        request: SaveRequest,
    ) -> StorageResult<BlobDescriptor> {
        if let Some(descriptor) = self.index.lookup(&digest)? {
            return Ok(descriptor);
        }
        let metadata = fs::metadata(path).await?;
        let descriptor = BlobDescriptor::new(
            digest,
            metadata.len(),
            request.media_type,
            request.owner,
            self.clock.now(),
        );
        self.index.insert(&descriptor)?;
        warn!(%digest, "Restored missing index entry for stored blob");
        Ok(descriptor)
    }

    /// Drop an index row whose content is gone. Re-checks under the digest
    /// lock so a concurrent re-save keeps its fresh row.
    async fn heal_stale_entry(&self, digest: &Digest) -> StorageResult<()> {
        let _guard = self.locks.acquire(*digest).await;
        if fs::try_exists(blob_path(&self.root, digest)).await? {
            return Ok(());
        }
        if self.index.remove(digest)? {
            warn!(%digest, "Removed stale index entry");
        }
        Ok(())
    }

    fn describe(&self, digest: &Digest, metadata: &std::fs::Metadata) -> StorageResult<BlobDescriptor> {
        let descriptor = match self.index.lookup(digest)? {
            Some(mut descriptor) => {
                descriptor.size = metadata.len();
                descriptor
            }
            None => {
                let stored_at = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                BlobDescriptor::new(*digest, metadata.len(), None, None, stored_at)
            }
        };
        Ok(descriptor)
    }
}

#[async_trait]
impl BlobStore for FilesystemStore {
    async fn save(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
        request: SaveRequest,
    ) -> StorageResult<BlobDescriptor> {
        self.telemetry.scope(self.save_inner(data, request)).await
    }

    async fn get(&self, digest: &Digest) -> StorageResult<(BlobReader, BlobDescriptor)> {
        self.telemetry
            .scope(async {
                let path = blob_path(&self.root, digest);
                let file = match fs::File::open(&path).await {
                    Ok(file) => file,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        self.heal_stale_entry(digest).await?;
                        return Err(StorageError::NotFound(*digest));
                    }
                    Err(e) => return Err(e.into()),
                };
                let metadata = file.metadata().await?;
                let descriptor = self.describe(digest, &metadata)?;
                Ok((Box::new(file) as BlobReader, descriptor))
            })
            .await
    }

    async fn stat(&self, digest: &Digest) -> StorageResult<BlobDescriptor> {
        self.telemetry
            .scope(async {
                let path = blob_path(&self.root, digest);
                match fs::metadata(&path).await {
                    Ok(metadata) => self.describe(digest, &metadata),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        self.heal_stale_entry(digest).await?;
                        Err(StorageError::NotFound(*digest))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    async fn exists(&self, digest: &Digest) -> StorageResult<bool> {
        let path = blob_path(&self.root, digest);
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, digest: &Digest) -> StorageResult<()> {
        self.telemetry
            .scope(async {
                let _guard = self.locks.acquire(*digest).await;
                let path = blob_path(&self.root, digest);
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        if self.index.remove(digest)? {
                            warn!(%digest, "Removed stale index entry");
                        }
                        return Err(StorageError::NotFound(*digest));
                    }
                    Err(e) => return Err(e.into()),
                }
                // Content first, then the index row
                self.index.remove(digest)?;
                info!(%digest, "Deleted blob");
                Ok(())
            })
            .await
    }

    fn list_by_owner(&self, owner: &PublicKey, range: TimeRange) -> BlobStream {
        let index = self.index.clone();
        let root = self.root.clone();
        let owner = *owner;

        let pages = stream::try_unfold(Some(None), move |cursor: Option<Option<IndexCursor>>| {
            let index = index.clone();
            let root = root.clone();
            async move {
                let Some(cursor) = cursor else {
                    return Ok(None);
                };
                let page = index.page_by_owner(&owner, range, cursor, LIST_PAGE_SIZE)?;
                let next = if page.len() < LIST_PAGE_SIZE {
                    None
                } else {
                    page.last().map(|d| Some(IndexCursor::after(d)))
                };

                // Skip rows whose content has been removed but whose index
                // entry has not been cleaned up yet
                let mut live = Vec::with_capacity(page.len());
                for descriptor in page {
                    if fs::try_exists(blob_path(&root, &descriptor.digest)).await? {
                        live.push(Ok(descriptor));
                    }
                }
                Ok::<_, StorageError>(Some((stream::iter(live), next)))
            }
        });

        pages.try_flatten().boxed()
    }
}

fn blob_path(root: &Path, digest: &Digest) -> PathBuf {
    let hex = digest.to_hex();
    root.join(BLOBS_DIR).join(&hex[..2]).join(hex)
}

/// Rename a verified temp file into place, make the new directory entries
/// durable and record the index row
fn promote(
    temp: TempFile,
    final_path: &Path,
    index: &SqliteIndex,
    descriptor: &BlobDescriptor,
) -> StorageResult<()> {
    let shard = final_path
        .parent()
        .ok_or_else(|| std::io::Error::other("blob path has no parent"))?;
    let new_shard = !shard.exists();
    std::fs::create_dir_all(shard)?;

    std::fs::rename(temp.path(), final_path)?;
    temp.disarm();

    sync_dir(shard)?;
    if new_shard {
        if let Some(blobs) = shard.parent() {
            sync_dir(blobs)?;
        }
    }

    index.insert(descriptor)?;
    Ok(())
}

/// Flush a directory's entries to disk
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

async fn sweep_temp_dir(dir: &Path) -> StorageResult<usize> {
    let mut removed = 0;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Temporary file removed on drop unless promoted
///
/// Covers every early return and cancellation between creation and rename.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
