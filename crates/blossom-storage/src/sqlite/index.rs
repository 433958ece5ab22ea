//! SQLite owner index
//!
//! Secondary index over stored content. Rows are inserted only after the
//! content is durable and removed only after the content is gone, so the
//! index may briefly lag the content store but never leads it.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use blossom_core::{Digest, PublicKey};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::schema::init_schema;
use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobDescriptor, TimeRange};

/// Keyset position within an owner listing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexCursor {
    pub stored_at: u64,
    pub digest: Digest,
}

impl IndexCursor {
    pub fn after(descriptor: &BlobDescriptor) -> Self {
        Self {
            stored_at: descriptor.stored_at,
            digest: descriptor.digest,
        }
    }
}

/// SQLite-backed descriptor index
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Index("connection lock poisoned".into()))
    }

    /// Record a descriptor. An existing row for the digest is left alone.
    ///
    /// Returns `true` if a row was written.
    pub fn insert(&self, descriptor: &BlobDescriptor) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO blobs (digest, size, media_type, owner, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                descriptor.digest.as_bytes().as_slice(),
                to_sql_u64(descriptor.size)?,
                descriptor.media_type,
                descriptor.owner.as_ref().map(|o| o.as_bytes().to_vec()),
                to_sql_u64(descriptor.stored_at)?,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn lookup(&self, digest: &Digest) -> StorageResult<Option<BlobDescriptor>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT digest, size, media_type, owner, stored_at FROM blobs WHERE digest = ?1",
                [digest.as_bytes().as_slice()],
                RawRow::from_row,
            )
            .optional()?;
        row.map(RawRow::into_descriptor).transpose()
    }

    /// Returns `true` if a row was removed
    pub fn remove(&self, digest: &Digest) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM blobs WHERE digest = ?1",
            [digest.as_bytes().as_slice()],
        )?;
        Ok(changed > 0)
    }

    /// One page of an owner's blobs, ordered by `(stored_at, digest)`,
    /// strictly after `cursor`
    pub fn page_by_owner(
        &self,
        owner: &PublicKey,
        range: TimeRange,
        cursor: Option<IndexCursor>,
        limit: usize,
    ) -> StorageResult<Vec<BlobDescriptor>> {
        let since = to_sql_u64(range.since.unwrap_or(0))?;
        let until = range.until.map(to_sql_u64).transpose()?.unwrap_or(i64::MAX);
        let (after_ts, after_digest) = match cursor {
            Some(c) => (to_sql_u64(c.stored_at)?, c.digest.as_bytes().to_vec()),
            None => (-1, Vec::new()),
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT digest, size, media_type, owner, stored_at FROM blobs
             WHERE owner = ?1
               AND stored_at >= ?2 AND stored_at <= ?3
               AND (stored_at > ?4 OR (stored_at = ?4 AND digest > ?5))
             ORDER BY stored_at ASC, digest ASC
             LIMIT ?6",
        )?;
        let rows = stmt.query_map(
            params![
                owner.as_bytes().as_slice(),
                since,
                until,
                after_ts,
                after_digest,
                limit
            ],
            RawRow::from_row,
        )?;

        let mut page = Vec::new();
        for row in rows {
            page.push(row?.into_descriptor()?);
        }
        Ok(page)
    }

    pub fn count(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}

fn to_sql_u64(value: u64) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::Index(format!("{value} exceeds i64 range")))
}

/// Column values before validation
struct RawRow {
    digest: Vec<u8>,
    size: i64,
    media_type: Option<String>,
    owner: Option<Vec<u8>>,
    stored_at: i64,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            digest: row.get(0)?,
            size: row.get(1)?,
            media_type: row.get(2)?,
            owner: row.get(3)?,
            stored_at: row.get(4)?,
        })
    }

    fn into_descriptor(self) -> StorageResult<BlobDescriptor> {
        let digest: [u8; 32] = self
            .digest
            .try_into()
            .map_err(|_| StorageError::Index("digest column is not 32 bytes".into()))?;
        let owner = self
            .owner
            .map(|bytes| {
                <[u8; 32]>::try_from(bytes)
                    .map(PublicKey::from_bytes)
                    .map_err(|_| StorageError::Index("owner column is not 32 bytes".into()))
            })
            .transpose()?;
        Ok(BlobDescriptor::new(
            Digest::from_bytes(digest),
            self.size.max(0) as u64,
            self.media_type,
            owner,
            self.stored_at.max(0) as u64,
        ))
    }
}
