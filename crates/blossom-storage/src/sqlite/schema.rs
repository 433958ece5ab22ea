//! SQLite schema definitions

use rusqlite::Connection;

use crate::error::StorageResult;

pub const SCHEMA_VERSION: u32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        -- One row per stored blob; first writer's metadata wins
        CREATE TABLE IF NOT EXISTS blobs (
            digest BLOB PRIMARY KEY,               -- 32 bytes SHA-256
            size INTEGER NOT NULL,
            media_type TEXT,
            owner BLOB,                            -- 32 bytes, NULL = anonymous
            stored_at INTEGER NOT NULL             -- Unix timestamp
        );

        CREATE INDEX IF NOT EXISTS idx_blobs_owner
            ON blobs(owner, stored_at, digest);
    "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_version (version) VALUES (?)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}

/// Check schema version
pub fn check_version(conn: &Connection) -> StorageResult<u32> {
    let version: u32 = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<u32>>(0)
        })?
        .unwrap_or(0);
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let version = check_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(check_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
