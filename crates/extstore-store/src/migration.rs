//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1. The staging table is
//! *not* part of the durable schema: it is a TEMP table recreated on every
//! open, so leftover staged rows can never survive a process restart.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    create_temp_tables(conn)?;
    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Local data: one row per extension, the application's current truth.
        -- data NULL is a tombstone: deleted locally, deletion not yet
        -- uploaded. The CHECK backs the engine-level invariant that a
        -- tombstone is never marked clean (status 3 = Normal).
        CREATE TABLE extension_data (
            ext_id TEXT PRIMARY KEY,
            data BLOB,
            sync_status INTEGER NOT NULL DEFAULT 1,  -- 1=New, 2=Tracking, 3=Normal
            sync_change_counter INTEGER NOT NULL DEFAULT 0,

            CHECK (data IS NOT NULL OR sync_status != 3)
        );

        -- Mirror: the last state known to be on the server, keyed by the
        -- server's guid. ext_id is unique but deliberately not a foreign
        -- key; the server may know extensions we have no local row for.
        CREATE TABLE extension_mirror (
            guid TEXT PRIMARY KEY,
            ext_id TEXT NOT NULL UNIQUE,
            server_modified INTEGER NOT NULL,
            data BLOB
        );

        -- Protocol bookkeeping (last sync timestamp, collection state, ...).
        -- Owned entirely by the sync collaborators.
        CREATE TABLE meta (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Create the transient staging table.
///
/// Runs on every open. TEMP tables are connection-scoped, so staged rows
/// left behind by a crash are gone by construction.
pub fn create_temp_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TEMP TABLE IF NOT EXISTS staging (
            guid TEXT PRIMARY KEY,
            ext_id TEXT NOT NULL UNIQUE,
            server_modified INTEGER NOT NULL,
            data BLOB
        );
        "#,
    )?;
    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"extension_data".to_string()));
        assert!(tables.contains(&"extension_mirror".to_string()));
        assert!(tables.contains(&"meta".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));

        // Staging is temp, not durable.
        assert!(!tables.contains(&"staging".to_string()));
        let temp_tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_temp_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert!(temp_tables.contains(&"staging".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_clean_tombstone_rejected_by_check() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let err = conn.execute(
            "INSERT INTO extension_data (ext_id, data, sync_status) VALUES ('e', NULL, 3)",
            [],
        );
        assert!(err.is_err());
    }
}
