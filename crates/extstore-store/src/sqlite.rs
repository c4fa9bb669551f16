//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. One connection,
//! protected by a mutex: application operations and merge operations
//! serialize on it, and the merge applies a whole pass inside a single
//! transaction.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use extstore_core::{
    ExtensionId, LocalRecord, MergeAction, MirrorRecord, OutgoingChange, Payload, RecordGuid,
    ServerTimestamp, StagedRecord, SyncStatus,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{IncomingRecord, ResolvedRecord, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist. The
    /// staging temp table is created fresh on every open, so staged rows
    /// from a previous process are discarded, never merged.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Runtime(format!("mutex poisoned: {}", e)))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Runtime(format!("spawn_blocking failed: {}", e)))?
    }
}

fn blob(payload: &Option<Payload>) -> Option<&[u8]> {
    payload.as_deref()
}

fn to_payload(data: Option<Vec<u8>>) -> Option<Payload> {
    data.map(Bytes::from)
}

/// Replace the mirror row for a merged staged record.
///
/// `INSERT OR REPLACE` clears rows conflicting on either guid or ext_id, so
/// the one-mirror-per-extension invariant holds even when the server rotates
/// the guid.
fn upsert_mirror(tx: &Transaction<'_>, staged: &StagedRecord) -> Result<()> {
    tx.execute(
        "INSERT OR REPLACE INTO extension_mirror (guid, ext_id, server_modified, data)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            staged.guid.as_str(),
            staged.ext_id.as_str(),
            staged.server_modified.as_millis(),
            blob(&staged.payload),
        ],
    )?;
    Ok(())
}

fn delete_mirror(tx: &Transaction<'_>, staged: &StagedRecord) -> Result<()> {
    tx.execute(
        "DELETE FROM extension_mirror WHERE guid = ?1 OR ext_id = ?2",
        params![staged.guid.as_str(), staged.ext_id.as_str()],
    )?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, ext_id: &ExtensionId) -> Result<Option<Payload>> {
        let ext_id = ext_id.clone();
        self.blocking(move |conn| {
            let data: Option<Option<Vec<u8>>> = conn
                .query_row(
                    "SELECT data FROM extension_data WHERE ext_id = ?1",
                    params![ext_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            // A tombstone row reads as "absent".
            Ok(data.flatten().map(Bytes::from))
        })
        .await
    }

    async fn put(&self, ext_id: &ExtensionId, payload: Payload) -> Result<()> {
        let ext_id = ext_id.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO extension_data (ext_id, data, sync_status, sync_change_counter)
                 VALUES (?1, ?2, ?3, 1)
                 ON CONFLICT(ext_id) DO UPDATE SET
                     data = excluded.data,
                     sync_status = CASE sync_status
                         WHEN ?4 THEN ?4
                         ELSE ?5
                     END,
                     sync_change_counter = sync_change_counter + 1",
                params![
                    ext_id.as_str(),
                    payload.as_ref(),
                    SyncStatus::New.as_u8(),
                    SyncStatus::New.as_u8(),
                    SyncStatus::Tracking.as_u8(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, ext_id: &ExtensionId) -> Result<()> {
        let ext_id = ext_id.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let row: Option<(u8, Option<Vec<u8>>)> = tx
                .query_row(
                    "SELECT sync_status, data FROM extension_data WHERE ext_id = ?1",
                    params![ext_id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                None => {
                    // Nothing to remove.
                }
                Some((_, None)) => {
                    // Already a tombstone.
                }
                Some((status, Some(_))) => {
                    let status = SyncStatus::from_u8(status)?;
                    if status == SyncStatus::New {
                        // Never uploaded: nothing to tell the server.
                        tx.execute(
                            "DELETE FROM extension_data WHERE ext_id = ?1",
                            params![ext_id.as_str()],
                        )?;
                    } else {
                        tx.execute(
                            "UPDATE extension_data SET
                                 data = NULL,
                                 sync_status = ?2,
                                 sync_change_counter = sync_change_counter + 1
                             WHERE ext_id = ?1",
                            params![ext_id.as_str(), status.after_local_change().as_u8()],
                        )?;
                    }
                }
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn stage_incoming(&self, records: Vec<StagedRecord>) -> Result<()> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            for record in &records {
                tx.execute(
                    "INSERT OR REPLACE INTO temp.staging (guid, ext_id, server_modified, data)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        record.guid.as_str(),
                        record.ext_id.as_str(),
                        record.server_modified.as_millis(),
                        blob(&record.payload),
                    ],
                )?;
            }
            tx.commit()?;
            tracing::debug!(count = records.len(), "staged incoming records");
            Ok(())
        })
        .await
    }

    async fn staged_count(&self) -> Result<usize> {
        self.blocking(|conn| {
            let count: i64 =
                conn.query_row("SELECT count(*) FROM temp.staging", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn discard_staging(&self) -> Result<()> {
        self.blocking(|conn| {
            conn.execute("DELETE FROM temp.staging", [])?;
            Ok(())
        })
        .await
    }

    async fn fetch_incoming(&self) -> Result<Vec<IncomingRecord>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT
                     s.guid, s.ext_id, s.server_modified, s.data,
                     m.guid, m.server_modified, m.data,
                     l.ext_id IS NOT NULL, l.data, l.sync_status, l.sync_change_counter
                 FROM temp.staging s
                 LEFT JOIN extension_mirror m ON m.guid = s.guid
                 LEFT JOIN extension_data l ON l.ext_id = s.ext_id
                 ORDER BY s.ext_id",
            )?;

            type RawRow = (
                String,
                String,
                i64,
                Option<Vec<u8>>,
                Option<String>,
                Option<i64>,
                Option<Vec<u8>>,
                bool,
                Option<Vec<u8>>,
                Option<u8>,
                Option<i64>,
            );

            let raw: Vec<RawRow> = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut incoming = Vec::with_capacity(raw.len());
            for (
                s_guid,
                s_ext_id,
                s_modified,
                s_data,
                m_guid,
                m_modified,
                m_data,
                l_exists,
                l_data,
                l_status,
                l_counter,
            ) in raw
            {
                let ext_id = ExtensionId::from(s_ext_id);
                let staged = StagedRecord {
                    guid: RecordGuid::from(s_guid),
                    ext_id: ext_id.clone(),
                    server_modified: ServerTimestamp(s_modified),
                    payload: to_payload(s_data),
                };

                let mirror = m_guid.map(|guid| MirrorRecord {
                    guid: RecordGuid::from(guid),
                    ext_id: ext_id.clone(),
                    server_modified: ServerTimestamp(m_modified.unwrap_or_default()),
                    payload: to_payload(m_data),
                });

                let local = if l_exists {
                    let status = l_status.ok_or_else(|| {
                        StoreError::InvalidData("local row missing sync_status".into())
                    })?;
                    let change_counter =
                        u32::try_from(l_counter.unwrap_or(0)).map_err(|_| {
                            StoreError::InvalidData("sync_change_counter out of range".into())
                        })?;
                    Some(LocalRecord {
                        ext_id,
                        payload: to_payload(l_data),
                        status: SyncStatus::from_u8(status)?,
                        change_counter,
                    })
                } else {
                    None
                };

                incoming.push(IncomingRecord {
                    staged,
                    local,
                    mirror,
                });
            }

            Ok(incoming)
        })
        .await
    }

    async fn apply_merge(&self, resolutions: Vec<ResolvedRecord>) -> Result<()> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            for resolved in &resolutions {
                let staged = &resolved.staged;
                match &resolved.action {
                    MergeAction::DeleteLocally => {
                        tx.execute(
                            "DELETE FROM extension_data WHERE ext_id = ?1",
                            params![staged.ext_id.as_str()],
                        )?;
                        delete_mirror(&tx, staged)?;
                    }
                    MergeAction::TakeRemote { payload } => {
                        tx.execute(
                            "INSERT OR REPLACE INTO extension_data
                                 (ext_id, data, sync_status, sync_change_counter)
                             VALUES (?1, ?2, ?3, 0)",
                            params![
                                staged.ext_id.as_str(),
                                payload.as_ref(),
                                SyncStatus::Normal.as_u8(),
                            ],
                        )?;
                        upsert_mirror(&tx, staged)?;
                    }
                    MergeAction::KeepLocal => {
                        // Local row stays dirty and re-uploads; the server
                        // currently holds nothing for this record.
                        delete_mirror(&tx, staged)?;
                    }
                    MergeAction::Same => {
                        upsert_mirror(&tx, staged)?;
                    }
                }

                tx.execute(
                    "DELETE FROM temp.staging WHERE guid = ?1",
                    params![staged.guid.as_str()],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn fetch_outgoing(&self) -> Result<Vec<OutgoingChange>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT l.ext_id, l.data, l.sync_change_counter, m.guid
                 FROM extension_data l
                 LEFT JOIN extension_mirror m ON m.ext_id = l.ext_id
                 WHERE l.sync_change_counter > 0 OR l.sync_status != ?1
                 ORDER BY l.ext_id",
            )?;

            let changes = stmt
                .query_map(params![SyncStatus::Normal.as_u8()], |row| {
                    let ext_id: String = row.get(0)?;
                    let data: Option<Vec<u8>> = row.get(1)?;
                    let counter: u32 = row.get(2)?;
                    let guid: Option<String> = row.get(3)?;
                    Ok(OutgoingChange {
                        guid: guid.map(RecordGuid::from).unwrap_or_else(RecordGuid::random),
                        ext_id: ExtensionId::from(ext_id),
                        payload: to_payload(data),
                        change_counter: counter,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(changes)
        })
        .await
    }

    async fn record_uploaded(
        &self,
        changes: &[OutgoingChange],
        server_modified: ServerTimestamp,
    ) -> Result<()> {
        let changes = changes.to_vec();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            for change in &changes {
                let row: Option<i64> = tx
                    .query_row(
                        "SELECT sync_change_counter FROM extension_data WHERE ext_id = ?1",
                        params![change.ext_id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;

                let Some(counter) = row else {
                    // The row vanished between fetch and confirmation; the
                    // upload still happened, nothing to settle locally.
                    continue;
                };

                let remaining = (counter - change.change_counter as i64).max(0);

                if change.is_tombstone() {
                    // The server now holds a tombstone; its mirror row goes
                    // regardless of what happened locally in the meantime.
                    tx.execute(
                        "DELETE FROM extension_mirror WHERE ext_id = ?1",
                        params![change.ext_id.as_str()],
                    )?;
                    if remaining == 0 {
                        // The tombstone's job is done.
                        tx.execute(
                            "DELETE FROM extension_data WHERE ext_id = ?1",
                            params![change.ext_id.as_str()],
                        )?;
                    } else {
                        tx.execute(
                            "UPDATE extension_data SET
                                 sync_change_counter = ?2, sync_status = ?3
                             WHERE ext_id = ?1",
                            params![
                                change.ext_id.as_str(),
                                remaining,
                                SyncStatus::Tracking.as_u8(),
                            ],
                        )?;
                    }
                } else {
                    let status = if remaining == 0 {
                        SyncStatus::Normal
                    } else {
                        SyncStatus::Tracking
                    };
                    tx.execute(
                        "UPDATE extension_data SET
                             sync_change_counter = ?2, sync_status = ?3
                         WHERE ext_id = ?1",
                        params![change.ext_id.as_str(), remaining, status.as_u8()],
                    )?;
                    tx.execute(
                        "INSERT OR REPLACE INTO extension_mirror
                             (guid, ext_id, server_modified, data)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            change.guid.as_str(),
                            change.ext_id.as_str(),
                            server_modified.as_millis(),
                            blob(&change.payload),
                        ],
                    )?;
                }
            }

            tx.commit()?;
            tracing::debug!(count = changes.len(), "recorded confirmed uploads");
            Ok(())
        })
        .await
    }

    async fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.blocking(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM meta WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn put_meta(&self, key: &str, value: &[u8]) -> Result<()> {
        let key = key.to_string();
        let value = value.to_vec();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_meta(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM meta WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn get_local_record(&self, ext_id: &ExtensionId) -> Result<Option<LocalRecord>> {
        let ext_id = ext_id.clone();
        self.blocking(move |conn| {
            let row: Option<(Option<Vec<u8>>, u8, u32)> = conn
                .query_row(
                    "SELECT data, sync_status, sync_change_counter
                     FROM extension_data WHERE ext_id = ?1",
                    params![ext_id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            match row {
                None => Ok(None),
                Some((data, status, counter)) => Ok(Some(LocalRecord {
                    ext_id,
                    payload: to_payload(data),
                    status: SyncStatus::from_u8(status)?,
                    change_counter: counter,
                })),
            }
        })
        .await
    }

    async fn get_mirror_record(&self, ext_id: &ExtensionId) -> Result<Option<MirrorRecord>> {
        let ext_id = ext_id.clone();
        self.blocking(move |conn| {
            let row: Option<(String, i64, Option<Vec<u8>>)> = conn
                .query_row(
                    "SELECT guid, server_modified, data
                     FROM extension_mirror WHERE ext_id = ?1",
                    params![ext_id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            Ok(row.map(|(guid, modified, data)| MirrorRecord {
                guid: RecordGuid::from(guid),
                ext_id,
                server_modified: ServerTimestamp(modified),
                payload: to_payload(data),
            }))
        })
        .await
    }
}
