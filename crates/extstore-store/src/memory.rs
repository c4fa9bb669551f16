//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. Record invariants
//! that SQLite enforces with a CHECK constraint are validated in code here.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use extstore_core::{
    ExtensionId, LocalRecord, MergeAction, MirrorRecord, OutgoingChange, Payload, RecordGuid,
    ServerTimestamp, StagedRecord, SyncStatus,
};

use crate::error::Result;
use crate::traits::{IncomingRecord, ResolvedRecord, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Local rows, keyed by extension id.
    local: BTreeMap<ExtensionId, LocalRecord>,

    /// Mirror rows. Keyed by extension id (at most one per extension);
    /// the guid lives inside the record.
    mirror: BTreeMap<ExtensionId, MirrorRecord>,

    /// Staged rows for the current pass, keyed by extension id.
    staging: BTreeMap<ExtensionId, StagedRecord>,

    /// Protocol metadata.
    meta: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, ext_id: &ExtensionId) -> Result<Option<Payload>> {
        let inner = self.read();
        Ok(inner
            .local
            .get(ext_id)
            .and_then(|record| record.payload.clone()))
    }

    async fn put(&self, ext_id: &ExtensionId, payload: Payload) -> Result<()> {
        let mut inner = self.write();
        match inner.local.entry(ext_id.clone()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.payload = Some(payload);
                record.status = record.status.after_local_change();
                record.change_counter += 1;
                record.validate()?;
            }
            Entry::Vacant(entry) => {
                entry.insert(LocalRecord::new(ext_id.clone(), payload));
            }
        }
        Ok(())
    }

    async fn remove(&self, ext_id: &ExtensionId) -> Result<()> {
        let mut inner = self.write();
        let Some(record) = inner.local.get_mut(ext_id) else {
            return Ok(());
        };
        if record.is_tombstone() {
            return Ok(());
        }
        if record.status == SyncStatus::New {
            inner.local.remove(ext_id);
        } else {
            record.payload = None;
            record.status = record.status.after_local_change();
            record.change_counter += 1;
            record.validate()?;
        }
        Ok(())
    }

    async fn stage_incoming(&self, records: Vec<StagedRecord>) -> Result<()> {
        let mut inner = self.write();
        for record in records {
            inner.staging.insert(record.ext_id.clone(), record);
        }
        Ok(())
    }

    async fn staged_count(&self) -> Result<usize> {
        Ok(self.read().staging.len())
    }

    async fn discard_staging(&self) -> Result<()> {
        self.write().staging.clear();
        Ok(())
    }

    async fn fetch_incoming(&self) -> Result<Vec<IncomingRecord>> {
        let inner = self.read();
        Ok(inner
            .staging
            .values()
            .map(|staged| IncomingRecord {
                staged: staged.clone(),
                local: inner.local.get(&staged.ext_id).cloned(),
                mirror: inner
                    .mirror
                    .get(&staged.ext_id)
                    .filter(|m| m.guid == staged.guid)
                    .cloned(),
            })
            .collect())
    }

    async fn apply_merge(&self, resolutions: Vec<ResolvedRecord>) -> Result<()> {
        let mut inner = self.write();

        for resolved in resolutions {
            let staged = resolved.staged;
            match resolved.action {
                MergeAction::DeleteLocally => {
                    inner.local.remove(&staged.ext_id);
                    inner.mirror.remove(&staged.ext_id);
                }
                MergeAction::TakeRemote { ref payload } => {
                    let record = LocalRecord {
                        ext_id: staged.ext_id.clone(),
                        payload: Some(payload.clone()),
                        status: SyncStatus::Normal,
                        change_counter: 0,
                    };
                    record.validate()?;
                    inner.local.insert(staged.ext_id.clone(), record);
                    inner
                        .mirror
                        .insert(staged.ext_id.clone(), staged.clone().into_mirror());
                }
                MergeAction::KeepLocal => {
                    inner.mirror.remove(&staged.ext_id);
                }
                MergeAction::Same => {
                    inner
                        .mirror
                        .insert(staged.ext_id.clone(), staged.clone().into_mirror());
                }
            }
            inner.staging.remove(&staged.ext_id);
        }

        Ok(())
    }

    async fn fetch_outgoing(&self) -> Result<Vec<OutgoingChange>> {
        let inner = self.read();
        Ok(inner
            .local
            .values()
            .filter(|record| record.change_counter > 0 || record.status.is_dirty())
            .map(|record| OutgoingChange {
                guid: inner
                    .mirror
                    .get(&record.ext_id)
                    .map(|m| m.guid.clone())
                    .unwrap_or_else(RecordGuid::random),
                ext_id: record.ext_id.clone(),
                payload: record.payload.clone(),
                change_counter: record.change_counter,
            })
            .collect())
    }

    async fn record_uploaded(
        &self,
        changes: &[OutgoingChange],
        server_modified: ServerTimestamp,
    ) -> Result<()> {
        let mut guard = self.write();
        let inner = &mut *guard;

        for change in changes {
            let Some(record) = inner.local.get_mut(&change.ext_id) else {
                continue;
            };
            let remaining = record.change_counter.saturating_sub(change.change_counter);

            if change.is_tombstone() {
                inner.mirror.remove(&change.ext_id);
                if remaining == 0 {
                    inner.local.remove(&change.ext_id);
                } else {
                    record.change_counter = remaining;
                    record.status = SyncStatus::Tracking;
                }
            } else {
                record.change_counter = remaining;
                record.status = if remaining == 0 {
                    SyncStatus::Normal
                } else {
                    SyncStatus::Tracking
                };
                record.validate()?;
                inner.mirror.insert(
                    change.ext_id.clone(),
                    MirrorRecord {
                        guid: change.guid.clone(),
                        ext_id: change.ext_id.clone(),
                        server_modified,
                        payload: change.payload.clone(),
                    },
                );
            }
        }

        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read().meta.get(key).cloned())
    }

    async fn put_meta(&self, key: &str, value: &[u8]) -> Result<()> {
        self.write().meta.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete_meta(&self, key: &str) -> Result<()> {
        self.write().meta.remove(key);
        Ok(())
    }

    async fn get_local_record(&self, ext_id: &ExtensionId) -> Result<Option<LocalRecord>> {
        Ok(self.read().local.get(ext_id).cloned())
    }

    async fn get_mirror_record(&self, ext_id: &ExtensionId) -> Result<Option<MirrorRecord>> {
        Ok(self.read().mirror.get(ext_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn payload(s: &str) -> Payload {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let id = ExtensionId::from("ext1");

        store.put(&id, payload("hello")).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(payload("hello")));
    }

    #[tokio::test]
    async fn test_memory_remove_new_deletes() {
        let store = MemoryStore::new();
        let id = ExtensionId::from("ext1");

        store.put(&id, payload("hello")).await.unwrap();
        store.remove(&id).await.unwrap();
        assert!(store.get_local_record(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_tombstone_invisible_to_get() {
        let store = MemoryStore::new();
        let id = ExtensionId::from("ext1");

        // Make the record look synced, then remove it.
        let staged = StagedRecord {
            guid: "guidAAAA".into(),
            ext_id: id.clone(),
            server_modified: ServerTimestamp(1),
            payload: Some(payload("hello")),
        };
        store.stage_incoming(vec![staged.clone()]).await.unwrap();
        store
            .apply_merge(vec![ResolvedRecord {
                staged,
                action: MergeAction::TakeRemote {
                    payload: payload("hello"),
                },
            }])
            .await
            .unwrap();
        store.remove(&id).await.unwrap();

        assert_eq!(store.get(&id).await.unwrap(), None);
        let record = store.get_local_record(&id).await.unwrap().unwrap();
        assert!(record.is_tombstone());
        assert_eq!(record.status, SyncStatus::Tracking);
    }

    #[tokio::test]
    async fn test_memory_staging_drained_by_merge() {
        let store = MemoryStore::new();
        let staged = StagedRecord {
            guid: "guidAAAA".into(),
            ext_id: "ext1".into(),
            server_modified: ServerTimestamp(1),
            payload: None,
        };

        store.stage_incoming(vec![staged.clone()]).await.unwrap();
        assert_eq!(store.staged_count().await.unwrap(), 1);

        store
            .apply_merge(vec![ResolvedRecord {
                staged,
                action: MergeAction::DeleteLocally,
            }])
            .await
            .unwrap();
        assert_eq!(store.staged_count().await.unwrap(), 0);
    }
}
