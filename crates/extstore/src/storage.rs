//! The unified storage API.
//!
//! [`ExtensionStorage`] brings local data, metadata, and sync
//! reconciliation together behind one type, and enforces the concurrency
//! contract between them: application operations may interleave freely
//! with each other, but never with a sync pass in flight.

use std::path::Path;
use std::sync::Arc;

use extstore_core::{ExtensionId, OutgoingChange, Payload, ServerTimestamp, StagedRecord};
use extstore_store::{MemoryStore, SqliteStore, Store};
use extstore_sync::{MergeEngine, MergeReport};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// Per-extension synced storage.
///
/// Application operations (`get`/`put`/`remove`) take a shared guard on
/// the pass gate; [`apply_incoming`](Self::apply_incoming) takes it
/// exclusively, so a merge pass sees a frozen local snapshot from staging
/// through commit. Upload confirmation runs outside the gate: change
/// counter subtraction keeps a raced mutation dirty regardless of
/// ordering.
pub struct ExtensionStorage<S> {
    store: Arc<S>,
    engine: MergeEngine<S>,
    pass_gate: RwLock<()>,
}

impl ExtensionStorage<SqliteStore> {
    /// Open (or create) SQLite-backed storage at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(SqliteStore::open(path)?))
    }
}

impl ExtensionStorage<MemoryStore> {
    /// Open in-memory storage. State is lost on drop.
    pub fn open_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: Store> ExtensionStorage<S> {
    /// Wrap an existing store.
    pub fn new(store: S) -> Self {
        let store = Arc::new(store);
        Self {
            engine: MergeEngine::new(Arc::clone(&store)),
            store,
            pass_gate: RwLock::new(()),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Application Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the payload stored for an extension, if any.
    pub async fn get(&self, ext_id: &ExtensionId) -> Result<Option<Payload>> {
        let _gate = self.pass_gate.read().await;
        Ok(self.store.get(ext_id).await?)
    }

    /// Store a payload for an extension, marking it for upload.
    pub async fn put(&self, ext_id: &ExtensionId, payload: Payload) -> Result<()> {
        let _gate = self.pass_gate.read().await;
        Ok(self.store.put(ext_id, payload).await?)
    }

    /// Remove an extension's data, marking the deletion for upload.
    pub async fn remove(&self, ext_id: &ExtensionId) -> Result<()> {
        let _gate = self.pass_gate.read().await;
        Ok(self.store.remove(ext_id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Pass
    // ─────────────────────────────────────────────────────────────────────────

    /// Run the incoming half of a sync pass: stage `records`, reconcile
    /// them against local and mirror state, and apply the result.
    ///
    /// Holds the pass gate exclusively, so no application mutation can
    /// slip between staging and commit.
    pub async fn apply_incoming(&self, records: Vec<StagedRecord>) -> Result<MergeReport> {
        let _gate = self.pass_gate.write().await;
        debug!(count = records.len(), "starting merge pass");
        self.engine.stage(records).await?;
        Ok(self.engine.apply_incoming().await?)
    }

    /// Collect pending local changes for upload.
    pub async fn fetch_outgoing(&self) -> Result<Vec<OutgoingChange>> {
        let _gate = self.pass_gate.read().await;
        Ok(self.engine.fetch_outgoing().await?)
    }

    /// Confirm that `changes` were uploaded at `server_modified`.
    ///
    /// Only pass in changes the server acknowledged; anything withheld
    /// stays dirty and re-uploads next pass.
    pub async fn record_uploaded(
        &self,
        changes: &[OutgoingChange],
        server_modified: ServerTimestamp,
    ) -> Result<()> {
        let _gate = self.pass_gate.read().await;
        Ok(self.engine.record_uploaded(changes, server_modified).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a sync bookkeeping value (e.g. the last server timestamp).
    pub async fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.store.get_meta(key).await?)
    }

    /// Set a sync bookkeeping value.
    pub async fn put_meta(&self, key: &str, value: &[u8]) -> Result<()> {
        Ok(self.store.put_meta(key, value).await?)
    }

    /// Delete a sync bookkeeping value.
    pub async fn delete_meta(&self, key: &str) -> Result<()> {
        Ok(self.store.delete_meta(key).await?)
    }
}
