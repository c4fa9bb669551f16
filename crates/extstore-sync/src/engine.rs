//! The merge engine: drives one reconciliation pass over staged records.

use std::sync::Arc;

use extstore_core::{MergeAction, OutgoingChange, ServerTimestamp, StagedRecord};
use extstore_store::{ResolvedRecord, Store};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::plan::{plan_incoming, DiscardedEdit};

/// What one merge pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Total staged records processed.
    pub applied: usize,
    /// Records where server state replaced local state.
    pub take_remote: usize,
    /// Records finalized as deleted.
    pub delete_local: usize,
    /// Records where a pending local edit survived a remote deletion.
    pub keep_local: usize,
    /// Records already identical on both sides.
    pub unchanged: usize,
    /// Local edits discarded in favor of server state.
    pub conflicts: Vec<DiscardedEdit>,
}

/// Drives reconciliation between staged server records and local data.
///
/// The engine owns no state of its own; all persistence goes through the
/// [`Store`]. One engine serves any number of passes.
pub struct MergeEngine<S> {
    store: Arc<S>,
}

impl<S: Store> MergeEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Stage a batch of server records for the current pass.
    pub async fn stage(&self, records: Vec<StagedRecord>) -> Result<()> {
        trace!(count = records.len(), "staging incoming records");
        self.store.stage_incoming(records).await?;
        Ok(())
    }

    /// Resolve and apply everything currently staged.
    ///
    /// Staging ends the pass empty either way: on success the applied rows
    /// are consumed inside the merge transaction, and on failure whatever
    /// is left is discarded so a broken pass cannot leak into the next one.
    pub async fn apply_incoming(&self) -> Result<MergeReport> {
        match self.merge_staged().await {
            Ok(report) => Ok(report),
            Err(err) => {
                if let Err(discard_err) = self.store.discard_staging().await {
                    warn!(error = %discard_err, "failed to discard staging after merge error");
                }
                Err(err)
            }
        }
    }

    async fn merge_staged(&self) -> Result<MergeReport> {
        let incoming = self.store.fetch_incoming().await?;
        let mut report = MergeReport::default();
        let mut resolutions = Vec::with_capacity(incoming.len());

        for record in incoming {
            let plan = plan_incoming(&record);
            trace!(
                ext_id = %record.staged.ext_id,
                action = ?plan.action,
                "planned incoming record"
            );
            match &plan.action {
                MergeAction::TakeRemote { .. } => report.take_remote += 1,
                MergeAction::DeleteLocally => report.delete_local += 1,
                MergeAction::KeepLocal => report.keep_local += 1,
                MergeAction::Same => report.unchanged += 1,
            }
            if let Some(conflict) = plan.conflict {
                warn!(
                    ext_id = %conflict.ext_id,
                    discarded_deletion = conflict.discarded.is_none(),
                    "discarding local edit in favor of server state"
                );
                report.conflicts.push(conflict);
            }
            resolutions.push(ResolvedRecord {
                staged: record.staged,
                action: plan.action,
            });
        }

        report.applied = resolutions.len();
        self.store.apply_merge(resolutions).await?;
        debug!(
            applied = report.applied,
            take_remote = report.take_remote,
            delete_local = report.delete_local,
            keep_local = report.keep_local,
            unchanged = report.unchanged,
            conflicts = report.conflicts.len(),
            "merge pass applied"
        );
        Ok(report)
    }

    /// Collect pending local changes for upload.
    pub async fn fetch_outgoing(&self) -> Result<Vec<OutgoingChange>> {
        let changes = self.store.fetch_outgoing().await?;
        trace!(count = changes.len(), "collected outgoing changes");
        Ok(changes)
    }

    /// Confirm that `changes` were uploaded at `server_modified`.
    pub async fn record_uploaded(
        &self,
        changes: &[OutgoingChange],
        server_modified: ServerTimestamp,
    ) -> Result<()> {
        debug!(count = changes.len(), "recording uploaded changes");
        self.store.record_uploaded(changes, server_modified).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use extstore_core::{ExtensionId, LocalRecord, MirrorRecord, Payload, RecordGuid, SyncStatus};
    use extstore_store::{IncomingRecord, MemoryStore, StoreError};

    /// Delegates to a MemoryStore but fails every merge commit.
    struct BrokenMergeStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl Store for BrokenMergeStore {
        async fn get(&self, ext_id: &ExtensionId) -> extstore_store::Result<Option<Payload>> {
            self.inner.get(ext_id).await
        }

        async fn put(&self, ext_id: &ExtensionId, payload: Payload) -> extstore_store::Result<()> {
            self.inner.put(ext_id, payload).await
        }

        async fn remove(&self, ext_id: &ExtensionId) -> extstore_store::Result<()> {
            self.inner.remove(ext_id).await
        }

        async fn stage_incoming(&self, records: Vec<StagedRecord>) -> extstore_store::Result<()> {
            self.inner.stage_incoming(records).await
        }

        async fn staged_count(&self) -> extstore_store::Result<usize> {
            self.inner.staged_count().await
        }

        async fn discard_staging(&self) -> extstore_store::Result<()> {
            self.inner.discard_staging().await
        }

        async fn fetch_incoming(&self) -> extstore_store::Result<Vec<IncomingRecord>> {
            self.inner.fetch_incoming().await
        }

        async fn apply_merge(
            &self,
            _resolutions: Vec<extstore_store::ResolvedRecord>,
        ) -> extstore_store::Result<()> {
            Err(StoreError::Runtime("merge commit failed".into()))
        }

        async fn fetch_outgoing(&self) -> extstore_store::Result<Vec<OutgoingChange>> {
            self.inner.fetch_outgoing().await
        }

        async fn record_uploaded(
            &self,
            changes: &[OutgoingChange],
            server_modified: ServerTimestamp,
        ) -> extstore_store::Result<()> {
            self.inner.record_uploaded(changes, server_modified).await
        }

        async fn get_meta(&self, key: &str) -> extstore_store::Result<Option<Vec<u8>>> {
            self.inner.get_meta(key).await
        }

        async fn put_meta(&self, key: &str, value: &[u8]) -> extstore_store::Result<()> {
            self.inner.put_meta(key, value).await
        }

        async fn delete_meta(&self, key: &str) -> extstore_store::Result<()> {
            self.inner.delete_meta(key).await
        }

        async fn get_local_record(
            &self,
            ext_id: &ExtensionId,
        ) -> extstore_store::Result<Option<LocalRecord>> {
            self.inner.get_local_record(ext_id).await
        }

        async fn get_mirror_record(
            &self,
            ext_id: &ExtensionId,
        ) -> extstore_store::Result<Option<MirrorRecord>> {
            self.inner.get_mirror_record(ext_id).await
        }
    }

    fn engine() -> MergeEngine<MemoryStore> {
        MergeEngine::new(Arc::new(MemoryStore::new()))
    }

    fn payload(s: &str) -> Payload {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn staged(ext_id: &str, data: Option<&str>) -> StagedRecord {
        StagedRecord {
            guid: RecordGuid::from(format!("guid-{ext_id}")),
            ext_id: ext_id.into(),
            server_modified: ServerTimestamp(100),
            payload: data.map(payload),
        }
    }

    #[tokio::test]
    async fn test_failed_pass_surfaces_error_and_drains_staging() {
        let engine = MergeEngine::new(Arc::new(BrokenMergeStore {
            inner: MemoryStore::new(),
        }));
        let ext1 = ExtensionId::from("ext1");

        engine.stage(vec![staged("ext1", Some("v1"))]).await.unwrap();
        let err = engine.apply_incoming().await.unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));

        // The failed pass leaves nothing behind: staging is empty and
        // local data is untouched.
        assert_eq!(engine.store.staged_count().await.unwrap(), 0);
        assert_eq!(engine.store.get(&ext1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_pass_is_noop() {
        let engine = engine();
        let report = engine.apply_incoming().await.unwrap();
        assert_eq!(report, MergeReport::default());
    }

    #[tokio::test]
    async fn test_incoming_record_lands_locally() {
        let engine = engine();
        engine.stage(vec![staged("ext1", Some("v1"))]).await.unwrap();
        let report = engine.apply_incoming().await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.take_remote, 1);
        assert!(report.conflicts.is_empty());

        let ext1 = ExtensionId::from("ext1");
        assert_eq!(engine.store.get(&ext1).await.unwrap(), Some(payload("v1")));
        let local = engine.store.get_local_record(&ext1).await.unwrap().unwrap();
        assert_eq!(local.status, SyncStatus::Normal);
        assert_eq!(local.change_counter, 0);
        // Staging drained inside the pass.
        assert_eq!(engine.store.staged_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conflict_remote_wins_and_is_reported() {
        let engine = engine();
        let ext1 = ExtensionId::from("ext1");
        engine.store.put(&ext1, payload("A")).await.unwrap();

        engine.stage(vec![staged("ext1", Some("B"))]).await.unwrap();
        let report = engine.apply_incoming().await.unwrap();

        assert_eq!(engine.store.get(&ext1).await.unwrap(), Some(payload("B")));
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].discarded, Some(payload("A")));
        // The winning remote state is clean.
        let local = engine.store.get_local_record(&ext1).await.unwrap().unwrap();
        assert_eq!(local.status, SyncStatus::Normal);
        assert_eq!(local.change_counter, 0);
    }

    #[tokio::test]
    async fn test_local_edit_survives_remote_tombstone() {
        let engine = engine();
        let ext1 = ExtensionId::from("ext1");

        // Get the record into a synced state, then edit it.
        engine.stage(vec![staged("ext1", Some("v1"))]).await.unwrap();
        engine.apply_incoming().await.unwrap();
        engine.store.put(&ext1, payload("v2")).await.unwrap();

        // Remote deletion arrives.
        engine.stage(vec![staged("ext1", None)]).await.unwrap();
        let report = engine.apply_incoming().await.unwrap();
        assert_eq!(report.keep_local, 1);
        assert!(report.conflicts.is_empty());

        // The edit survives, still dirty, and will re-upload.
        assert_eq!(engine.store.get(&ext1).await.unwrap(), Some(payload("v2")));
        let outgoing = engine.fetch_outgoing().await.unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].payload, Some(payload("v2")));
        // The mirror row is gone; the re-upload is a resurrection.
        assert!(engine.store.get_mirror_record(&ext1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tombstone_collision_leaves_nothing() {
        let engine = engine();
        let ext1 = ExtensionId::from("ext1");

        engine.stage(vec![staged("ext1", Some("v1"))]).await.unwrap();
        engine.apply_incoming().await.unwrap();
        engine.store.remove(&ext1).await.unwrap();

        engine.stage(vec![staged("ext1", None)]).await.unwrap();
        let report = engine.apply_incoming().await.unwrap();
        assert_eq!(report.delete_local, 1);

        assert!(engine.store.get_local_record(&ext1).await.unwrap().is_none());
        assert!(engine.store.get_mirror_record(&ext1).await.unwrap().is_none());
        assert!(engine.fetch_outgoing().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identical_state_counts_as_unchanged() {
        let engine = engine();

        engine.stage(vec![staged("ext1", Some("v1"))]).await.unwrap();
        engine.apply_incoming().await.unwrap();

        engine.stage(vec![staged("ext1", Some("v1"))]).await.unwrap();
        let report = engine.apply_incoming().await.unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.take_remote, 0);
    }

    #[tokio::test]
    async fn test_full_round_trip_upload() {
        let engine = engine();
        let ext1 = ExtensionId::from("ext1");
        engine.store.put(&ext1, payload("local-v1")).await.unwrap();

        let outgoing = engine.fetch_outgoing().await.unwrap();
        assert_eq!(outgoing.len(), 1);
        engine
            .record_uploaded(&outgoing, ServerTimestamp(200))
            .await
            .unwrap();

        let local = engine.store.get_local_record(&ext1).await.unwrap().unwrap();
        assert_eq!(local.status, SyncStatus::Normal);
        assert_eq!(local.change_counter, 0);
        let mirror = engine.store.get_mirror_record(&ext1).await.unwrap().unwrap();
        assert_eq!(mirror.payload, Some(payload("local-v1")));
        assert_eq!(mirror.server_modified, ServerTimestamp(200));
        assert!(engine.fetch_outgoing().await.unwrap().is_empty());
    }
}
