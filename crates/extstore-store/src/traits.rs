//! Store trait: the abstract interface over the local/mirror/staging triad.
//!
//! This trait keeps the merge engine storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use extstore_core::{
    ExtensionId, LocalRecord, MergeAction, MirrorRecord, OutgoingChange, Payload, ServerTimestamp,
    StagedRecord,
};

use crate::error::Result;

/// A staged record joined against its mirror and local counterparts.
///
/// This is the raw material for planning: one of these exists per staged
/// record, with the mirror matched by guid and the local row by extension id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRecord {
    /// The server record fetched this pass.
    pub staged: StagedRecord,
    /// The local row for the same extension, if one exists.
    pub local: Option<LocalRecord>,
    /// The mirror row for the same guid, if one exists.
    pub mirror: Option<MirrorRecord>,
}

/// A staged record plus the resolution the engine decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecord {
    /// The staged record being resolved.
    pub staged: StagedRecord,
    /// What to do with it locally.
    pub action: MergeAction,
}

/// The Store trait: async interface over local data, mirror, staging, and
/// metadata.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite we use `spawn_blocking` internally to avoid blocking the
/// runtime.
///
/// # Ownership
///
/// The application-facing operations touch only local data. Staging, merge,
/// and outgoing operations are reserved for the merge engine and its
/// fetch/push collaborators; they never run concurrently with each other
/// within one pass.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Application Operations (local data)
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the payload for an extension.
    ///
    /// Returns `None` for missing rows *and* for tombstones; pending
    /// deletion is an internal state, invisible to callers.
    async fn get(&self, ext_id: &ExtensionId) -> Result<Option<Payload>>;

    /// Insert or update the payload for an extension.
    ///
    /// Bumps the change counter and moves a clean record to `Tracking`
    /// (a never-synced record stays `New`).
    async fn put(&self, ext_id: &ExtensionId, payload: Payload) -> Result<()>;

    /// Remove an extension's data.
    ///
    /// A never-synced record is deleted outright; anything the server has
    /// seen becomes a tombstone pending upload. Removing an absent or
    /// already-tombstoned record is a no-op.
    async fn remove(&self, ext_id: &ExtensionId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Staging (written by the fetch collaborator, drained by the engine)
    // ─────────────────────────────────────────────────────────────────────────

    /// Stage server records for the current sync pass.
    ///
    /// Each extension id appears at most once per pass; re-staging the same
    /// id replaces the earlier row.
    async fn stage_incoming(&self, records: Vec<StagedRecord>) -> Result<()>;

    /// Number of records currently staged.
    async fn staged_count(&self) -> Result<usize>;

    /// Unconditionally empty the staging area.
    ///
    /// Used on the merge error path: staging must end every pass empty so a
    /// failed pass cannot leak stale records into the next one.
    async fn discard_staging(&self) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Merge Support (engine only)
    // ─────────────────────────────────────────────────────────────────────────

    /// Join every staged record against the mirror (by guid) and local data
    /// (by extension id).
    async fn fetch_incoming(&self) -> Result<Vec<IncomingRecord>>;

    /// Apply the engine's resolutions.
    ///
    /// For each record this applies the action to local data, settles the
    /// mirror row, and deletes the staging row — all of it in a single
    /// transaction, so a failure rolls the whole pass back.
    async fn apply_merge(&self, resolutions: Vec<ResolvedRecord>) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Outgoing (engine + push collaborator)
    // ─────────────────────────────────────────────────────────────────────────

    /// Collect the records with pending local changes, ready for upload.
    ///
    /// Records the server already knows reuse their mirror guid; new records
    /// get a fresh one.
    async fn fetch_outgoing(&self) -> Result<Vec<OutgoingChange>>;

    /// Record that the given changes were confirmed uploaded at
    /// `server_modified`.
    ///
    /// Subtracts each uploaded change counter (a mutation that raced the
    /// upload keeps the record dirty), marks settled records clean, writes
    /// the uploaded state into the mirror, and purges tombstones whose job
    /// is done. Unconfirmed records must simply not be passed in; they keep
    /// their state and re-attempt next pass.
    async fn record_uploaded(
        &self,
        changes: &[OutgoingChange],
        server_modified: ServerTimestamp,
    ) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Metadata (protocol bookkeeping, owned by the sync collaborators)
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a metadata value.
    async fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a metadata value. Last write wins.
    async fn put_meta(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete a metadata value.
    async fn delete_meta(&self, key: &str) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection (tests and diagnostics)
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the full local record, tombstones included.
    async fn get_local_record(&self, ext_id: &ExtensionId) -> Result<Option<LocalRecord>>;

    /// Get the mirror record for an extension.
    async fn get_mirror_record(&self, ext_id: &ExtensionId) -> Result<Option<MirrorRecord>>;
}
