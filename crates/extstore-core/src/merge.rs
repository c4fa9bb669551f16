//! The merge vocabulary shared by the storage layer and the merge engine.
//!
//! The engine decides *what* to do with each staged record; the store knows
//! *how* to do it atomically. [`MergeAction`] is the contract between them.

use serde::{Deserialize, Serialize};

use crate::types::{ExtensionId, Payload, RecordGuid};

/// The locally-applied resolution for one staged record.
///
/// Every action also settles the mirror row for the record: actions that end
/// with the record alive on the server replace the mirror with the staged
/// state, actions that end with it deleted drop the mirror row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAction {
    /// Finalize a deletion: remove the local row (if any) and the mirror row.
    DeleteLocally,
    /// The server's payload wins: write it locally, mark the record clean.
    TakeRemote {
        /// The winning payload.
        payload: Payload,
    },
    /// A pending local edit beats a remote deletion: the local row is left
    /// untouched (still dirty, so it re-uploads), the mirror row is dropped
    /// because the server currently has nothing.
    KeepLocal,
    /// Local and remote already agree; only the mirror is refreshed.
    Same,
}

/// One record's worth of pending local changes, ready for upload.
///
/// `payload == None` marks an outgoing tombstone. The `change_counter` is the
/// value observed when the batch was built; confirming the upload subtracts
/// exactly that much, so a mutation that lands mid-upload survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingChange {
    /// The server's key: the mirror's guid, or a fresh one for a record the
    /// server has never seen.
    pub guid: RecordGuid,
    /// The extension the change belongs to.
    pub ext_id: ExtensionId,
    /// The payload to upload, or `None` to delete the record remotely.
    pub payload: Option<Payload>,
    /// The change counter at the time the batch was built.
    pub change_counter: u32,
}

impl OutgoingChange {
    /// Whether this change deletes the record on the server.
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }
}
