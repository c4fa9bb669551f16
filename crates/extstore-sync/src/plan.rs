//! Planning: deciding what to do with each staged record.
//!
//! Planning is pure. It looks at the presence triad (staged/local/mirror)
//! and the payloads involved, and produces a [`MergeAction`] plus an
//! optional conflict to surface. The store applies the plan; nothing here
//! touches storage.
//!
//! ## Conflict policy
//!
//! Payloads are opaque blobs, so there is no field-level merging. The
//! policy is deterministic:
//!
//! - No pending local change: the server wins unconditionally.
//! - Pending local change vs. an incoming record: prefer whichever side has
//!   a payload. If both do, the remote wins and the discarded local edit is
//!   surfaced as a [`DiscardedEdit`] rather than silently dropped.
//! - A pending local *edit* against a remote *deletion* keeps the local
//!   payload; the record stays dirty and re-uploads, resurrecting it.
//! - Two deletions agree: the record is finalized as gone, with no outgoing
//!   change.

use extstore_core::{ExtensionId, LocalRecord, MergeAction, Payload};
use extstore_store::IncomingRecord;

/// The state we find ourselves in when considering a staged record: which
/// of the three repositories have a row for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingState {
    /// Only the staged record exists. First time we have ever seen this
    /// extension; no conflict is possible.
    IncomingOnly { incoming: Option<Payload> },
    /// Staged and local rows, but no mirror: another client synced this
    /// extension before we ever uploaded it.
    LocalOnly {
        incoming: Option<Payload>,
        local: LocalRecord,
    },
    /// Staged and mirror rows, but nothing local: a local deletion has
    /// already been finalized, or the server knows extensions we don't.
    MirrorOnly { incoming: Option<Payload> },
    /// All three rows exist: the ordinary steady-state case.
    Everywhere {
        incoming: Option<Payload>,
        local: LocalRecord,
    },
}

/// Classify a joined incoming record into its presence state.
pub fn classify(record: &IncomingRecord) -> IncomingState {
    let incoming = record.staged.payload.clone();
    match (&record.local, &record.mirror) {
        (None, None) => IncomingState::IncomingOnly { incoming },
        (Some(local), None) => IncomingState::LocalOnly {
            incoming,
            local: local.clone(),
        },
        (None, Some(_)) => IncomingState::MirrorOnly { incoming },
        (Some(local), Some(_)) => IncomingState::Everywhere {
            incoming,
            local: local.clone(),
        },
    }
}

/// A local edit the merge discarded in favor of server state.
///
/// Data loss is possible here, so it must be observable: every discarded
/// edit ends up in the merge report and in the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardedEdit {
    /// The extension whose local edit lost.
    pub ext_id: ExtensionId,
    /// The losing payload; `None` means the discarded edit was a deletion.
    pub discarded: Option<Payload>,
}

/// The outcome of planning one staged record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// What the store should do.
    pub action: MergeAction,
    /// A local edit this plan throws away, if any.
    pub conflict: Option<DiscardedEdit>,
}

impl Plan {
    fn clean(action: MergeAction) -> Self {
        Self {
            action,
            conflict: None,
        }
    }
}

/// Decide the action for one staged record. Pure and total.
pub fn plan_incoming(record: &IncomingRecord) -> Plan {
    let ext_id = &record.staged.ext_id;
    match classify(record) {
        IncomingState::IncomingOnly { incoming } | IncomingState::MirrorOnly { incoming } => {
            // No local row, so no local edit to protect. Server wins.
            match incoming {
                Some(payload) => Plan::clean(MergeAction::TakeRemote { payload }),
                None => Plan::clean(MergeAction::DeleteLocally),
            }
        }
        IncomingState::LocalOnly { incoming, local }
        | IncomingState::Everywhere { incoming, local } => plan_with_local(ext_id, incoming, local),
    }
}

fn plan_with_local(ext_id: &ExtensionId, incoming: Option<Payload>, local: LocalRecord) -> Plan {
    if !local.status.is_dirty() {
        // Clean local record: the server wins unconditionally.
        return match incoming {
            Some(payload) if local.payload.as_ref() == Some(&payload) => {
                Plan::clean(MergeAction::Same)
            }
            Some(payload) => Plan::clean(MergeAction::TakeRemote { payload }),
            None => Plan::clean(MergeAction::DeleteLocally),
        };
    }

    match (incoming, &local.payload) {
        (Some(remote), Some(ours)) if &remote == ours => {
            // Both sides made the same change; take it and come out clean.
            Plan::clean(MergeAction::TakeRemote { payload: remote })
        }
        (Some(remote), Some(ours)) => {
            // A real conflict between two payloads. Blobs can't be merged
            // semantically, so the remote wins and the local edit is
            // surfaced, not silently dropped.
            Plan {
                action: MergeAction::TakeRemote { payload: remote },
                conflict: Some(DiscardedEdit {
                    ext_id: ext_id.clone(),
                    discarded: Some(ours.clone()),
                }),
            }
        }
        (Some(remote), None) => {
            // Pending local deletion vs. incoming data: the payload wins.
            // The discarded edit is the deletion itself.
            Plan {
                action: MergeAction::TakeRemote { payload: remote },
                conflict: Some(DiscardedEdit {
                    ext_id: ext_id.clone(),
                    discarded: None,
                }),
            }
        }
        (None, Some(_)) => {
            // Pending local edit vs. remote deletion: the payload wins.
            // The record stays dirty and re-uploads, resurrecting it.
            Plan::clean(MergeAction::KeepLocal)
        }
        (None, None) => {
            // Tombstone collision: both sides agree it's gone. Finalize
            // with no outgoing change.
            Plan::clean(MergeAction::DeleteLocally)
        }
    }
}
