//! The three record shapes: local, mirror, and staged.
//!
//! Local is current truth with sync bookkeeping. Mirror is the last state
//! known to be on the server, keyed by the server's guid. Staged is a
//! just-fetched server record queued for the next merge; it has the same
//! shape as the mirror but lives only for one sync pass.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::SyncStatus;
use crate::types::{ExtensionId, Payload, RecordGuid, ServerTimestamp};

/// A row in the local table: the data the application reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRecord {
    /// The logical key. Immutable once created.
    pub ext_id: ExtensionId,
    /// The stored blob. `None` is a tombstone: deleted locally, deletion not
    /// yet confirmed by the server.
    pub payload: Option<Payload>,
    /// Where this record stands with respect to the server.
    pub status: SyncStatus,
    /// Local mutations since the last confirmed upload. Zero means clean.
    pub change_counter: u32,
}

impl LocalRecord {
    /// A fresh record the server has never seen.
    pub fn new(ext_id: ExtensionId, payload: Payload) -> Self {
        Self {
            ext_id,
            payload: Some(payload),
            status: SyncStatus::New,
            change_counter: 1,
        }
    }

    /// Whether this record is a pending-deletion marker.
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    /// Check the entity invariant: a tombstone may not be marked clean.
    ///
    /// A clean tombstone would mean the server has confirmed the deletion,
    /// at which point the row must be purged rather than kept. Hitting this
    /// is an engine bug.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.is_tombstone() && self.status == SyncStatus::Normal {
            return Err(CoreError::TombstoneMarkedClean(self.ext_id.clone()));
        }
        Ok(())
    }
}

/// A row in the mirror table: the last state known to be on the server.
///
/// Keyed by the server's guid. At most one mirror record exists per
/// extension id, but the extension id is not a foreign key; the mirror may
/// reference an extension with no local row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRecord {
    /// The server's key for this record.
    pub guid: RecordGuid,
    /// The extension the record belongs to.
    pub ext_id: ExtensionId,
    /// When the server last modified the record.
    pub server_modified: ServerTimestamp,
    /// The server's copy of the blob. `None` means deleted on the server.
    pub payload: Option<Payload>,
}

/// A server record fetched this pass and queued for merge.
///
/// Same shape as [`MirrorRecord`]; serde-derived because this is the type
/// the fetch collaborator hands to the engine. Staged records never outlive
/// the pass that wrote them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedRecord {
    /// The server's key for this record.
    pub guid: RecordGuid,
    /// The extension the record belongs to.
    pub ext_id: ExtensionId,
    /// When the server last modified the record.
    pub server_modified: ServerTimestamp,
    /// The incoming blob, or `None` for a server-side deletion.
    pub payload: Option<Payload>,
}

impl StagedRecord {
    /// The mirror row this staged record becomes once merged.
    pub fn into_mirror(self) -> MirrorRecord {
        MirrorRecord {
            guid: self.guid,
            ext_id: self.ext_id,
            server_modified: self.server_modified,
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn payload(s: &str) -> Payload {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_new_record_is_dirty() {
        let r = LocalRecord::new("ext1".into(), payload("{}"));
        assert_eq!(r.status, SyncStatus::New);
        assert_eq!(r.change_counter, 1);
        assert!(!r.is_tombstone());
        r.validate().unwrap();
    }

    #[test]
    fn test_tombstone_invariant() {
        let mut r = LocalRecord::new("ext1".into(), payload("{}"));
        r.payload = None;
        r.status = SyncStatus::Tracking;
        r.validate().unwrap();

        r.status = SyncStatus::Normal;
        assert!(matches!(
            r.validate(),
            Err(CoreError::TombstoneMarkedClean(_))
        ));
    }

    #[test]
    fn test_staged_into_mirror() {
        let staged = StagedRecord {
            guid: "guidAAAA".into(),
            ext_id: "ext1".into(),
            server_modified: ServerTimestamp(42),
            payload: Some(payload("data")),
        };
        let mirror = staged.clone().into_mirror();
        assert_eq!(mirror.guid, staged.guid);
        assert_eq!(mirror.ext_id, staged.ext_id);
        assert_eq!(mirror.server_modified, staged.server_modified);
        assert_eq!(mirror.payload, staged.payload);
    }
}
