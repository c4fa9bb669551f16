//! The sync status state machine.
//!
//! Every local record carries a `SyncStatus` that says where it stands with
//! respect to the server:
//!
//! ```text
//! New ──(upload confirmed)──> Normal
//!  │                            │
//!  │ (local change: stays New)  │ (local change)
//!  └──────────────┐             ▼
//!                 │         Tracking ──(upload confirmed)──> Normal
//!                 └────────────────────────────────────────────┘
//! ```
//!
//! `New` means the server has never seen the record, `Tracking` means it has
//! but local changes are pending upload, `Normal` means synced and clean.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Sync state of a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SyncStatus {
    /// Never uploaded. Deleting a `New` record needs no tombstone, there is
    /// nothing to tell the server.
    New = 1,
    /// Synced before, local changes pending upload.
    Tracking = 2,
    /// Synced and clean as of the last sync pass.
    Normal = 3,
}

impl SyncStatus {
    /// Decode a stored status byte.
    pub fn from_u8(value: u8) -> Result<Self, CoreError> {
        match value {
            1 => Ok(SyncStatus::New),
            2 => Ok(SyncStatus::Tracking),
            3 => Ok(SyncStatus::Normal),
            other => Err(CoreError::InvalidStatus(other)),
        }
    }

    /// Encode for storage.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The status after a local mutation (put or remove).
    ///
    /// A never-uploaded record stays `New`; anything the server has seen
    /// becomes `Tracking` so the change is picked up for upload.
    pub fn after_local_change(self) -> Self {
        match self {
            SyncStatus::New => SyncStatus::New,
            SyncStatus::Tracking | SyncStatus::Normal => SyncStatus::Tracking,
        }
    }

    /// Whether the record has local changes the server has not confirmed.
    pub fn is_dirty(self) -> bool {
        !matches!(self, SyncStatus::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for status in [SyncStatus::New, SyncStatus::Tracking, SyncStatus::Normal] {
            assert_eq!(SyncStatus::from_u8(status.as_u8()).unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_byte_rejected() {
        assert!(SyncStatus::from_u8(0).is_err());
        assert!(SyncStatus::from_u8(4).is_err());
    }

    #[test]
    fn test_local_change_transitions() {
        assert_eq!(SyncStatus::New.after_local_change(), SyncStatus::New);
        assert_eq!(SyncStatus::Normal.after_local_change(), SyncStatus::Tracking);
        assert_eq!(
            SyncStatus::Tracking.after_local_change(),
            SyncStatus::Tracking
        );
    }

    #[test]
    fn test_dirty() {
        assert!(SyncStatus::New.is_dirty());
        assert!(SyncStatus::Tracking.is_dirty());
        assert!(!SyncStatus::Normal.is_dirty());
    }
}
