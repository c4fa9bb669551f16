//! Error types for the core data model.

use thiserror::Error;

use crate::status::SyncStatus;
use crate::types::ExtensionId;

/// Errors that indicate a record violates an entity invariant.
///
/// These are programming-contract errors: the engine must never produce a
/// record that trips one of these, so they are surfaced loudly rather than
/// recovered from.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A stored status byte is not a known `SyncStatus` discriminant.
    #[error("invalid sync status value: {0}")]
    InvalidStatus(u8),

    /// A tombstone was marked as fully reconciled. A tombstone only exists
    /// to be uploaded; once clean it must be purged, not retained.
    #[error("tombstone for '{0}' is marked clean (status Normal)")]
    TombstoneMarkedClean(ExtensionId),

    /// A status transition the state machine does not allow.
    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SyncStatus, to: SyncStatus },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
