//! # Extstore Core
//!
//! Pure data model for the synced extension storage: identifiers, the sync
//! status state machine, and the record types shared by the local table, the
//! server mirror, and the staging area.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over record state.
//!
//! ## Key Types
//!
//! - [`ExtensionId`] - The logical key: one record per extension
//! - [`RecordGuid`] - Opaque server-assigned record identifier
//! - [`SyncStatus`] - The `New -> Tracking -> Normal` state machine
//! - [`LocalRecord`] - Current-truth row with sync bookkeeping
//! - [`MirrorRecord`] - Last state known to be on the server
//! - [`StagedRecord`] - A just-fetched server record awaiting merge
//!
//! ## Tombstones
//!
//! A record marked for deletion keeps its row with a `None` payload until the
//! deletion has been uploaded. [`LocalRecord::validate`] enforces that a
//! tombstone is never simultaneously marked clean.

pub mod error;
pub mod merge;
pub mod record;
pub mod status;
pub mod types;

pub use error::{CoreError, Result};
pub use merge::{MergeAction, OutgoingChange};
pub use record::{LocalRecord, MirrorRecord, StagedRecord};
pub use status::SyncStatus;
pub use types::{ExtensionId, Payload, RecordGuid, ServerTimestamp};
