//! # Extstore
//!
//! The unified API for synced per-extension storage: an opaque payload per
//! extension, kept reconciled with a server copy.
//!
//! ## Overview
//!
//! Extstore keeps three repositories of record:
//!
//! - **Local data**: the authoritative payloads, readable and writable at
//!   any time, tracked for upload via a status and change counter.
//! - **Mirror**: the last state confirmed uploaded to the server, used as
//!   the common ancestor during reconciliation.
//! - **Staging**: a transient area holding the records fetched from the
//!   server during one sync pass.
//!
//! A sync pass stages the server's records, reconciles them three-ways
//! against local and mirror state, then collects pending local changes
//! for upload and confirms them once acknowledged.
//!
//! ## Key Concepts
//!
//! - **Tombstone**: a local row with no payload, marking a deletion the
//!   server has yet to learn about.
//! - **Change counter**: mutations increment it; upload confirmation
//!   subtracts what was uploaded, so an edit that raced the upload stays
//!   pending.
//! - **Conflict**: colliding payloads resolve in the server's favor, with
//!   the discarded local edit surfaced in the merge report.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use extstore::{ExtensionStorage, ServerTimestamp};
//!
//! async fn example() -> extstore::Result<()> {
//!     let storage = ExtensionStorage::open("extensions.db")?;
//!
//!     let ext_id = "some-extension".into();
//!     storage.put(&ext_id, bytes::Bytes::from("payload")).await?;
//!
//!     // A sync pass: apply server records, then upload our changes.
//!     // let report = storage.apply_incoming(records_from_server).await?;
//!     let outgoing = storage.fetch_outgoing().await?;
//!     // ... upload `outgoing`, then confirm:
//!     storage.record_uploaded(&outgoing, ServerTimestamp(12345)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `extstore::core` - Core types (records, statuses, merge actions)
//! - `extstore::store` - Storage abstraction, SQLite and in-memory backends
//! - `extstore::sync` - The merge engine and planning logic

pub mod error;
pub mod storage;

// Re-export component crates
pub use extstore_core as core;
pub use extstore_store as store;
pub use extstore_sync as sync;

// Re-export main types for convenience
pub use error::{Result, StorageError};
pub use storage::ExtensionStorage;

// Re-export commonly used component types
pub use extstore_core::{
    ExtensionId, LocalRecord, MergeAction, MirrorRecord, OutgoingChange, Payload, RecordGuid,
    ServerTimestamp, StagedRecord, SyncStatus,
};
pub use extstore_store::{MemoryStore, SqliteStore, Store};
pub use extstore_sync::{DiscardedEdit, MergeEngine, MergeReport};
