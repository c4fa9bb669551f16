//! # Extstore Sync
//!
//! Three-way reconciliation between local extension data and server state.
//!
//! ## Overview
//!
//! A sync pass stages records fetched from the server, joins each one
//! against the mirror (last state confirmed uploaded) and the local row
//! (authoritative, possibly edited), plans a resolution per record, and
//! applies the whole batch atomically. Pending local changes then travel
//! the other way as outgoing changes, confirmed back via
//! [`MergeEngine::record_uploaded`].
//!
//! ## Key Properties
//!
//! - **Local wins over silence**: a local edit survives a remote deletion.
//! - **Server wins conflicts**: colliding payloads take the server's side,
//!   with the discarded local edit surfaced in the [`MergeReport`].
//! - **Idempotent**: re-applying the same server records is a no-op.
//! - **Atomic**: a pass either fully applies or leaves local data untouched,
//!   and staging ends every pass empty either way.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use extstore_store::MemoryStore;
//! use extstore_sync::MergeEngine;
//!
//! async fn example() -> extstore_sync::Result<()> {
//!     let engine = MergeEngine::new(Arc::new(MemoryStore::new()));
//!     // engine.stage(records_from_server).await?;
//!     let report = engine.apply_incoming().await?;
//!     println!("applied {} records", report.applied);
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod plan;

pub use engine::{MergeEngine, MergeReport};
pub use error::{Result, SyncError};
pub use plan::{classify, plan_incoming, DiscardedEdit, IncomingState, Plan};
