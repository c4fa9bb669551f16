//! # Extstore Store
//!
//! Storage abstraction for extstore. Provides a trait-based interface over
//! the local/mirror/staging triad with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts the three repositories behind the [`Store`]
//! trait, keeping the merge engine storage-agnostic. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`IncomingRecord`] - A staged record joined with mirror and local rows
//! - [`ResolvedRecord`] - A staged record plus the engine's resolution
//!
//! ## Design Notes
//!
//! - **Whole-pass transactions**: [`Store::apply_merge`] commits every
//!   resolution, mirror update, and staging delete together or not at all.
//! - **Transient staging**: in SQLite, staging is a TEMP table. Staged rows
//!   cannot survive a restart, so a crash mid-pass leaves durable state
//!   either pre-pass or fully merged, never mixed.
//! - **Invisible tombstones**: `get` reports tombstones as absent; pending
//!   deletion is internal bookkeeping.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{IncomingRecord, ResolvedRecord, Store};
