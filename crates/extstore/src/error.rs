//! Error types for the unified storage API.

use extstore_core::CoreError;
use extstore_store::StoreError;
use extstore_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Invariant violation in a record.
    #[error("record error: {0}")]
    Core(#[from] CoreError),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync reconciliation error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
