//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during merge-engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store operation failed. The pass is aborted and surfaced to the
    /// sync orchestrator, which decides on retry/backoff.
    #[error("store error: {0}")]
    Store(#[from] extstore_store::StoreError),

    /// Record data violated an entity invariant mid-merge.
    #[error("core error: {0}")]
    Core(#[from] extstore_core::CoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
