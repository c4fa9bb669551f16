//! Error types for the store module.

use thiserror::Error;

use extstore_core::CoreError;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite. Fatal to the current operation; the
    /// caller decides on retry.
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// A row violated an entity invariant (e.g. a clean tombstone). This is
    /// an engine bug, never swallowed.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Data read back from storage could not be interpreted.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Async runtime error (blocking task failed to run).
    #[error("runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        // Surface CHECK/UNIQUE failures as contract errors, not plumbing.
        if let rusqlite::Error::SqliteFailure(ffi_err, ref msg) = e {
            if ffi_err.code == rusqlite::ErrorCode::ConstraintViolation {
                return StoreError::Constraint(
                    msg.clone().unwrap_or_else(|| ffi_err.to_string()),
                );
            }
        }
        StoreError::Database(e)
    }
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::TombstoneMarkedClean(_) | CoreError::InvalidTransition { .. } => {
                StoreError::Constraint(e.to_string())
            }
            CoreError::InvalidStatus(_) => StoreError::InvalidData(e.to_string()),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
