//! Error types for the reconciler.

use tandem_store::StoreError;
use thiserror::Error;

/// Result type for reconciler operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during reconciliation.
///
/// Most failures are recovered inside the driver (rows and tables are
/// skipped with a log line); these variants are what escapes to the
/// caller.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store error while reading or writing a database file.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error outside the store (worker thread spawn).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker thread panicked before producing a report.
    #[error("sync worker panicked: {message}")]
    WorkerPanicked {
        /// Panic payload, if it was a string.
        message: String,
    },
}

impl SyncError {
    /// Creates a worker-panicked error.
    pub fn worker_panicked(message: impl Into<String>) -> Self {
        Self::WorkerPanicked {
            message: message.into(),
        }
    }
}
