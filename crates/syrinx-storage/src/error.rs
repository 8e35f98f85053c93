#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used by `syrinx-storage`.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by storage adapters.
///
/// Callers treat these as opaque and propagate them verbatim; retry policy
/// lives inside the adapter. An error never poisons the adapter: subsequent
/// calls with fresh inputs must be accepted.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage failed: {0}")]
    Failed(String),
}
