//! Error types for quorum-state

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Run not found
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// Run is not in the state the operation requires
    #[error("run {run_id} is {status}, expected {expected}")]
    InvalidRunState {
        run_id: String,
        status: String,
        expected: String,
    },

    /// Digest string is not 64 hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Stored content no longer matches its recorded digest
    #[error("digest mismatch for run {run_id}: expected {expected}, got {actual}")]
    DigestMismatch {
        run_id: String,
        expected: String,
        actual: String,
    },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
