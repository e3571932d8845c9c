//! Error types for the sync engines.

use thiserror::Error;
use vaultgit_git::GitError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the sync engines.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A git invocation failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// An HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A host file operation failed.
    #[error("host file error: {0}")]
    Host(String),

    /// A merge could not be completed.
    #[error("merge failed: {0}")]
    MergeFailed(String),

    /// The network path is halted after an auth failure.
    #[error("sync halted: credentials rejected")]
    Halted,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
