//! Error types for Git object hashing and the Git cache.
//!
//! [`GitError`] is the single error type returned by the codec and cache
//! modules. It uses rich enum variants so callers can match on specific
//! failure modes (missing object, hash mismatch, subprocess failure)
//! without parsing error messages.

use std::path::PathBuf;

use mrlock_core::CoreError;
use thiserror::Error;

/// Errors returned by object-codec and Git-cache operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// A requested object, commit, or tree was not found in the cache.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// An OID string could not be parsed or was otherwise invalid.
    #[error("invalid object id `{value}`: {reason}")]
    InvalidOid { value: String, reason: String },

    /// The computed hash of written content did not match the expected one.
    #[error("hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    /// A git cache repository is required at `path` but does not exist yet
    /// and could not be initialized.
    #[error("git cache at {} is not initialized: {message}", path.display())]
    CacheNotInitialized { path: PathBuf, message: String },

    /// Every mirror (and the primary URL) failed to produce the requested
    /// commit or tree.
    #[error("failed to fetch {what} from any of {sources:?}")]
    AllSourcesFailed { what: String, sources: Vec<String> },

    /// An I/O error occurred while reading or writing loose objects.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A subprocess (git, or a locking/launcher primitive) failed.
    #[error("subprocess error: {0}")]
    Process(#[from] CoreError),

    /// The underlying `git` binary returned an unclassified error.
    #[error("git backend error: {message}")]
    Backend { message: String },
}
