//! Error type for the content-addressed file store.

use std::path::PathBuf;

/// Errors raised by [`crate::store::FileCas`] operations. Any I/O error
/// aborts the invocation with a contextualized message — there is no
/// recoverable path once the store can't be written to.
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    #[error("failed to write blob to CAS at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to publish blob from {tmp_path} to {path}: {source}")]
    Publish {
        tmp_path: PathBuf,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read blob from CAS at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("requested blob {hash} is not present in the CAS")]
    NotFound { hash: String },
}
