//! Error types for locking and subprocess plumbing.

use std::path::PathBuf;

/// Errors raised by the locking and process-launcher primitives.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("failed to acquire {mode} lock on {path}: {source}")]
    Lock {
        path: PathBuf,
        mode: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open lock file {path}: {source}")]
    LockFileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("command {command:?} failed with exit code {exit_code:?}:\n{stderr}")]
    CommandFailed {
        command: Vec<String>,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to launch command {command:?}: {source}")]
    Spawn {
        command: Vec<String>,
        #[source]
        source: std::io::Error,
    },
}
