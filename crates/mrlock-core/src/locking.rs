//! Advisory shared/exclusive file locks on a named path.
//!
//! Locks are scoped to the lifetime of a [`FileLock`] guard: dropping the
//! guard releases the lock. Nesting guards in a single scope and letting
//! them go out of scope in reverse declaration order gives the LIFO release
//! order the repository-graph build relies on (e.g. a per-clone lock
//! acquired inside a shared GC-barrier lock is always released first).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use crate::error::CoreError;

/// Which kind of advisory lock to take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// Multiple holders allowed; excludes exclusive holders.
    Shared,
    /// Single holder; excludes all other holders.
    Exclusive,
}

impl LockMode {
    fn as_str(self) -> &'static str {
        match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
        }
    }
}

/// A held advisory lock on `path`. The lock is released when this value is
/// dropped.
pub struct FileLock {
    path: PathBuf,
    mode: LockMode,
    // Kept alive only to hold the OS lock; never read.
    _file: File,
}

impl FileLock {
    /// Acquire a lock on `path`, creating the lock file if it does not
    /// exist. Shared locks open the file in append mode so concurrent
    /// shared holders never truncate each other's placeholder content.
    pub fn acquire(path: &Path, mode: LockMode) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CoreError::LockFileOpen {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let file = match mode {
            LockMode::Shared => OpenOptions::new()
                .create(true)
                .append(true)
                .read(true)
                .open(path),
            LockMode::Exclusive => OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(path),
        }
        .map_err(|source| CoreError::LockFileOpen {
            path: path.to_path_buf(),
            source,
        })?;

        match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        }
        .map_err(|source| CoreError::Lock {
            path: path.to_path_buf(),
            mode: mode.as_str(),
            source,
        })?;

        tracing::debug!(path = %path.display(), mode = mode.as_str(), "lock acquired");

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            _file: file,
        })
    }

    /// Acquire an exclusive lock, retrying up to `attempts` times with the
    /// given action between attempts. Used for the tag-keep race described
    /// for the Git cache, where the lock is short-lived and contended.
    pub fn acquire_with_retries(
        path: &Path,
        mode: LockMode,
        attempts: u32,
    ) -> Result<Self, CoreError> {
        let mut last_err = None;
        for attempt in 0..attempts.max(1) {
            match Self::acquire(path, mode) {
                Ok(lock) => return Ok(lock),
                Err(err) => {
                    tracing::warn!(attempt, %err, "lock acquisition failed, retrying");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.expect("attempts >= 1"))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if FileExt::unlock(&self._file).is_err() {
            tracing::warn!(path = %self.path.display(), "failed to release lock cleanly");
        }
        tracing::debug!(path = %self.path.display(), mode = self.mode.as_str(), "lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_locks_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.lock");
        let a = FileLock::acquire(&path, LockMode::Shared).unwrap();
        let b = FileLock::acquire(&path, LockMode::Shared).unwrap();
        drop(a);
        drop(b);
    }

    #[test]
    fn exclusive_lock_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("init_open.lock");
        let lock = FileLock::acquire(&path, LockMode::Exclusive).unwrap();
        assert!(path.exists());
        drop(lock);
    }

    #[test]
    fn lifo_release_order_via_scoping() {
        let dir = tempfile::tempdir().unwrap();
        let outer_path = dir.path().join("gc.lock");
        let inner_path = dir.path().join("clone.lock");
        let outer = FileLock::acquire(&outer_path, LockMode::Shared).unwrap();
        {
            let inner = FileLock::acquire(&inner_path, LockMode::Exclusive).unwrap();
            drop(inner);
        }
        drop(outer);
    }
}
