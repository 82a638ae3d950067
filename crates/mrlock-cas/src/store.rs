//! Content-addressed file store, keyed by the Git-blob hash of its
//! contents, shared across concurrent invocations via atomic publish.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use mrlock_git::GitOid;
use mrlock_git::codec::hash_blob;

use crate::error::CasError;

/// A directory tree of hash-keyed, read-only blobs at
/// `<root>/<xx>/<rest>` where `<xx><rest>` is the 40-hex Git blob hash.
#[derive(Debug, Clone)]
pub struct FileCas {
    root: PathBuf,
}

impl FileCas {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a blob with the given hash would live at, regardless of
    /// whether it has actually been published.
    pub fn path(&self, hash: &GitOid) -> PathBuf {
        let hex = hash.to_string();
        self.root.join(&hex[0..2]).join(&hex[2..])
    }

    pub fn exists(&self, hash: &GitOid) -> bool {
        self.path(hash).is_file()
    }

    /// Write `data` into the store, returning its path and Git-blob hash.
    /// Writes to a uniquely suffixed temp file in the same directory
    /// (suffixed with the process id so concurrent writers never
    /// collide), syncs it, makes it read-only, zeroes its mtime, then
    /// atomically renames it into place. A no-op beyond hashing if the
    /// target already exists.
    pub fn add(&self, data: &[u8]) -> Result<(PathBuf, GitOid), CasError> {
        let hash = hash_blob(data);
        let path = self.path(&hash);
        if path.is_file() {
            return Ok((path, hash));
        }

        let dir = path.parent().expect("path has a parent under root");
        std::fs::create_dir_all(dir).map_err(|source| CasError::Write {
            path: path.clone(),
            source,
        })?;

        let tmp_path = dir.join(format!(".tmp-{}-{}", std::process::id(), hash));
        {
            let mut file = std::fs::File::create(&tmp_path).map_err(|source| CasError::Write {
                path: tmp_path.clone(),
                source,
            })?;
            file.write_all(data).map_err(|source| CasError::Write {
                path: tmp_path.clone(),
                source,
            })?;
            file.sync_all().map_err(|source| CasError::Write {
                path: tmp_path.clone(),
                source,
            })?;
        }

        let mut perms = std::fs::metadata(&tmp_path)
            .map_err(|source| CasError::Write {
                path: tmp_path.clone(),
                source,
            })?
            .permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&tmp_path, perms).map_err(|source| CasError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        filetime::set_file_mtime(&tmp_path, filetime::FileTime::zero()).map_err(|source| {
            CasError::Write {
                path: tmp_path.clone(),
                source,
            }
        })?;

        match std::fs::rename(&tmp_path, &path) {
            Ok(()) => Ok((path, hash)),
            Err(source) => {
                // Another writer may have published it first; that's a
                // success, not a failure, for a content-addressed store.
                if path.is_file() {
                    let _ = std::fs::remove_file(&tmp_path);
                    Ok((path, hash))
                } else {
                    Err(CasError::Publish {
                        tmp_path,
                        path,
                        source,
                    })
                }
            }
        }
    }

    /// Read a previously published blob back out.
    pub fn read(&self, hash: &GitOid) -> Result<Vec<u8>, CasError> {
        let path = self.path(hash);
        std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CasError::NotFound {
                    hash: hash.to_string(),
                }
            } else {
                CasError::Read { path, source }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn add_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cas = FileCas::new(dir.path().to_path_buf());
        let (path, hash) = cas.add(b"hello world").unwrap();
        assert!(cas.exists(&hash));
        assert_eq!(cas.read(&hash).unwrap(), b"hello world");
        assert_eq!(path, cas.path(&hash));
    }

    #[test]
    fn git_hash_equals_cas_key() {
        let dir = tempfile::tempdir().unwrap();
        let cas = FileCas::new(dir.path().to_path_buf());
        let (_, hash) = cas.add(b"some content").unwrap();
        assert_eq!(hash, hash_blob(b"some content"));
    }

    #[test]
    fn published_blob_is_read_only_with_zero_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let cas = FileCas::new(dir.path().to_path_buf());
        let (path, _) = cas.add(b"payload").unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.permissions().readonly());
        assert_eq!(meta.permissions().mode() & 0o222, 0);
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime, filetime::FileTime::zero());
    }

    #[test]
    fn adding_existing_blob_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cas = FileCas::new(dir.path().to_path_buf());
        let (path1, hash1) = cas.add(b"dup").unwrap();
        let (path2, hash2) = cas.add(b"dup").unwrap();
        assert_eq!(path1, path2);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn missing_blob_reads_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cas = FileCas::new(dir.path().to_path_buf());
        let err = cas.read(&GitOid::ZERO).unwrap_err();
        assert!(matches!(err, CasError::NotFound { .. }));
    }
}
