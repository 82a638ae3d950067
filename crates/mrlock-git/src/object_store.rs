//! Writing loose Git objects directly to a repository's object database.
//!
//! Used to hand-write blobs and trees for a directory tree produced by a
//! `git tree` generator command — Git's own plumbing would skip empty
//! directories and respect `.gitignore`-like filtering, which this writer
//! deliberately does not do, since the generator's output must be staged
//! byte-for-byte.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::codec::{encode_tree, hash_object};
use crate::error::GitError;
use crate::oid::{GitOid, TreeEntry};

/// Write `content` as a loose object of type `kind` (`"blob"` or `"tree"`)
/// into the `.git/objects` directory under `git_dir`. Returns the object's
/// id. A no-op (besides computing the id) if the object is already present.
pub fn write_loose_object(git_dir: &Path, kind: &str, content: &[u8]) -> Result<GitOid, GitError> {
    let oid = hash_object(kind, content);
    let path = loose_object_path(git_dir, &oid);
    if path.exists() {
        return Ok(oid);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut framed = Vec::with_capacity(content.len() + kind.len() + 16);
    framed.extend_from_slice(kind.as_bytes());
    framed.push(b' ');
    framed.extend_from_slice(content.len().to_string().as_bytes());
    framed.push(0);
    framed.extend_from_slice(content);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&framed)?;
    let compressed = encoder.finish()?;

    let tmp_path = path.with_extension(format!("tmp-{}", std::process::id()));
    std::fs::write(&tmp_path, &compressed)?;
    std::fs::rename(&tmp_path, &path)?;

    Ok(oid)
}

/// Write a blob object.
pub fn write_blob(git_dir: &Path, content: &[u8]) -> Result<GitOid, GitError> {
    write_loose_object(git_dir, "blob", content)
}

/// Write a tree object from already-resolved entries (their child objects
/// must already be written).
pub fn write_tree(git_dir: &Path, entries: &[TreeEntry]) -> Result<GitOid, GitError> {
    write_loose_object(git_dir, "tree", &encode_tree(entries))
}

fn loose_object_path(git_dir: &Path, oid: &GitOid) -> PathBuf {
    let hex = oid.to_string();
    git_dir
        .join("objects")
        .join(&hex[0..2])
        .join(&hex[2..])
}

/// Decompress and return the framed content (with the `"<type> <len>\0"`
/// header stripped) of a loose object, or `None` if it is not present.
pub fn read_loose_object(git_dir: &Path, oid: &GitOid) -> Result<Option<Vec<u8>>, GitError> {
    use flate2::read::ZlibDecoder;
    use std::io::Read as _;

    let path = loose_object_path(git_dir, oid);
    if !path.exists() {
        return Ok(None);
    }
    let compressed = std::fs::read(&path)?;
    let mut decoder = ZlibDecoder::new(&compressed[..]);
    let mut framed = Vec::new();
    decoder.read_to_end(&mut framed)?;

    let nul = framed
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| GitError::Backend {
            message: format!("loose object {oid} has no NUL header terminator"),
        })?;
    Ok(Some(framed[nul + 1..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        let oid = write_blob(&git_dir, b"hello\n").unwrap();
        assert_eq!(oid.to_string(), "ce013625030ba8dba906f756967f9e9ca394464a");
        let content = read_loose_object(&git_dir, &oid).unwrap().unwrap();
        assert_eq!(content, b"hello\n");
    }

    #[test]
    fn writing_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        let a = write_blob(&git_dir, b"same content").unwrap();
        let b = write_blob(&git_dir, b"same content").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_object_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        assert!(read_loose_object(&git_dir, &GitOid::ZERO).unwrap().is_none());
    }
}
