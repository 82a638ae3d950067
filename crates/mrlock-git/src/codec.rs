//! Git object hashing and the canonical tree encoding.
//!
//! A Git object id is the SHA-1 digest of the object framed as
//! `"<type> <len>\0" || content`. This module computes that digest and
//! encodes/decodes the two object kinds the cache needs: `blob` and `tree`.

use crate::oid::{EntryMode, GitOid, TreeEntry};
use sha1::{Digest, Sha1};

/// Compute the Git object id of `content` framed under object type `kind`
/// (`"blob"` or `"tree"`), without writing anything to disk.
pub fn hash_object(kind: &str, content: &[u8]) -> GitOid {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_bytes());
    hasher.update(b" ");
    hasher.update(content.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(content);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest);
    GitOid::from_bytes(bytes)
}

/// Hash a blob's raw payload.
pub fn hash_blob(content: &[u8]) -> GitOid {
    hash_object("blob", content)
}

/// Key used to sort tree entries: Git's canonical ordering compares names
/// as if every directory name had a trailing `/` appended, so that e.g.
/// `"foo"` (a file) sorts before `"foo.c"` but `"foo/"` (a directory) sorts
/// after it.
fn sort_key(entry: &TreeEntry) -> String {
    if entry.mode.is_tree() {
        format!("{}/", entry.name)
    } else {
        entry.name.clone()
    }
}

/// Encode a set of tree entries into the raw (unframed) tree object
/// payload, sorting them into Git's canonical order first.
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let mut out = Vec::new();
    for entry in sorted {
        out.extend_from_slice(entry.mode.octal().as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.oid.as_bytes());
    }
    out
}

/// Compute the tree object id for a set of entries: encode then hash.
pub fn hash_tree(entries: &[TreeEntry]) -> GitOid {
    hash_object("tree", &encode_tree(&entries.to_vec()))
}

/// Decode a raw tree object payload (as returned by `git cat-file tree
/// <id>`) back into entries.
pub fn decode_tree(raw: &[u8]) -> Result<Vec<TreeEntry>, String> {
    let mut entries = Vec::new();
    let mut rest = raw;
    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| "missing space in tree entry header".to_string())?;
        let mode_str = std::str::from_utf8(&rest[..space])
            .map_err(|e| format!("invalid mode bytes: {e}"))?;
        let mode = mode_from_octal(mode_str)?;
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| "missing NUL terminator in tree entry".to_string())?;
        let name = std::str::from_utf8(&rest[..nul])
            .map_err(|e| format!("invalid name bytes: {e}"))?
            .to_string();
        rest = &rest[nul + 1..];

        if rest.len() < 20 {
            return Err("truncated tree entry hash".to_string());
        }
        let mut oid_bytes = [0u8; 20];
        oid_bytes.copy_from_slice(&rest[..20]);
        rest = &rest[20..];

        entries.push(TreeEntry {
            name,
            mode,
            oid: GitOid::from_bytes(oid_bytes),
        });
    }
    Ok(entries)
}

fn mode_from_octal(s: &str) -> Result<EntryMode, String> {
    match s {
        "100644" | "644" => Ok(EntryMode::Blob),
        "100755" | "755" => Ok(EntryMode::BlobExecutable),
        "40000" => Ok(EntryMode::Tree),
        "120000" => Ok(EntryMode::Link),
        other => Err(format!("unrecognized tree entry mode {other}")),
    }
}
