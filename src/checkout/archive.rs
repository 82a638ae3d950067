//! The `archive`/`zip` checkout driver: fetch into the File CAS (or
//! reuse a cache hit), then unpack into a temp directory.

use mrlock_core::InvocationContext;
use mrlock_cas::FileCas;
use mrlock_git::{GitCache, GitOid};

use crate::error::{MrLockError, Result};
use crate::model::{Pragma, RootVariant};

use super::{CheckoutInfo, cmd};

pub struct ArchiveSource<'a> {
    pub fetch: &'a str,
    pub content: Option<&'a str>,
    pub mirrors: &'a [String],
    pub sha256: Option<&'a str>,
    pub sha512: Option<&'a str>,
    pub subdir: Option<&'a str>,
    pub is_zip: bool,
}

pub fn checkout(
    ctx: &InvocationContext,
    cas: &FileCas,
    cache: &GitCache,
    source: ArchiveSource<'_>,
) -> Result<CheckoutInfo> {
    let span = tracing::info_span!("checkout", source = if source.is_zip { "zip" } else { "archive" });
    let _enter = span.enter();

    let content = source.content.map(str::parse::<GitOid>).transpose().map_err(|e| {
        MrLockError::Checkout {
            source: "archive".to_string(),
            detail: format!("invalid content hash: {e}"),
        }
    })?;

    let hash = archive_fetch(ctx, cas, cache, &source, content)?;

    let unpack_dir = tempfile::Builder::new()
        .prefix("mrlock-archive-")
        .tempdir_in(ctx.tmp_workspace_root("archive"))
        .map_err(|e| MrLockError::io("archive unpack tempdir", e))?;
    let bytes = cas.read(&hash)?;
    unpack(ctx, &bytes, unpack_dir.path(), source.is_zip)?;

    let source_dir = match source.subdir {
        Some(sub) if sub != "." => unpack_dir.path().join(sub),
        _ => unpack_dir.path().to_path_buf(),
    };

    let remote_stub = if source.is_zip {
        RootVariant::Zip {
            fetch: source.fetch.to_string(),
            content: Some(hash.to_string()),
            subdir: source.subdir.map(str::to_string),
            mirrors: none_if_empty(source.mirrors),
            sha256: source.sha256.map(str::to_string),
            sha512: source.sha512.map(str::to_string),
            pragma: Pragma::default(),
        }
    } else {
        RootVariant::Archive {
            fetch: source.fetch.to_string(),
            content: Some(hash.to_string()),
            subdir: source.subdir.map(str::to_string),
            mirrors: none_if_empty(source.mirrors),
            sha256: source.sha256.map(str::to_string),
            sha512: source.sha512.map(str::to_string),
            pragma: Pragma::default(),
        }
    };

    Ok(CheckoutInfo {
        source_dir,
        remote_stub,
        remote_subdir: None,
        remote_tree_id: None,
        _temp_dir: Some(unpack_dir),
    })
}

fn none_if_empty(v: &[String]) -> Option<Vec<String>> {
    if v.is_empty() {
        None
    } else {
        Some(v.to_vec())
    }
}

/// Resolve the archive's bytes into the File CAS, returning the blob
/// hash. Tries, in order: File CAS hit, Git-cache blob copy, then each
/// mirror followed by `fetch`, verifying any declared checksums.
fn archive_fetch(
    ctx: &InvocationContext,
    cas: &FileCas,
    cache: &GitCache,
    source: &ArchiveSource<'_>,
    content: Option<GitOid>,
) -> Result<GitOid> {
    if let Some(hash) = content {
        if cas.exists(&hash) {
            return Ok(hash);
        }
        if let Some(blob) = cache.read_object(&hash, "blob")? {
            let (_, written) = cas.add(&blob)?;
            return Ok(written);
        }
    }

    let sources: Vec<&str> = source.mirrors.iter().map(String::as_str).chain(std::iter::once(source.fetch)).collect();
    for url in &sources {
        match try_fetch_one(ctx, url) {
            Ok(bytes) => {
                if let Some(expected) = source.sha256 {
                    let actual = sha256_hex(&bytes);
                    if actual != expected {
                        tracing::warn!(url, expected, actual, "sha256 mismatch, skipping source");
                        continue;
                    }
                }
                if let Some(expected) = source.sha512 {
                    let actual = sha512_hex(&bytes);
                    if actual != expected {
                        tracing::warn!(url, expected, actual, "sha512 mismatch, skipping source");
                        continue;
                    }
                }
                let (_, hash) = cas.add(&bytes)?;
                if let Some(expected) = content {
                    if hash != expected {
                        tracing::warn!(url, %expected, actual = %hash, "content mismatch, skipping source");
                        continue;
                    }
                }
                return Ok(hash);
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "archive fetch failed, trying next source");
            }
        }
    }

    Err(MrLockError::ArchiveFetchExhausted {
        repo: source.fetch.to_string(),
        tried: sources.len(),
    })
}

fn try_fetch_one(ctx: &InvocationContext, url: &str) -> Result<Vec<u8>> {
    let out = ctx.launcher().run_checked(
        &cmd(&["wget", "-q", "-O", "-", url]),
        std::path::Path::new("."),
        &std::collections::BTreeMap::new(),
        None,
    )?;
    Ok(out.stdout)
}

fn unpack(ctx: &InvocationContext, bytes: &[u8], target: &std::path::Path, is_zip: bool) -> Result<()> {
    std::fs::create_dir_all(target).map_err(|e| MrLockError::io(target.display().to_string(), e))?;
    if is_zip {
        let target_str = target.display().to_string();
        let primary = ctx.launcher().run_prefixed(
            &cmd(&["unzip", "-q", "-d", &target_str, "-"]),
            target,
            &std::collections::BTreeMap::new(),
            Some(bytes),
        );
        if primary.map(|o| o.success()).unwrap_or(false) {
            return Ok(());
        }
        let dest_flag = format!("-o{target_str}");
        ctx.launcher().run_checked(
            &cmd(&["7z", "x", &dest_flag, "-si"]),
            target,
            &std::collections::BTreeMap::new(),
            Some(bytes),
        )?;
    } else {
        let target_str = target.display().to_string();
        ctx.launcher().run_checked(
            &cmd(&["tar", "xf", "-", "-C", &target_str]),
            target,
            &std::collections::BTreeMap::new(),
            Some(bytes),
        )?;
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_string(&hasher.finalize())
}

fn sha512_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha512};
    let mut hasher = Sha512::new();
    hasher.update(bytes);
    hex_string(&hasher.finalize())
}

fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

