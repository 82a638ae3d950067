//! The `git tree` checkout driver: runs a generator command (or a
//! command produced by a `cmd gen` command), imports the resulting
//! directory into the Git cache byte-for-byte, and tags it.

use std::collections::BTreeMap;

use mrlock_core::InvocationContext;
use mrlock_git::{GitCache, GitOid, codec, object_store};

use crate::error::{MrLockError, Result};
use crate::model::{Pragma, RootVariant};

use super::CheckoutInfo;

pub struct GitTreeSource<'a> {
    pub cmd: Option<&'a [String]>,
    pub cmd_gen: Option<&'a [String]>,
    pub env: &'a BTreeMap<String, String>,
    pub inherit_env: &'a [String],
    pub subdir: Option<&'a str>,
}

pub fn checkout(ctx: &InvocationContext, cache: &GitCache, source: GitTreeSource<'_>) -> Result<CheckoutInfo> {
    let span = tracing::info_span!("checkout", source = "git tree");
    let _enter = span.enter();

    match (source.cmd.is_some(), source.cmd_gen.is_some()) {
        (true, false) | (false, true) => {}
        (given_cmd, given_gen) => {
            return Err(MrLockError::ExactlyOneOfCmd {
                repo: "git tree".to_string(),
                given: if given_cmd && given_gen { "both" } else { "neither" },
            });
        }
    }

    let resolved_cmd: Vec<String> = match source.cmd {
        Some(c) => c.to_vec(),
        None => {
            let gen = source.cmd_gen.expect("exactly-one check above");
            let out = ctx
                .launcher()
                .run_checked(gen, std::path::Path::new("."), source.env, None)?;
            serde_json::from_str(&out.stdout_string()).map_err(|e| MrLockError::Checkout {
                source: "git tree".to_string(),
                detail: format!("cmd gen stdout was not a JSON list: {e}"),
            })?
        }
    };

    let work_dir = tempfile::Builder::new()
        .prefix("mrlock-git-tree-")
        .tempdir_in(ctx.tmp_workspace_root("git-tree"))
        .map_err(|e| MrLockError::io("git tree work tempdir", e))?;
    ctx.launcher()
        .run_checked(&resolved_cmd, work_dir.path(), source.env, None)?;

    cache.ensure_init()?;
    let tree_id = hash_dir(work_dir.path(), cache.root())?;
    let cmd_json = serde_json::to_string(&resolved_cmd).unwrap_or_default();
    let tag_message = codec::hash_object("blob", cmd_json.as_bytes()).to_string();
    let commit = cache.commit_tree(&tree_id, &tag_message)?;
    cache.keep(&commit)?;

    let source_dir = match source.subdir {
        Some(sub) if sub != "." => work_dir.path().join(sub),
        _ => work_dir.path().to_path_buf(),
    };

    let remote_stub = RootVariant::GitTree {
        id: tree_id.to_string(),
        cmd: Some(resolved_cmd),
        env: if source.env.is_empty() {
            None
        } else {
            Some(source.env.clone())
        },
        inherit_env: if source.inherit_env.is_empty() {
            None
        } else {
            Some(source.inherit_env.to_vec())
        },
        pragma: Pragma::default(),
    };

    Ok(CheckoutInfo {
        source_dir,
        remote_stub,
        remote_subdir: source.subdir.map(str::to_string),
        remote_tree_id: Some(tree_id),
        _temp_dir: Some(work_dir),
    })
}

/// Hash every file under `dir` directly (preserving empty directories and
/// dotfiles that a plain `git add` would skip) and write the resulting
/// tree, bottom-up, as loose objects directly into the cache's own object
/// database at `git_dir` (so the later `commit-tree` in that same
/// repository can see the tree it is committing).
fn hash_dir(dir: &std::path::Path, git_dir: &std::path::Path) -> Result<GitOid> {
    use mrlock_git::oid::{EntryMode, TreeEntry};

    let mut entries = Vec::new();
    let mut read_dir: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| MrLockError::io(dir.display().to_string(), e))?
        .filter_map(std::result::Result::ok)
        .collect();
    read_dir.sort_by_key(std::fs::DirEntry::file_name);

    for entry in read_dir {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let metadata = entry
            .metadata()
            .map_err(|e| MrLockError::io(path.display().to_string(), e))?;
        if metadata.is_dir() {
            let oid = hash_dir(&path, git_dir)?;
            entries.push(TreeEntry {
                name,
                mode: EntryMode::Tree,
                oid,
            });
        } else if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&path).map_err(|e| MrLockError::io(path.display().to_string(), e))?;
            let oid = object_store::write_blob(git_dir, target.to_string_lossy().as_bytes())?;
            entries.push(TreeEntry {
                name,
                mode: EntryMode::Link,
                oid,
            });
        } else {
            let content = std::fs::read(&path).map_err(|e| MrLockError::io(path.display().to_string(), e))?;
            let oid = object_store::write_blob(git_dir, &content)?;
            let mode = if GitCache::is_executable(&metadata) {
                EntryMode::BlobExecutable
            } else {
                EntryMode::Blob
            };
            entries.push(TreeEntry { name, mode, oid });
        }
    }

    object_store::write_tree(git_dir, &entries).map_err(Into::into)
}
