//! The clone engine: materializes a repository's content onto the local
//! filesystem at a user-requested destination, then rewrites that
//! repository's description to point at the materialized directory.

use std::path::{Path, PathBuf};

use mrlock_core::InvocationContext;
use mrlock_core::locking::{FileLock, LockMode};
use mrlock_git::{GitCache, GitOid};
use mrlock_cas::FileCas;

use crate::checkout::{archive, git as git_driver};
use crate::error::{MrLockError, Result};
use crate::model::{Pragma, RepoGraph, RepositoryDescription, RootSlot, RootVariant};

/// Follow string-reference roots until a concrete object is reached.
fn resolve_object<'a>(graph: &'a RepoGraph, name: &str) -> Option<(&'a str, &'a RootVariant)> {
    let mut current = name;
    loop {
        let desc = graph.get(current)?;
        match &desc.repository {
            RootSlot::Object(obj) => return Some((current, obj)),
            RootSlot::Name(next) => current = next,
        }
    }
}

fn clone_lock_path(clone_to: &Path) -> PathBuf {
    clone_to
        .parent()
        .map_or_else(|| PathBuf::from("clone.lock"), |p| p.join("clone.lock"))
}

fn copy_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(|e| MrLockError::io(dst.display().to_string(), e))?;
    for entry in std::fs::read_dir(src).map_err(|e| MrLockError::io(src.display().to_string(), e))? {
        let entry = entry.map_err(|e| MrLockError::io(src.display().to_string(), e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let metadata = entry
            .metadata()
            .map_err(|e| MrLockError::io(from.display().to_string(), e))?;
        if metadata.is_dir() {
            copy_recursive(&from, &to)?;
        } else if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&from).map_err(|e| MrLockError::io(from.display().to_string(), e))?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(target, &to).map_err(|e| MrLockError::io(to.display().to_string(), e))?;
            #[cfg(not(unix))]
            let _ = target;
        } else {
            std::fs::copy(&from, &to).map_err(|e| MrLockError::io(to.display().to_string(), e))?;
        }
    }
    Ok(())
}

/// Materialize `repo_name`'s content at `clone_to` and compute the `file`
/// root its description should be rewritten to. Returns the name whose
/// description should be rewritten (the workspace-root repository
/// `repo_name` resolves to via string references) together with that new
/// root; the caller is responsible for merging it into the graph, so that
/// concurrent clones never race on a shared mutable graph.
pub fn clone_repository(
    ctx: &InvocationContext,
    cas: &FileCas,
    cache: &GitCache,
    graph: &RepoGraph,
    repo_name: &str,
    clone_to: &Path,
) -> Result<(String, Option<RootVariant>)> {
    let span = tracing::info_span!("clone", repo = repo_name, to = %clone_to.display());
    let _enter = span.enter();

    let _lock = FileLock::acquire(&clone_lock_path(clone_to), LockMode::Exclusive)?;

    let (target_name, root) = {
        let (name, obj) = resolve_object(graph, repo_name).ok_or_else(|| MrLockError::UnknownRepository {
            name: repo_name.to_string(),
            from: "clone".to_string(),
        })?;
        (name.to_string(), obj.clone())
    };

    if clone_to.is_dir() {
        let occupied = std::fs::read_dir(clone_to)
            .map_err(|e| MrLockError::io(clone_to.display().to_string(), e))?
            .next()
            .is_some();
        if occupied {
            return Ok((target_name, None));
        }
    } else if clone_to.exists() {
        return Err(MrLockError::CloneDestinationNotDir {
            path: clone_to.display().to_string(),
        });
    }

    let mut subdir_suffix: Option<String> = None;
    let pragma = root.pragma().clone();

    match &root {
        RootVariant::File { path, .. } => {
            copy_recursive(Path::new(path), clone_to)?;
        }
        RootVariant::Git {
            repository,
            branch,
            commit,
            subdir,
            mirrors,
            inherit_env,
            ..
        } => {
            let commit: GitOid = commit
                .as_deref()
                .ok_or_else(|| MrLockError::Checkout {
                    source: "clone".to_string(),
                    detail: "git root has no pinned commit to clone".to_string(),
                })?
                .parse()
                .map_err(|e| MrLockError::Checkout {
                    source: "clone".to_string(),
                    detail: format!("invalid commit: {e}"),
                })?;
            clone_git(ctx, cache, repository, branch, commit, mirrors.as_deref().unwrap_or(&[]), clone_to)?;
            let _ = inherit_env;
            subdir_suffix = subdir.clone();
        }
        RootVariant::Archive {
            fetch,
            content,
            subdir,
            mirrors,
            sha256,
            sha512,
            ..
        }
        | RootVariant::Zip {
            fetch,
            content,
            subdir,
            mirrors,
            sha256,
            sha512,
            ..
        } => {
            let is_zip = matches!(root, RootVariant::Zip { .. });
            let info = archive::checkout(
                ctx,
                cas,
                cache,
                archive::ArchiveSource {
                    fetch,
                    content: content.as_deref(),
                    mirrors: mirrors.as_deref().unwrap_or(&[]),
                    sha256: sha256.as_deref(),
                    sha512: sha512.as_deref(),
                    subdir: subdir.as_deref(),
                    is_zip,
                },
            )?;
            copy_recursive(&info.source_dir, clone_to)?;
        }
        RootVariant::ForeignFile { name, executable, .. } => {
            return Err(MrLockError::Checkout {
                source: "clone".to_string(),
                detail: format!("cloning a foreign file root ({name}) is not meaningful; clone its containing repository instead, executable={executable:?}"),
            });
        }
        RootVariant::Distdir { repositories, .. } => {
            std::fs::create_dir_all(clone_to).map_err(|e| MrLockError::io(clone_to.display().to_string(), e))?;
            for entry_name in repositories {
                if let Some((_, entry_root)) = resolve_object(graph, entry_name) {
                    if let RootVariant::File { path, .. } = entry_root {
                        copy_recursive(Path::new(path), &clone_to.join(entry_name))?;
                    }
                }
            }
        }
        RootVariant::GitTree { id, .. } => {
            let tree: GitOid = id.parse().map_err(|e| MrLockError::Checkout {
                source: "clone".to_string(),
                detail: format!("invalid git tree id: {e}"),
            })?;
            cache.stage_tree(&tree, clone_to)?;
        }
        RootVariant::Computed { .. } | RootVariant::TreeStructure { .. } => {
            tracing::warn!(repo = target_name, "skipping clone of a computed/tree-structure root");
            return Ok((target_name, None));
        }
    }

    let abs = std::fs::canonicalize(clone_to).unwrap_or_else(|_| clone_to.to_path_buf());
    let path = match subdir_suffix {
        Some(sub) if sub != "." => abs.join(sub).display().to_string(),
        _ => abs.display().to_string(),
    };

    let new_file_root = RootVariant::File {
        path,
        pragma: Pragma {
            special: pragma.special,
            absent: None,
            to_git: pragma.to_git,
        },
    };

    Ok((target_name, Some(new_file_root)))
}

fn clone_git(
    ctx: &InvocationContext,
    cache: &GitCache,
    repository: &str,
    branch: &str,
    commit: GitOid,
    mirrors: &[String],
    clone_to: &Path,
) -> Result<()> {
    if cache.commit_present(&commit) {
        cache.stage_tree(&cache.tree_of(&commit, ".")?, clone_to)?;
        return Ok(());
    }
    let info = git_driver::checkout(
        ctx,
        cache,
        git_driver::GitSource {
            repository,
            branch,
            commit: Some(&commit.to_string()),
            mirrors,
            inherit_env: &[],
        },
    )?;
    copy_recursive(&info.source_dir, clone_to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_root_clone_copies_directory_tree() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"hi").unwrap();
        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("sub/b.txt"), b"lo").unwrap();

        let dst = tempfile::tempdir().unwrap();
        let clone_to = dst.path().join("out");

        let mut graph = RepoGraph::new();
        graph.insert(
            "main".to_string(),
            RepositoryDescription {
                repository: RootSlot::Object(RootVariant::File {
                    path: src.path().display().to_string(),
                    pragma: Pragma::default(),
                }),
                target_root: None,
                rule_root: None,
                expression_root: None,
                target_file_name: None,
                rule_file_name: None,
                expression_file_name: None,
                bindings: None,
            },
        );

        let ctx = InvocationContext::default();
        let cache = GitCache::new(
            dst.path().join("git-cache"),
            PathBuf::from("git"),
            mrlock_core::process::Launcher::default(),
        );
        let cas = FileCas::new(dst.path().join("cas"));

        let (target, new_root) = clone_repository(&ctx, &cas, &cache, &graph, "main", &clone_to).unwrap();
        assert_eq!(target, "main");
        assert!(clone_to.join("a.txt").exists());
        assert!(clone_to.join("sub/b.txt").exists());
        match new_root {
            Some(RootVariant::File { path, .. }) => {
                assert_eq!(Path::new(&path), std::fs::canonicalize(&clone_to).unwrap());
            }
            other => panic!("expected file root, got {other:?}"),
        }
    }
}
