//! The `git` checkout driver: resolves a branch/commit, ensures it is in
//! the shared Git cache, and materializes a working directory from it.

use std::collections::BTreeMap;

use mrlock_core::InvocationContext;
use mrlock_core::process::nobody_git_env;
use mrlock_git::{GitCache, GitOid};

use crate::error::{MrLockError, Result};
use crate::model::{Pragma, RootVariant};

use super::{CheckoutInfo, git_binary_args};

pub struct GitSource<'a> {
    pub repository: &'a str,
    pub branch: &'a str,
    pub commit: Option<&'a str>,
    pub mirrors: &'a [String],
    pub inherit_env: &'a [String],
}

pub fn checkout(ctx: &InvocationContext, cache: &GitCache, source: GitSource<'_>) -> Result<CheckoutInfo> {
    let tracing_span = tracing::info_span!("checkout", source = "git", repository = source.repository);
    let _enter = tracing_span.enter();

    let (commit, resolved_from_head) = match source.commit {
        Some(c) => (
            c.parse::<GitOid>().map_err(|e| MrLockError::Checkout {
                source: "git".to_string(),
                detail: format!("invalid commit \"{c}\": {e}"),
            })?,
            false,
        ),
        None => (resolve_head(ctx, source.repository, source.branch)?, true),
    };

    if !cache.commit_present(&commit) {
        if resolved_from_head {
            fetch_via_shallow_clone(ctx, cache, source.repository, source.branch, commit)?;
        } else {
            fetch_commit_from_sources(ctx, cache, source.mirrors, source.repository, source.branch, commit)?;
        }
    }

    let work_dir = tempfile::Builder::new()
        .prefix("mrlock-git-checkout-")
        .tempdir_in(ctx.tmp_workspace_root("git"))
        .map_err(|e| MrLockError::io("git checkout tempdir", e))?;
    materialize(ctx, cache, commit, work_dir.path())?;

    let remote_stub = RootVariant::Git {
        repository: source.repository.to_string(),
        branch: source.branch.to_string(),
        commit: Some(commit.to_string()),
        subdir: None,
        mirrors: if source.mirrors.is_empty() {
            None
        } else {
            Some(source.mirrors.to_vec())
        },
        inherit_env: if source.inherit_env.is_empty() {
            None
        } else {
            Some(source.inherit_env.to_vec())
        },
        pragma: Pragma::default(),
    };

    Ok(CheckoutInfo {
        source_dir: work_dir.path().to_path_buf(),
        remote_stub,
        remote_subdir: None,
        remote_tree_id: None,
        _temp_dir: Some(work_dir),
    })
}

fn resolve_head(ctx: &InvocationContext, url: &str, branch: &str) -> Result<GitOid> {
    let out = ctx.launcher().run_checked(
        &git_binary_args(ctx.git_binary(), &["ls-remote", url, branch]),
        std::path::Path::new("."),
        &nobody_git_env(),
        None,
    )?;
    let line = out.stdout_string();
    let first = line.lines().next().unwrap_or_default();
    let hash = first.split('\t').next().unwrap_or_default();
    hash.parse().map_err(|e| MrLockError::Checkout {
        source: "git".to_string(),
        detail: format!("ls-remote for {url}#{branch} returned an unparseable commit: {e}"),
    })
}

fn fetch_via_shallow_clone(
    ctx: &InvocationContext,
    cache: &GitCache,
    url: &str,
    branch: &str,
    expected: GitOid,
) -> Result<()> {
    let clone_dir = tempfile::Builder::new()
        .prefix("mrlock-git-shallow-")
        .tempdir_in(ctx.tmp_workspace_root("git"))
        .map_err(|e| MrLockError::io("shallow clone tempdir", e))?;
    ctx.launcher().run_checked(
        &git_binary_args(
            ctx.git_binary(),
            &[
                "clone",
                "--depth=1",
                "--branch",
                branch,
                url,
                &clone_dir.path().display().to_string(),
            ],
        ),
        std::path::Path::new("."),
        &nobody_git_env(),
        None,
    )?;
    let out = ctx.launcher().run_checked(
        &git_binary_args(ctx.git_binary(), &["rev-parse", "HEAD"]),
        clone_dir.path(),
        &nobody_git_env(),
        None,
    )?;
    let head: GitOid = out.stdout_string().trim().parse().map_err(|e| MrLockError::Checkout {
        source: "git".to_string(),
        detail: format!("shallow clone produced an unparseable HEAD: {e}"),
    })?;
    let _ = expected;

    cache.fetch(
        &clone_dir.path().display().to_string(),
        &format!("refs/mrlock/{head}"),
        "HEAD",
    )?;
    cache.keep(&head)?;
    Ok(())
}

fn fetch_commit_from_sources(
    _ctx: &InvocationContext,
    cache: &GitCache,
    mirrors: &[String],
    url: &str,
    branch: &str,
    commit: GitOid,
) -> Result<()> {
    cache.ensure_init()?;
    let refspec = format!("refs/heads/{branch}");
    let to = format!("refs/mrlock/{commit}");
    for source in mirrors.iter().chain(std::iter::once(&url.to_string())) {
        if cache.fetch(source, &to, &refspec).is_ok() && cache.commit_present(&commit) {
            cache.keep(&commit)?;
            return Ok(());
        }
    }
    Err(MrLockError::ArchiveFetchExhausted {
        repo: url.to_string(),
        tried: mirrors.len() + 1,
    })
}

fn materialize(ctx: &InvocationContext, cache: &GitCache, commit: GitOid, target: &std::path::Path) -> Result<()> {
    ctx.launcher().run_checked(
        &git_binary_args(ctx.git_binary(), &["init", "-q", &target.display().to_string()]),
        std::path::Path::new("."),
        &nobody_git_env(),
        None,
    )?;
    ctx.launcher().run_checked(
        &git_binary_args(
            ctx.git_binary(),
            &["fetch", "-q", &cache.root().display().to_string(), &commit.to_string()],
        ),
        target,
        &nobody_git_env(),
        None,
    )?;
    ctx.launcher().run_checked(
        &git_binary_args(ctx.git_binary(), &["checkout", "-q", &commit.to_string()]),
        target,
        &nobody_git_env(),
        None,
    )?;
    Ok(())
}

#[allow(dead_code)]
fn env_table() -> BTreeMap<String, String> {
    nobody_git_env()
}
