//! Checkout drivers: one per foreign-source kind. Each produces a
//! [`CheckoutInfo`] the import engine rewrites dependencies against.

pub mod archive;
pub mod file;
pub mod generic;
pub mod git;
pub mod git_tree;

use std::path::PathBuf;

use mrlock_git::GitOid;

use crate::model::RootVariant;

/// What a checkout driver hands back to the import engine.
pub struct CheckoutInfo {
    /// Directory containing the checked-out tree (already narrowed to
    /// `subdir`, where the source kind has one).
    pub source_dir: PathBuf,
    /// Root-description template used to rewrite `file`-typed
    /// dependencies of the imported repository.
    pub remote_stub: RootVariant,
    /// Transient subdir used for `git tree` sub-tree-id rewriting; never
    /// part of `remote_stub` itself.
    pub remote_subdir: Option<String>,
    /// Root tree id backing a `git tree` remote, kept for sub-tree
    /// resolution during rewriting.
    pub remote_tree_id: Option<GitOid>,
    /// Temp directory backing `source_dir`; dropped (and cleaned up) once
    /// the import that consumes it finishes.
    pub _temp_dir: Option<tempfile::TempDir>,
}

impl CheckoutInfo {
    pub fn simple(source_dir: PathBuf, remote_stub: RootVariant) -> Self {
        Self {
            source_dir,
            remote_stub,
            remote_subdir: None,
            remote_tree_id: None,
            _temp_dir: None,
        }
    }
}

pub(crate) fn git_binary_args(git_binary: &std::path::Path, args: &[&str]) -> Vec<String> {
    let mut cmd = vec![git_binary.display().to_string()];
    cmd.extend(args.iter().map(|s| (*s).to_string()));
    cmd
}

/// Build a plain `Vec<String>` command; the configured launcher prefix is
/// applied automatically by [`mrlock_core::process::Launcher::run_prefixed`]
/// or [`mrlock_core::process::Launcher::run_checked`], so callers should
/// never prepend it themselves.
pub(crate) fn cmd(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_string()).collect()
}
