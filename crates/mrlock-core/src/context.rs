//! Immutable invocation context, threaded explicitly instead of living as
//! process-global state.

use std::path::{Path, PathBuf};

use crate::process::Launcher;

/// Resolved configuration for a single run: local build root, launcher
/// prefix, and worker-pool size. Constructed once at startup and passed by
/// reference to every subsystem that needs it — the orchestrator, checkout
/// drivers, import engine, and clone engine never read from a global.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    local_build_root: PathBuf,
    launcher: Launcher,
    git_binary: PathBuf,
    jobs: usize,
}

impl InvocationContext {
    pub fn new(local_build_root: PathBuf, launcher: Launcher, git_binary: PathBuf, jobs: usize) -> Self {
        Self {
            local_build_root,
            launcher,
            git_binary,
            jobs: jobs.max(1),
        }
    }

    /// Default local build root, mirroring `~/.cache/just`.
    pub fn default_local_build_root() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cache")
            .join("mrlock")
    }

    pub fn local_build_root(&self) -> &Path {
        &self.local_build_root
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    pub fn git_binary(&self) -> &Path {
        &self.git_binary
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Bare Git cache repository path, per the fixed on-disk layout.
    pub fn git_cache_root(&self) -> PathBuf {
        self.local_build_root
            .join("repositories")
            .join("generation-0")
            .join("git")
    }

    /// File CAS root, per the fixed on-disk layout.
    pub fn file_cas_root(&self) -> PathBuf {
        self.local_build_root
            .join("protocol-dependent")
            .join("generation-0")
            .join("git-sha1")
            .join("casf")
    }

    /// Root for per-invocation temp workspaces of a given kind.
    pub fn tmp_workspace_root(&self, kind: &str) -> PathBuf {
        self.local_build_root.join("tmp-workspaces").join(kind)
    }

    /// Git cache GC-barrier lock path.
    pub fn git_gc_lock(&self) -> PathBuf {
        self.local_build_root.join("repositories").join("gc.lock")
    }

    /// File CAS GC-barrier lock path.
    pub fn cas_gc_lock(&self) -> PathBuf {
        self.local_build_root
            .join("protocol-dependent")
            .join("gc.lock")
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new(
            Self::default_local_build_root(),
            Launcher::default(),
            PathBuf::from("git"),
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_match_fixed_layout() {
        let ctx = InvocationContext::new(
            PathBuf::from("/cache/root"),
            Launcher::default(),
            PathBuf::from("git"),
            4,
        );
        assert_eq!(
            ctx.git_cache_root(),
            PathBuf::from("/cache/root/repositories/generation-0/git")
        );
        assert_eq!(
            ctx.file_cas_root(),
            PathBuf::from("/cache/root/protocol-dependent/generation-0/git-sha1/casf")
        );
        assert_eq!(ctx.jobs(), 4);
    }

    #[test]
    fn jobs_is_clamped_to_at_least_one() {
        let ctx = InvocationContext::new(PathBuf::from("/x"), Launcher::default(), PathBuf::from("git"), 0);
        assert_eq!(ctx.jobs(), 1);
    }
}
