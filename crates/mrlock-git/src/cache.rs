//! The shared bare Git repository used as a cache for every `git`-rooted
//! and `git tree`-rooted repository.

use std::collections::BTreeMap;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use mrlock_core::locking::{FileLock, LockMode};
use mrlock_core::process::{Launcher, nobody_git_env};

use crate::error::GitError;
use crate::oid::{EntryMode, GitOid, TreeEntry};

/// A single shared bare repository acting as the content-addressed Git
/// object/commit cache.
pub struct GitCache {
    root: PathBuf,
    git_binary: PathBuf,
    launcher: Launcher,
}

impl GitCache {
    pub fn new(root: PathBuf, git_binary: PathBuf, launcher: Launcher) -> Self {
        Self {
            root,
            git_binary,
            launcher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn init_lock_path(&self) -> PathBuf {
        self.root
            .parent()
            .map_or_else(|| PathBuf::from("init_open.lock"), |p| p.join("init_open.lock"))
    }

    fn git(&self, args: &[&str]) -> Vec<String> {
        let mut cmd = vec![self.git_binary.display().to_string()];
        cmd.extend(args.iter().map(|s| (*s).to_string()));
        cmd
    }

    /// Create the bare repository if it does not exist yet, under an
    /// exclusive lock.
    pub fn ensure_init(&self) -> Result<(), GitError> {
        if self.root.join("HEAD").exists() {
            return Ok(());
        }
        let _lock = FileLock::acquire(&self.init_lock_path(), LockMode::Exclusive)?;
        if self.root.join("HEAD").exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.root)?;
        self.launcher.run_checked(
            &self.git(&["init", "--bare", "-q", &self.root.display().to_string()]),
            &self.root,
            &nobody_git_env(),
            None,
        )?;
        Ok(())
    }

    /// Rewrite a local-looking URL (`/abs/path`, `./rel/path`,
    /// `file://...`) to an absolute filesystem path `git fetch` can use
    /// without network access; leaves remote URLs untouched.
    pub fn normalize_local_url(url: &str, cwd: &Path) -> String {
        if let Some(path) = url.strip_prefix("file://") {
            return path.to_string();
        }
        if url.starts_with('/') {
            return url.to_string();
        }
        if url.starts_with("./") || url.starts_with("../") {
            return cwd.join(url).display().to_string();
        }
        url.to_string()
    }

    /// Fetch `refspec` from `from` into the cache under ref `to`.
    pub fn fetch(&self, from: &str, to: &str, refspec: &str) -> Result<(), GitError> {
        self.ensure_init()?;
        let url = Self::normalize_local_url(from, &self.root);
        let spec = format!("{refspec}:{to}");
        self.launcher.run_checked(
            &self.git(&[
                "fetch",
                "--no-auto-gc",
                "--no-write-fetch-head",
                &url,
                &spec,
            ]),
            &self.root,
            &nobody_git_env(),
            None,
        )?;
        Ok(())
    }

    /// Tag `commit` as `keep-<commit>` under an exclusive lock, retrying up
    /// to 3 times to survive races with concurrent tag writers.
    pub fn keep(&self, commit: &GitOid) -> Result<(), GitError> {
        let _lock = FileLock::acquire_with_retries(&self.init_lock_path(), LockMode::Exclusive, 3)?;
        let tag = format!("keep-{commit}");
        self.launcher.run_checked(
            &self.git(&["tag", "-f", &tag, &commit.to_string()]),
            &self.root,
            &nobody_git_env(),
            None,
        )?;
        Ok(())
    }

    /// Whether the cache repository exists and already contains `commit`.
    pub fn commit_present(&self, commit: &GitOid) -> bool {
        if !self.root.join("HEAD").exists() {
            return false;
        }
        self.launcher
            .run(
                &self.git(&["cat-file", "-e", &format!("{commit}^{{commit}}")]),
                &self.root,
                &nobody_git_env(),
                None,
            )
            .map(|out| out.success())
            .unwrap_or(false)
    }

    /// Resolve the tree id rooted at `commit`, optionally narrowed to
    /// `subdir` (pass `"."` for the whole tree).
    pub fn tree_of(&self, commit: &GitOid, subdir: &str) -> Result<GitOid, GitError> {
        let out = self.launcher.run_checked(
            &self.git(&["log", "-n1", "--format=%T", &commit.to_string()]),
            &self.root,
            &nobody_git_env(),
            None,
        )?;
        let tree: GitOid = out
            .stdout_string()
            .trim()
            .parse()
            .map_err(|_| GitError::Backend {
                message: format!("git log printed an unparseable tree id for {commit}"),
            })?;
        if subdir == "." || subdir.is_empty() {
            return Ok(tree);
        }
        let spec = format!("{tree}:{subdir}");
        let out = self.launcher.run_checked(
            &self.git(&["rev-parse", &spec]),
            &self.root,
            &nobody_git_env(),
            None,
        )?;
        out.stdout_string()
            .trim()
            .parse()
            .map_err(|_| GitError::Backend {
                message: format!("git rev-parse printed an unparseable tree id for {spec}"),
            })
    }

    /// Resolve the sub-tree of `tree` at `subdir` (pass `"."` to get
    /// `tree` back unchanged). Used when rewriting a `file`-typed
    /// dependency of a `git tree` root into its own pinned tree id.
    pub fn subtree_id(&self, tree: &GitOid, subdir: &str) -> Result<GitOid, GitError> {
        if subdir == "." || subdir.is_empty() {
            return Ok(*tree);
        }
        let spec = format!("{tree}:{subdir}");
        let out = self.launcher.run_checked(
            &self.git(&["rev-parse", &spec]),
            &self.root,
            &nobody_git_env(),
            None,
        )?;
        out.stdout_string()
            .trim()
            .parse()
            .map_err(|_| GitError::Backend {
                message: format!("git rev-parse printed an unparseable tree id for {spec}"),
            })
    }

    /// `git cat-file <kind> <id>`; `None` on non-zero exit.
    pub fn read_object(&self, id: &GitOid, kind: &str) -> Result<Option<Vec<u8>>, GitError> {
        let out = self.launcher.run(
            &self.git(&["cat-file", kind, &id.to_string()]),
            &self.root,
            &nobody_git_env(),
            None,
        )?;
        if !out.success() {
            return Ok(None);
        }
        Ok(Some(out.stdout))
    }

    /// Fetch a tree object and parse it into entries, using the canonical
    /// tree encoding.
    pub fn read_tree(&self, id: &GitOid) -> Result<Vec<TreeEntry>, GitError> {
        let raw = self
            .read_object(id, "tree")?
            .ok_or_else(|| GitError::NotFound {
                message: format!("tree {id} not present in cache"),
            })?;
        crate::codec::decode_tree(&raw).map_err(|reason| GitError::Backend {
            message: format!("malformed tree {id}: {reason}"),
        })
    }

    /// Synthesize a commit over `tree` via `git commit-tree` with the fixed
    /// Nobody identity, so hashes are deterministic for identical trees.
    /// `message` typically embeds the hash of the generator command.
    pub fn commit_tree(&self, tree: &GitOid, message: &str) -> Result<GitOid, GitError> {
        let out = self.launcher.run_checked(
            &self.git(&["commit-tree", &tree.to_string(), "-m", message]),
            &self.root,
            &nobody_git_env(),
            None,
        )?;
        out.stdout_string()
            .trim()
            .parse()
            .map_err(|_| GitError::Backend {
                message: "git commit-tree printed an unparseable commit id".to_string(),
            })
    }

    /// Recursively write the tree rooted at `id` into `target`, preserving
    /// the execute bit and symlinks. Unknown entry kinds are logged and
    /// skipped rather than treated as fatal.
    pub fn stage_tree(&self, id: &GitOid, target: &Path) -> Result<(), GitError> {
        std::fs::create_dir_all(target)?;
        for entry in self.read_tree(id)? {
            let out_path = target.join(&entry.name);
            match entry.mode {
                EntryMode::Tree => {
                    self.stage_tree(&entry.oid, &out_path)?;
                }
                EntryMode::Blob | EntryMode::BlobExecutable => {
                    let content = self.read_object(&entry.oid, "blob")?.ok_or_else(|| {
                        GitError::NotFound {
                            message: format!("blob {} not present in cache", entry.oid),
                        }
                    })?;
                    std::fs::write(&out_path, content)?;
                    if entry.mode == EntryMode::BlobExecutable {
                        let mut perms = std::fs::metadata(&out_path)?.permissions();
                        perms.set_mode(perms.mode() | 0o111);
                        std::fs::set_permissions(&out_path, perms)?;
                    }
                }
                EntryMode::Link => {
                    let content = self.read_object(&entry.oid, "blob")?.ok_or_else(|| {
                        GitError::NotFound {
                            message: format!("symlink blob {} not present in cache", entry.oid),
                        }
                    })?;
                    let target_path = String::from_utf8_lossy(&content).into_owned();
                    #[cfg(unix)]
                    std::os::unix::fs::symlink(target_path, &out_path)?;
                }
            }
        }
        Ok(())
    }

    /// Run in a worker thread: checks whether a path is executable for
    /// tests that construct trees from the filesystem rather than from the
    /// cache.
    pub fn is_executable(metadata: &std::fs::Metadata) -> bool {
        metadata.mode() & 0o111 != 0
    }

    #[allow(dead_code)]
    fn env(&self) -> BTreeMap<String, String> {
        nobody_git_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real_git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok()
    }

    #[test]
    fn normalize_local_url_handles_all_forms() {
        let cwd = Path::new("/work/dir");
        assert_eq!(GitCache::normalize_local_url("/abs/path", cwd), "/abs/path");
        assert_eq!(
            GitCache::normalize_local_url("file:///abs/path", cwd),
            "/abs/path"
        );
        assert_eq!(
            GitCache::normalize_local_url("./rel", cwd),
            cwd.join("./rel").display().to_string()
        );
        assert_eq!(
            GitCache::normalize_local_url("https://example.com/repo.git", cwd),
            "https://example.com/repo.git"
        );
    }

    #[test]
    fn commit_present_false_when_cache_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GitCache::new(
            dir.path().join("git"),
            PathBuf::from("git"),
            Launcher::default(),
        );
        assert!(!cache.commit_present(&GitOid::ZERO));
    }

    #[test]
    fn ensure_init_creates_bare_repository() {
        if !real_git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let cache = GitCache::new(
            dir.path().join("git"),
            PathBuf::from("git"),
            Launcher::default(),
        );
        cache.ensure_init().unwrap();
        assert!(cache.root().join("HEAD").exists());
        // Idempotent: calling again does not fail.
        cache.ensure_init().unwrap();
    }
}
