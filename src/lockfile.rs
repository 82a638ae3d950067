//! Locating, loading, and writing the input/output lockfiles.

use std::path::{Path, PathBuf};

use crate::error::{MrLockError, Result};
use crate::model::{LockInput, RepoGraph};

const MARKERS: &[&str] = &[".git", "ROOT", "WORKSPACE"];
const DEFAULT_NAME: &str = "repos.in.json";

/// Walk upward from `start` looking for a directory containing one of
/// [`MARKERS`]; that directory is the workspace root.
fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        if MARKERS.iter().any(|m| d.join(m).exists()) {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}

/// Resolve the input lockfile path: an explicit `-C` path if given,
/// otherwise `repos.in.json` searched in the workspace root and its
/// `etc` subdirectory.
pub fn resolve_input_path(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let root = find_workspace_root(cwd).unwrap_or_else(|| cwd.to_path_buf());
    for candidate in [root.join(DEFAULT_NAME), root.join("etc").join(DEFAULT_NAME)] {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(MrLockError::InputNotFound {
        start: cwd.display().to_string(),
    })
}

/// Default output path derived from the input path: same directory,
/// `repos.json`.
pub fn default_output_path(input: &Path) -> PathBuf {
    input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("repos.json")
}

pub fn load_input(path: &Path) -> Result<LockInput> {
    let raw = std::fs::read_to_string(path).map_err(|source| MrLockError::io(path.display().to_string(), source))?;
    serde_json::from_str(&raw).map_err(|source| MrLockError::json(path.display().to_string(), source))
}

pub fn write_output(path: &Path, graph: &RepoGraph) -> Result<()> {
    let json = serde_json::to_string_pretty(graph)
        .map_err(|source| MrLockError::json(path.display().to_string(), source))?;
    std::fs::write(path, json + "\n").map_err(|source| MrLockError::OutputWrite {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_workspace_root_by_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("WORKSPACE"), "").unwrap();
        let found = find_workspace_root(&dir.path().join("a/b")).unwrap();
        assert_eq!(found, dir.path());
    }

    #[test]
    fn resolve_input_path_prefers_explicit() {
        let explicit = Path::new("/explicit/repos.in.json");
        let resolved = resolve_input_path(Some(explicit), Path::new("/irrelevant")).unwrap();
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn resolve_input_path_falls_back_to_etc() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ROOT"), "").unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc").join(DEFAULT_NAME), "{}").unwrap();
        let resolved = resolve_input_path(None, dir.path()).unwrap();
        assert_eq!(resolved, dir.path().join("etc").join(DEFAULT_NAME));
    }

    #[test]
    fn load_input_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repos.in.json");
        std::fs::write(&path, r#"{"not_a_real_field": true}"#).unwrap();
        assert!(load_input(&path).is_err());
    }
}
