//! Top-level error type: wraps every subsystem error behind one causal
//! chain, with a `to fix:` remediation line wherever one exists.

use mrlock_cas::CasError;
use mrlock_core::CoreError;
use mrlock_git::GitError;

/// Errors raised by the import resolver, dedup, clone engine, or
/// orchestrator. Subsystem errors (locking, Git cache, file CAS) are
/// wrapped rather than flattened, so their own message survives intact
/// as the tail of the causal chain.
#[derive(Debug, thiserror::Error)]
pub enum MrLockError {
    #[error("while loading repository config {path}: {detail}\n  to fix: check the file is valid JSON and has a top-level \"repositories\" object")]
    InputParse { path: String, detail: String },

    #[error("could not find a repository config near {start}\n  to fix: pass -C <file>, or create repos.in.json next to .git/ROOT/WORKSPACE")]
    InputNotFound { start: String },

    #[error("repository \"{name}\" referenced from {from} does not exist\n  to fix: check the name against the repositories map")]
    UnknownRepository { name: String, from: String },

    #[error("distdir entry \"{name}\" in \"{distdir}\" is not archive-rooted")]
    InvalidDistdirEntry { distdir: String, name: String },

    #[error("git tree import needs exactly one of cmd/cmd_gen, got {given} in repo \"{repo}\"")]
    ExactlyOneOfCmd { repo: String, given: &'static str },

    #[error("subdir \"{subdir}\" escapes the tree root via a git tree import\n  to fix: use a path under the imported root, not one containing \"..\"")]
    SubdirEscapesRoot { subdir: String },

    #[error("While checking out source \"{source}\":\n{detail}")]
    Checkout { source: String, detail: String },

    #[error("failed to fetch archive for \"{repo}\" from any of {tried} source(s)\n  to fix: check network access and that fetch/mirrors URLs are reachable")]
    ArchiveFetchExhausted { repo: String, tried: usize },

    #[error("hash mismatch for \"{what}\": expected {expected}, got {actual}")]
    HashMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("clone destination {path} exists and is not a directory\n  to fix: remove it or choose a different --clone destination")]
    CloneDestinationNotDir { path: String },

    #[error("generic import command for \"{repo}\" produced invalid output: {detail}\n  to fix: the command's stdout must be a JSON object with a \"repositories\" key")]
    GenericImportOutput { repo: String, detail: String },

    #[error("failed to write output lockfile {path}: {source}")]
    OutputWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Cas(#[from] CasError),

    #[error("invalid JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl MrLockError {
    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MrLockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_error_embeds_causal_chain_prefix() {
        let err = MrLockError::Checkout {
            source: "git".to_string(),
            detail: "ls-remote failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("While checking out source \"git\":"));
        assert!(msg.contains("ls-remote failed"));
    }

    #[test]
    fn unknown_repository_has_a_fix_line() {
        let err = MrLockError::UnknownRepository {
            name: "foo".to_string(),
            from: "bindings of bar".to_string(),
        };
        assert!(err.to_string().contains("to fix:"));
    }

    #[test]
    fn core_error_wraps_transparently() {
        let core = CoreError::Spawn {
            command: vec!["git".to_string()],
            source: std::io::Error::other("boom"),
        };
        let wrapped: MrLockError = core.into();
        assert!(matches!(wrapped, MrLockError::Core(_)));
    }
}
