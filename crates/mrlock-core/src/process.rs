//! Uniform subprocess launcher.
//!
//! Every external tool invocation (`git`, `wget`, `tar`, `unzip`, `7z`, and
//! user-supplied `git tree`/`generic` commands) funnels through [`Launcher`]
//! so error reporting and mockability are consistent, matching the pattern
//! this codebase already uses for wrapping its own `git` subprocess calls.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::CoreError;

/// Captured result of a subprocess invocation.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status_code: Option<i32>,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }

    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Wraps every external invocation with a configurable command-prefix, e.g.
/// `["env", "--"]`, and forces the deterministic Nobody Git identity.
#[derive(Debug, Clone)]
pub struct Launcher {
    prefix: Vec<String>,
}

impl Default for Launcher {
    fn default() -> Self {
        Self {
            prefix: vec!["env".to_string(), "--".to_string()],
        }
    }
}

impl Launcher {
    pub fn new(prefix: Vec<String>) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    /// Run `cmd` (already including any launcher prefix the caller wants,
    /// or not — callers that need the configured prefix should call
    /// [`Launcher::run_prefixed`]), in `cwd`, with `env` applied on top of
    /// the inherited environment, optionally feeding `stdin`.
    pub fn run(
        &self,
        cmd: &[String],
        cwd: &Path,
        env: &BTreeMap<String, String>,
        stdin: Option<&[u8]>,
    ) -> Result<RunOutput, CoreError> {
        let Some((program, args)) = cmd.split_first() else {
            return Err(CoreError::Spawn {
                command: cmd.to_vec(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .envs(env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn().map_err(|source| CoreError::Spawn {
            command: cmd.to_vec(),
            source,
        })?;

        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            // Best-effort: a child that exits early without reading stdin
            // should not turn a real subprocess failure into a broken-pipe
            // error masking the original exit code.
            let _ = pipe.write_all(input);
        }

        let output = child.wait_with_output().map_err(|source| CoreError::Spawn {
            command: cmd.to_vec(),
            source,
        })?;

        Ok(RunOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            status_code: output.status.code(),
        })
    }

    /// Run `cmd` prefixed by the configured launcher prefix.
    pub fn run_prefixed(
        &self,
        cmd: &[String],
        cwd: &Path,
        env: &BTreeMap<String, String>,
        stdin: Option<&[u8]>,
    ) -> Result<RunOutput, CoreError> {
        let mut full = self.prefix.clone();
        full.extend(cmd.iter().cloned());
        self.run(&full, cwd, env, stdin)
    }

    /// Run and require a zero exit code, turning failure into a typed
    /// error carrying the captured stderr.
    pub fn run_checked(
        &self,
        cmd: &[String],
        cwd: &Path,
        env: &BTreeMap<String, String>,
        stdin: Option<&[u8]>,
    ) -> Result<RunOutput, CoreError> {
        let output = self.run_prefixed(cmd, cwd, env, stdin)?;
        if !output.success() {
            return Err(CoreError::CommandFailed {
                command: cmd.to_vec(),
                exit_code: output.status_code,
                stderr: output.stderr_string(),
            });
        }
        Ok(output)
    }
}

/// Environment variables that force the deterministic Nobody Git identity
/// (epoch 0), used for every Git subprocess so commit hashes over identical
/// trees are reproducible across machines and runs.
pub fn nobody_git_env() -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for key in [
        "GIT_AUTHOR_NAME",
        "GIT_COMMITTER_NAME",
    ] {
        env.insert(key.to_string(), "Nobody".to_string());
    }
    for key in ["GIT_AUTHOR_EMAIL", "GIT_COMMITTER_EMAIL"] {
        env.insert(key.to_string(), "nobody@example.org".to_string());
    }
    for key in ["GIT_AUTHOR_DATE", "GIT_COMMITTER_DATE"] {
        env.insert(key.to_string(), "1970-01-01T00:00:00+00:00".to_string());
    }
    env.insert("GIT_CONFIG_GLOBAL".to_string(), "/dev/null".to_string());
    env.insert("GIT_CONFIG_SYSTEM".to_string(), "/dev/null".to_string());
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_and_captures_stdout() {
        let launcher = Launcher::new(vec![]);
        let cwd = std::env::temp_dir();
        let out = launcher
            .run(
                &["echo".to_string(), "hello".to_string()],
                &cwd,
                &BTreeMap::new(),
                None,
            )
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_string().trim(), "hello");
    }

    #[test]
    fn checked_run_surfaces_nonzero_exit() {
        let launcher = Launcher::new(vec![]);
        let cwd = std::env::temp_dir();
        let err = launcher
            .run_checked(
                &["false".to_string()],
                &cwd,
                &BTreeMap::new(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::CommandFailed { .. }));
    }

    #[test]
    fn nobody_env_is_deterministic() {
        let env = nobody_git_env();
        assert_eq!(env.get("GIT_AUTHOR_NAME").map(String::as_str), Some("Nobody"));
        assert_eq!(
            env.get("GIT_AUTHOR_DATE").map(String::as_str),
            Some("1970-01-01T00:00:00+00:00")
        );
    }
}
