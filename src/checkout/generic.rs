//! The `generic` import driver: unlike the other four, it does not
//! check out a single foreign repository. It pipes the *whole* current
//! core configuration to a command and replaces it wholesale with
//! whatever the command prints back.

use std::collections::BTreeMap;

use mrlock_core::InvocationContext;
use serde::Deserialize;

use crate::error::{MrLockError, Result};
use crate::model::RepoGraph;

pub struct GenericSource<'a> {
    pub cmd: &'a [String],
    pub env: &'a BTreeMap<String, String>,
    pub inherit_env: &'a [String],
    pub cwd: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenericOutput {
    repositories: RepoGraph,
    main: Option<String>,
}

/// Replace the current core configuration (`repositories`, and `main` if
/// the command names one) with whatever `source.cmd` prints to stdout
/// after reading the current configuration from stdin.
pub fn run(
    ctx: &InvocationContext,
    source: GenericSource<'_>,
    current_repositories: &RepoGraph,
    current_main: Option<&str>,
) -> Result<(RepoGraph, Option<String>)> {
    let span = tracing::info_span!("import", source = "generic");
    let _enter = span.enter();

    let stdin_body = serde_json::to_vec(&serde_json::json!({
        "repositories": current_repositories,
        "main": current_main,
    }))
    .map_err(|source| MrLockError::json("generic import stdin".to_string(), source))?;

    let cwd = source.cwd.map_or_else(|| std::path::PathBuf::from("."), std::path::PathBuf::from);
    let out = ctx
        .launcher()
        .run_checked(source.cmd, &cwd, source.env, Some(&stdin_body))?;

    let parsed: GenericOutput = serde_json::from_slice(&out.stdout).map_err(|e| MrLockError::GenericImportOutput {
        repo: format!("{:?}", source.cmd),
        detail: format!("stdout was not a {{repositories, main?}} JSON object: {e}"),
    })?;

    let _ = source.inherit_env;
    Ok((parsed.repositories, parsed.main))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrlock_core::process::Launcher;

    #[test]
    fn round_trips_an_unchanged_graph_through_cat() {
        if std::process::Command::new("cat").arg("--version").output().is_err() {
            return;
        }
        let ctx = InvocationContext::default();
        let graph: RepoGraph = serde_json::from_str(r#"{"main": {"repository": "."}}"#).unwrap();
        let source = GenericSource {
            cmd: &["cat".to_string()],
            env: &BTreeMap::new(),
            inherit_env: &[],
            cwd: None,
        };
        let (out_graph, out_main) = run(&ctx, source, &graph, Some("main")).unwrap();
        assert_eq!(out_graph, graph);
        assert_eq!(out_main.as_deref(), Some("main"));
        let _ = Launcher::default();
    }
}
