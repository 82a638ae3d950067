//! The import engine: ties closure computation, name assignment, and
//! description rewriting together for one `repos` entry of an import,
//! merging a foreign repository graph into the core graph.

use std::collections::BTreeSet;

use mrlock_git::{GitCache, GitOid};

use crate::closure::closure;
use crate::error::{MrLockError, Result};
use crate::model::{ImportRepoEntry, Pragma, RepoGraph, RepositoryDescription, RootSlot, RootVariant};
use crate::naming::name_imports;
use crate::rewrite::{RewriteContext, rewrite_description};

/// What the checkout driver produced, independent of which source kind
/// produced it.
pub struct CheckedOutSource<'a> {
    pub remote_stub: &'a RootVariant,
    pub remote_subdir: Option<&'a str>,
    pub remote_tree_id: Option<GitOid>,
    pub foreign_graph: &'a RepoGraph,
    pub foreign_main: Option<&'a str>,
}

fn as_plain_graph() -> RepoGraph {
    let mut g = RepoGraph::new();
    g.insert(
        String::new(),
        RepositoryDescription {
            repository: RootSlot::Object(RootVariant::File {
                path: ".".to_string(),
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
    g
}

fn default_foreign_main(graph: &RepoGraph, declared: Option<&str>) -> Option<String> {
    declared
        .map(str::to_string)
        .or_else(|| graph.keys().next().cloned())
}

/// Apply every entry in `repos` (or, if empty, a single default entry
/// pulling in the foreign main) against `core`, mutating it in place.
pub fn apply_import(
    core: &mut RepoGraph,
    git_cache: Option<&GitCache>,
    source: &CheckedOutSource<'_>,
    repos: &[ImportRepoEntry],
) -> Result<()> {
    if repos.is_empty() {
        return apply_one(core, git_cache, source, &ImportRepoEntry::default());
    }
    for entry in repos {
        apply_one(core, git_cache, source, entry)?;
    }
    Ok(())
}

fn apply_one(
    core: &mut RepoGraph,
    git_cache: Option<&GitCache>,
    source: &CheckedOutSource<'_>,
    entry: &ImportRepoEntry,
) -> Result<()> {
    let as_plain = entry.as_plain.unwrap_or(false);
    let owned_plain_graph;
    let foreign_graph: &RepoGraph = if as_plain {
        owned_plain_graph = as_plain_graph();
        &owned_plain_graph
    } else {
        source.foreign_graph
    };

    let foreign_main = if as_plain {
        String::new()
    } else {
        default_foreign_main(foreign_graph, source.foreign_main).ok_or_else(|| MrLockError::Checkout {
            source: "import".to_string(),
            detail: "foreign repository config has no repositories".to_string(),
        })?
    };

    let start = entry.repo.clone().unwrap_or_else(|| foreign_main.clone());
    let known: BTreeSet<String> = entry.map.as_ref().map(|m| m.keys().cloned().collect()).unwrap_or_default();

    let (to_import, extra_imports) = closure(foreign_graph, &start, &known);

    let existing: BTreeSet<String> = core.keys().cloned().collect();
    let all_imported: BTreeSet<String> = to_import.union(&extra_imports).cloned().collect();
    let mut name_map = name_imports(&all_imported, &start, entry.alias.as_deref(), &existing);
    if let Some(map) = &entry.map {
        for (foreign_name, core_name) in map {
            name_map.insert(foreign_name.clone(), core_name.clone());
        }
    }

    let pragma_override = entry.pragma.clone().unwrap_or_default();
    let ctx = RewriteContext {
        remote: source.remote_stub,
        remote_subdir: source.remote_subdir,
        git_cache,
        remote_tree_id: source.remote_tree_id,
        name_map: &name_map,
        pragma_override: &pragma_override,
        as_plain,
    };

    for foreign_name in &to_import {
        let desc = &foreign_graph[foreign_name];
        let rewritten = rewrite_description(desc, &ctx, true)?;
        core.insert(name_map[foreign_name].clone(), rewritten);
    }
    for foreign_name in &extra_imports {
        let desc = &foreign_graph[foreign_name];
        let rewritten = rewrite_description(desc, &ctx, false)?;
        core.insert(name_map[foreign_name].clone(), rewritten);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn file_repo(path: &str) -> RepositoryDescription {
        RepositoryDescription {
            repository: RootSlot::Object(RootVariant::File {
                path: path.to_string(),
                pragma: Pragma::default(),
            }),
            target_root: None,
            rule_root: None,
            expression_root: None,
            target_file_name: None,
            rule_file_name: None,
            expression_file_name: None,
            bindings: None,
        }
    }

    #[test]
    fn imports_foreign_main_under_alias() {
        let mut foreign = RepoGraph::new();
        foreign.insert("root".to_string(), file_repo("."));

        let remote = RootVariant::Git {
            repository: "https://example.invalid/repo.git".to_string(),
            branch: "main".to_string(),
            commit: Some("a".repeat(40)),
            subdir: None,
            mirrors: None,
            inherit_env: None,
            pragma: Pragma::default(),
        };
        let source = CheckedOutSource {
            remote_stub: &remote,
            remote_subdir: None,
            remote_tree_id: None,
            foreign_graph: &foreign,
            foreign_main: Some("root"),
        };

        let mut core = RepoGraph::new();
        let entry = ImportRepoEntry {
            alias: Some("dep".to_string()),
            ..ImportRepoEntry::default()
        };
        apply_import(&mut core, None, &source, std::slice::from_ref(&entry)).unwrap();

        assert!(core.contains_key("dep"));
        match &core["dep"].repository {
            RootSlot::Object(RootVariant::Git { subdir, .. }) => assert!(subdir.is_none()),
            other => panic!("expected git root, got {other:?}"),
        }
    }

    #[test]
    fn bound_sub_repository_is_imported_and_binding_remapped() {
        let mut foreign = RepoGraph::new();
        let mut root = file_repo(".");
        root.bindings = Some(BTreeMap::from([("lib".to_string(), "libfoo".to_string())]));
        foreign.insert("root".to_string(), root);
        foreign.insert("libfoo".to_string(), file_repo("lib"));

        let remote = RootVariant::File {
            path: "/checkout".to_string(),
            pragma: Pragma::default(),
        };
        let source = CheckedOutSource {
            remote_stub: &remote,
            remote_subdir: None,
            remote_tree_id: None,
            foreign_graph: &foreign,
            foreign_main: Some("root"),
        };

        let mut core = RepoGraph::new();
        let entry = ImportRepoEntry {
            alias: Some("dep".to_string()),
            ..ImportRepoEntry::default()
        };
        apply_import(&mut core, None, &source, std::slice::from_ref(&entry)).unwrap();

        assert!(core.contains_key("dep"));
        assert!(core.contains_key("dep/libfoo"));
        assert_eq!(core["dep"].bindings().get("lib"), Some(&"dep/libfoo".to_string()));
    }
}
