//! Rewrites an imported repository's description so it is consistent
//! with the source it was checked out from: name references are
//! remapped into the core graph, and `file`-typed roots are reparented
//! onto the remote's actual source (a Git commit, an archive, a Git
//! tree, or another local path).

use std::collections::BTreeMap;
use std::path::Path;

use mrlock_git::GitCache;
use mrlock_git::GitOid;

use crate::error::{MrLockError, Result};
use crate::model::{Pragma, RepositoryDescription, RootSlot, RootVariant};

/// Context threaded through one import entry's rewrite pass.
pub struct RewriteContext<'a> {
    /// The checkout driver's remote stub — the root description that a
    /// `file`-typed dependency is reparented onto.
    pub remote: &'a RootVariant,
    /// For a `git tree` remote: the subdir the driver staged from, used
    /// transiently to compute sub-tree ids. Stripped from the emitted
    /// description.
    pub remote_subdir: Option<&'a str>,
    /// Git cache used to resolve sub-tree ids for `git tree` remotes.
    pub git_cache: Option<&'a GitCache>,
    /// The root tree id of the `git tree` remote, if applicable.
    pub remote_tree_id: Option<GitOid>,
    /// Foreign name -> core name, covering both freshly assigned names
    /// and the caller-supplied `map` of already-known repositories.
    pub name_map: &'a BTreeMap<String, String>,
    /// The import entry's own pragma override.
    pub pragma_override: &'a Pragma,
    /// Whether `special` may be overwritten by `pragma_override.special`.
    pub as_plain: bool,
}

fn remap_name(name: &str, ctx: &RewriteContext<'_>, origin: &str) -> Result<String> {
    ctx.name_map
        .get(name)
        .cloned()
        .ok_or_else(|| MrLockError::UnknownRepository {
            name: name.to_string(),
            from: origin.to_string(),
        })
}

fn rewrite_root_slot(slot: &RootSlot, ctx: &RewriteContext<'_>, origin: &str) -> Result<RootSlot> {
    match slot {
        RootSlot::Name(name) => Ok(RootSlot::Name(remap_name(name, ctx, origin)?)),
        RootSlot::Object(obj) => Ok(RootSlot::Object(rewrite_root_object(obj, ctx)?)),
    }
}

fn rewrite_root_object(obj: &RootVariant, ctx: &RewriteContext<'_>) -> Result<RootVariant> {
    match obj {
        RootVariant::File { path, pragma } => rewrite_file_root(path, pragma, ctx),
        RootVariant::Distdir {
            repositories,
            pragma,
        } => {
            let mut remapped = Vec::with_capacity(repositories.len());
            for name in repositories {
                remapped.push(remap_name(name, ctx, "distdir.repositories")?);
            }
            Ok(RootVariant::Distdir {
                repositories: remapped,
                pragma: merge_general(pragma, ctx),
            })
        }
        RootVariant::Computed {
            repo,
            target,
            config,
            pragma,
        } => Ok(RootVariant::Computed {
            repo: remap_name(repo, ctx, "computed.repo")?,
            target: target.clone(),
            config: config.clone(),
            pragma: merge_general(pragma, ctx),
        }),
        RootVariant::TreeStructure {
            repo,
            target,
            config,
            pragma,
        } => Ok(RootVariant::TreeStructure {
            repo: remap_name(repo, ctx, "tree_structure.repo")?,
            target: target.clone(),
            config: config.clone(),
            pragma: merge_general(pragma, ctx),
        }),
        other => Ok(other.clone().with_pragma(merge_general(other.pragma(), ctx))),
    }
}

fn merge_general(existing: &Pragma, ctx: &RewriteContext<'_>) -> Pragma {
    existing.merge_overlay(ctx.pragma_override, ctx.as_plain)
}

/// `preserve only special=ignore, absent` per the remote-reparenting
/// rule; `to_git` is dropped since the target is no longer file-rooted.
fn pragma_for_remote_rewrite(existing: &Pragma, ctx: &RewriteContext<'_>) -> Pragma {
    let special = existing
        .special
        .clone()
        .filter(|s| s == "ignore");
    let absent = match (existing.absent, ctx.pragma_override.absent) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(false) || b.unwrap_or(false)),
    };
    Pragma {
        special,
        absent,
        to_git: None,
    }
}

fn rewrite_file_root(path: &str, pragma: &Pragma, ctx: &RewriteContext<'_>) -> Result<RootVariant> {
    match ctx.remote {
        RootVariant::Git {
            repository,
            branch,
            commit,
            ..
        } => Ok(RootVariant::Git {
            repository: repository.clone(),
            branch: branch.clone(),
            commit: commit.clone(),
            subdir: if path == "." {
                None
            } else {
                Some(path.to_string())
            },
            mirrors: None,
            inherit_env: None,
            pragma: pragma_for_remote_rewrite(pragma, ctx),
        }),
        RootVariant::File {
            path: remote_path, ..
        } => Ok(RootVariant::File {
            path: join_relative(remote_path, path),
            pragma: merge_general(pragma, ctx),
        }),
        RootVariant::Archive {
            fetch,
            content,
            subdir: remote_subdir,
            mirrors,
            sha256,
            sha512,
            ..
        } => Ok(RootVariant::Archive {
            fetch: fetch.clone(),
            content: content.clone(),
            subdir: Some(compose_subdir(remote_subdir.as_deref(), path)),
            mirrors: mirrors.clone(),
            sha256: sha256.clone(),
            sha512: sha512.clone(),
            pragma: pragma_for_remote_rewrite(pragma, ctx),
        }),
        RootVariant::Zip {
            fetch,
            content,
            subdir: remote_subdir,
            mirrors,
            sha256,
            sha512,
            ..
        } => Ok(RootVariant::Zip {
            fetch: fetch.clone(),
            content: content.clone(),
            subdir: Some(compose_subdir(remote_subdir.as_deref(), path)),
            mirrors: mirrors.clone(),
            sha256: sha256.clone(),
            sha512: sha512.clone(),
            pragma: pragma_for_remote_rewrite(pragma, ctx),
        }),
        RootVariant::GitTree {
            cmd, env, inherit_env, ..
        } => {
            let combined = compose_subdir(ctx.remote_subdir, path);
            if combined.split('/').any(|seg| seg == "..") || combined.starts_with('/') {
                return Err(MrLockError::SubdirEscapesRoot { subdir: combined });
            }
            let root_tree = ctx.remote_tree_id.ok_or_else(|| MrLockError::Checkout {
                source: "git tree".to_string(),
                detail: "missing root tree id for sub-tree rewrite".to_string(),
            })?;
            let git_cache = ctx.git_cache.ok_or_else(|| MrLockError::Checkout {
                source: "git tree".to_string(),
                detail: "no git cache available for sub-tree rewrite".to_string(),
            })?;
            let id = git_cache.subtree_id(&root_tree, &combined)?;
            Ok(RootVariant::GitTree {
                id: id.to_string(),
                cmd: cmd.clone(),
                env: env.clone(),
                inherit_env: inherit_env.clone(),
                pragma: pragma_for_remote_rewrite(pragma, ctx),
            })
        }
        other => Err(MrLockError::Checkout {
            source: "file rewrite".to_string(),
            detail: format!("unsupported remote root kind for rewriting a file dependency: {other:?}"),
        }),
    }
}

fn join_relative(base: &str, path: &str) -> String {
    if path.starts_with('/') || path == "." {
        return if path == "." { base.to_string() } else { path.to_string() };
    }
    if base.is_empty() || base == "." {
        path.to_string()
    } else {
        Path::new(base).join(path).to_string_lossy().into_owned()
    }
}

fn compose_subdir(remote_subdir: Option<&str>, path: &str) -> String {
    join_relative(remote_subdir.unwrap_or("."), path)
}

/// Rewrite a full repository description. `include_layer_fields` is
/// false for layer-only (`extra_imports`) repositories, which drop
/// alternate roots, file-name overrides, and bindings.
pub fn rewrite_description(
    desc: &RepositoryDescription,
    ctx: &RewriteContext<'_>,
    include_layer_fields: bool,
) -> Result<RepositoryDescription> {
    let repository = rewrite_root_slot(&desc.repository, ctx, "repository")?;

    if !include_layer_fields {
        return Ok(RepositoryDescription {
            repository,
            target_root: None,
            rule_root: None,
            expression_root: None,
            target_file_name: None,
            rule_file_name: None,
            expression_file_name: None,
            bindings: None,
        });
    }

    let target_root = desc
        .target_root
        .as_ref()
        .map(|s| rewrite_root_slot(s, ctx, "target_root"))
        .transpose()?;
    let rule_root = desc
        .rule_root
        .as_ref()
        .map(|s| rewrite_root_slot(s, ctx, "rule_root"))
        .transpose()?;
    let expression_root = desc
        .expression_root
        .as_ref()
        .map(|s| rewrite_root_slot(s, ctx, "expression_root"))
        .transpose()?;

    let bindings = desc
        .bindings
        .as_ref()
        .map(|map| {
            map.iter()
                .map(|(alias, target)| Ok((alias.clone(), remap_name(target, ctx, "bindings")?)))
                .collect::<Result<BTreeMap<String, String>>>()
        })
        .transpose()?;

    Ok(RepositoryDescription {
        repository,
        target_root,
        rule_root,
        expression_root,
        target_file_name: desc.target_file_name.clone(),
        rule_file_name: desc.rule_file_name.clone(),
        expression_file_name: desc.expression_file_name.clone(),
        bindings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        remote: &'a RootVariant,
        name_map: &'a BTreeMap<String, String>,
        pragma_override: &'a Pragma,
    ) -> RewriteContext<'a> {
        RewriteContext {
            remote,
            remote_subdir: None,
            git_cache: None,
            remote_tree_id: None,
            name_map,
            pragma_override,
            as_plain: false,
        }
    }

    #[test]
    fn file_through_git_remote_gets_subdir_and_pinned_commit() {
        let remote = RootVariant::Git {
            repository: "u".to_string(),
            branch: "main".to_string(),
            commit: Some("deadbeef".repeat(5)),
            subdir: None,
            mirrors: None,
            inherit_env: None,
            pragma: Pragma::default(),
        };
        let name_map = BTreeMap::new();
        let overlay = Pragma::default();
        let c = ctx(&remote, &name_map, &overlay);

        let rewritten = rewrite_file_root("src/lib", &Pragma::default(), &c).unwrap();
        match rewritten {
            RootVariant::Git {
                repository,
                branch,
                commit,
                subdir,
                ..
            } => {
                assert_eq!(repository, "u");
                assert_eq!(branch, "main");
                assert_eq!(commit, Some("deadbeef".repeat(5)));
                assert_eq!(subdir, Some("src/lib".to_string()));
            }
            other => panic!("expected git root, got {other:?}"),
        }
    }

    #[test]
    fn distdir_entries_are_remapped_through_name_map() {
        let remote = RootVariant::File {
            path: ".".to_string(),
            pragma: Pragma::default(),
        };
        let mut name_map = BTreeMap::new();
        name_map.insert("a".to_string(), "core/a".to_string());
        let overlay = Pragma::default();
        let c = ctx(&remote, &name_map, &overlay);

        let obj = RootVariant::Distdir {
            repositories: vec!["a".to_string()],
            pragma: Pragma::default(),
        };
        let rewritten = rewrite_root_object(&obj, &c).unwrap();
        match rewritten {
            RootVariant::Distdir { repositories, .. } => {
                assert_eq!(repositories, vec!["core/a".to_string()]);
            }
            other => panic!("expected distdir root, got {other:?}"),
        }
    }

    #[test]
    fn layer_only_rewrite_drops_bindings_and_alt_roots() {
        let remote = RootVariant::File {
            path: ".".to_string(),
            pragma: Pragma::default(),
        };
        let name_map = BTreeMap::new();
        let overlay = Pragma::default();
        let c = ctx(&remote, &name_map, &overlay);

        let desc = RepositoryDescription {
            repository: RootSlot::Object(RootVariant::File {
                path: ".".to_string(),
                pragma: Pragma::default(),
            }),
            target_root: Some(RootSlot::Name("x".to_string())),
            rule_root: None,
            expression_root: None,
            target_file_name: None,
            rule_file_name: None,
            expression_file_name: None,
            bindings: Some(BTreeMap::from([("dep".to_string(), "y".to_string())])),
        };
        let rewritten = rewrite_description(&desc, &c, false).unwrap();
        assert!(rewritten.target_root.is_none());
        assert!(rewritten.bindings.is_none());
    }
}
