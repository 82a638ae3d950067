//! Sequences a full run: load input, check out every fetching source in
//! parallel, apply imports in declared order, clone requested
//! destinations in parallel, deduplicate, write output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mrlock_core::InvocationContext;
use mrlock_core::locking::{FileLock, LockMode};
use mrlock_cas::FileCas;
use mrlock_git::GitCache;
use rayon::prelude::*;

use crate::checkout::{CheckoutInfo, archive, file as file_driver, generic, git as git_driver, git_tree};
use crate::clone::clone_repository;
use crate::dedup::deduplicate;
use crate::error::{MrLockError, Result};
use crate::import::{CheckedOutSource, apply_import};
use crate::model::{ImportEntry, ImportSource, LockInput, RepoGraph};

/// One checked-out import, ready to be applied to the core graph in
/// declared order.
enum Prepared {
    Sourced {
        info: CheckoutInfo,
        foreign_graph: RepoGraph,
        foreign_main: Option<String>,
        entry: ImportEntry,
    },
    Generic {
        entry: ImportEntry,
    },
}

/// Check out the fetching side of a single import entry. `generic`
/// imports do no fetching here; they are applied directly during the
/// sequential pass, since they need the graph state at that point.
fn prepare_checkout(ctx: &InvocationContext, cache: &GitCache, cas: &FileCas, entry: &ImportEntry) -> Result<Prepared> {
    match &entry.source {
        ImportSource::Git {
            url,
            branch,
            commit,
            mirrors,
            inherit_env,
        } => {
            let info = git_driver::checkout(
                ctx,
                cache,
                git_driver::GitSource {
                    repository: url,
                    branch,
                    commit: commit.as_deref(),
                    mirrors: mirrors.as_deref().unwrap_or(&[]),
                    inherit_env: inherit_env.as_deref().unwrap_or(&[]),
                },
            )?;
            let (foreign_graph, foreign_main) = read_foreign_config(&info)?;
            Ok(Prepared::Sourced {
                info,
                foreign_graph,
                foreign_main,
                entry: entry.clone(),
            })
        }
        ImportSource::File { path } => {
            let info = file_driver::checkout(path)?;
            let (foreign_graph, foreign_main) = read_foreign_config(&info)?;
            Ok(Prepared::Sourced {
                info,
                foreign_graph,
                foreign_main,
                entry: entry.clone(),
            })
        }
        ImportSource::Archive {
            fetch,
            content,
            mirrors,
            sha256,
            sha512,
            subdir,
            archive_type,
        } => {
            let info = archive::checkout(
                ctx,
                cas,
                cache,
                archive::ArchiveSource {
                    fetch,
                    content: content.as_deref(),
                    mirrors: mirrors.as_deref().unwrap_or(&[]),
                    sha256: sha256.as_deref(),
                    sha512: sha512.as_deref(),
                    subdir: subdir.as_deref(),
                    is_zip: archive_type == "zip",
                },
            )?;
            let (foreign_graph, foreign_main) = read_foreign_config(&info)?;
            Ok(Prepared::Sourced {
                info,
                foreign_graph,
                foreign_main,
                entry: entry.clone(),
            })
        }
        ImportSource::GitTree {
            cmd,
            cmd_gen,
            env,
            inherit_env,
            subdir,
        } => {
            let env = env.clone().unwrap_or_default();
            let info = git_tree::checkout(
                ctx,
                cache,
                git_tree::GitTreeSource {
                    cmd: cmd.as_deref(),
                    cmd_gen: cmd_gen.as_deref(),
                    env: &env,
                    inherit_env: inherit_env.as_deref().unwrap_or(&[]),
                    subdir: subdir.as_deref(),
                },
            )?;
            let (foreign_graph, foreign_main) = read_foreign_config(&info)?;
            Ok(Prepared::Sourced {
                info,
                foreign_graph,
                foreign_main,
                entry: entry.clone(),
            })
        }
        ImportSource::Generic { .. } => Ok(Prepared::Generic { entry: entry.clone() }),
    }
}

/// Foreign repository configs are themselves `repos.in.json`-shaped
/// (`{main?, repositories?}`) at the root of the checked-out tree.
fn read_foreign_config(info: &CheckoutInfo) -> Result<(RepoGraph, Option<String>)> {
    let path = info.source_dir.join("repos.in.json");
    if !path.is_file() {
        return Ok((RepoGraph::new(), None));
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| MrLockError::io(path.display().to_string(), e))?;
    let input: LockInput = serde_json::from_str(&raw).map_err(|e| MrLockError::json(path.display().to_string(), e))?;
    Ok((input.repositories(), input.main))
}

/// Run the full pipeline: load, check out, import, clone, deduplicate,
/// write. `clone_map` is the CLI's `--clone` destination-to-repository
/// mapping, applied after imports settle and before deduplication.
pub fn run(
    ctx: &InvocationContext,
    input_path: &Path,
    output_path: &Path,
    clone_map: &BTreeMap<PathBuf, String>,
) -> Result<()> {
    let input = crate::lockfile::load_input(input_path)?;

    let cache = GitCache::new(ctx.git_cache_root(), ctx.git_binary().to_path_buf(), ctx.launcher().clone());
    let cas = FileCas::new(ctx.file_cas_root());

    let _git_gc = FileLock::acquire(&ctx.git_gc_lock(), LockMode::Shared)?;
    let _cas_gc = FileLock::acquire(&ctx.cas_gc_lock(), LockMode::Shared)?;

    let entries = input.imports();
    let fetching: Vec<&ImportEntry> = entries
        .iter()
        .filter(|e| !matches!(e.source, ImportSource::Generic { .. }))
        .collect();

    let checked_out: Vec<Result<Prepared>> = fetching
        .par_iter()
        .map(|entry| prepare_checkout(ctx, &cache, &cas, entry))
        .collect();

    let mut by_identity: BTreeMap<*const ImportEntry, Prepared> = BTreeMap::new();
    for (entry, prepared) in fetching.iter().zip(checked_out) {
        by_identity.insert(*entry as *const ImportEntry, prepared?);
    }

    let mut core = input.repositories();
    let mut main_name = input.main.clone();

    // Sequential pass, in declared order: this is what makes `generic`
    // imports observe the graph exactly as built by earlier entries in
    // this list, with no reordering or snapshotting.
    for entry in entries {
        match &entry.source {
            ImportSource::Generic { cmd, env, inherit_env, cwd } => {
                let env = env.clone().unwrap_or_default();
                let (new_repos, new_main) = generic::run(
                    ctx,
                    generic::GenericSource {
                        cmd,
                        env: &env,
                        inherit_env: inherit_env.as_deref().unwrap_or(&[]),
                        cwd: cwd.as_deref(),
                    },
                    &core,
                    main_name.as_deref(),
                )?;
                if new_main.is_some() {
                    main_name = new_main;
                }
                core = new_repos;
            }
            _ => {
                let key = entry as *const ImportEntry;
                let prepared = by_identity.remove(&key).expect("every fetching entry was checked out");
                match prepared {
                    Prepared::Sourced {
                        info,
                        foreign_graph,
                        foreign_main,
                        entry,
                    } => {
                        let source = CheckedOutSource {
                            remote_stub: &info.remote_stub,
                            remote_subdir: info.remote_subdir.as_deref(),
                            remote_tree_id: info.remote_tree_id,
                            foreign_graph: &foreign_graph,
                            foreign_main: foreign_main.as_deref(),
                        };
                        apply_import(&mut core, Some(&cache), &source, &entry.repos)?;
                    }
                    Prepared::Generic { .. } => unreachable!("generic entries never land in by_identity"),
                }
            }
        }
    }

    let mut keep: std::collections::BTreeSet<String> = input.keep().into_iter().collect();
    if let Some(main) = &main_name {
        keep.insert(main.clone());
    }

    if !clone_map.is_empty() {
        // Every clone reads the same pre-clone `core` in parallel; none of
        // them observes another's result, so results are merged into
        // `core` sequentially afterward.
        let results: Vec<Result<(String, Option<crate::model::RootVariant>)>> = clone_map
            .par_iter()
            .map(|(clone_to, repo_name)| clone_repository(ctx, &cas, &cache, &core, repo_name, clone_to))
            .collect();
        for ((_, repo_name), result) in clone_map.iter().zip(results) {
            let (target_name, new_root) = result?;
            if let Some(new_root) = new_root {
                if let Some(desc) = core.get_mut(&target_name) {
                    desc.repository = crate::model::RootSlot::Object(new_root);
                }
            }
            keep.insert(repo_name.clone());
            keep.insert(target_name);
        }
    }

    drop(_git_gc);
    drop(_cas_gc);

    let deduped = deduplicate(&core, &keep);
    crate::lockfile::write_output(output_path, &deduped)
}
