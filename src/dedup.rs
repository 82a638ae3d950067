//! The bisimulation deduplicator: computes the coarsest equivalence
//! relation on repository names under which equivalent repositories are
//! merged, then rewrites every reference to point at one representative
//! per class.
//!
//! The core fixpoint is Hopcroft-style: each pair starts out
//! provisionally equal, backed by a registry of "this pair is equal
//! only if that pair turns out equal" edges. Whenever a pair is proved
//! different, the registry is walked to mark every pair depending on it
//! different too, without recursion (a plain worklist over the pending
//! back-edges).

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::model::{Pragma, RepoGraph, RepositoryDescription, RootSlot, RootVariant};

type Pair = (String, String);

fn pair_key(a: &str, b: &str) -> Pair {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Follow name references on a root slot until an object is reached.
fn resolve_root<'a>(graph: &'a RepoGraph, slot: &'a RootSlot) -> Option<&'a RootVariant> {
    match slot {
        RootSlot::Object(obj) => Some(obj),
        RootSlot::Name(name) => graph.get(name).and_then(|d| resolve_root(graph, &d.repository)),
    }
}

fn effective_slot<'a>(
    graph: &'a RepoGraph,
    desc: &'a RepositoryDescription,
    selector: impl Fn(&'a RepositoryDescription) -> Option<&'a RootSlot>,
) -> Option<&'a RootVariant> {
    match selector(desc) {
        Some(slot) => resolve_root(graph, slot),
        None => resolve_root(graph, &desc.repository),
    }
}

/// Structural, type-specific root equality. `repo`/`computed` references
/// that aren't yet known equal are pushed onto `deps` rather than
/// resolved eagerly, mirroring the pending-dependency scheme used for
/// `bindings`.
fn roots_equal(
    ra: Option<&RootVariant>,
    rb: Option<&RootVariant>,
    different: &HashSet<Pair>,
    deps: &mut Vec<Pair>,
) -> bool {
    match (ra, rb) {
        (None, None) => true,
        (Some(a), Some(b)) => match (a, b) {
            (RootVariant::File { path: p1, .. }, RootVariant::File { path: p2, .. }) => p1 == p2,
            (
                RootVariant::Archive {
                    content: c1,
                    subdir: s1,
                    ..
                },
                RootVariant::Archive {
                    content: c2,
                    subdir: s2,
                    ..
                },
            )
            | (
                RootVariant::Zip {
                    content: c1,
                    subdir: s1,
                    ..
                },
                RootVariant::Zip {
                    content: c2,
                    subdir: s2,
                    ..
                },
            ) => c1 == c2 && s1 == s2,
            (
                RootVariant::Git {
                    commit: c1,
                    subdir: s1,
                    ..
                },
                RootVariant::Git {
                    commit: c2,
                    subdir: s2,
                    ..
                },
            ) => c1 == c2 && s1 == s2,
            (
                RootVariant::Computed {
                    repo: r1,
                    target: t1,
                    config: cfg1,
                    ..
                },
                RootVariant::Computed {
                    repo: r2,
                    target: t2,
                    config: cfg2,
                    ..
                },
            )
            | (
                RootVariant::TreeStructure {
                    repo: r1,
                    target: t1,
                    config: cfg1,
                    ..
                },
                RootVariant::TreeStructure {
                    repo: r2,
                    target: t2,
                    config: cfg2,
                    ..
                },
            ) => {
                if t1 != t2 || cfg1 != cfg2 {
                    return false;
                }
                if r1 == r2 {
                    return true;
                }
                let key = pair_key(r1, r2);
                if different.contains(&key) {
                    false
                } else {
                    deps.push(key);
                    true
                }
            }
            (
                RootVariant::ForeignFile {
                    fetch: f1,
                    content: c1,
                    mirrors: m1,
                    sha256: sh1,
                    sha512: sv1,
                    name: n1,
                    executable: e1,
                    ..
                },
                RootVariant::ForeignFile {
                    fetch: f2,
                    content: c2,
                    mirrors: m2,
                    sha256: sh2,
                    sha512: sv2,
                    name: n2,
                    executable: e2,
                    ..
                },
            ) => f1 == f2 && c1 == c2 && m1 == m2 && sh1 == sh2 && sv1 == sv2 && n1 == n2 && e1 == e2,
            (
                RootVariant::GitTree {
                    id: i1,
                    cmd: cmd1,
                    env: e1,
                    inherit_env: ie1,
                    ..
                },
                RootVariant::GitTree {
                    id: i2,
                    cmd: cmd2,
                    env: e2,
                    inherit_env: ie2,
                    ..
                },
            ) => i1 == i2 && cmd1 == cmd2 && e1 == e2 && ie1 == ie2,
            (
                RootVariant::Distdir { repositories: r1, .. },
                RootVariant::Distdir { repositories: r2, .. },
            ) => r1 == r2,
            _ => false,
        },
        _ => false,
    }
}

enum Verdict {
    Different,
    Equal(Vec<Pair>),
}

fn try_equal(graph: &RepoGraph, a: &str, b: &str, different: &HashSet<Pair>) -> Verdict {
    let Some(da) = graph.get(a) else {
        return Verdict::Different;
    };
    let Some(db) = graph.get(b) else {
        return Verdict::Different;
    };

    if da.target_file_name() != db.target_file_name()
        || da.rule_file_name() != db.rule_file_name()
        || da.expression_file_name() != db.expression_file_name()
    {
        return Verdict::Different;
    }

    let mut deps = Vec::new();

    let slots: [fn(&RepositoryDescription) -> Option<&RootSlot>; 4] = [
        |d| Some(&d.repository),
        |d| d.target_root.as_ref(),
        |d| d.rule_root.as_ref(),
        |d| d.expression_root.as_ref(),
    ];
    for selector in slots {
        let ra = effective_slot(graph, da, selector);
        let rb = effective_slot(graph, db, selector);
        if !roots_equal(ra, rb, different, &mut deps) {
            return Verdict::Different;
        }
    }

    let ba = da.bindings();
    let bb = db.bindings();
    if ba.keys().collect::<BTreeSet<_>>() != bb.keys().collect::<BTreeSet<_>>() {
        return Verdict::Different;
    }
    for (key, u) in ba {
        let v = &bb[key];
        if u == v {
            continue;
        }
        let pk = pair_key(u, v);
        if different.contains(&pk) {
            return Verdict::Different;
        }
        deps.push(pk);
    }

    Verdict::Equal(deps)
}

/// Compute the coarsest equivalence relation over `graph`'s repository
/// names. Returns the `different` set's complement, expressed as a map
/// from name to its class representative's *provisional* id (via
/// union-find root), ready for [`classes_from`].
fn compute_equivalence(graph: &RepoGraph) -> HashSet<Pair> {
    let names: Vec<String> = graph.keys().cloned().collect();
    let mut different: HashSet<Pair> = HashSet::new();
    let mut pending: HashMap<Pair, Vec<Pair>> = HashMap::new();

    let mark_different = |pair: Pair, different: &mut HashSet<Pair>, pending: &mut HashMap<Pair, Vec<Pair>>| {
        let mut queue = VecDeque::new();
        queue.push_back(pair);
        while let Some(p) = queue.pop_front() {
            if !different.insert(p.clone()) {
                continue;
            }
            if let Some(dependents) = pending.remove(&p) {
                queue.extend(dependents);
            }
        }
    };

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let pair = pair_key(&names[i], &names[j]);
                if different.contains(&pair) {
                    continue;
                }
                match try_equal(graph, &names[i], &names[j], &different) {
                    Verdict::Different => {
                        mark_different(pair, &mut different, &mut pending);
                        changed = true;
                    }
                    Verdict::Equal(deps) => {
                        for dep in deps {
                            if different.contains(&dep) {
                                mark_different(pair.clone(), &mut different, &mut pending);
                                changed = true;
                                break;
                            }
                            pending.entry(dep).or_default().push(pair.clone());
                        }
                    }
                }
            }
        }
    }

    different
}

struct UnionFind {
    parent: HashMap<String, String>,
}

impl UnionFind {
    fn new(names: impl Iterator<Item = String>) -> Self {
        let mut parent = HashMap::new();
        for n in names {
            parent.insert(n.clone(), n);
        }
        Self { parent }
    }

    fn find(&mut self, x: &str) -> String {
        let p = self.parent.get(x).cloned().unwrap_or_else(|| x.to_string());
        if p == x {
            return p;
        }
        let root = self.find(&p);
        self.parent.insert(x.to_string(), root.clone());
        root
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

fn classes_from(graph: &RepoGraph, different: &HashSet<Pair>) -> BTreeMap<String, BTreeSet<String>> {
    let names: Vec<String> = graph.keys().cloned().collect();
    let mut uf = UnionFind::new(names.iter().cloned());
    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            let pair = pair_key(&names[i], &names[j]);
            if !different.contains(&pair) {
                uf.union(&names[i], &names[j]);
            }
        }
    }
    let mut classes: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in &names {
        let root = uf.find(name);
        classes.entry(root).or_default().insert(name.clone());
    }
    classes
}

fn pick_representative(class: &BTreeSet<String>, graph: &RepoGraph, keep: &BTreeSet<String>) -> String {
    let is_object_rooted = |name: &String| matches!(graph[name].repository, RootSlot::Object(_));

    let object_rooted: Vec<String> = class.iter().filter(|n| is_object_rooted(n)).cloned().collect();
    let pool: Vec<String> = if object_rooted.is_empty() {
        class.iter().cloned().collect()
    } else {
        object_rooted
    };

    let kept: Vec<String> = pool.iter().filter(|n| keep.contains(*n)).cloned().collect();
    let pool = if kept.is_empty() { pool } else { kept };

    pool.into_iter()
        .min_by_key(|n| (n.matches('/').count(), n.len(), n.clone()))
        .expect("a class is never empty")
}

fn merge_pragma_for_class(class: &BTreeSet<String>, graph: &RepoGraph, representative: &str) -> Pragma {
    let rep_pragma = resolve_root(graph, &graph[representative].repository)
        .map(RootVariant::pragma)
        .cloned()
        .unwrap_or_default();

    let mut absent_all = true;
    let mut to_git_any = false;
    let mut saw_object_rooted = false;
    for name in class {
        if let Some(obj) = resolve_root(graph, &graph[name].repository) {
            saw_object_rooted = true;
            let p = obj.pragma();
            absent_all &= p.absent.unwrap_or(false);
            to_git_any |= p.to_git.unwrap_or(false);
        }
    }

    Pragma {
        special: rep_pragma.special,
        absent: if saw_object_rooted { Some(absent_all) } else { rep_pragma.absent },
        to_git: if saw_object_rooted { Some(to_git_any) } else { rep_pragma.to_git },
    }
}

fn remap_slot(slot: &RootSlot, subst: &HashMap<String, String>) -> RootSlot {
    match slot {
        RootSlot::Name(n) => RootSlot::Name(subst.get(n).cloned().unwrap_or_else(|| n.clone())),
        RootSlot::Object(obj) => RootSlot::Object(remap_object(obj, subst)),
    }
}

fn remap_object(obj: &RootVariant, subst: &HashMap<String, String>) -> RootVariant {
    match obj {
        RootVariant::Distdir {
            repositories,
            pragma,
        } => RootVariant::Distdir {
            repositories: repositories
                .iter()
                .map(|n| subst.get(n).cloned().unwrap_or_else(|| n.clone()))
                .collect(),
            pragma: pragma.clone(),
        },
        RootVariant::Computed {
            repo,
            target,
            config,
            pragma,
        } => RootVariant::Computed {
            repo: subst.get(repo).cloned().unwrap_or_else(|| repo.clone()),
            target: target.clone(),
            config: config.clone(),
            pragma: pragma.clone(),
        },
        RootVariant::TreeStructure {
            repo,
            target,
            config,
            pragma,
        } => RootVariant::TreeStructure {
            repo: subst.get(repo).cloned().unwrap_or_else(|| repo.clone()),
            target: target.clone(),
            config: config.clone(),
            pragma: pragma.clone(),
        },
        other => other.clone(),
    }
}

/// Deduplicate `graph`, treating every name in `keep` (plus the main
/// repository, which the caller must include) as one to never drop.
/// Idempotent: applying this to its own output is a no-op beyond name
/// stability.
///
/// Mirrors the original's "rename only if `repo not in keep`" rule: a
/// `keep` member is never folded away even when it is bisimilar to
/// another class member, though its internal references still get
/// remapped onto representatives like everything else.
pub fn deduplicate(graph: &RepoGraph, keep: &BTreeSet<String>) -> RepoGraph {
    let different = compute_equivalence(graph);
    let classes = classes_from(graph, &different);

    let mut subst: HashMap<String, String> = HashMap::new();
    let mut survivors: BTreeMap<String, Pragma> = BTreeMap::new();
    for class in classes.values() {
        let representative = pick_representative(class, graph, keep);
        let pragma = merge_pragma_for_class(class, graph, &representative);
        for member in class {
            if member != &representative && keep.contains(member) {
                // A kept non-representative member survives under its own
                // name; only non-kept members collapse onto the representative.
                subst.insert(member.clone(), member.clone());
                survivors.insert(member.clone(), pragma.clone());
            } else {
                subst.insert(member.clone(), representative.clone());
            }
        }
        survivors.insert(representative.clone(), pragma);
    }

    let mut out = RepoGraph::new();
    for (name, merged_pragma) in survivors {
        let desc = &graph[&name];
        let repository = match &desc.repository {
            RootSlot::Object(obj) => RootSlot::Object(remap_object(obj, &subst).with_pragma(merged_pragma)),
            slot => remap_slot(slot, &subst),
        };
        let target_root = desc.target_root.as_ref().map(|s| remap_slot(s, &subst));
        let rule_root = desc.rule_root.as_ref().map(|s| remap_slot(s, &subst));
        let expression_root = desc.expression_root.as_ref().map(|s| remap_slot(s, &subst));
        let bindings = desc.bindings.as_ref().map(|b| {
            b.iter()
                .map(|(alias, target)| {
                    (
                        alias.clone(),
                        subst.get(target).cloned().unwrap_or_else(|| target.clone()),
                    )
                })
                .collect()
        });
        out.insert(
            name,
            RepositoryDescription {
                repository,
                target_root,
                rule_root,
                expression_root,
                target_file_name: desc.target_file_name.clone(),
                rule_file_name: desc.rule_file_name.clone(),
                expression_file_name: desc.expression_file_name.clone(),
                bindings,
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive(content: &str) -> RepositoryDescription {
        RepositoryDescription {
            repository: RootSlot::Object(RootVariant::Archive {
                fetch: "https://example.invalid/a.tar".to_string(),
                content: Some(content.to_string()),
                subdir: None,
                mirrors: None,
                sha256: None,
                sha512: None,
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
    fn scenario_a_identical_archives_merge() {
        let mut graph = RepoGraph::new();
        graph.insert("x".to_string(), archive(&"a".repeat(40)));
        graph.insert("y".to_string(), archive(&"a".repeat(40)));
        let mut other = archive(&"b".repeat(40));
        other.bindings = Some(BTreeMap::from([("dep".to_string(), "y".to_string())]));
        graph.insert("z".to_string(), other);

        let keep = BTreeSet::from(["x".to_string()]);
        let out = deduplicate(&graph, &keep);

        assert!(out.contains_key("x"));
        assert!(!out.contains_key("y"));
        assert_eq!(out["z"].bindings().get("dep"), Some(&"x".to_string()));
    }

    #[test]
    fn dedup_is_idempotent() {
        let mut graph = RepoGraph::new();
        graph.insert("x".to_string(), archive(&"a".repeat(40)));
        graph.insert("y".to_string(), archive(&"a".repeat(40)));
        let keep = BTreeSet::new();

        let once = deduplicate(&graph, &keep);
        let twice = deduplicate(&once, &keep);
        assert_eq!(once, twice);
    }

    #[test]
    fn keep_set_members_survive() {
        let mut graph = RepoGraph::new();
        graph.insert("x".to_string(), archive(&"a".repeat(40)));
        graph.insert("y".to_string(), archive(&"a".repeat(40)));
        let keep = BTreeSet::from(["y".to_string()]);

        let out = deduplicate(&graph, &keep);
        assert!(out.contains_key("y"));
        assert!(!out.contains_key("x"));
    }

    #[test]
    fn two_keep_members_in_the_same_class_both_survive() {
        let mut graph = RepoGraph::new();
        graph.insert("x".to_string(), archive(&"a".repeat(40)));
        graph.insert("y".to_string(), archive(&"a".repeat(40)));
        let keep = BTreeSet::from(["x".to_string(), "y".to_string()]);

        let out = deduplicate(&graph, &keep);
        assert!(out.contains_key("x"));
        assert!(out.contains_key("y"));
    }

    #[test]
    fn scenario_f_mutual_bindings_merge_into_two_classes() {
        let mut graph = RepoGraph::new();

        let mut a = archive(&"a".repeat(40));
        a.bindings = Some(BTreeMap::from([("x".to_string(), "a2".to_string())]));
        graph.insert("a".to_string(), a);

        let mut b = archive(&"a".repeat(40));
        b.bindings = Some(BTreeMap::from([("x".to_string(), "b2".to_string())]));
        graph.insert("b".to_string(), b);

        graph.insert("a2".to_string(), archive(&"c".repeat(40)));
        graph.insert("b2".to_string(), archive(&"c".repeat(40)));

        let different = compute_equivalence(&graph);
        assert!(!different.contains(&pair_key("a", "b")));
        assert!(!different.contains(&pair_key("a2", "b2")));
    }
}
