//! Transitive closure of repositories reachable from a foreign import's
//! declared main: which ones are imported in full (bindings followed
//! too) versus only as layers.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::model::{RepoGraph, RootSlot};

/// Whether a repository was reached via a binding edge (`Full`, imported
/// completely) or only via a layer/computed-base edge (`Layer`, imported
/// but its own bindings are not followed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReachKind {
    Layer,
    Full,
}

/// `to_import` (bound repositories) and `extra_imports` (layer-only
/// repositories) reachable from `start` in `graph`, skipping anything in
/// `known` (already satisfied by the caller's `map`).
pub fn closure(
    graph: &RepoGraph,
    start: &str,
    known: &BTreeSet<String>,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut kind: BTreeMap<String, ReachKind> = BTreeMap::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    visit(start, ReachKind::Full, known, &mut kind, &mut queue);

    while let Some(name) = queue.pop_front() {
        let Some(desc) = graph.get(&name) else {
            continue;
        };
        let current = kind[&name];

        for layer_slot in [&desc.target_root, &desc.rule_root, &desc.expression_root]
            .into_iter()
            .flatten()
        {
            if let RootSlot::Name(target) = layer_slot {
                visit(target, ReachKind::Layer, known, &mut kind, &mut queue);
            }
        }
        if let Some(base) = desc.repository.as_object().and_then(|o| o.base_repo()) {
            visit(base, ReachKind::Layer, known, &mut kind, &mut queue);
        }
        if let RootSlot::Name(target) = &desc.repository {
            visit(target, ReachKind::Layer, known, &mut kind, &mut queue);
        }

        if current == ReachKind::Full {
            for target in desc.bindings().values() {
                visit(target, ReachKind::Full, known, &mut kind, &mut queue);
            }
        }
    }

    let mut to_import = BTreeSet::new();
    let mut extra_imports = BTreeSet::new();
    for (name, k) in kind {
        match k {
            ReachKind::Full => {
                to_import.insert(name);
            }
            ReachKind::Layer => {
                extra_imports.insert(name);
            }
        }
    }
    (to_import, extra_imports)
}

fn visit(
    name: &str,
    proposed: ReachKind,
    known: &BTreeSet<String>,
    kind: &mut BTreeMap<String, ReachKind>,
    queue: &mut VecDeque<String>,
) {
    if known.contains(name) {
        return;
    }
    let upgraded = match kind.get(name) {
        None => true,
        Some(existing) => proposed > *existing,
    };
    if upgraded {
        kind.insert(name.to_string(), proposed);
        queue.push_back(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Pragma, RepositoryDescription, RootVariant};
    use std::collections::BTreeMap as Map;

    fn file_desc(path: &str) -> RepositoryDescription {
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
    fn binding_edges_are_fully_imported() {
        let mut graph = RepoGraph::new();
        let mut a = file_desc(".");
        a.bindings = Some(Map::from([("dep".to_string(), "b".to_string())]));
        graph.insert("a".to_string(), a);
        graph.insert("b".to_string(), file_desc("lib"));

        let (to_import, extra) = closure(&graph, "a", &BTreeSet::new());
        assert_eq!(to_import, BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert!(extra.is_empty());
    }

    #[test]
    fn layer_only_edges_do_not_pull_in_bindings() {
        let mut graph = RepoGraph::new();
        let mut a = file_desc(".");
        a.target_root = Some(RootSlot::Name("layer".to_string()));
        graph.insert("a".to_string(), a);

        let mut layer = file_desc("x");
        layer.bindings = Some(Map::from([("dep".to_string(), "unreached".to_string())]));
        graph.insert("layer".to_string(), layer);
        graph.insert("unreached".to_string(), file_desc("y"));

        let (to_import, extra) = closure(&graph, "a", &BTreeSet::new());
        assert_eq!(to_import, BTreeSet::from(["a".to_string()]));
        assert_eq!(extra, BTreeSet::from(["layer".to_string()]));
        assert!(!to_import.contains("unreached") && !extra.contains("unreached"));
    }

    #[test]
    fn a_node_reached_both_ways_counts_only_as_full() {
        let mut graph = RepoGraph::new();
        let mut a = file_desc(".");
        a.target_root = Some(RootSlot::Name("b".to_string()));
        a.bindings = Some(Map::from([("dep".to_string(), "b".to_string())]));
        graph.insert("a".to_string(), a);
        graph.insert("b".to_string(), file_desc("lib"));

        let (to_import, extra) = closure(&graph, "a", &BTreeSet::new());
        assert!(to_import.contains("b"));
        assert!(!extra.contains("b"));
    }

    #[test]
    fn known_repositories_are_never_followed() {
        let mut graph = RepoGraph::new();
        let mut a = file_desc(".");
        a.bindings = Some(Map::from([("dep".to_string(), "b".to_string())]));
        graph.insert("a".to_string(), a);
        graph.insert("b".to_string(), file_desc("lib"));

        let known = BTreeSet::from(["b".to_string()]);
        let (to_import, extra) = closure(&graph, "a", &known);
        assert_eq!(to_import, BTreeSet::from(["a".to_string()]));
        assert!(extra.is_empty());
    }

    #[test]
    fn bare_name_repository_reference_is_followed() {
        let mut graph = RepoGraph::new();
        let mut a = file_desc(".");
        a.repository = RootSlot::Name("aliased".to_string());
        graph.insert("a".to_string(), a);
        graph.insert("aliased".to_string(), file_desc("lib"));

        let (to_import, extra) = closure(&graph, "a", &BTreeSet::new());
        assert_eq!(to_import, BTreeSet::from(["a".to_string()]));
        assert_eq!(extra, BTreeSet::from(["aliased".to_string()]));
    }

    #[test]
    fn closure_is_monotone_in_known() {
        let mut graph = RepoGraph::new();
        let mut a = file_desc(".");
        a.bindings = Some(Map::from([
            ("x".to_string(), "b".to_string()),
            ("y".to_string(), "c".to_string()),
        ]));
        graph.insert("a".to_string(), a);
        graph.insert("b".to_string(), file_desc("lib-b"));
        graph.insert("c".to_string(), file_desc("lib-c"));

        let (small_to_import, _) = closure(&graph, "a", &BTreeSet::new());
        let enlarged_known = BTreeSet::from(["b".to_string()]);
        let (enlarged_to_import, _) = closure(&graph, "a", &enlarged_known);

        assert!(enlarged_to_import.is_subset(&small_to_import));
    }
}
