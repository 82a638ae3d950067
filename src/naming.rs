//! Assigns fresh, collision-free names to the repositories pulled in by
//! one import entry's closure.

use std::collections::{BTreeMap, BTreeSet};

/// Map from foreign repository name to the name it is assigned in the
/// core graph. `imported` is `to_import ∪ extra_imports` from
/// [`crate::closure::closure`]; `existing` is every name already present
/// in the core graph (plus names assigned by earlier imports in this
/// run).
pub fn name_imports(
    imported: &BTreeSet<String>,
    foreign_main: &str,
    import_as: Option<&str>,
    existing: &BTreeSet<String>,
) -> BTreeMap<String, String> {
    let mut taken = existing.clone();
    let mut assigned = BTreeMap::new();

    let prefix = import_as.unwrap_or(foreign_main).to_string();

    if imported.contains(foreign_main) {
        let main_name = dedupe(prefix.clone(), &taken);
        taken.insert(main_name.clone());
        assigned.insert(foreign_main.to_string(), main_name);
    }

    for name in imported {
        if name == foreign_main {
            continue;
        }
        let candidate = format!("{prefix}/{name}");
        let final_name = dedupe(candidate, &taken);
        taken.insert(final_name.clone());
        assigned.insert(name.clone(), final_name);
    }

    assigned
}

/// Append ` (<n>)`, `n = 1, 2, …`, until `candidate` is not in `taken`.
fn dedupe(candidate: String, taken: &BTreeSet<String>) -> String {
    if !taken.contains(&candidate) {
        return candidate;
    }
    let mut n = 1u32;
    loop {
        let attempt = format!("{candidate} ({n})");
        if !taken.contains(&attempt) {
            return attempt;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_gets_import_as_name_others_get_prefixed_names() {
        let imported = BTreeSet::from(["root".to_string(), "lib".to_string()]);
        let existing = BTreeSet::new();
        let assigned = name_imports(&imported, "root", Some("foo"), &existing);
        assert_eq!(assigned["root"], "foo");
        assert_eq!(assigned["lib"], "foo/lib");
    }

    #[test]
    fn missing_import_as_falls_back_to_foreign_main_name() {
        let imported = BTreeSet::from(["root".to_string()]);
        let existing = BTreeSet::new();
        let assigned = name_imports(&imported, "root", None, &existing);
        assert_eq!(assigned["root"], "root");
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let imported = BTreeSet::from(["root".to_string()]);
        let existing = BTreeSet::from(["foo".to_string(), "foo (1)".to_string()]);
        let assigned = name_imports(&imported, "root", Some("foo"), &existing);
        assert_eq!(assigned["root"], "foo (2)");
    }

    #[test]
    fn assigned_names_are_injective_and_disjoint_from_existing() {
        let imported = BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()]);
        let existing = BTreeSet::from(["foo/b".to_string()]);
        let assigned = name_imports(&imported, "a", Some("foo"), &existing);

        let mut values: Vec<_> = assigned.values().cloned().collect();
        let unique: BTreeSet<_> = values.iter().cloned().collect();
        values.sort();
        assert_eq!(values.len(), unique.len(), "assignment must be injective");
        for v in &unique {
            assert!(!existing.contains(v), "must not collide with existing names");
        }
    }
}
