//! The repository-graph data model: root variants, repository
//! descriptions, and the on-disk lockfile shapes they serialize to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Hints attached to a root description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pragma {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "to_git")]
    pub to_git: Option<bool>,
}

impl Pragma {
    pub fn is_empty(&self) -> bool {
        self.special.is_none() && self.absent.is_none() && self.to_git.is_none()
    }

    /// OR `absent`/`to_git`, overwrite `special` only when told to.
    pub fn merge_overlay(&self, overlay: &Pragma, overwrite_special: bool) -> Pragma {
        Pragma {
            special: if overwrite_special {
                overlay.special.clone().or_else(|| self.special.clone())
            } else {
                self.special.clone()
            },
            absent: or_opt_bool(self.absent, overlay.absent),
            to_git: or_opt_bool(self.to_git, overlay.to_git),
        }
    }
}

fn or_opt_bool(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(false) || b.unwrap_or(false)),
    }
}

/// A root description: a concrete content reference for a repository's
/// file tree. Every variant may carry a `pragma`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RootVariant {
    File {
        path: String,
        #[serde(skip_serializing_if = "Pragma::is_empty", default)]
        pragma: Pragma,
    },
    Git {
        repository: String,
        branch: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        commit: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subdir: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mirrors: Option<Vec<String>>,
        #[serde(rename = "inherit env", skip_serializing_if = "Option::is_none")]
        inherit_env: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Pragma::is_empty", default)]
        pragma: Pragma,
    },
    #[serde(rename = "archive")]
    Archive {
        fetch: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subdir: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mirrors: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha512: Option<String>,
        #[serde(skip_serializing_if = "Pragma::is_empty", default)]
        pragma: Pragma,
    },
    #[serde(rename = "zip")]
    Zip {
        fetch: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subdir: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mirrors: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha512: Option<String>,
        #[serde(skip_serializing_if = "Pragma::is_empty", default)]
        pragma: Pragma,
    },
    #[serde(rename = "foreign file")]
    ForeignFile {
        fetch: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mirrors: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha512: Option<String>,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        executable: Option<bool>,
        #[serde(skip_serializing_if = "Pragma::is_empty", default)]
        pragma: Pragma,
    },
    #[serde(rename = "git tree")]
    GitTree {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cmd: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        env: Option<BTreeMap<String, String>>,
        #[serde(rename = "inherit env", skip_serializing_if = "Option::is_none")]
        inherit_env: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Pragma::is_empty", default)]
        pragma: Pragma,
    },
    Distdir {
        repositories: Vec<String>,
        #[serde(skip_serializing_if = "Pragma::is_empty", default)]
        pragma: Pragma,
    },
    Computed {
        repo: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Pragma::is_empty", default)]
        pragma: Pragma,
    },
    #[serde(rename = "tree structure")]
    TreeStructure {
        repo: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Pragma::is_empty", default)]
        pragma: Pragma,
    },
}

impl RootVariant {
    pub fn pragma(&self) -> &Pragma {
        match self {
            RootVariant::File { pragma, .. }
            | RootVariant::Git { pragma, .. }
            | RootVariant::Archive { pragma, .. }
            | RootVariant::Zip { pragma, .. }
            | RootVariant::ForeignFile { pragma, .. }
            | RootVariant::GitTree { pragma, .. }
            | RootVariant::Distdir { pragma, .. }
            | RootVariant::Computed { pragma, .. }
            | RootVariant::TreeStructure { pragma, .. } => pragma,
        }
    }

    pub fn with_pragma(mut self, new: Pragma) -> Self {
        match &mut self {
            RootVariant::File { pragma, .. }
            | RootVariant::Git { pragma, .. }
            | RootVariant::Archive { pragma, .. }
            | RootVariant::Zip { pragma, .. }
            | RootVariant::ForeignFile { pragma, .. }
            | RootVariant::GitTree { pragma, .. }
            | RootVariant::Distdir { pragma, .. }
            | RootVariant::Computed { pragma, .. }
            | RootVariant::TreeStructure { pragma, .. } => *pragma = new,
        }
        self
    }

    /// `repo` field of `computed`/`tree structure` roots, if this is one.
    pub fn base_repo(&self) -> Option<&str> {
        match self {
            RootVariant::Computed { repo, .. } | RootVariant::TreeStructure { repo, .. } => {
                Some(repo)
            }
            _ => None,
        }
    }

    /// Entry names of a `distdir` root, if this is one.
    pub fn distdir_entries(&self) -> Option<&[String]> {
        match self {
            RootVariant::Distdir { repositories, .. } => Some(repositories),
            _ => None,
        }
    }
}

/// A root slot: either a concrete root object, or a string naming another
/// repository whose root is transitively used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RootSlot {
    Name(String),
    Object(RootVariant),
}

impl RootSlot {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            RootSlot::Name(n) => Some(n),
            RootSlot::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&RootVariant> {
        match self {
            RootSlot::Object(o) => Some(o),
            RootSlot::Name(_) => None,
        }
    }
}

/// A single repository's description in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDescription {
    pub repository: RootSlot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_root: Option<RootSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_root: Option<RootSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression_root: Option<RootSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bindings: Option<BTreeMap<String, String>>,
}

impl RepositoryDescription {
    pub fn target_file_name(&self) -> &str {
        self.target_file_name.as_deref().unwrap_or("TARGETS")
    }

    pub fn rule_file_name(&self) -> &str {
        self.rule_file_name.as_deref().unwrap_or("RULES")
    }

    pub fn expression_file_name(&self) -> &str {
        self.expression_file_name.as_deref().unwrap_or("EXPRESSIONS")
    }

    pub fn bindings(&self) -> &BTreeMap<String, String> {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        self.bindings.as_ref().unwrap_or(&EMPTY)
    }
}

/// The full named repository graph.
pub type RepoGraph = BTreeMap<String, RepositoryDescription>;

/// `{ alias?, repo?, map?, pragma? }` entry inside an import's `repos` list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportRepoEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pragma: Option<Pragma>,
    #[serde(rename = "as plain", skip_serializing_if = "Option::is_none")]
    pub as_plain: Option<bool>,
}

/// Per-source-kind fields of an import entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ImportSource {
    Git {
        url: String,
        branch: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        commit: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mirrors: Option<Vec<String>>,
        #[serde(rename = "inherit env", skip_serializing_if = "Option::is_none")]
        inherit_env: Option<Vec<String>>,
    },
    File {
        path: String,
    },
    Archive {
        fetch: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mirrors: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha512: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subdir: Option<String>,
        #[serde(rename = "archive_type", default = "default_archive_type")]
        archive_type: String,
    },
    #[serde(rename = "git tree")]
    GitTree {
        #[serde(skip_serializing_if = "Option::is_none")]
        cmd: Option<Vec<String>>,
        #[serde(rename = "cmd gen", skip_serializing_if = "Option::is_none")]
        cmd_gen: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        env: Option<BTreeMap<String, String>>,
        #[serde(rename = "inherit env", skip_serializing_if = "Option::is_none")]
        inherit_env: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subdir: Option<String>,
    },
    Generic {
        cmd: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        env: Option<BTreeMap<String, String>>,
        #[serde(rename = "inherit env", skip_serializing_if = "Option::is_none")]
        inherit_env: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },
}

fn default_archive_type() -> String {
    "tar".to_string()
}

/// A single `imports` list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportEntry {
    #[serde(flatten)]
    pub source: ImportSource,
    #[serde(default)]
    pub repos: Vec<ImportRepoEntry>,
}

/// The input lockfile shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repositories: Option<RepoGraph>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imports: Option<Vec<ImportEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep: Option<Vec<String>>,
}

impl LockInput {
    pub fn repositories(&self) -> RepoGraph {
        self.repositories.clone().unwrap_or_default()
    }

    pub fn imports(&self) -> &[ImportEntry] {
        self.imports.as_deref().unwrap_or(&[])
    }

    pub fn keep(&self) -> Vec<String> {
        self.keep.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_root_roundtrips_through_json() {
        let root = RootVariant::File {
            path: "src/lib".to_string(),
            pragma: Pragma::default(),
        };
        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json["type"], "file");
        let back: RootVariant = serde_json::from_value(json).unwrap();
        assert_eq!(back, root);
    }

    #[test]
    fn root_slot_accepts_string_or_object() {
        let name: RootSlot = serde_json::from_str("\"other\"").unwrap();
        assert_eq!(name.as_name(), Some("other"));

        let obj: RootSlot =
            serde_json::from_str(r#"{"type": "file", "path": "."}"#).unwrap();
        assert!(obj.as_object().is_some());
    }

    #[test]
    fn pragma_merge_ors_absent_and_to_git_overwrites_special_conditionally() {
        let base = Pragma {
            special: Some("ignore".to_string()),
            absent: Some(false),
            to_git: Some(false),
        };
        let overlay = Pragma {
            special: Some("other".to_string()),
            absent: Some(true),
            to_git: Some(false),
        };
        let merged_no_overwrite = base.merge_overlay(&overlay, false);
        assert_eq!(merged_no_overwrite.special, Some("ignore".to_string()));
        assert_eq!(merged_no_overwrite.absent, Some(true));

        let merged_overwrite = base.merge_overlay(&overlay, true);
        assert_eq!(merged_overwrite.special, Some("other".to_string()));
    }

    #[test]
    fn git_tree_import_source_carries_cmd_gen_alternative() {
        let json = serde_json::json!({
            "source": "git tree",
            "cmd gen": ["generate.sh"],
            "repos": []
        });
        let entry: ImportEntry = serde_json::from_value(json).unwrap();
        match entry.source {
            ImportSource::GitTree { cmd, cmd_gen, .. } => {
                assert!(cmd.is_none());
                assert_eq!(cmd_gen, Some(vec!["generate.sh".to_string()]));
            }
            _ => panic!("expected git tree source"),
        }
    }
}
