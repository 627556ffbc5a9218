//! Node path grammar and the node data model (§3 of the node-type table).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A hierarchical, `/`-prefixed node identifier.
///
/// Valid paths match `^/[A-Za-z0-9_\-/]+$`. This is a thin `String` newtype
/// rather than a borrowed-slice type since paths are cheaply cloned and
/// stored as map keys throughout the scheduler.
pub type NodePath = String;

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/[A-Za-z0-9_\-/]+$").unwrap())
}

/// Returns `true` if `path` conforms to the node path grammar.
pub fn is_valid_path(path: &str) -> bool {
    path_regex().is_match(path)
}

/// Well-known reserved path prefixes.
pub mod prefix {
    pub const SYSTEM: &str = "/__system__/";
    pub const LIB: &str = "/lib/";
    pub const DYNAMIC: &str = "/dynamic/";
    pub const RESOURCES: &str = "/resources/";
    pub const MAIN: &str = "/main";
}

/// Well-known system node paths.
pub mod system_path {
    pub const BUDGET_EXCEEDED: &str = "/__system__/budget_exceeded";
    pub const END_SOFT: &str = "/__system__/end_soft";
    pub const NOOP: &str = "/__system__/noop";
}

/// How a `wait_for` dependency set is expressed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WaitFor {
    /// A plain list of statically-known paths (`all_of` semantics).
    Direct(Vec<NodePath>),
    /// `{all_of: [...]}` — identical semantics to `Direct`.
    AllOf { all_of: Vec<NodePath> },
    /// `{any_of: [...]}` — collapsed to `all_of` semantics in this engine
    /// (see the dynamic-DAG design notes); the tag is preserved so a future
    /// event-driven scheduler can special-case it.
    AnyOf { any_of: Vec<NodePath> },
    /// A template expression evaluated at run time against the current
    /// context, expected to render to a JSON array of paths.
    Expr(String),
}

impl WaitFor {
    /// The statically-known dependency set, if this variant doesn't require
    /// template evaluation at run time.
    pub fn static_deps(&self) -> Option<&[NodePath]> {
        match self {
            WaitFor::Direct(v) => Some(v),
            WaitFor::AllOf { all_of } => Some(all_of),
            WaitFor::AnyOf { any_of } => Some(any_of),
            WaitFor::Expr(_) => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, WaitFor::Expr(_))
    }
}

/// `next` accepts either a single path or a list; this type normalizes both
/// forms at the data-model level so downstream code only sees `Vec`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::None => Vec::new(),
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Termination mode for an `end` node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TerminationMode {
    #[default]
    Hard,
    Soft,
}

/// Signature-validation strictness for `generate_subgraph`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureValidation {
    Strict,
    Warn,
    #[default]
    Ignore,
}

/// Declared scope of a `resource` node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceScope {
    Global,
    Local,
}

/// The per-variant payload of a node, mirroring §3's node-type table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeVariant {
    Start,
    End {
        #[serde(default)]
        termination_mode: TerminationMode,
    },
    Assign {
        assignments: std::collections::BTreeMap<String, String>,
    },
    ToolCall {
        tool: String,
        #[serde(default)]
        arguments: std::collections::BTreeMap<String, String>,
        #[serde(default)]
        output_keys: OneOrMany,
    },
    LlmCall {
        prompt_template: String,
        #[serde(default)]
        output_keys: OneOrMany,
    },
    Resource {
        resource_type: String,
        uri: String,
        scope: ResourceScope,
    },
    Fork {
        branches: Vec<NodePath>,
    },
    /// The branch paths to wait for are carried by the common `wait_for`
    /// attribute (not a second field here) so the wire form only ever has
    /// one `wait_for` key per node; see `Scheduler::join_branches`.
    Join {
        merge_strategy: crate::context::MergeStrategy,
    },
    GenerateSubgraph {
        prompt_template: String,
        #[serde(default)]
        output_keys: OneOrMany,
        #[serde(default)]
        signature_validation: SignatureValidation,
        #[serde(default)]
        on_signature_violation: Option<NodePath>,
    },
    Assert {
        condition: String,
        #[serde(default)]
        on_failure: Option<NodePath>,
    },
}

impl NodeVariant {
    /// The type tag used in traces and wire forms (`"assign"`, `"tool_call"`, …).
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeVariant::Start => "start",
            NodeVariant::End { .. } => "end",
            NodeVariant::Assign { .. } => "assign",
            NodeVariant::ToolCall { .. } => "tool_call",
            NodeVariant::LlmCall { .. } => "llm_call",
            NodeVariant::Resource { .. } => "resource",
            NodeVariant::Fork { .. } => "fork",
            NodeVariant::Join { .. } => "join",
            NodeVariant::GenerateSubgraph { .. } => "generate_subgraph",
            NodeVariant::Assert { .. } => "assert",
        }
    }
}

/// One node of the DAG: common attributes plus a variant payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub path: NodePath,
    #[serde(default)]
    pub next: Vec<NodePath>,
    #[serde(default)]
    pub wait_for: Option<WaitFor>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub variant: NodeVariant,
}

impl Node {
    pub fn new(path: impl Into<String>, variant: NodeVariant) -> Self {
        Node {
            path: path.into(),
            next: Vec::new(),
            wait_for: None,
            metadata: serde_json::Value::Null,
            signature: None,
            permissions: Vec::new(),
            variant,
        }
    }

    pub fn metadata_bool(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Whether this node requires a pre-execution snapshot per the
    /// execution session's snapshot policy (§4.6 step 1).
    pub fn requires_snapshot(&self) -> bool {
        match &self.variant {
            NodeVariant::Fork { .. }
            | NodeVariant::GenerateSubgraph { .. }
            | NodeVariant::Assert { .. } => true,
            NodeVariant::ToolCall { .. } => self.metadata_bool("rollback_on_failure"),
            _ => self.metadata_bool("snapshot_before_execution"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_node_path_grammar() {
        assert!(is_valid_path("/main/step1"));
        assert!(is_valid_path("/__system__/budget_exceeded"));
        assert!(!is_valid_path("main/step1"));
        assert!(!is_valid_path("/main/step with space"));
    }

    #[test]
    fn one_or_many_normalizes() {
        let yaml = "\"/main/end\"";
        let v: OneOrMany = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(v.into_vec(), vec!["/main/end".to_string()]);

        let yaml = "[\"/main/a\", \"/main/b\"]";
        let v: OneOrMany = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(v.into_vec(), vec!["/main/a".to_string(), "/main/b".to_string()]);
    }

    #[test]
    fn fork_requires_snapshot_by_default() {
        let node = Node::new("/main/fork1", NodeVariant::Fork { branches: vec![] });
        assert!(node.requires_snapshot());

        let node = Node::new(
            "/main/a1",
            NodeVariant::Assign {
                assignments: Default::default(),
            },
        );
        assert!(!node.requires_snapshot());
    }
}
