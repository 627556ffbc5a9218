//! Standard-Library Index (§4.9): descriptors of known subgraph paths,
//! exposed to LLM prompts as `ctx.available_subgraphs`.

use crate::node::NodePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Whether a descriptor names a fixed `/lib/` entry or a graph spliced in
/// during this run under `/dynamic/`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Stable,
    Dynamic,
}

/// A callable-subgraph descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphDescriptor {
    pub path: NodePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub is_subgraph: bool,
    pub stability: Stability,
}

/// Registry of known subgraph descriptors: `/lib/` entries loaded at setup
/// time plus `/dynamic/` graphs spliced in during the run.
#[derive(Debug, Default)]
pub struct StdlibIndex {
    entries: BTreeMap<NodePath, SubgraphDescriptor>,
}

impl StdlibIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: SubgraphDescriptor) {
        self.entries.insert(descriptor.path.clone(), descriptor);
    }

    pub fn get(&self, path: &str) -> Option<&SubgraphDescriptor> {
        self.entries.get(path)
    }

    /// Builds the `ctx.available_subgraphs` value: library entries marked
    /// as subgraphs, plus live `/dynamic/` graphs whose signature yields a
    /// non-null output schema.
    pub fn available_subgraphs(&self) -> Value {
        let list: Vec<Value> = self
            .entries
            .values()
            .filter(|d| {
                d.is_subgraph
                    && (d.stability == Stability::Stable || d.output_schema.is_some())
            })
            .map(|d| {
                serde_json::json!({
                    "path": d.path,
                    "signature": d.signature,
                    "output_schema": d.output_schema,
                    "permissions": d.permissions,
                    "stability": match d.stability {
                        Stability::Stable => "stable",
                        Stability::Dynamic => "dynamic",
                    },
                })
            })
            .collect();
        Value::Array(list)
    }
}
