//! `ParsedGraph`: the value the Markdown/YAML loader hands to the engine,
//! and the DAG-level container types built from it (§3, §6).

use crate::budget::ExecutionBudget;
use crate::node::{Node, NodePath};
use serde::{Deserialize, Serialize};

/// A group of nodes sharing a common path prefix, as produced by the
/// loader from one `### AgenticDSL \`<path>\`` block.
///
/// Either a subgraph container (multiple nodes under one prefix) or a
/// single-node block; the loader is responsible for producing the fully
/// path-qualified [`Node`] values either way, so downstream code (the
/// scheduler) only ever sees a flat `Vec<Node>` per `ParsedGraph`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedGraph {
    /// Common path prefix for this block (e.g. `/main`, `/dynamic/plan_1`).
    pub prefix: NodePath,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub budget: Option<ExecutionBudget>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub is_standard_library: bool,
}

impl ParsedGraph {
    pub fn single(node: Node) -> Self {
        ParsedGraph {
            prefix: node.path.clone(),
            nodes: vec![node],
            budget: None,
            signature: None,
            permissions: Vec::new(),
            is_standard_library: false,
        }
    }
}
