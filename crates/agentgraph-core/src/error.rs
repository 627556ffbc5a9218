//! Error types for graph parsing, construction, and execution.
//!
//! All errors that can surface from a run are collected into a single
//! [`AgentGraphError`] enum. Every variant maps to one of the error kinds
//! named in the engine's error taxonomy via [`AgentGraphError::error_code`],
//! which is what ends up in `TraceRecord.error_code` and in
//! `RunResult.message`.

use thiserror::Error;

/// Convenience result type using [`AgentGraphError`].
pub type Result<T> = std::result::Result<T, AgentGraphError>;

/// The kind of graph-structure failure behind a [`AgentGraphError::Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// A newly spliced or declared edge would introduce a cycle.
    Cycle,
    /// A referenced node path does not exist in the live graph.
    Missing,
    /// Two nodes were registered under the same path.
    Duplicate,
}

impl GraphErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            GraphErrorKind::Cycle => "cycle",
            GraphErrorKind::Missing => "missing",
            GraphErrorKind::Duplicate => "duplicate",
        }
    }
}

impl std::fmt::Display for GraphErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The budget dimension that was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetKind {
    Nodes,
    LlmCalls,
    Duration,
    SubgraphDepth,
}

impl std::fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BudgetKind::Nodes => "max_nodes",
            BudgetKind::LlmCalls => "max_llm_calls",
            BudgetKind::Duration => "max_duration_sec",
            BudgetKind::SubgraphDepth => "max_subgraph_depth",
        };
        f.write_str(s)
    }
}

/// Comprehensive error type for graph parsing, construction and execution.
///
/// Every variant corresponds to one of the engine's named error kinds and
/// exposes that name back out through [`AgentGraphError::error_code`] for
/// trace and wire-result reporting.
#[derive(Error, Debug)]
pub enum AgentGraphError {
    /// The Markdown/YAML loader could not produce a `ParsedGraph` set.
    #[error("parse error: {0}")]
    Parse(String),

    /// DAG construction or splice rejected the graph.
    #[error("graph error ({kind}): {message}")]
    Graph {
        kind: GraphErrorKind,
        message: String,
    },

    /// Template rendering failed.
    #[error("template error: {0}")]
    Template(String),

    /// A `tool_call` node failed.
    #[error("tool '{name}' failed: {message}")]
    Tool { name: String, message: String },

    /// An `llm_call` or `generate_subgraph` node failed.
    #[error("llm error: {0}")]
    Llm(String),

    /// An `assert` node's condition was false and no jump handled it.
    #[error("assertion failed at '{path}': {condition}")]
    Assert { path: String, condition: String },

    /// A budget dimension would have been exceeded by the attempted work.
    #[error("budget exceeded: {kind}")]
    Budget { kind: BudgetKind },

    /// A context merge under `error_on_conflict` hit a genuine conflict.
    #[error("merge conflict at '{path}'")]
    Conflict { path: String },

    /// The scheduler terminated with nodes that never became runnable.
    #[error("unresolved dependencies: {}", unresolved.join(", "))]
    Dependency { unresolved: Vec<String> },

    /// `generate_subgraph` signature validation failed under `strict` mode.
    #[error("signature violation at '{path}': {reason}")]
    Signature { path: String, reason: String },

    /// Wraps an I/O failure encountered while loading a workflow file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a YAML deserialization failure.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wraps a JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentGraphError {
    /// The stable taxonomy name used in `TraceRecord.error_code`.
    pub fn error_code(&self) -> &'static str {
        match self {
            AgentGraphError::Parse(_) => "ParseError",
            AgentGraphError::Graph { .. } => "GraphError",
            AgentGraphError::Template(_) => "TemplateError",
            AgentGraphError::Tool { .. } => "ToolError",
            AgentGraphError::Llm(_) => "LlmError",
            AgentGraphError::Assert { .. } => "AssertError",
            AgentGraphError::Budget { .. } => "BudgetError",
            AgentGraphError::Conflict { .. } => "ConflictError",
            AgentGraphError::Dependency { .. } => "DependencyError",
            AgentGraphError::Signature { .. } => "SignatureError",
            AgentGraphError::Io(_) => "ParseError",
            AgentGraphError::Yaml(_) => "ParseError",
            AgentGraphError::Json(_) => "ParseError",
        }
    }

    pub fn graph(kind: GraphErrorKind, message: impl Into<String>) -> Self {
        AgentGraphError::Graph {
            kind,
            message: message.into(),
        }
    }

    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        AgentGraphError::Tool {
            name: name.into(),
            message: message.into(),
        }
    }
}
