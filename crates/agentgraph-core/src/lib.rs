//! # agentgraph-core - Markdown-DSL agentic workflow execution engine
//!
//! `agentgraph-core` loads a Markdown document describing an agentic
//! workflow as a DAG of typed nodes, schedules those nodes respecting
//! their dependencies, and drives execution through a shared JSON context
//! with budget enforcement, snapshotting, and tracing at every step.
//!
//! ## Core Concepts
//!
//! ### 1. Nodes and the DSL
//!
//! A workflow is a set of [`Node`] values addressed by a hierarchical
//! [`NodePath`] (`/main/...`, `/lib/...`, `/dynamic/...`, `/resources/...`).
//! Each node carries a [`NodeVariant`] (`start`, `end`, `assign`,
//! `tool_call`, `llm_call`, `resource`, `fork`, `join`,
//! `generate_subgraph`, `assert`) describing what it does when reached.
//! [`parser::parse_markdown`] turns a Markdown document of
//! `### AgenticDSL` blocks into the [`ParsedGraph`] values the engine
//! registers.
//!
//! ### 2. The Context Store
//!
//! Execution threads a single JSON document (the context) through every
//! node. Nodes never mutate context in place; they return a new value,
//! merged into the running context per a [`MergeStrategy`] resolved from
//! the node's metadata.
//!
//! ### 3. Budgets, Snapshots, and Traces
//!
//! [`BudgetController`] enforces node/LLM-call/wall-clock/subgraph-depth
//! caps with atomic counters. [`SnapshotStore`] keeps bounded
//! pre-execution context snapshots for nodes that request rollback
//! safety. [`TraceRecorder`] records a start/end entry for every node
//! executed, forming the run's audit trail.
//!
//! ### 4. The Scheduler and the Engine
//!
//! [`Scheduler`] is the DAG-level ready-queue executor: static and
//! dynamic dependency resolution, fork/join branch simulation, and
//! dynamic subgraph splicing all live there. [`Engine`] is the façade
//! embedders use: load a document, register tools, run it, and (for
//! `generate_subgraph`/`llm_call` pause points) feed generated DSL back
//! in before resuming.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agentgraph_core::{Engine, llm::LlmAdapter};
//! use std::sync::Arc;
//!
//! # async fn run(llm: Arc<dyn LlmAdapter>) -> agentgraph_core::Result<()> {
//! let text = std::fs::read_to_string("workflow.agent.md")?;
//! let mut engine = Engine::from_markdown(&text, llm)?;
//! let result = engine.run(serde_json::json!({})).await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod llm;
pub mod node;
pub mod parser;
pub mod resource;
pub mod scheduler;
pub mod session;
pub mod stdlib;
pub mod system_nodes;
pub mod template;
pub mod tool;
pub mod trace;

pub use budget::{BudgetController, BudgetSnapshot, ExecutionBudget};
pub use context::{MergeStrategy, SnapshotStore};
pub use engine::{Engine, RunResult};
pub use error::{AgentGraphError, BudgetKind, GraphErrorKind, Result};
pub use executor::{Dispatch, NodeExecutor};
pub use graph::ParsedGraph;
pub use llm::LlmAdapter;
pub use node::{Node, NodePath, NodeVariant, OneOrMany, TerminationMode, WaitFor};
pub use resource::{Resource, ResourceRegistry};
pub use scheduler::{RunOutcome, Scheduler};
pub use session::Session;
pub use stdlib::{Stability, StdlibIndex, SubgraphDescriptor};
pub use trace::{TraceMode, TraceRecord, TraceRecorder, TraceStatus};
pub use tool::{Tool, ToolRegistry};
