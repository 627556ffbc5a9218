//! Engine Facade (§4.8): loads parsed graphs, wires the collaborators
//! together, and drives the scheduler through `run`/`append` operations.

use crate::budget::BudgetController;
use crate::error::{AgentGraphError, GraphErrorKind, Result};
use crate::executor::NodeExecutor;
use crate::graph::ParsedGraph;
use crate::llm::LlmAdapter;
use crate::node::{prefix, Node, NodePath, NodeVariant};
use crate::parser;
use crate::resource::Resource;
use crate::scheduler::Scheduler;
use crate::session::Session;
use crate::stdlib::{StdlibIndex, Stability, SubgraphDescriptor};
use crate::system_nodes;
use crate::tool::{Tool, ToolRegistry};
use crate::trace::TraceRecord;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// The wire-level result of `Engine::run` (§6 "Run result (wire form)").
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub success: bool,
    pub message: String,
    pub final_context: Value,
    pub paused_at: Option<NodePath>,
    pub traces: Vec<TraceRecord>,
}

/// Per-run orchestrator wiring the scheduler to its collaborators: the tool
/// registry, the LLM adapter, the standard-library index, and the session
/// that owns budget/snapshot/trace/resource state.
pub struct Engine {
    scheduler: Scheduler,
    session: Session,
    tools: ToolRegistry,
    llm: Arc<dyn LlmAdapter>,
    stdlib: StdlibIndex,
}

impl Engine {
    /// Parses `text` as an AgenticDSL Markdown document, builds the DAG, and
    /// asserts `/main` is present before returning.
    pub fn from_markdown(text: &str, llm: Arc<dyn LlmAdapter>) -> Result<Self> {
        let graphs = parser::parse_markdown(text)?;
        Self::from_parsed_graphs(graphs, llm)
    }

    pub fn from_file(path: impl AsRef<Path>, llm: Arc<dyn LlmAdapter>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_markdown(&text, llm)
    }

    fn from_parsed_graphs(graphs: Vec<ParsedGraph>, llm: Arc<dyn LlmAdapter>) -> Result<Self> {
        let (meta, real): (Vec<ParsedGraph>, Vec<ParsedGraph>) =
            graphs.into_iter().partition(|g| g.prefix == "/__meta__");

        let budget = meta.iter().rev().find_map(|g| g.budget.clone());

        let mut nodes: Vec<Node> = Vec::new();
        for g in &real {
            nodes.extend(g.nodes.iter().cloned());
        }

        if !nodes.iter().any(|n| n.path == prefix::MAIN || n.path.starts_with("/main/")) {
            return Err(AgentGraphError::graph(
                GraphErrorKind::Missing,
                "'/main' node not found",
            ));
        }

        let mut scheduler = Scheduler::new();
        scheduler.register(system_nodes::builtin_nodes())?;
        scheduler.register(nodes.clone())?;

        let mut session = Session::new(BudgetController::new(budget));
        register_resources(&mut session, &nodes);

        let mut stdlib = StdlibIndex::new();
        register_library_graphs(&mut stdlib, &real);

        Ok(Engine {
            scheduler,
            session,
            tools: ToolRegistry::new(),
            llm,
            stdlib,
        })
    }

    /// Registers a tool under its own name, making it callable from
    /// `tool_call` nodes and satisfying `tool:<name>` permission checks.
    pub fn register_tool(&mut self, tool: Tool) {
        self.tools.register(tool);
    }

    /// Replaces the run's execution budget, resetting its counters and
    /// wall-clock start (used by hosts such as the CLI to apply an
    /// override loaded independently of the workflow document).
    pub fn override_budget(&mut self, budget: crate::budget::ExecutionBudget) {
        self.session.budget.set_budget(budget);
    }

    /// Splices previously-parsed graphs into the live DAG (used to resume
    /// after a pause without restarting the scheduler).
    pub fn append_graphs(&mut self, graphs: Vec<ParsedGraph>) -> Result<()> {
        let (meta, real): (Vec<ParsedGraph>, Vec<ParsedGraph>) =
            graphs.into_iter().partition(|g| g.prefix == "/__meta__");

        if let Some(budget) = meta.into_iter().rev().find_map(|g| g.budget) {
            self.session.budget.set_budget(budget);
        }

        let mut nodes: Vec<Node> = Vec::new();
        for g in &real {
            nodes.extend(g.nodes.iter().cloned());
        }
        register_resources(&mut self.session, &nodes);
        register_library_graphs(&mut self.stdlib, &real);

        if !real.is_empty() {
            self.scheduler.splice(real)?;
        }
        Ok(())
    }

    /// Parses `text` as an AgenticDSL Markdown fragment and splices it in.
    pub fn continue_with_generated_dsl(&mut self, text: &str) -> Result<()> {
        let graphs = parser::parse_markdown(text)?;
        self.append_graphs(graphs)
    }

    /// Drives the scheduler from `ctx` until the run finishes, fails, or
    /// pauses at an `llm_call`. Re-invoking after a pause (optionally after
    /// `append_graphs`/`continue_with_generated_dsl`) resumes from the ready
    /// state the scheduler had built up to that point, since the scheduler
    /// itself is owned by this `Engine` and is never rebuilt between calls.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn run(&mut self, ctx: Value) -> Result<RunResult> {
        tracing::info!("starting run");
        let executor = NodeExecutor::new(Arc::new(self.tools.clone()), self.llm.clone());
        let outcome = self
            .scheduler
            .run(ctx, &mut self.session, &executor, &mut self.stdlib)
            .await?;
        if outcome.success {
            tracing::info!("run completed");
        } else if let Some(path) = &outcome.paused_at {
            tracing::debug!(node_path = %path, "run paused");
        } else {
            tracing::error!(message = %outcome.message, "run failed");
        }
        Ok(RunResult {
            success: outcome.success,
            message: outcome.message,
            final_context: outcome.final_context,
            paused_at: outcome.paused_at,
            traces: self.session.trace.records().to_vec(),
        })
    }
}

fn register_resources(session: &mut Session, nodes: &[Node]) {
    for node in nodes {
        if let NodeVariant::Resource {
            resource_type,
            uri,
            scope,
        } = &node.variant
        {
            session.resources.register(Resource {
                path: node.path.clone(),
                resource_type: resource_type.clone(),
                uri: uri.clone(),
                scope: *scope,
            });
        }
    }
}

fn register_library_graphs(stdlib: &mut StdlibIndex, graphs: &[ParsedGraph]) {
    for g in graphs {
        if !g.is_standard_library {
            continue;
        }
        stdlib.register(SubgraphDescriptor {
            path: g.prefix.clone(),
            signature: g.signature.clone(),
            output_schema: None,
            permissions: g.permissions.clone(),
            is_subgraph: true,
            stability: Stability::Stable,
        });
    }
}
