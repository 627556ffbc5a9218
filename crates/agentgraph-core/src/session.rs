//! Execution Session (§4.6): wraps every node execution with snapshot,
//! budget, and trace bookkeeping before/after dispatch.

use crate::budget::BudgetController;
use crate::context::{context_delta, SnapshotStore};
use crate::error::{AgentGraphError, BudgetKind, Result};
use crate::executor::{Dispatch, NodeExecutor};
use crate::node::{system_path, Node, NodeVariant};
use crate::resource::ResourceRegistry;
use crate::stdlib::StdlibIndex;
use crate::trace::{TraceMode, TraceRecorder, TraceStatus};
use serde_json::Value;

/// Per-run orchestrator: the home of the budget controller, snapshot
/// store, trace recorder, and resource registry.
pub struct Session {
    pub budget: BudgetController,
    pub snapshots: SnapshotStore,
    pub trace: TraceRecorder,
    pub resources: ResourceRegistry,
}

impl Session {
    pub fn new(budget: BudgetController) -> Self {
        Session {
            budget,
            snapshots: SnapshotStore::new(),
            trace: TraceRecorder::new(),
            resources: ResourceRegistry::new(),
        }
    }

    /// Runs one node end to end: snapshot, budget, trace-start, resource
    /// injection, dispatch, trace-end (§4.6 steps 1-6).
    #[tracing::instrument(skip(self, node, ctx, executor, stdlib), fields(node_path = %node.path, node_type = node.variant.type_name()))]
    pub async fn run_node(
        &mut self,
        node: &Node,
        ctx: Value,
        executor: &NodeExecutor,
        stdlib: &StdlibIndex,
        mode: TraceMode,
    ) -> Result<Dispatch> {
        let is_system = node.path.starts_with(crate::node::prefix::SYSTEM);

        let snapshot_key = if node.requires_snapshot() {
            let key = node.path.clone();
            self.snapshots.save(key.clone(), ctx.clone());
            self.snapshots.enforce_budget(
                self.budget.max_snapshots(),
                self.budget.snapshot_max_size_kb(),
            );
            Some(key)
        } else {
            None
        };

        if let Err(kind) = self.consume_budget(node, is_system) {
            tracing::error!(%kind, "budget exceeded");
            let open = self.trace.on_start(
                &node.path,
                node.variant.type_name(),
                self.budget.snapshot(),
                mode,
            );
            self.trace.on_end(
                open,
                TraceStatus::Failed,
                Some("BudgetError".to_string()),
                Value::Object(Default::default()),
                snapshot_key,
                self.budget.snapshot(),
                Value::Null,
            );
            return Err(BudgetController::budget_error(kind));
        }

        let open = self.trace.on_start(
            &node.path,
            node.variant.type_name(),
            self.budget.snapshot(),
            mode,
        );

        let mut dispatch_ctx = ctx.clone();
        if let Some(obj) = dispatch_ctx.as_object_mut() {
            obj.insert("resources".to_string(), self.resources.view());
        }

        let result = executor.dispatch(node, dispatch_ctx, stdlib).await;

        let after_ctx = match &result {
            Ok(Dispatch::Continue(c))
            | Ok(Dispatch::Paused { ctx: c })
            | Ok(Dispatch::Jump { ctx: c, .. })
            | Ok(Dispatch::HardEnd { ctx: c })
            | Ok(Dispatch::SoftEnd { ctx: c })
            | Ok(Dispatch::Splice { ctx: c, .. }) => c.clone(),
            _ => ctx.clone(),
        };

        let delta = context_delta(&ctx, &after_ctx);
        let status = if result.is_ok() {
            TraceStatus::Success
        } else {
            TraceStatus::Failed
        };
        let error_code = result.as_ref().err().map(|e| e.error_code().to_string());

        self.trace.on_end(
            open,
            status,
            error_code,
            delta,
            snapshot_key,
            self.budget.snapshot(),
            Value::Null,
        );

        result
    }

    /// Consumes the budget dimensions §4.6 step 2 requires: LLM call first
    /// (for `llm_call`/`generate_subgraph`), then subgraph depth (for
    /// `generate_subgraph`), then the node counter. System-terminal nodes
    /// never consume the node counter, so a tripped budget can always reach
    /// its termination target.
    fn consume_budget(&self, node: &Node, is_system: bool) -> std::result::Result<(), BudgetKind> {
        let needs_llm = matches!(
            node.variant,
            NodeVariant::LlmCall { .. } | NodeVariant::GenerateSubgraph { .. }
        );
        let needs_subgraph_depth = matches!(node.variant, NodeVariant::GenerateSubgraph { .. });

        if needs_llm && !self.budget.try_consume_llm_call() {
            return Err(BudgetKind::LlmCalls);
        }
        if needs_subgraph_depth && !self.budget.try_consume_subgraph_depth() {
            return Err(BudgetKind::SubgraphDepth);
        }
        if !is_system && !self.budget.try_consume_node() {
            return Err(BudgetKind::Nodes);
        }
        Ok(())
    }

    /// The path the scheduler should jump to once a budget trips.
    pub fn budget_terminate_at(&self) -> &str {
        self.budget.terminate_at()
    }

    pub fn budget_exceeded(&self) -> bool {
        self.budget.exceeded()
    }
}

impl From<BudgetKind> for AgentGraphError {
    fn from(kind: BudgetKind) -> Self {
        BudgetController::budget_error(kind)
    }
}

#[allow(dead_code)]
fn system_budget_exceeded_path() -> &'static str {
    system_path::BUDGET_EXCEEDED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ExecutionBudget;
    use crate::executor::NodeExecutor;
    use crate::llm::testing::StaticAdapter;
    use crate::node::NodeVariant;
    use crate::tool::ToolRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn executor() -> NodeExecutor {
        NodeExecutor::new(Arc::new(ToolRegistry::new()), Arc::new(StaticAdapter::new("ok")))
    }

    #[tokio::test]
    async fn node_runs_and_records_trace() {
        let mut session = Session::new(BudgetController::new(None));
        let node = Node::new(
            "/main/a",
            NodeVariant::Assign {
                assignments: [("x".to_string(), "1".to_string())].into_iter().collect(),
            },
        );
        let exec = executor();
        let stdlib = StdlibIndex::new();
        let result = session
            .run_node(&node, json!({}), &exec, &stdlib, TraceMode::Main)
            .await
            .unwrap();
        match result {
            Dispatch::Continue(ctx) => assert_eq!(ctx["x"], "1"),
            _ => panic!("expected Continue"),
        }
        assert_eq!(session.trace.records().len(), 1);
        assert_eq!(session.trace.records()[0].status, TraceStatus::Success);
    }

    #[tokio::test]
    async fn budget_error_recorded_without_dispatch() {
        let mut session = Session::new(BudgetController::new(Some(ExecutionBudget {
            max_nodes: 0,
            ..Default::default()
        })));
        let node = Node::new(
            "/main/a",
            NodeVariant::Assign {
                assignments: Default::default(),
            },
        );
        let exec = executor();
        let stdlib = StdlibIndex::new();
        let err = session
            .run_node(&node, json!({}), &exec, &stdlib, TraceMode::Main)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "BudgetError");
        assert_eq!(session.trace.records()[0].error_code.as_deref(), Some("BudgetError"));
    }

    #[tokio::test]
    async fn system_nodes_bypass_node_budget() {
        let mut session = Session::new(BudgetController::new(Some(ExecutionBudget {
            max_nodes: 0,
            ..Default::default()
        })));
        let node = Node::new(
            system_path::BUDGET_EXCEEDED,
            NodeVariant::End {
                termination_mode: crate::node::TerminationMode::Hard,
            },
        );
        let exec = executor();
        let stdlib = StdlibIndex::new();
        let result = session
            .run_node(&node, json!({}), &exec, &stdlib, TraceMode::Main)
            .await;
        assert!(result.is_ok());
    }
}
