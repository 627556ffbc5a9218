//! Trace Recorder (§4.3): per-node start/end records, append-only and
//! never dropped under budget or snapshot pressure.

use crate::budget::BudgetSnapshot;
use crate::node::NodePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outcome of a single node's execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Success,
    Failed,
    Skipped,
}

/// Whether a node ran on the main flow or inside a fork branch; carried on
/// the wire form per §6 but not part of the base invariants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    #[default]
    Main,
    Branch,
}

/// One entry in the execution trace (§6 wire form).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub node_path: NodePath,
    #[serde(rename = "type")]
    pub node_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: TraceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub context_delta: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctx_snapshot_key: Option<String>,
    pub budget_snapshot: BudgetSnapshot,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub mode: TraceMode,
}

/// An in-progress trace entry awaiting its `on_end` call.
pub struct OpenTrace {
    trace_id: String,
    node_path: NodePath,
    node_type: String,
    start_time: DateTime<Utc>,
    budget_before: BudgetSnapshot,
    mode: TraceMode,
}

/// Append-only trace recorder. Traces are never evicted; only the
/// (bounded) snapshot store has eviction pressure.
#[derive(Default)]
pub struct TraceRecorder {
    records: Vec<TraceRecord>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(
        &self,
        path: &str,
        node_type: &str,
        budget_before: BudgetSnapshot,
        mode: TraceMode,
    ) -> OpenTrace {
        OpenTrace {
            trace_id: Uuid::new_v4().to_string(),
            node_path: path.to_string(),
            node_type: node_type.to_string(),
            start_time: Utc::now(),
            budget_before,
            mode,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn on_end(
        &mut self,
        open: OpenTrace,
        status: TraceStatus,
        error_code: Option<String>,
        context_delta: Value,
        ctx_snapshot_key: Option<String>,
        budget_after: BudgetSnapshot,
        metadata: Value,
    ) {
        let _ = open.budget_before;
        self.records.push(TraceRecord {
            trace_id: open.trace_id,
            node_path: open.node_path,
            node_type: open.node_type,
            start_time: open.start_time,
            end_time: Utc::now(),
            status,
            error_code,
            context_delta,
            ctx_snapshot_key,
            budget_snapshot: budget_after,
            metadata,
            mode: open.mode,
        });
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TraceRecord> {
        self.records
    }

    pub fn extend(&mut self, other: Vec<TraceRecord>) {
        self.records.extend(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_end_pair_has_end_not_before_start() {
        let mut rec = TraceRecorder::new();
        let open = rec.on_start(
            "/main/a",
            "assign",
            BudgetSnapshot {
                nodes_used: 0,
                llm_calls_used: 0,
                subgraph_depth_used: 0,
            },
            TraceMode::Main,
        );
        rec.on_end(
            open,
            TraceStatus::Success,
            None,
            json!({}),
            None,
            BudgetSnapshot {
                nodes_used: 1,
                llm_calls_used: 0,
                subgraph_depth_used: 0,
            },
            Value::Null,
        );
        let records = rec.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].end_time >= records[0].start_time);
    }

    #[test]
    fn order_matches_pop_order() {
        let mut rec = TraceRecorder::new();
        for path in ["/main/a", "/main/b", "/main/c"] {
            let open = rec.on_start(
                path,
                "assign",
                BudgetSnapshot {
                    nodes_used: 0,
                    llm_calls_used: 0,
                    subgraph_depth_used: 0,
                },
                TraceMode::Main,
            );
            rec.on_end(
                open,
                TraceStatus::Success,
                None,
                json!({}),
                None,
                BudgetSnapshot {
                    nodes_used: 0,
                    llm_calls_used: 0,
                    subgraph_depth_used: 0,
                },
                Value::Null,
            );
        }
        let paths: Vec<_> = rec.records().iter().map(|r| r.node_path.clone()).collect();
        assert_eq!(paths, vec!["/main/a", "/main/b", "/main/c"]);
    }
}
