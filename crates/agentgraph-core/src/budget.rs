//! Budget Controller (§4.2): atomic CAS-based consumption of the per-run
//! resource budget, plus the bounded snapshot-store limits it governs.

use crate::error::{AgentGraphError, BudgetKind};
use crate::node::{system_path, NodePath};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// A `-1` limit means unbounded throughout this module, matching the
/// source convention.
const UNBOUNDED: i64 = -1;

/// Declared resource limits for a run (§3 "Execution Budget").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionBudget {
    #[serde(default = "default_unbounded")]
    pub max_nodes: i64,
    #[serde(default = "default_unbounded")]
    pub max_llm_calls: i64,
    #[serde(default = "default_unbounded")]
    pub max_duration_sec: i64,
    #[serde(default = "default_unbounded")]
    pub max_subgraph_depth: i64,
    #[serde(default = "default_unbounded")]
    pub max_snapshots: i64,
    #[serde(default = "default_snapshot_kb")]
    pub snapshot_max_size_kb: usize,
}

fn default_unbounded() -> i64 {
    UNBOUNDED
}

fn default_snapshot_kb() -> usize {
    512
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        ExecutionBudget {
            max_nodes: UNBOUNDED,
            max_llm_calls: UNBOUNDED,
            max_duration_sec: UNBOUNDED,
            max_subgraph_depth: UNBOUNDED,
            max_snapshots: UNBOUNDED,
            snapshot_max_size_kb: default_snapshot_kb(),
        }
    }
}

/// A point-in-time view of the counters, recorded into each trace entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BudgetSnapshot {
    pub nodes_used: i64,
    pub llm_calls_used: i64,
    pub subgraph_depth_used: i64,
}

/// Tracks node, LLM-call, wall-clock, and subgraph-depth consumption for a
/// run, with atomic CAS counters so parallel fork branches (a permitted
/// optimization) can consume the same budget safely.
pub struct BudgetController {
    budget: Option<ExecutionBudget>,
    nodes_used: AtomicI64,
    llm_calls_used: AtomicI64,
    subgraph_depth_used: AtomicI64,
    start_time: Instant,
    terminate_at: NodePath,
}

impl Default for BudgetController {
    fn default() -> Self {
        Self::new(None)
    }
}

impl BudgetController {
    pub fn new(budget: Option<ExecutionBudget>) -> Self {
        BudgetController {
            budget,
            nodes_used: AtomicI64::new(0),
            llm_calls_used: AtomicI64::new(0),
            subgraph_depth_used: AtomicI64::new(0),
            start_time: Instant::now(),
            terminate_at: system_path::BUDGET_EXCEEDED.to_string(),
        }
    }

    /// Replaces the active budget, resetting all counters and the
    /// wall-clock start time to zero/now. Mirrors the reference
    /// implementation's move-assignment behavior for `ExecutionBudget`.
    pub fn set_budget(&mut self, budget: ExecutionBudget) {
        self.budget = Some(budget);
        self.nodes_used.store(0, Ordering::SeqCst);
        self.llm_calls_used.store(0, Ordering::SeqCst);
        self.subgraph_depth_used.store(0, Ordering::SeqCst);
        self.start_time = Instant::now();
    }

    pub fn terminate_at(&self) -> &str {
        &self.terminate_at
    }

    pub fn set_terminate_at(&mut self, path: impl Into<String>) {
        self.terminate_at = path.into();
    }

    fn try_consume(counter: &AtomicI64, max: i64) -> bool {
        if max < 0 {
            counter.fetch_add(1, Ordering::SeqCst);
            return true;
        }
        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current >= max {
                return false;
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn try_consume_node(&self) -> bool {
        match &self.budget {
            None => true,
            Some(b) => Self::try_consume(&self.nodes_used, b.max_nodes),
        }
    }

    pub fn try_consume_llm_call(&self) -> bool {
        match &self.budget {
            None => true,
            Some(b) => Self::try_consume(&self.llm_calls_used, b.max_llm_calls),
        }
    }

    pub fn try_consume_subgraph_depth(&self) -> bool {
        match &self.budget {
            None => true,
            Some(b) => Self::try_consume(&self.subgraph_depth_used, b.max_subgraph_depth),
        }
    }

    /// `true` if any dimension (including elapsed wall-clock) is over cap.
    pub fn exceeded(&self) -> bool {
        let Some(b) = &self.budget else {
            return false;
        };
        if b.max_nodes >= 0 && self.nodes_used.load(Ordering::SeqCst) > b.max_nodes {
            return true;
        }
        if b.max_llm_calls >= 0 && self.llm_calls_used.load(Ordering::SeqCst) > b.max_llm_calls {
            return true;
        }
        if b.max_subgraph_depth >= 0
            && self.subgraph_depth_used.load(Ordering::SeqCst) > b.max_subgraph_depth
        {
            return true;
        }
        if b.max_duration_sec >= 0 {
            let elapsed = self.start_time.elapsed().as_secs() as i64;
            if elapsed > b.max_duration_sec {
                return true;
            }
        }
        false
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            nodes_used: self.nodes_used.load(Ordering::SeqCst),
            llm_calls_used: self.llm_calls_used.load(Ordering::SeqCst),
            subgraph_depth_used: self.subgraph_depth_used.load(Ordering::SeqCst),
        }
    }

    pub fn max_snapshots(&self) -> i64 {
        self.budget.as_ref().map(|b| b.max_snapshots).unwrap_or(UNBOUNDED)
    }

    pub fn snapshot_max_size_kb(&self) -> usize {
        self.budget
            .as_ref()
            .map(|b| b.snapshot_max_size_kb)
            .unwrap_or(usize::MAX)
    }

    /// Converts a failed consumption of `kind` into the engine error.
    pub fn budget_error(kind: BudgetKind) -> AgentGraphError {
        AgentGraphError::Budget { kind }
    }
}
