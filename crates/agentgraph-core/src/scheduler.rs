//! DAG Scheduler (§4.7): owns the node set, in-degree map, ready queue, and
//! drives the main execution loop, including fork/join simulation and
//! dynamic-graph splicing.

use crate::context::merge;
use crate::error::{AgentGraphError, GraphErrorKind, Result};
use crate::executor::{Dispatch, NodeExecutor};
use crate::graph::ParsedGraph;
use crate::node::{prefix, Node, NodePath, NodeVariant, SignatureValidation, WaitFor};
use crate::session::Session;
use crate::stdlib::StdlibIndex;
use crate::template;
use crate::trace::TraceMode;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// The wire-level result of a `run`/resume call (§4.8).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub message: String,
    pub final_context: Value,
    pub paused_at: Option<NodePath>,
}

enum BranchOutcome {
    Finished,
    HardEnded(Value),
}

enum BranchResult {
    Finished(Value),
    HardEnded(Value),
}

/// Owns the live DAG and drives the ready-queue main loop.
#[derive(Default)]
pub struct Scheduler {
    nodes: HashMap<NodePath, Node>,
    successors: HashMap<NodePath, Vec<NodePath>>,
    predecessors: HashMap<NodePath, Vec<NodePath>>,
    in_degree: HashMap<NodePath, i64>,
    ready: VecDeque<NodePath>,
    executed: HashSet<NodePath>,
    pending_dynamic_deps: HashMap<NodePath, Vec<NodePath>>,
    branch_results: HashMap<NodePath, Value>,
    fork_branch_targets: HashSet<NodePath>,
    /// Set by `trip_or_fail` on a budget trip, consumed once the jumped-to
    /// terminal node dispatches its `HardEnd` so the run reports the budget
    /// failure instead of a plain successful hard-end.
    budget_trip_message: Option<String>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_node(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Registers the initial node set built at engine construction time.
    /// Rejects the whole registration if the static-edge graph has a cycle.
    pub fn register(&mut self, nodes: Vec<Node>) -> Result<()> {
        for node in &nodes {
            if self.nodes.contains_key(&node.path) {
                return Err(AgentGraphError::graph(
                    GraphErrorKind::Duplicate,
                    format!("duplicate node path '{}'", node.path),
                ));
            }
        }

        for node in &nodes {
            if let NodeVariant::Fork { branches } = &node.variant {
                for b in branches {
                    self.fork_branch_targets.insert(b.clone());
                }
            }
        }

        let mut candidate_successors = self.successors.clone();
        let mut candidate_predecessors = self.predecessors.clone();
        let mut candidate_nodes = self.nodes.clone();
        for node in &nodes {
            candidate_nodes.insert(node.path.clone(), node.clone());
        }
        for node in &nodes {
            for target in &node.next {
                candidate_successors
                    .entry(node.path.clone())
                    .or_default()
                    .push(target.clone());
                candidate_predecessors
                    .entry(target.clone())
                    .or_default()
                    .push(node.path.clone());
            }
            if let Some(wf) = &node.wait_for {
                if let Some(deps) = wf.static_deps() {
                    for dep in deps {
                        candidate_successors
                            .entry(dep.clone())
                            .or_default()
                            .push(node.path.clone());
                        candidate_predecessors
                            .entry(node.path.clone())
                            .or_default()
                            .push(dep.clone());
                    }
                }
            }
        }

        if has_cycle(&candidate_nodes, &candidate_successors) {
            return Err(AgentGraphError::graph(
                GraphErrorKind::Cycle,
                "registration would introduce a cycle",
            ));
        }

        self.nodes = candidate_nodes;
        self.successors = candidate_successors;
        self.predecessors = candidate_predecessors;

        for node in &nodes {
            let deg = self
                .predecessors
                .get(&node.path)
                .map(|p| p.len() as i64)
                .unwrap_or(0);
            self.in_degree.insert(node.path.clone(), deg);
        }

        for node in &nodes {
            let is_system = node.path.starts_with(prefix::SYSTEM);
            let is_branch_target = self.fork_branch_targets.contains(&node.path);
            if !is_system
                && !is_branch_target
                && self.in_degree.get(&node.path).copied().unwrap_or(0) == 0
            {
                self.ready.push_back(node.path.clone());
            }
        }

        Ok(())
    }

    /// Splices newly-generated graphs into the live DAG (§4.7 "Dynamic
    /// splice"), rejecting the whole batch if it would introduce a cycle
    /// into the existing graph.
    pub fn splice(&mut self, graphs: Vec<ParsedGraph>) -> Result<Vec<NodePath>> {
        let mut new_nodes = Vec::new();
        for g in &graphs {
            for n in &g.nodes {
                if self.nodes.contains_key(&n.path) {
                    return Err(AgentGraphError::graph(
                        GraphErrorKind::Duplicate,
                        format!("spliced node path '{}' already exists", n.path),
                    ));
                }
                new_nodes.push(n.clone());
            }
        }

        let mut candidate_nodes = self.nodes.clone();
        for n in &new_nodes {
            candidate_nodes.insert(n.path.clone(), n.clone());
        }
        let mut candidate_successors = self.successors.clone();
        let mut candidate_predecessors = self.predecessors.clone();
        for n in &new_nodes {
            for target in &n.next {
                candidate_successors
                    .entry(n.path.clone())
                    .or_default()
                    .push(target.clone());
                candidate_predecessors
                    .entry(target.clone())
                    .or_default()
                    .push(n.path.clone());
            }
            if let Some(wf) = &n.wait_for {
                if let Some(deps) = wf.static_deps() {
                    for dep in deps {
                        candidate_successors
                            .entry(dep.clone())
                            .or_default()
                            .push(n.path.clone());
                        candidate_predecessors
                            .entry(n.path.clone())
                            .or_default()
                            .push(dep.clone());
                    }
                }
            }
        }

        if has_cycle(&candidate_nodes, &candidate_successors) {
            return Err(AgentGraphError::graph(
                GraphErrorKind::Cycle,
                "splice would introduce a cycle",
            ));
        }

        self.nodes = candidate_nodes;
        self.successors = candidate_successors;
        self.predecessors = candidate_predecessors;

        let mut new_roots = Vec::new();
        for n in &new_nodes {
            let deg = self
                .predecessors
                .get(&n.path)
                .map(|preds| {
                    preds
                        .iter()
                        .filter(|p| !self.executed.contains(*p))
                        .count() as i64
                })
                .unwrap_or(0);
            self.in_degree.insert(n.path.clone(), deg);
            if deg == 0 {
                self.ready.push_back(n.path.clone());
            }
        }
        for g in &graphs {
            new_roots.push(g.prefix.clone());
        }
        Ok(new_roots)
    }

    fn mark_executed_and_propagate(&mut self, path: &str) -> Vec<NodePath> {
        self.executed.insert(path.to_string());
        let mut newly_ready = Vec::new();
        if let Some(succs) = self.successors.get(path).cloned() {
            for s in succs {
                if let Some(deg) = self.in_degree.get_mut(&s) {
                    if *deg > 0 {
                        *deg -= 1;
                    }
                    if *deg == 0 && !self.executed.contains(&s) {
                        newly_ready.push(s);
                    }
                }
            }
        }
        newly_ready
    }

    fn promote_pending_dynamic(&mut self) {
        let ready_paths: Vec<NodePath> = self
            .pending_dynamic_deps
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| self.executed.contains(d)))
            .map(|(p, _)| p.clone())
            .collect();
        for p in ready_paths {
            self.pending_dynamic_deps.remove(&p);
            self.ready.push_back(p);
        }
    }

    fn unresolved_report(&self) -> Vec<NodePath> {
        let mut unresolved: Vec<NodePath> = self
            .in_degree
            .iter()
            .filter(|(p, deg)| {
                *deg > 0
                    && !self.executed.contains(p.as_str())
                    && !p.starts_with(prefix::SYSTEM)
            })
            .map(|(p, _)| p.clone())
            .collect();
        unresolved.extend(self.pending_dynamic_deps.keys().cloned());
        unresolved.sort();
        unresolved.dedup();
        unresolved
    }

    fn predecessors_in_scope(&self, path: &str, scope: &HashSet<NodePath>) -> usize {
        self.predecessors
            .get(path)
            .map(|preds| {
                preds
                    .iter()
                    .filter(|p| scope.contains(*p) && !self.executed.contains(*p))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drives the main ready-queue loop (§4.7 "Main loop") until the run
    /// finishes, fails, or pauses at an `llm_call`.
    pub async fn run(
        &mut self,
        mut ctx: Value,
        session: &mut Session,
        executor: &NodeExecutor,
        stdlib: &mut StdlibIndex,
    ) -> Result<RunOutcome> {
        loop {
            if self.ready.is_empty() {
                if self.pending_dynamic_deps.is_empty() {
                    let unresolved = self.unresolved_report();
                    if unresolved.is_empty() {
                        return Ok(RunOutcome {
                            success: true,
                            message: "ok".to_string(),
                            final_context: ctx,
                            paused_at: None,
                        });
                    }
                    return Ok(RunOutcome {
                        success: false,
                        message: AgentGraphError::Dependency {
                            unresolved: unresolved.clone(),
                        }
                        .to_string(),
                        final_context: ctx,
                        paused_at: None,
                    });
                }
                let unresolved = self.unresolved_report();
                return Ok(RunOutcome {
                    success: false,
                    message: AgentGraphError::Dependency { unresolved }.to_string(),
                    final_context: ctx,
                    paused_at: None,
                });
            }

            let path = self.ready.pop_front().unwrap();
            if self.executed.contains(&path) {
                continue;
            }
            let node = match self.nodes.get(&path).cloned() {
                Some(n) => n,
                None => continue,
            };

            if let Some(WaitFor::Expr(expr)) = &node.wait_for {
                match template::render_json(expr, &ctx) {
                    Ok(value) => {
                        let deps: Vec<String> = match serde_json::from_value(value) {
                            Ok(d) => d,
                            Err(e) => {
                                return Ok(RunOutcome {
                                    success: false,
                                    message: AgentGraphError::Template(e.to_string()).to_string(),
                                    final_context: ctx,
                                    paused_at: None,
                                })
                            }
                        };
                        let unresolved: Vec<String> = deps
                            .into_iter()
                            .filter(|d| !self.executed.contains(d))
                            .collect();
                        if !unresolved.is_empty() {
                            self.pending_dynamic_deps.insert(path.clone(), unresolved);
                            continue;
                        }
                    }
                    Err(e) => {
                        return Ok(RunOutcome {
                            success: false,
                            message: e.to_string(),
                            final_context: ctx,
                            paused_at: None,
                        })
                    }
                }
            }

            match &node.variant {
                NodeVariant::Fork { .. } => {
                    let dispatch = session
                        .run_node(&node, ctx.clone(), executor, &*stdlib, TraceMode::Main)
                        .await;
                    match dispatch {
                        Err(e) => {
                            if let Some(outcome) = self.trip_or_fail(session, e, ctx.clone()) {
                                return Ok(outcome);
                            }
                            continue;
                        }
                        Ok(Dispatch::ForkMarker { branches }) => {
                            match self
                                .run_fork_branches(&branches, &ctx, session, executor, &*stdlib)
                                .await
                            {
                                Ok(BranchOutcome::HardEnded(final_ctx)) => {
                                    return Ok(RunOutcome {
                                        success: true,
                                        message: "hard end".to_string(),
                                        final_context: final_ctx,
                                        paused_at: None,
                                    });
                                }
                                Ok(BranchOutcome::Finished) => {
                                    let newly = self.mark_executed_and_propagate(&path);
                                    for n in newly {
                                        self.ready.push_back(n);
                                    }
                                }
                                Err(e) => {
                                    if let Some(outcome) = self.trip_or_fail(session, e, ctx.clone()) {
                                        return Ok(outcome);
                                    }
                                    continue;
                                }
                            }
                        }
                        Ok(_) => unreachable!("fork dispatch always yields ForkMarker"),
                    }
                }

                NodeVariant::Join { .. } => {
                    let wait_for = join_branches(&node);
                    let dispatch = session
                        .run_node(&node, ctx.clone(), executor, &*stdlib, TraceMode::Main)
                        .await;
                    match dispatch {
                        Err(e) => {
                            if let Some(outcome) = self.trip_or_fail(session, e, ctx.clone()) {
                                return Ok(outcome);
                            }
                            continue;
                        }
                        Ok(Dispatch::JoinMarker { merge_strategy }) => {
                            let missing = wait_for
                                .iter()
                                .any(|b| !self.branch_results.contains_key(b));
                            if missing {
                                self.ready.push_back(path.clone());
                                continue;
                            }
                            let mut merged = ctx.clone();
                            let mut conflict = None;
                            for b in &wait_for {
                                if let Some(branch_ctx) = self.branch_results.remove(b) {
                                    match merge(&merged, &branch_ctx, b, merge_strategy) {
                                        Ok(m) => merged = m,
                                        Err(e) => {
                                            conflict = Some(e);
                                            break;
                                        }
                                    }
                                }
                            }
                            if let Some(e) = conflict {
                                if let Some(outcome) = self.trip_or_fail(session, e, ctx.clone()) {
                                    return Ok(outcome);
                                }
                                continue;
                            }
                            ctx = merged;
                            let newly = self.mark_executed_and_propagate(&path);
                            for n in newly {
                                self.ready.push_back(n);
                            }
                        }
                        Ok(_) => unreachable!("join dispatch always yields JoinMarker"),
                    }
                }

                _ => {
                    let dispatch = session
                        .run_node(&node, ctx.clone(), executor, &*stdlib, TraceMode::Main)
                        .await;
                    match dispatch {
                        Err(e) => {
                            if let Some(outcome) = self.trip_or_fail(session, e, ctx.clone()) {
                                return Ok(outcome);
                            }
                            continue;
                        }
                        Ok(Dispatch::Continue(new_ctx)) => {
                            ctx = new_ctx;
                            let newly = self.mark_executed_and_propagate(&path);
                            for n in newly {
                                self.ready.push_back(n);
                            }
                        }
                        Ok(Dispatch::Paused { ctx: new_ctx }) => {
                            ctx = new_ctx;
                            let newly = self.mark_executed_and_propagate(&path);
                            for n in newly {
                                self.ready.push_back(n);
                            }
                            return Ok(RunOutcome {
                                success: true,
                                message: "paused".to_string(),
                                final_context: ctx,
                                paused_at: Some(path),
                            });
                        }
                        Ok(Dispatch::Jump {
                            ctx: new_ctx,
                            target,
                        }) => {
                            ctx = new_ctx;
                            self.mark_executed_and_propagate(&path);
                            self.ready.clear();
                            self.pending_dynamic_deps.clear();
                            self.ready.push_back(target);
                        }
                        Ok(Dispatch::HardEnd { ctx: new_ctx }) => {
                            if path == session.budget_terminate_at() {
                                if let Some(message) = self.budget_trip_message.take() {
                                    return Ok(RunOutcome {
                                        success: false,
                                        message,
                                        final_context: new_ctx,
                                        paused_at: None,
                                    });
                                }
                            }
                            return Ok(RunOutcome {
                                success: true,
                                message: "hard end".to_string(),
                                final_context: new_ctx,
                                paused_at: None,
                            });
                        }
                        Ok(Dispatch::SoftEnd { ctx: new_ctx }) => {
                            ctx = new_ctx;
                            let newly = self.mark_executed_and_propagate(&path);
                            for n in newly {
                                self.ready.push_back(n);
                            }
                        }
                        Ok(Dispatch::Splice {
                            ctx: new_ctx,
                            graphs,
                            output_keys,
                            signature_validation,
                            on_signature_violation,
                        }) => {
                            match self.handle_splice(
                                &path,
                                new_ctx,
                                graphs,
                                &output_keys,
                                signature_validation,
                                on_signature_violation,
                                stdlib,
                            ) {
                                Ok(new_ctx) => {
                                    ctx = new_ctx;
                                    let newly = self.mark_executed_and_propagate(&path);
                                    for n in newly {
                                        self.ready.push_back(n);
                                    }
                                }
                                Err(e) => {
                                    if let Some(outcome) = self.trip_or_fail(session, e, ctx.clone()) {
                                        return Ok(outcome);
                                    }
                                    continue;
                                }
                            }
                        }
                        Ok(Dispatch::ForkMarker { .. }) | Ok(Dispatch::JoinMarker { .. }) => {
                            unreachable!("only fork/join nodes yield these markers")
                        }
                    }
                }
            }

            self.promote_pending_dynamic();
        }
    }

    /// On a budget error, clears the queue and jumps to the termination
    /// target instead of failing outright (§4.2, §4.7 "Termination
    /// conditions"), returning `None` so the caller's loop keeps running.
    /// Any other error fails the run, returning `Some` outcome.
    fn trip_or_fail(
        &mut self,
        session: &Session,
        err: AgentGraphError,
        ctx: Value,
    ) -> Option<RunOutcome> {
        if err.error_code() == "BudgetError" {
            self.budget_trip_message = Some(err.to_string());
            self.ready.clear();
            self.pending_dynamic_deps.clear();
            self.ready.push_back(session.budget_terminate_at().to_string());
            return None;
        }
        Some(RunOutcome {
            success: false,
            message: err.to_string(),
            final_context: ctx,
            paused_at: None,
        })
    }

    fn handle_splice(
        &mut self,
        generator_path: &str,
        ctx: Value,
        graphs: Vec<ParsedGraph>,
        output_keys: &[String],
        validation: SignatureValidation,
        on_violation: Option<NodePath>,
        stdlib: &mut StdlibIndex,
    ) -> Result<Value> {
        let mut accepted = Vec::new();
        let mut violated = false;
        for g in graphs {
            let all_dynamic = g.nodes.iter().all(|n| n.path.starts_with(prefix::DYNAMIC));
            if !all_dynamic {
                match validation {
                    SignatureValidation::Strict => {
                        violated = true;
                    }
                    SignatureValidation::Warn => {
                        tracing::warn!(
                            generator = generator_path,
                            prefix = %g.prefix,
                            "generated subgraph does not use the /dynamic/ namespace"
                        );
                        accepted.push(g);
                    }
                    SignatureValidation::Ignore => {}
                }
            } else {
                accepted.push(g);
            }
        }

        if violated {
            if let Some(target) = on_violation {
                return Ok(bind_subgraph_paths(ctx, output_keys, &[target]));
            }
            return Err(AgentGraphError::Signature {
                path: generator_path.to_string(),
                reason: "generated graph violates the /dynamic/ namespace signature".to_string(),
            });
        }

        for g in &accepted {
            if g.signature.is_some() {
                stdlib.register(crate::stdlib::SubgraphDescriptor {
                    path: g.prefix.clone(),
                    signature: g.signature.clone(),
                    output_schema: g.signature.as_ref().map(|s| Value::String(s.clone())),
                    permissions: g.permissions.clone(),
                    is_subgraph: true,
                    stability: crate::stdlib::Stability::Dynamic,
                });
            }
        }

        let roots = self.splice(accepted)?;
        Ok(bind_subgraph_paths(ctx, output_keys, &roots))
    }

    async fn run_fork_branches(
        &mut self,
        branches: &[NodePath],
        base_ctx: &Value,
        session: &mut Session,
        executor: &NodeExecutor,
        stdlib: &StdlibIndex,
    ) -> Result<BranchOutcome> {
        for branch_path in branches {
            let branch_ctx = base_ctx.clone();
            match self
                .run_branch(branch_path, branch_ctx, session, executor, stdlib)
                .await?
            {
                BranchResult::Finished(final_ctx) => {
                    self.branch_results.insert(branch_path.clone(), final_ctx);
                }
                BranchResult::HardEnded(final_ctx) => {
                    return Ok(BranchOutcome::HardEnded(final_ctx));
                }
            }
        }
        Ok(BranchOutcome::Finished)
    }

    fn branch_scope(&self, root: &str) -> HashSet<NodePath> {
        let child_prefix = format!("{}/", root);
        self.nodes
            .keys()
            .filter(|p| p.as_str() == root || p.starts_with(&child_prefix))
            .cloned()
            .collect()
    }

    async fn run_branch(
        &mut self,
        root: &str,
        mut ctx: Value,
        session: &mut Session,
        executor: &NodeExecutor,
        stdlib: &StdlibIndex,
    ) -> Result<BranchResult> {
        let scope = self.branch_scope(root);
        let mut local_ready: VecDeque<NodePath> = VecDeque::new();
        local_ready.push_back(root.to_string());
        for p in &scope {
            if p != root
                && !self.executed.contains(p)
                && self.predecessors_in_scope(p, &scope) == 0
            {
                local_ready.push_back(p.clone());
            }
        }

        while let Some(p) = local_ready.pop_front() {
            if self.executed.contains(&p) {
                continue;
            }
            let node = match self.nodes.get(&p).cloned() {
                Some(n) => n,
                None => continue,
            };

            match &node.variant {
                NodeVariant::Fork { .. } => {
                    let dispatch = session
                        .run_node(&node, ctx.clone(), executor, stdlib, TraceMode::Branch)
                        .await?;
                    if let Dispatch::ForkMarker { branches } = dispatch {
                        match self
                            .run_fork_branches(&branches, &ctx, session, executor, stdlib)
                            .await?
                        {
                            BranchOutcome::HardEnded(c) => return Ok(BranchResult::HardEnded(c)),
                            BranchOutcome::Finished => {}
                        }
                    }
                    let newly = self.mark_executed_and_propagate(&p);
                    for n in newly {
                        if scope.contains(&n) {
                            local_ready.push_back(n);
                        } else {
                            self.ready.push_back(n);
                        }
                    }
                }
                NodeVariant::Join { merge_strategy } => {
                    let merge_strategy = *merge_strategy;
                    let wait_for = join_branches(&node);
                    let _ = session
                        .run_node(&node, ctx.clone(), executor, stdlib, TraceMode::Branch)
                        .await?;
                    let mut merged = ctx.clone();
                    for b in &wait_for {
                        if let Some(branch_ctx) = self.branch_results.remove(b) {
                            merged = merge(&merged, &branch_ctx, b, merge_strategy)?;
                        }
                    }
                    ctx = merged;
                    let newly = self.mark_executed_and_propagate(&p);
                    for n in newly {
                        if scope.contains(&n) {
                            local_ready.push_back(n);
                        } else {
                            self.ready.push_back(n);
                        }
                    }
                }
                _ => {
                    let dispatch = session
                        .run_node(&node, ctx.clone(), executor, stdlib, TraceMode::Branch)
                        .await?;
                    match dispatch {
                        Dispatch::Continue(c) => {
                            ctx = c;
                            let newly = self.mark_executed_and_propagate(&p);
                            for n in newly {
                                if scope.contains(&n) {
                                    local_ready.push_back(n);
                                } else {
                                    self.ready.push_back(n);
                                }
                            }
                        }
                        Dispatch::SoftEnd { ctx: c } => {
                            ctx = c;
                            self.executed.insert(p.clone());
                        }
                        Dispatch::HardEnd { ctx: c } => {
                            self.executed.insert(p.clone());
                            return Ok(BranchResult::HardEnded(c));
                        }
                        Dispatch::Jump { ctx: c, target } => {
                            ctx = c;
                            self.executed.insert(p.clone());
                            if scope.contains(&target) {
                                local_ready.clear();
                                local_ready.push_back(target);
                            }
                        }
                        Dispatch::Paused { .. } => {
                            return Err(AgentGraphError::Llm(
                                "llm_call is not supported inside a fork branch".to_string(),
                            ));
                        }
                        Dispatch::Splice { .. } => {
                            return Err(AgentGraphError::Llm(
                                "generate_subgraph is not supported inside a fork branch"
                                    .to_string(),
                            ));
                        }
                        Dispatch::ForkMarker { .. } | Dispatch::JoinMarker { .. } => {
                            unreachable!()
                        }
                    }
                }
            }
        }

        Ok(BranchResult::Finished(ctx))
    }
}

/// The branch paths a `join` node waits on live in its common `wait_for`
/// attribute (§3), not a second field on the `Join` payload itself — see the
/// comment on `NodeVariant::Join`.
fn join_branches(node: &Node) -> Vec<NodePath> {
    node.wait_for
        .as_ref()
        .and_then(WaitFor::static_deps)
        .map(|deps| deps.to_vec())
        .unwrap_or_default()
}

fn bind_subgraph_paths(ctx: Value, output_keys: &[String], paths: &[NodePath]) -> Value {
    let mut next = ctx;
    if let Some(obj) = next.as_object_mut() {
        if let Some(key) = output_keys.first() {
            let value = if paths.len() == 1 {
                Value::String(paths[0].clone())
            } else {
                Value::Array(paths.iter().cloned().map(Value::String).collect())
            };
            obj.insert(key.clone(), value);
        }
    }
    next
}

fn has_cycle(nodes: &HashMap<NodePath, Node>, successors: &HashMap<NodePath, Vec<NodePath>>) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        Visiting,
        Done,
    }
    let mut state: HashMap<&str, State> = nodes.keys().map(|k| (k.as_str(), State::Unvisited)).collect();

    fn visit<'a>(
        path: &'a str,
        successors: &'a HashMap<NodePath, Vec<NodePath>>,
        state: &mut HashMap<&'a str, State>,
    ) -> bool {
        match state.get(path).copied() {
            Some(State::Visiting) => return true,
            Some(State::Done) => return false,
            _ => {}
        }
        state.insert(path, State::Visiting);
        if let Some(succs) = successors.get(path) {
            for s in succs {
                if visit(s.as_str(), successors, state) {
                    return true;
                }
            }
        }
        state.insert(path, State::Done);
        false
    }

    let paths: Vec<&str> = nodes.keys().map(|k| k.as_str()).collect();
    for path in paths {
        if visit(path, successors, &mut state) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::StaticAdapter;
    use crate::node::{Node, NodeVariant, TerminationMode};
    use crate::tool::ToolRegistry;
    use std::sync::Arc;

    fn assign(path: &str, key: &str, template: &str, next: Vec<&str>) -> Node {
        let mut node = Node::new(
            path,
            NodeVariant::Assign {
                assignments: [(key.to_string(), template.to_string())]
                    .into_iter()
                    .collect(),
            },
        );
        node.next = next.into_iter().map(String::from).collect();
        node
    }

    fn end(path: &str, mode: TerminationMode) -> Node {
        Node::new(path, NodeVariant::End { termination_mode: mode })
    }

    fn executor() -> NodeExecutor {
        NodeExecutor::new(Arc::new(ToolRegistry::new()), Arc::new(StaticAdapter::new("")))
    }

    #[tokio::test]
    async fn linear_assign_scenario() {
        let mut scheduler = Scheduler::new();
        let mut start = Node::new("/main/start", NodeVariant::Start);
        start.next = vec!["/main/a".to_string()];
        let a = assign("/main/a", "x", "1", vec!["/main/b"]);
        let b = assign("/main/b", "y", "{{ x }}", vec!["/main/end"]);
        let end_node = end("/main/end", TerminationMode::Hard);
        scheduler
            .register(vec![start, a, b, end_node])
            .unwrap();

        let mut session = Session::new(crate::budget::BudgetController::new(None));
        let exec = executor();
        let mut stdlib = StdlibIndex::new();
        let outcome = scheduler
            .run(serde_json::json!({}), &mut session, &exec, &mut stdlib)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.final_context["x"], "1");
        assert_eq!(outcome.final_context["y"], "1");
        assert_eq!(session.trace.records().len(), 4);
    }

    #[tokio::test]
    async fn cyclic_registration_rejected() {
        let mut scheduler = Scheduler::new();
        let mut a = assign("/main/a", "x", "1", vec!["/main/b"]);
        let mut b = assign("/main/b", "y", "1", vec!["/main/a"]);
        a.wait_for = Some(WaitFor::Direct(vec!["/main/b".to_string()]));
        b.next = vec!["/main/a".to_string()];
        let err = scheduler.register(vec![a, b]).unwrap_err();
        assert_eq!(err.error_code(), "GraphError");
    }

    #[tokio::test]
    async fn fork_join_last_write_wins() {
        let mut scheduler = Scheduler::new();
        let mut start = Node::new("/main/start", NodeVariant::Start);
        start.next = vec!["/main/fork".to_string()];
        let fork = Node::new(
            "/main/fork",
            NodeVariant::Fork {
                branches: vec!["/task/a".to_string(), "/task/b".to_string()],
            },
        );
        let branch_a = assign("/task/a", "x", "A", vec![]);
        let branch_b = assign("/task/b", "x", "B", vec![]);
        let mut join = Node::new(
            "/main/join",
            NodeVariant::Join {
                merge_strategy: crate::context::MergeStrategy::LastWriteWins,
            },
        );
        join.wait_for = Some(WaitFor::Direct(vec![
            "/task/a".to_string(),
            "/task/b".to_string(),
        ]));
        join.next = vec!["/main/end".to_string()];
        let end_node = end("/main/end", TerminationMode::Hard);

        scheduler
            .register(vec![start, fork, branch_a, branch_b, join, end_node])
            .unwrap();

        let mut session = Session::new(crate::budget::BudgetController::new(None));
        let exec = executor();
        let mut stdlib = StdlibIndex::new();
        let outcome = scheduler
            .run(serde_json::json!({}), &mut session, &exec, &mut stdlib)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.final_context["x"], "B");
    }

    #[tokio::test]
    async fn budget_trip_jumps_to_system_terminal() {
        let mut scheduler = Scheduler::new();
        scheduler
            .register(crate::system_nodes::builtin_nodes())
            .unwrap();
        let mut start = Node::new("/main/start", NodeVariant::Start);
        start.next = vec!["/main/s1".to_string()];
        let s1 = assign("/main/s1", "a", "1", vec!["/main/s2"]);
        let s2 = assign("/main/s2", "b", "1", vec!["/main/s3"]);
        let s3 = assign("/main/s3", "c", "1", vec!["/main/end"]);
        let end_node = end("/main/end", TerminationMode::Hard);
        scheduler
            .register(vec![start, s1, s2, s3, end_node])
            .unwrap();

        let mut session = Session::new(crate::budget::BudgetController::new(Some(
            crate::budget::ExecutionBudget {
                max_nodes: 2,
                ..Default::default()
            },
        )));
        let exec = executor();
        let mut stdlib = StdlibIndex::new();

        let outcome = scheduler
            .run(serde_json::json!({}), &mut session, &exec, &mut stdlib)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.message.to_lowercase().contains("budget"));
        assert!(outcome.final_context.get("c").is_none());
    }
}
