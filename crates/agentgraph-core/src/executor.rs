//! Node Executor (§4.5): polymorphic dispatch over node variants.
//!
//! `fork` and `join` are only partially handled here: their real work
//! (branch simulation, merge) needs access to the scheduler's node map and
//! is delegated there. This module returns a [`Dispatch::ForkMarker`] /
//! [`Dispatch::JoinMarker`] for those two variants so they still flow
//! through the same permission-check and dispatch path as everything else.

use crate::context::MergeStrategy;
use crate::error::{AgentGraphError, Result};
use crate::graph::ParsedGraph;
use crate::llm::LlmAdapter;
use crate::node::{Node, NodeVariant, NodePath, SignatureValidation};
use crate::stdlib::StdlibIndex;
use crate::template;
use crate::tool::ToolRegistry;
use serde_json::Value;
use std::sync::Arc;

/// The result of dispatching one node through the executor.
pub enum Dispatch {
    /// Normal completion; the node returned a new context.
    Continue(Value),
    /// `llm_call` paused the run. `ctx` already has the rendered response
    /// bound to `output_keys[0]`.
    Paused { ctx: Value },
    /// `assert` failed and had an `on_failure` target.
    Jump { ctx: Value, target: NodePath },
    /// Hard `end`.
    HardEnd { ctx: Value },
    /// Soft `end`.
    SoftEnd { ctx: Value },
    /// `generate_subgraph` produced new graphs awaiting splice. The
    /// scheduler binds `output_keys[0]` once splice succeeds.
    Splice {
        ctx: Value,
        graphs: Vec<ParsedGraph>,
        output_keys: Vec<String>,
        signature_validation: SignatureValidation,
        on_signature_violation: Option<NodePath>,
    },
    /// `fork`; the scheduler performs branch simulation.
    ForkMarker { branches: Vec<NodePath> },
    /// `join`; the scheduler performs the merge, reading the branch list off
    /// the node's common `wait_for` attribute and the strategy off here.
    JoinMarker { merge_strategy: MergeStrategy },
}

/// Stateless dispatcher holding the tool/LLM/stdlib collaborators.
pub struct NodeExecutor {
    pub tools: Arc<ToolRegistry>,
    pub llm: Arc<dyn LlmAdapter>,
}

impl NodeExecutor {
    pub fn new(tools: Arc<ToolRegistry>, llm: Arc<dyn LlmAdapter>) -> Self {
        NodeExecutor { tools, llm }
    }

    fn check_permissions(&self, node: &Node) -> Result<()> {
        for perm in &node.permissions {
            if let Some(name) = perm.strip_prefix("tool:") {
                if !self.tools.has_tool(name) {
                    return Err(AgentGraphError::tool(name, "required by permission but not registered"));
                }
            }
        }
        Ok(())
    }

    /// Dispatches `node` against `ctx` (which already has `resources`
    /// injected under the reserved top-level key).
    pub async fn dispatch(
        &self,
        node: &Node,
        ctx: Value,
        stdlib: &StdlibIndex,
    ) -> Result<Dispatch> {
        self.check_permissions(node)?;

        match &node.variant {
            NodeVariant::Start => Ok(Dispatch::Continue(ctx)),

            NodeVariant::End { termination_mode } => match termination_mode {
                crate::node::TerminationMode::Hard => Ok(Dispatch::HardEnd { ctx }),
                crate::node::TerminationMode::Soft => Ok(Dispatch::SoftEnd { ctx }),
            },

            NodeVariant::Assign { assignments } => {
                let next = crate::context::render_and_merge(assignments, &ctx, &|tpl, c| {
                    template::render(tpl, c)
                })?;
                Ok(Dispatch::Continue(next))
            }

            NodeVariant::ToolCall {
                tool,
                arguments,
                output_keys,
            } => {
                let mut rendered_args = serde_json::Map::new();
                for (key, tpl) in arguments {
                    let rendered = template::render(tpl, &ctx)?;
                    rendered_args.insert(key.clone(), Value::String(rendered));
                }
                let result = self
                    .tools
                    .call(tool, Value::Object(rendered_args))
                    .await?;
                let keys = output_keys.clone().into_vec();
                let next = bind_tool_result(&ctx, &result, &keys)?;
                Ok(Dispatch::Continue(next))
            }

            NodeVariant::LlmCall {
                prompt_template,
                output_keys,
            } => {
                let prompt = template::render(prompt_template, &ctx)?;
                let response = self
                    .llm
                    .complete(&prompt)
                    .await
                    .map_err(AgentGraphError::Llm)?;
                let keys = output_keys.clone().into_vec();
                let key = keys
                    .first()
                    .ok_or_else(|| AgentGraphError::Llm("llm_call requires an output_key".to_string()))?;
                let mut next = ctx;
                next.as_object_mut()
                    .ok_or_else(|| AgentGraphError::Template("context is not a JSON object".to_string()))?
                    .insert(key.clone(), Value::String(response));
                Ok(Dispatch::Paused { ctx: next })
            }

            NodeVariant::Resource { .. } => Ok(Dispatch::Continue(ctx)),

            NodeVariant::Fork { branches } => Ok(Dispatch::ForkMarker {
                branches: branches.clone(),
            }),

            NodeVariant::Join { merge_strategy } => Ok(Dispatch::JoinMarker {
                merge_strategy: *merge_strategy,
            }),

            NodeVariant::GenerateSubgraph {
                prompt_template,
                output_keys,
                signature_validation,
                on_signature_violation,
            } => {
                let mut prompt_ctx = ctx.clone();
                if let Some(obj) = prompt_ctx.as_object_mut() {
                    obj.insert("available_subgraphs".to_string(), stdlib.available_subgraphs());
                }
                let prompt = template::render(prompt_template, &prompt_ctx)?;
                let response = self
                    .llm
                    .complete(&prompt)
                    .await
                    .map_err(AgentGraphError::Llm)?;
                let graphs = crate::parser::parse_markdown(&response)?;
                Ok(Dispatch::Splice {
                    ctx,
                    graphs,
                    output_keys: output_keys.clone().into_vec(),
                    signature_validation: *signature_validation,
                    on_signature_violation: on_signature_violation.clone(),
                })
            }

            NodeVariant::Assert {
                condition,
                on_failure,
            } => {
                let rendered = template::render(condition, &ctx)?;
                if template::as_condition_bool(&rendered) {
                    Ok(Dispatch::Continue(ctx))
                } else if let Some(target) = on_failure {
                    Ok(Dispatch::Jump {
                        ctx,
                        target: target.clone(),
                    })
                } else {
                    Err(AgentGraphError::Assert {
                        path: node.path.clone(),
                        condition: rendered,
                    })
                }
            }
        }
    }
}

/// Binds a tool's raw result into `ctx` per the three output-key rules
/// (§4.5 `tool_call`).
fn bind_tool_result(ctx: &Value, result: &Value, output_keys: &[String]) -> Result<Value> {
    let mut next = ctx.clone();
    let obj = next
        .as_object_mut()
        .ok_or_else(|| AgentGraphError::Template("context is not a JSON object".to_string()))?;

    if output_keys.len() == 1 {
        obj.insert(output_keys[0].clone(), result.clone());
    } else if let Some(result_obj) = result.as_object() {
        for key in output_keys {
            if let Some(v) = result_obj.get(key) {
                obj.insert(key.clone(), v.clone());
            }
        }
    } else if let Some(first) = output_keys.first() {
        obj.insert(first.clone(), result.clone());
    }
    Ok(next)
}
