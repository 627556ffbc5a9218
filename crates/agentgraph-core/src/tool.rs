//! Tool registry: the `name → function` boundary the `tool_call` node
//! dispatches through.
//!
//! Tools are opaque async functions from rendered-argument JSON to a result
//! JSON value; this crate is an orchestration engine, not a tool library, so
//! the registry only provides registration and lookup, leaving tool bodies
//! entirely to the embedder.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A tool's result future.
pub type ToolFuture = BoxFuture<'static, Result<Value, String>>;

/// A tool executor function: rendered arguments in, result JSON or an
/// error message out.
pub type ToolExecutor = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// One registered tool.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    executor: ToolExecutor,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        executor: ToolExecutor,
    ) -> Self {
        Tool {
            name: name.into(),
            description: description.into(),
            executor,
        }
    }

    pub async fn execute(&self, args: Value) -> Result<Value, String> {
        (self.executor)(args).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Name-keyed collection of registered tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn call(&self, name: &str, args: Value) -> Result<Value, crate::error::AgentGraphError> {
        let tool = self
            .get(name)
            .ok_or_else(|| crate::error::AgentGraphError::tool(name, "tool not registered"))?;
        tool.execute(args)
            .await
            .map_err(|message| crate::error::AgentGraphError::tool(name, message))
    }
}
