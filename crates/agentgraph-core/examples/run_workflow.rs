//! Loads an AgenticDSL Markdown workflow, registers a couple of tools, and
//! runs it to completion, printing the final context and trace length.
//!
//! Run with: cargo run --example run_workflow

use agentgraph_core::llm::LlmAdapter;
use agentgraph_core::tool::{Tool, ToolExecutor};
use agentgraph_core::Engine;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// This workflow never reaches an `llm_call` node, so a real adapter is
/// unnecessary; an embedder with LLM-backed nodes would supply one here.
struct NoLlm;

#[async_trait]
impl LlmAdapter for NoLlm {
    async fn complete(&self, _prompt: &str) -> Result<String, String> {
        Err("no LLM adapter configured for this example".to_string())
    }
}

const WORKFLOW: &str = r#"
### AgenticDSL `/main`
```yaml
graph_type: subgraph
nodes:
  - id: start
    type: start
    next: [greet]
  - id: greet
    type: tool_call
    tool: uppercase
    arguments:
      text: "{{ name }}"
    output_keys: [greeting]
    next: [fork]
  - id: fork
    type: fork
    branches: ["/main/log_a", "/main/log_b"]
  - id: log_a
    type: assign
    assignments:
      branch_a: "done"
    next: []
  - id: log_b
    type: assign
    assignments:
      branch_b: "done"
    next: []
  - id: join
    type: join
    merge_strategy: deep_merge
    wait_for: ["/main/log_a", "/main/log_b"]
    next: [end]
  - id: end
    type: end
    metadata:
      termination_mode: hard
```
"#;

fn uppercase_tool() -> Tool {
    let exec: ToolExecutor = Arc::new(|args| {
        Box::pin(async move {
            let text = args["text"].as_str().unwrap_or_default();
            Ok(json!({ "text": text.to_uppercase() }))
        })
    });
    Tool::new("uppercase", "uppercases its `text` argument", exec)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = Engine::from_markdown(WORKFLOW, Arc::new(NoLlm))?;
    engine.register_tool(uppercase_tool());

    let result = engine.run(json!({ "name": "crate" })).await?;

    println!("success: {}", result.success);
    println!("final context: {}", serde_json::to_string_pretty(&result.final_context)?);
    println!("trace records: {}", result.traces.len());

    Ok(())
}
