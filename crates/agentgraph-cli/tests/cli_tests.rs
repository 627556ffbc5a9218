//! Binary-level integration tests for `agentgraph`: invokes the compiled
//! CLI against real workflow files and inspects its exit code and the
//! trace file it writes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_agentgraph"))
}

fn write_workflow(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("workflow.agent.md");
    fs::write(&path, contents).unwrap();
    path
}

const LINEAR_WORKFLOW: &str = r#"
### AgenticDSL `/main`
```yaml
graph_type: subgraph
nodes:
  - id: start
    type: start
    next: [a]
  - id: a
    type: assign
    assignments:
      x: "1"
    next: [end]
  - id: end
    type: end
    metadata:
      termination_mode: hard
```
"#;

#[test]
fn runs_linear_workflow_and_exits_success() {
    let dir = TempDir::new().unwrap();
    let workflow = write_workflow(&dir, LINEAR_WORKFLOW);
    let trace_out = dir.path().join("trace.json");

    let status = bin()
        .arg(&workflow)
        .arg("--trace-out")
        .arg(&trace_out)
        .arg("--quiet")
        .status()
        .unwrap();

    assert!(status.success());
    let trace: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&trace_out).unwrap()).unwrap();
    assert_eq!(trace["success"], true);
    assert_eq!(trace["final_context"]["x"], "1");
}

#[test]
fn missing_workflow_file_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let status = bin()
        .arg(dir.path().join("missing.agent.md"))
        .arg("--trace-out")
        .arg(dir.path().join("trace.json"))
        .arg("--quiet")
        .status()
        .unwrap();

    assert!(!status.success());
}

#[test]
fn missing_main_node_is_rejected_before_running() {
    let dir = TempDir::new().unwrap();
    let workflow = write_workflow(
        &dir,
        r#"
### AgenticDSL `/lib/helper`
```yaml
type: start
next: []
```
"#,
    );
    let status = bin()
        .arg(&workflow)
        .arg("--trace-out")
        .arg(dir.path().join("trace.json"))
        .arg("--quiet")
        .status()
        .unwrap();

    assert!(!status.success());
}

#[test]
fn budget_override_trips_and_is_reflected_in_trace() {
    let dir = TempDir::new().unwrap();
    let workflow = write_workflow(
        &dir,
        r#"
### AgenticDSL `/main`
```yaml
graph_type: subgraph
nodes:
  - id: start
    type: start
    next: [s1]
  - id: s1
    type: assign
    assignments:
      a: "1"
    next: [s2]
  - id: s2
    type: assign
    assignments:
      b: "1"
    next: [end]
  - id: end
    type: end
    metadata:
      termination_mode: hard
```
"#,
    );
    let budget_path = dir.path().join("budget.json");
    fs::write(&budget_path, r#"{"max_nodes": 1}"#).unwrap();
    let trace_out = dir.path().join("trace.json");

    let status = bin()
        .arg(&workflow)
        .arg("--trace-out")
        .arg(&trace_out)
        .arg("--budget")
        .arg(&budget_path)
        .arg("--quiet")
        .status()
        .unwrap();

    // The run reaches the budget-exceeded system terminal rather than `s2`,
    // and the CLI exits non-zero since the workflow itself failed.
    assert!(!status.success());
    let trace: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&trace_out).unwrap()).unwrap();
    assert_eq!(trace["success"], false);
    assert!(trace["message"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("budget"));
    assert!(trace["final_context"].get("b").is_none());
}

#[test]
fn input_context_file_seeds_initial_context() {
    let dir = TempDir::new().unwrap();
    let workflow = write_workflow(
        &dir,
        r#"
### AgenticDSL `/main`
```yaml
graph_type: subgraph
nodes:
  - id: start
    type: start
    next: [a]
  - id: a
    type: assign
    assignments:
      doubled: "{{ seed }}"
    next: [end]
  - id: end
    type: end
    metadata:
      termination_mode: hard
```
"#,
    );
    let input_path = dir.path().join("input.json");
    fs::write(&input_path, r#"{"seed": "42"}"#).unwrap();
    let trace_out = dir.path().join("trace.json");

    let status = bin()
        .arg(&workflow)
        .arg("--trace-out")
        .arg(&trace_out)
        .arg("--input")
        .arg(&input_path)
        .arg("--quiet")
        .status()
        .unwrap();

    assert!(status.success());
    let trace: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&trace_out).unwrap()).unwrap();
    assert_eq!(trace["final_context"]["seed"], "42");
    assert_eq!(trace["final_context"]["doubled"], "42");
}
