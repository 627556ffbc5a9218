//! Markdown/YAML DSL loader (§6 "DSL input format").
//!
//! An external-collaborator boundary: the hard core only needs this to
//! produce [`ParsedGraph`] values so the scheduler has something to
//! register. Each block is a `### AgenticDSL` header naming a node path in
//! backticks, followed by a fenced `yaml` code block whose body is wrapped
//! in `# --- BEGIN AgenticDSL ---` / `# --- END AgenticDSL ---` marker
//! comments (stripped before parsing).
//!
//! A block's YAML body is one of: a `graph_type: subgraph` container with an
//! `id`-keyed `nodes` list (each node's effective path is
//! `<block path>/<id>`); a single node object (`type: ...` directly, using
//! the block path as-is); or the reserved `/__meta__` block carrying
//! `execution_budget`.

use crate::budget::ExecutionBudget;
use crate::error::{AgentGraphError, Result};
use crate::graph::ParsedGraph;
use crate::node::{is_valid_path, Node};
use regex::Regex;
use std::sync::OnceLock;

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)###\s*AgenticDSL\s*`([^`]+)`\s*```yaml\s*(.*?)```").unwrap()
    })
}

/// Parses every `### AgenticDSL \`<path>\`` block in `text` into a
/// [`ParsedGraph`]. The `/__meta__` block (if present) comes back as a
/// `ParsedGraph` with no nodes and `budget` set, which callers filter out
/// of node registration and use to seed the execution budget instead.
pub fn parse_markdown(text: &str) -> Result<Vec<ParsedGraph>> {
    let mut graphs = Vec::new();
    for caps in block_regex().captures_iter(text) {
        let path = caps.get(1).unwrap().as_str().trim().to_string();
        let body = strip_markers(caps.get(2).unwrap().as_str());

        if !is_valid_path(&path) && path != "/__meta__" {
            return Err(AgentGraphError::Parse(format!(
                "invalid node path '{}'",
                path
            )));
        }

        graphs.push(parse_block(&path, &body)?);
    }
    Ok(graphs)
}

fn strip_markers(body: &str) -> String {
    body.lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed != "# --- BEGIN AgenticDSL ---" && trimmed != "# --- END AgenticDSL ---"
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_block(path: &str, body: &str) -> Result<ParsedGraph> {
    let value: serde_yaml::Value = serde_yaml::from_str(body)?;

    if path == "/__meta__" {
        return parse_meta_block(&value);
    }

    if !value.is_mapping() {
        return Err(AgentGraphError::Parse(format!(
            "block '{}' is not a YAML mapping",
            path
        )));
    }

    let is_subgraph = value.get("graph_type").and_then(|v| v.as_str()) == Some("subgraph");

    if is_subgraph {
        parse_subgraph_block(path, &value)
    } else {
        parse_single_node_block(path, value)
    }
}

fn parse_meta_block(value: &serde_yaml::Value) -> Result<ParsedGraph> {
    let budget_value = value
        .get("execution_budget")
        .ok_or_else(|| AgentGraphError::Parse("/__meta__ block missing execution_budget".to_string()))?;
    let budget: ExecutionBudget = serde_yaml::from_value(budget_value.clone())?;
    Ok(ParsedGraph {
        prefix: "/__meta__".to_string(),
        nodes: Vec::new(),
        budget: Some(budget),
        signature: None,
        permissions: Vec::new(),
        is_standard_library: false,
    })
}

fn parse_subgraph_block(path: &str, value: &serde_yaml::Value) -> Result<ParsedGraph> {
    let node_list = value
        .get("nodes")
        .and_then(|v| v.as_sequence())
        .ok_or_else(|| AgentGraphError::Parse(format!("subgraph '{}' missing nodes list", path)))?;

    let block_path = path.trim_end_matches('/');
    let mut nodes = Vec::with_capacity(node_list.len());
    for entry in node_list {
        let id = entry
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentGraphError::Parse(format!("node entry under '{}' missing id", path)))?
            .to_string();
        let mut mapping = entry
            .as_mapping()
            .ok_or_else(|| AgentGraphError::Parse(format!("node entry under '{}' is not a mapping", path)))?
            .clone();
        qualify_relative_paths(&mut mapping, block_path);
        let child_path = format!("{}/{}", block_path, id);
        mapping.insert(
            serde_yaml::Value::String("path".to_string()),
            serde_yaml::Value::String(child_path),
        );
        let node: Node = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))?;
        nodes.push(node);
    }

    let budget = value
        .get("budget")
        .map(|v| serde_yaml::from_value(v.clone()))
        .transpose()?;
    let signature = value
        .get("signature")
        .and_then(|v| v.as_str())
        .map(String::from);
    let permissions = value
        .get("permissions")
        .and_then(|v| v.as_sequence())
        .map(|seq| seq.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let is_standard_library = value
        .get("is_standard_library")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Ok(ParsedGraph {
        prefix: path.to_string(),
        nodes,
        budget,
        signature,
        permissions,
        is_standard_library,
    })
}

/// Node path references within a `graph_type: subgraph` block may name a
/// sibling by its bare `id` (e.g. `next: [a]`) rather than the fully
/// qualified path the parsed [`Node`] needs. Rewrites every path-bearing
/// field in place, prefixing any value that doesn't already start with `/`
/// with `block_path`. `wait_for` is only rewritten when it is a list (or
/// `all_of`/`any_of`) of paths; a bare string there is a dynamic template
/// expression, not a path, and is left untouched.
fn qualify_relative_paths(mapping: &mut serde_yaml::Mapping, block_path: &str) {
    let qualify_str = |v: &mut serde_yaml::Value| {
        if let serde_yaml::Value::String(s) = v {
            if !s.starts_with('/') {
                *s = format!("{}/{}", block_path, s);
            }
        }
    };
    let qualify_seq = |v: &mut serde_yaml::Value| match v {
        serde_yaml::Value::String(_) => qualify_str(v),
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                qualify_str(item);
            }
        }
        _ => {}
    };

    for key in ["next", "branches", "on_failure", "on_signature_violation"] {
        if let Some(v) = mapping.get_mut(serde_yaml::Value::String(key.to_string())) {
            qualify_seq(v);
        }
    }

    if let Some(v) = mapping.get_mut(serde_yaml::Value::String("wait_for".to_string())) {
        match v {
            serde_yaml::Value::Sequence(seq) => {
                for item in seq {
                    qualify_str(item);
                }
            }
            serde_yaml::Value::Mapping(m) => {
                for key in ["all_of", "any_of"] {
                    if let Some(inner) = m.get_mut(serde_yaml::Value::String(key.to_string())) {
                        qualify_seq(inner);
                    }
                }
            }
            _ => {}
        }
    }
}

fn parse_single_node_block(path: &str, value: serde_yaml::Value) -> Result<ParsedGraph> {
    let mut mapping = value
        .as_mapping()
        .ok_or_else(|| AgentGraphError::Parse(format!("block '{}' is not a YAML mapping", path)))?
        .clone();
    mapping.insert(
        serde_yaml::Value::String("path".to_string()),
        serde_yaml::Value::String(path.to_string()),
    );
    let node: Node = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))?;
    Ok(ParsedGraph::single(node))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_node_block() {
        let text = r#"
### AgenticDSL `/main/start`
```yaml
# --- BEGIN AgenticDSL ---
type: start
next: ["/main/a"]
# --- END AgenticDSL ---
```
"#;
        let graphs = parse_markdown(text).unwrap();
        assert_eq!(graphs.len(), 1);
        assert_eq!(graphs[0].nodes.len(), 1);
        assert_eq!(graphs[0].nodes[0].path, "/main/start");
        assert_eq!(graphs[0].nodes[0].next, vec!["/main/a".to_string()]);
    }

    #[test]
    fn parses_subgraph_block_with_prefixed_node_paths() {
        let text = r#"
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
        let graphs = parse_markdown(text).unwrap();
        assert_eq!(graphs.len(), 1);
        assert_eq!(graphs[0].nodes.len(), 3);
        assert_eq!(graphs[0].nodes[0].path, "/main/start");
        assert_eq!(graphs[0].nodes[1].path, "/main/a");
        assert_eq!(graphs[0].nodes[0].next, vec!["/main/a".to_string()]);
        assert_eq!(graphs[0].nodes[1].next, vec!["/main/end".to_string()]);
    }

    #[test]
    fn qualifies_sibling_ids_in_fork_join_and_assert_fields() {
        let text = r#"
### AgenticDSL `/main`
```yaml
graph_type: subgraph
nodes:
  - id: start
    type: start
    next: [fork]
  - id: fork
    type: fork
    branches: [a, b]
    next: [join]
  - id: join
    type: join
    wait_for: [a, b]
    merge_strategy: last_write_wins
    next: [check]
  - id: check
    type: assert
    condition: "true"
    on_failure: repair
    next: [end]
  - id: repair
    type: assign
    assignments:
      fixed: "1"
    next: [end]
  - id: end
    type: end
    metadata:
      termination_mode: hard
```
"#;
        let graphs = parse_markdown(text).unwrap();
        let nodes = &graphs[0].nodes;
        let fork = nodes.iter().find(|n| n.path == "/main/fork").unwrap();
        match &fork.variant {
            crate::node::NodeVariant::Fork { branches } => {
                assert_eq!(branches, &vec!["/main/a".to_string(), "/main/b".to_string()]);
            }
            _ => panic!("expected fork"),
        }
        let join = nodes.iter().find(|n| n.path == "/main/join").unwrap();
        assert_eq!(
            join.wait_for.as_ref().unwrap().static_deps(),
            Some(&["/main/a".to_string(), "/main/b".to_string()][..])
        );
        match &join.variant {
            crate::node::NodeVariant::Join { merge_strategy } => {
                assert_eq!(*merge_strategy, crate::context::MergeStrategy::LastWriteWins);
            }
            _ => panic!("expected join"),
        }
        let check = nodes.iter().find(|n| n.path == "/main/check").unwrap();
        match &check.variant {
            crate::node::NodeVariant::Assert { on_failure, .. } => {
                assert_eq!(on_failure.as_deref(), Some("/main/repair"));
            }
            _ => panic!("expected assert"),
        }
    }

    #[test]
    fn dynamic_wait_for_expression_is_left_as_a_template_not_a_path() {
        let text = r#"
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
    wait_for: "{{ deps }}"
    next: [end]
  - id: end
    type: end
    metadata:
      termination_mode: hard
```
"#;
        let graphs = parse_markdown(text).unwrap();
        let a = graphs[0]
            .nodes
            .iter()
            .find(|n| n.path == "/main/a")
            .unwrap();
        match a.wait_for.as_ref().unwrap() {
            crate::node::WaitFor::Expr(expr) => assert_eq!(expr, "{{ deps }}"),
            other => panic!("expected a dynamic expression, got {:?}", other),
        }
    }

    #[test]
    fn parses_meta_block_budget() {
        let text = r#"
### AgenticDSL `/__meta__`
```yaml
execution_budget:
  max_nodes: 2
  max_llm_calls: 1
```
"#;
        let graphs = parse_markdown(text).unwrap();
        assert_eq!(graphs.len(), 1);
        assert_eq!(graphs[0].prefix, "/__meta__");
        assert!(graphs[0].nodes.is_empty());
        let budget = graphs[0].budget.as_ref().unwrap();
        assert_eq!(budget.max_nodes, 2);
        assert_eq!(budget.max_llm_calls, 1);
    }

    #[test]
    fn rejects_malformed_path() {
        let text = r#"
### AgenticDSL `main start`
```yaml
type: start
```
"#;
        assert!(parse_markdown(text).is_err());
    }
}
