//! Resource Registry (§4.4): a stable, read-only view of declared
//! resources, injected into context as `ctx.resources` on every node entry.

use crate::node::{NodePath, ResourceScope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A registered resource declaration (from a `resource` node).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub path: NodePath,
    pub resource_type: String,
    pub uri: String,
    pub scope: ResourceScope,
}

/// Read-mostly registry of resources, populated at DAG build time from
/// `resource` nodes and consulted (never mutated) during execution.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<NodePath, Resource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource: Resource) {
        self.resources.insert(resource.path.clone(), resource);
    }

    pub fn get(&self, path: &str) -> Option<&Resource> {
        self.resources.get(path)
    }

    /// Materializes the registry as the JSON object injected under
    /// `ctx.resources`: `{ path: {uri, type, scope} }`.
    pub fn view(&self) -> Value {
        let mut obj = serde_json::Map::new();
        for (path, res) in &self.resources {
            let scope = match res.scope {
                ResourceScope::Global => "global",
                ResourceScope::Local => "local",
            };
            obj.insert(
                path.clone(),
                serde_json::json!({
                    "uri": res.uri,
                    "type": res.resource_type,
                    "scope": scope,
                }),
            );
        }
        Value::Object(obj)
    }
}
