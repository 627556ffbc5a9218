//! Context Store (§4.1): the JSON document nodes read and return, plus
//! merge-policy resolution and the bounded snapshot FIFO.

use crate::error::{AgentGraphError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// How `merge` reconciles a source value into a destination value at a
/// given path (§4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    ErrorOnConflict,
    LastWriteWins,
    DeepMerge,
    ArrayConcat,
    ArrayMergeUnique,
}

/// Renders each `(key, template)` pair against `ctx` and assigns the
/// rendered string into `ctx[key]`, per §4.1 `render_and_merge`.
///
/// All templates are rendered against the *same* pre-node context; nothing
/// in this function observes a partially-updated context mid-way through.
pub fn render_and_merge(
    assignments: &std::collections::BTreeMap<String, String>,
    ctx: &Value,
    renderer: &dyn Fn(&str, &Value) -> Result<String>,
) -> Result<Value> {
    let mut next = ctx.clone();
    let obj = next
        .as_object_mut()
        .ok_or_else(|| AgentGraphError::Template("context is not a JSON object".to_string()))?;
    for (key, template) in assignments {
        let rendered = renderer(template, ctx)?;
        obj.insert(key.clone(), Value::String(rendered));
    }
    Ok(next)
}

/// Deep-merges `src` into `dst` at `path`, dispatching to the strategy
/// resolved for that path. Returns the merged value or a `ConflictError`.
pub fn merge(dst: &Value, src: &Value, path: &str, policy: MergeStrategy) -> Result<Value> {
    merge_at(dst, src, path, policy)
}

fn merge_at(dst: &Value, src: &Value, path: &str, policy: MergeStrategy) -> Result<Value> {
    match (dst, src) {
        (Value::Object(d), Value::Object(s)) => {
            let mut out = d.clone();
            for (k, sv) in s {
                let child_path = format!("{}/{}", path.trim_end_matches('/'), k);
                match out.get(k) {
                    Some(dv) => {
                        let merged = merge_at(dv, sv, &child_path, policy)?;
                        out.insert(k.clone(), merged);
                    }
                    None => {
                        out.insert(k.clone(), sv.clone());
                    }
                }
            }
            Ok(Value::Object(out))
        }
        (Value::Array(d), Value::Array(s)) => merge_arrays(d, s, path, policy),
        _ => {
            if dst == src {
                return Ok(dst.clone());
            }
            match policy {
                MergeStrategy::LastWriteWins | MergeStrategy::DeepMerge => Ok(src.clone()),
                MergeStrategy::ErrorOnConflict => Err(AgentGraphError::Conflict {
                    path: path.to_string(),
                }),
                MergeStrategy::ArrayConcat | MergeStrategy::ArrayMergeUnique => {
                    Err(AgentGraphError::Conflict {
                        path: path.to_string(),
                    })
                }
            }
        }
    }
}

fn merge_arrays(
    d: &[Value],
    s: &[Value],
    path: &str,
    policy: MergeStrategy,
) -> Result<Value> {
    match policy {
        MergeStrategy::ArrayConcat => {
            let mut out = d.to_vec();
            out.extend_from_slice(s);
            Ok(Value::Array(out))
        }
        MergeStrategy::ArrayMergeUnique => {
            let mut out = d.to_vec();
            for v in s {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Ok(Value::Array(out))
        }
        MergeStrategy::LastWriteWins | MergeStrategy::DeepMerge => Ok(Value::Array(s.to_vec())),
        MergeStrategy::ErrorOnConflict => {
            if d == s {
                Ok(Value::Array(d.to_vec()))
            } else {
                Err(AgentGraphError::Conflict {
                    path: path.to_string(),
                })
            }
        }
    }
}

/// Resolves the merge policy in effect for `path` from a set of
/// `(pattern, policy)` registrations.
///
/// Resolution order (see the "glob-policy precedence" open-question
/// decision in `DESIGN.md`): exact match, then the longest matching
/// `prefix.*` glob (ties broken by declaration order), then `default`.
pub fn resolve_policy(
    path: &str,
    policies: &[(String, MergeStrategy)],
    default: MergeStrategy,
) -> MergeStrategy {
    if let Some((_, policy)) = policies.iter().find(|(pat, _)| pat == path) {
        return *policy;
    }

    let mut best: Option<(usize, MergeStrategy)> = None;
    for (pat, policy) in policies {
        if let Some(prefix) = pat.strip_suffix(".*") {
            if path.starts_with(prefix) {
                let len = prefix.len();
                if best.map(|(blen, _)| len > blen).unwrap_or(true) {
                    best = Some((len, *policy));
                }
            }
        }
    }

    best.map(|(_, p)| p).unwrap_or(default)
}

/// Deep-copy-keyed, bounded FIFO context snapshot store.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    order: VecDeque<String>,
    entries: HashMap<String, (Value, usize)>,
    total_kb: usize,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimated size in KiB of a canonical serialized form of `value`.
    pub fn estimate_size_kb(value: &Value) -> usize {
        let bytes = serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0);
        bytes.div_ceil(1024).max(1)
    }

    pub fn save(&mut self, key: impl Into<String>, ctx: Value) {
        let key = key.into();
        let size = Self::estimate_size_kb(&ctx);
        if let Some((_, old_size)) = self.entries.remove(&key) {
            self.order.retain(|k| k != &key);
            self.total_kb -= old_size;
        }
        self.order.push_back(key.clone());
        self.total_kb += size;
        self.entries.insert(key, (ctx, size));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|(v, _)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts the oldest entries, by insertion order, until both
    /// `max_count` (-1 = unbounded) and `max_total_kb` hold.
    pub fn enforce_budget(&mut self, max_count: i64, max_total_kb: usize) {
        while (max_count >= 0 && self.entries.len() as i64 > max_count)
            || self.total_kb > max_total_kb
        {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some((_, size)) = self.entries.remove(&oldest) {
                self.total_kb -= size;
            }
        }
    }
}

/// Computes the JSON-object delta between `before` and `after`: every key
/// whose value differs, with added/changed keys present and removed keys
/// mapped to `null` (§4.3).
pub fn context_delta(before: &Value, after: &Value) -> Value {
    let mut out = serde_json::Map::new();
    let empty = serde_json::Map::new();
    let before_obj = before.as_object().unwrap_or(&empty);
    let after_obj = after.as_object().unwrap_or(&empty);

    for (k, v) in after_obj {
        if before_obj.get(k) != Some(v) {
            out.insert(k.clone(), v.clone());
        }
    }
    for k in before_obj.keys() {
        if !after_obj.contains_key(k) {
            out.insert(k.clone(), Value::Null);
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_recurses_objects() {
        let dst = json!({"a": {"x": 1}});
        let src = json!({"a": {"y": 2}});
        let out = merge(&dst, &src, "/root", MergeStrategy::DeepMerge).unwrap();
        assert_eq!(out, json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn error_on_conflict_fails_on_scalar_disagreement() {
        let dst = json!({"x": "A"});
        let src = json!({"x": "B"});
        let err = merge(&dst, &src, "/root", MergeStrategy::ErrorOnConflict).unwrap_err();
        assert_eq!(err.error_code(), "ConflictError");
    }

    #[test]
    fn error_on_conflict_succeeds_on_disjoint_keys() {
        let dst = json!({"x": "A"});
        let src = json!({"y": "B"});
        let out = merge(&dst, &src, "/root", MergeStrategy::ErrorOnConflict).unwrap();
        assert_eq!(out, json!({"x": "A", "y": "B"}));
    }

    #[test]
    fn last_write_wins_overwrites() {
        let dst = json!({"x": "A"});
        let src = json!({"x": "B"});
        let out = merge(&dst, &src, "/root", MergeStrategy::LastWriteWins).unwrap();
        assert_eq!(out, json!({"x": "B"}));
    }

    #[test]
    fn array_concat_appends() {
        let dst = json!({"x": [1, 2]});
        let src = json!({"x": [3]});
        let out = merge(&dst, &src, "/root", MergeStrategy::ArrayConcat).unwrap();
        assert_eq!(out, json!({"x": [1, 2, 3]}));
    }

    #[test]
    fn array_merge_unique_dedupes() {
        let dst = json!({"x": [1, 2]});
        let src = json!({"x": [2, 3]});
        let out = merge(&dst, &src, "/root", MergeStrategy::ArrayMergeUnique).unwrap();
        assert_eq!(out, json!({"x": [1, 2, 3]}));
    }

    #[test]
    fn policy_resolution_prefers_exact_then_longest_glob() {
        let policies = vec![
            ("/a.*".to_string(), MergeStrategy::LastWriteWins),
            ("/a/b.*".to_string(), MergeStrategy::DeepMerge),
            ("/a/b/c".to_string(), MergeStrategy::ArrayConcat),
        ];
        assert_eq!(
            resolve_policy("/a/b/c", &policies, MergeStrategy::ErrorOnConflict),
            MergeStrategy::ArrayConcat
        );
        assert_eq!(
            resolve_policy("/a/b/d", &policies, MergeStrategy::ErrorOnConflict),
            MergeStrategy::DeepMerge
        );
        assert_eq!(
            resolve_policy("/a/z", &policies, MergeStrategy::ErrorOnConflict),
            MergeStrategy::LastWriteWins
        );
        assert_eq!(
            resolve_policy("/unrelated", &policies, MergeStrategy::ErrorOnConflict),
            MergeStrategy::ErrorOnConflict
        );
    }

    #[test]
    fn snapshot_store_evicts_fifo_under_count_pressure() {
        let mut store = SnapshotStore::new();
        store.save("/a", json!({"n": 1}));
        store.save("/b", json!({"n": 2}));
        store.save("/c", json!({"n": 3}));
        store.enforce_budget(2, usize::MAX);
        assert_eq!(store.len(), 2);
        assert!(store.get("/a").is_none());
        assert!(store.get("/b").is_some());
        assert!(store.get("/c").is_some());
    }

    #[test]
    fn context_delta_reports_added_changed_and_removed() {
        let before = json!({"x": 1, "y": 2});
        let after = json!({"x": 1, "y": 3, "z": 4});
        let delta = context_delta(&before, &after);
        assert_eq!(delta, json!({"y": 3, "z": 4}));
    }
}
