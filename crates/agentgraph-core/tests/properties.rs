//! Property-style invariants over the context merge policies, the bounded
//! snapshot store, and the trace recorder: random small inputs instead of
//! hand-picked examples.

use agentgraph_core::{MergeStrategy, SnapshotStore};
use proptest::collection::{hash_map, vec as pvec};
use proptest::prelude::*;
use serde_json::{json, Value};

fn json_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z]{1,8}".prop_map(Value::String),
    ]
}

fn disjoint_object_pair() -> impl Strategy<Value = (Value, Value)> {
    hash_map("[a-z]{1,6}", json_scalar(), 0..6).prop_flat_map(|left_keys| {
        let used: Vec<String> = left_keys.keys().cloned().collect();
        hash_map(
            "[a-z]{1,6}".prop_filter("must not reuse a left key", move |k| !used.contains(k)),
            json_scalar(),
            0..6,
        )
        .prop_map(move |right_keys| {
            let left = Value::Object(left_keys.clone().into_iter().collect());
            let right = Value::Object(right_keys.into_iter().collect());
            (left, right)
        })
    })
}

proptest! {
    /// Merging disjoint key sets is order-independent regardless of
    /// strategy, since no path ever visits a shared key.
    #[test]
    fn merge_on_disjoint_keys_is_commutative((a, b) in disjoint_object_pair()) {
        for policy in [
            MergeStrategy::ErrorOnConflict,
            MergeStrategy::LastWriteWins,
            MergeStrategy::DeepMerge,
        ] {
            let forward = agentgraph_core::context::merge(&a, &b, "/root", policy).unwrap();
            let backward = agentgraph_core::context::merge(&b, &a, "/root", policy).unwrap();
            prop_assert_eq!(forward, backward);
        }
    }

    /// `enforce_budget` never leaves more entries than `max_count` allows,
    /// and always keeps the most recently saved keys (FIFO eviction).
    #[test]
    fn snapshot_store_respects_count_budget(
        keys in pvec("[a-z]{1,6}", 1..20),
        max_count in 0i64..10,
    ) {
        let mut store = SnapshotStore::new();
        let mut order: Vec<String> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            store.save(key.clone(), json!({ "i": i }));
            order.retain(|k| k != key);
            order.push(key.clone());
        }
        store.enforce_budget(max_count, usize::MAX);

        prop_assert!(store.len() as i64 <= max_count);

        let kept: Vec<&String> = order.iter().rev().take(max_count as usize).collect();
        for key in &kept {
            prop_assert!(store.get(key).is_some());
        }
    }

    /// After eviction, the total size of whatever remains either fits the
    /// byte budget or the store has been emptied trying to reach it.
    #[test]
    fn snapshot_store_honors_size_budget(
        keys in pvec("[a-z]{1,6}", 0..15),
        max_kb in 1usize..8,
    ) {
        let mut store = SnapshotStore::new();
        let mut distinct = Vec::new();
        for key in &keys {
            let value = json!({ "payload": key.repeat(400) });
            store.save(key.clone(), value);
            if !distinct.contains(key) {
                distinct.push(key.clone());
            }
        }
        store.enforce_budget(-1, max_kb);

        let remaining_total: usize = distinct
            .iter()
            .filter_map(|k| store.get(k))
            .map(SnapshotStore::estimate_size_kb)
            .sum();
        prop_assert!(store.is_empty() || remaining_total <= max_kb);
    }
}

#[test]
fn context_delta_round_trip_over_disjoint_additions() {
    let before = json!({"a": 1});
    let after = json!({"a": 1, "b": 2});
    let delta = agentgraph_core::context::context_delta(&before, &after);
    assert_eq!(delta, json!({"b": 2}));
}
