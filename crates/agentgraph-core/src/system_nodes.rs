//! System Nodes (§2): the built-in terminal nodes under `/__system__/`.
//!
//! These are registered with every scheduler but, per §4.7's DAG
//! construction rule, only ever scheduled when explicitly targeted (by the
//! budget controller's soft-termination jump, or by an explicit `next`).

use crate::node::{system_path, Node, NodeVariant, TerminationMode};

/// Builds the fixed set of `/__system__/` nodes seeded into every scheduler.
pub fn builtin_nodes() -> Vec<Node> {
    vec![
        Node::new(
            system_path::BUDGET_EXCEEDED,
            NodeVariant::End {
                termination_mode: TerminationMode::Hard,
            },
        ),
        Node::new(
            system_path::END_SOFT,
            NodeVariant::End {
                termination_mode: TerminationMode::Soft,
            },
        ),
        Node::new(
            system_path::NOOP,
            NodeVariant::End {
                termination_mode: TerminationMode::Soft,
            },
        ),
    ]
}
