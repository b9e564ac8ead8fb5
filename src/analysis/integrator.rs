//! The reducer: turns settled unit results into one ranked action plan.

use crate::graph::TaskGraph;
use crate::models::ActionItem;
use crate::state::SharedState;
use std::cmp::Reverse;
use tracing::debug;

/// Apply every `Ok` unit's rules to its payload and rank the items.
///
/// Units are visited in the graph's declaration order and the sort is
/// stable, so identical results always produce the same plan. Units that
/// failed, were skipped or never ran contribute nothing.
pub fn reduce(
    state: &SharedState,
    graph: &TaskGraph,
    max_actions: Option<usize>,
) -> Vec<ActionItem> {
    let mut items: Vec<ActionItem> = Vec::new();

    for node in graph.nodes() {
        let Some(payload) = state.result(node.id()).and_then(|s| s.payload()) else {
            continue;
        };
        let before = items.len();
        for rule in node.unit().rules() {
            items.extend(
                rule.apply(payload)
                    .into_iter()
                    .map(|template| template.into_item(node.id())),
            );
        }
        debug!(unit = %node.id(), items = items.len() - before, "rules_applied");
    }

    rank(&mut items);
    if let Some(max) = max_actions {
        items.truncate(max);
    }
    items
}

/// Stable sort by priority, then impact, both descending.
pub fn rank(items: &mut [ActionItem]) {
    items.sort_by_key(|item| (Reverse(item.priority), Reverse(item.impact)));
}
