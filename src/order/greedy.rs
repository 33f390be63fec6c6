//! Heap-driven greedy ordering shared by the degree and dynamic variants.

use rustc_hash::FxHashSet;

use crate::graph::{Edge, Graph, NodeId};
use crate::order::BuildPlan;
use crate::order::heap::IndexedMaxHeap;

/// Repeatedly extract the highest-contribution node, emit its internal edges
/// to already selected neighbors plus all of its dangling edges, and add
/// `step` to the contribution of each still unselected neighbor (once per
/// parallel edge).
///
/// `first`, when present in the graph, is extracted before anything else.
pub(crate) fn greedy_plan(
    graph: &Graph,
    initial: impl Fn(NodeId) -> i64,
    step: i64,
    first: Option<NodeId>,
) -> BuildPlan {
    let nodes = graph.nodes();
    let mut heap = IndexedMaxHeap::with_capacity(nodes.len());
    for &node in &nodes {
        heap.push(node, initial(node));
    }
    if let Some(start) = first {
        heap.update(start, i64::MAX);
    }

    let mut selected: FxHashSet<NodeId> =
        FxHashSet::with_capacity_and_hasher(nodes.len(), Default::default());
    let mut plan = BuildPlan::with_capacity(nodes.len());

    while let Some((node, _)) = heap.pop() {
        selected.insert(node);

        let mut batch = Vec::new();
        for &neighbor in graph.neighbors(node) {
            if selected.contains(&neighbor) {
                batch.push(Edge::internal(node, neighbor));
            } else {
                heap.adjust(neighbor, step);
            }
        }
        batch.extend(graph.dangling(node).iter().map(|d| Edge::external(node, d)));

        plan.push(node, batch);
    }

    plan
}

/// Static-degree ordering: score = internal + dangling degree, decremented
/// as neighbors get placed.
pub fn degree_plan(graph: &Graph) -> BuildPlan {
    greedy_plan(graph, |node| graph.degree(node) as i64, -1, None)
}

/// Cluster-completing ordering: score = dangling count, incremented as
/// neighbors get placed.
pub fn dynamic_plan(graph: &Graph) -> BuildPlan {
    greedy_plan(graph, |node| graph.dangling(node).len() as i64, 1, None)
}
