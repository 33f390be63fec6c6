use crate::graph::Graph;
use crate::order::BuildPlan;

/// Place every node first and realise all edges with the last one.
///
/// Internal edges appear once, oriented low id to high id; every dangling
/// entry appears once.
pub fn naive_plan(graph: &Graph) -> BuildPlan {
    let nodes = graph.nodes();
    let mut plan = BuildPlan::with_capacity(nodes.len());
    let Some((&last, rest)) = nodes.split_last() else {
        return plan;
    };

    for &node in rest {
        plan.push(node, Vec::new());
    }

    let mut all = graph.internal_edges();
    all.extend(graph.dangling_edges());
    plan.push(last, all);
    plan
}
