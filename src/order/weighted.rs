use std::time::Instant;

use tracing::{debug, info};

use crate::graph::{Graph, NodeId};
use crate::order::greedy::greedy_plan;
use crate::order::{BestPlanSelection, BuildPlan};

/// Candidates explored between progress reports.
const REPORT_EVERY: usize = 100;

/// Degree-seeded dynamic ordering, optionally forced to start at `start`.
///
/// Each placed neighbor adds `max_degree + 1`, more than any static degree
/// difference, so a node's realisable-edge count always dominates and static
/// degree only breaks ties. Without `start` the highest-degree node goes
/// first.
pub fn weighted_dynamic_plan(graph: &Graph, start: Option<NodeId>) -> BuildPlan {
    let weight = graph.max_degree() as i64 + 1;
    greedy_plan(graph, |node| graph.degree(node) as i64, weight, start)
}

/// Run [`weighted_dynamic_plan`] from every start node and keep one result.
pub fn best_weighted_dynamic_plan(graph: &Graph, selection: BestPlanSelection) -> BuildPlan {
    let mut kept: Option<(u64, NodeId, BuildPlan)> = None;
    let mut window = Instant::now();

    for (i, start) in graph.nodes().into_iter().enumerate() {
        let plan = weighted_dynamic_plan(graph, Some(start));
        let score = plan.accumulated_depth();

        let replace = match (&kept, selection) {
            (None, _) | (_, BestPlanSelection::Last) => true,
            (Some((best, _, _)), BestPlanSelection::Best) => score < *best,
        };
        if replace {
            kept = Some((score, start, plan));
        }

        let explored = i + 1;
        if explored % REPORT_EVERY == 0 {
            info!(
                explored,
                elapsed_s = window.elapsed().as_secs_f64(),
                "best-plan search: {REPORT_EVERY} more candidate plans explored"
            );
            window = Instant::now();
        }
    }

    match kept {
        Some((score, start, plan)) => {
            debug!(start, score, %selection, "best-plan search finished");
            plan
        }
        None => BuildPlan::default(),
    }
}
