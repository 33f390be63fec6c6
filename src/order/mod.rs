//! Build-order planning.
//!
//! Turns a [`Graph`] into a [`BuildPlan`]: the order in which nodes are
//! materialised, and for each node the batch of edges that becomes buildable
//! exactly when that node is placed.
//!
//! ## Naive
//! Every node first, then every edge in one final batch. Worst-case baseline.
//!
//! ## Degree
//! Max-heap on static degree. Selecting a node lowers each unselected
//! neighbor's score by one, spreading edge realisation evenly.
//!
//! ## Dynamic
//! Max-heap seeded with dangling-edge counts only. Selecting a node raises
//! each unselected neighbor's score by one, so nodes adjacent to already
//! built structure go next and clusters complete early.
//!
//! ## Weighted dynamic
//! Seeded with static degree; selecting a node raises each unselected
//! neighbor by `max_degree + 1`, so edges realisable now dominate and static
//! degree breaks ties. Can be forced to start from a given node.
//!
//! ## Best weighted dynamic
//! Runs weighted dynamic from every start node and keeps one plan according
//! to [`BestPlanSelection`].

mod greedy;
pub mod heap;
mod naive;
mod weighted;

use std::fmt;

use serde::Serialize;

use crate::graph::{Edge, Graph, NodeId};

pub use greedy::{degree_plan, dynamic_plan};
pub use heap::IndexedMaxHeap;
pub use naive::naive_plan;
pub use weighted::{best_weighted_dynamic_plan, weighted_dynamic_plan};

/// Node order plus aligned incremental edge batches.
///
/// `edge_order[i]` holds the edges realised when `node_order[i]` is placed,
/// and `cumulative_edges[i]` the running total after position `i`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub node_order: Vec<NodeId>,
    pub edge_order: Vec<Vec<Edge>>,
    pub cumulative_edges: Vec<usize>,
}

impl BuildPlan {
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            node_order: Vec::with_capacity(nodes),
            edge_order: Vec::with_capacity(nodes),
            cumulative_edges: Vec::with_capacity(nodes),
        }
    }

    /// Append `node` with the batch it unlocks.
    pub fn push(&mut self, node: NodeId, batch: Vec<Edge>) {
        let total = self.total_edges() + batch.len();
        self.node_order.push(node);
        self.edge_order.push(batch);
        self.cumulative_edges.push(total);
    }

    pub fn len(&self) -> usize {
        self.node_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_order.is_empty()
    }

    /// Edges realised by the whole plan.
    pub fn total_edges(&self) -> usize {
        self.cumulative_edges.last().copied().unwrap_or(0)
    }

    /// Sum of batch sizes. Equals [`total_edges`](Self::total_edges) for a
    /// well-formed plan.
    pub fn edge_sum(&self) -> usize {
        self.edge_order.iter().map(Vec::len).sum()
    }

    /// `Σ i · (cum[i] − cum[i−1])`: how deep into the node order edges are
    /// realised on aggregate. Lower means edges are front-loaded.
    pub fn accumulated_depth(&self) -> u64 {
        self.cumulative_edges
            .windows(2)
            .enumerate()
            .map(|(i, w)| (i as u64 + 1) * (w[1] - w[0]) as u64)
            .sum()
    }

    /// The same plan walked back to front, with running totals recomputed.
    /// Used to tear down in the mirror image of construction.
    pub fn reversed(&self) -> BuildPlan {
        let mut plan = BuildPlan::with_capacity(self.len());
        for (node, batch) in self.node_order.iter().zip(&self.edge_order).rev() {
            plan.push(*node, batch.clone());
        }
        plan
    }

    /// Human-readable dump: one line per position, then the statistics.
    pub fn write_report(&self, mut out: impl std::io::Write) -> std::io::Result<()> {
        for (i, (node, batch)) in self.node_order.iter().zip(&self.edge_order).enumerate() {
            let edges: Vec<String> = batch.iter().map(Edge::to_string).collect();
            writeln!(
                out,
                "{i:>6} node {node:<6} +{:<4} total {:<6} [{}]",
                batch.len(),
                self.cumulative_edges[i],
                edges.join(" ")
            )?;
        }
        writeln!(out, "accumulatedDepth = {}", self.accumulated_depth())?;
        writeln!(out, "edgeSum = {}", self.edge_sum())
    }

    /// `(position, edge)` for every edge in walk order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, &Edge)> {
        self.edge_order
            .iter()
            .enumerate()
            .flat_map(|(i, batch)| batch.iter().map(move |e| (i, e)))
    }
}

/// Which plan the best-weighted-dynamic search returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BestPlanSelection {
    /// Lowest [`BuildPlan::accumulated_depth`]; earliest start node wins ties.
    #[default]
    Best,
    /// The plan from the last start node explored, whatever its score.
    Last,
}

impl fmt::Display for BestPlanSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BestPlanSelection::Best => write!(f, "best"),
            BestPlanSelection::Last => write!(f, "last"),
        }
    }
}

impl clap::ValueEnum for BestPlanSelection {
    fn value_variants<'a>() -> &'a [Self] {
        &[BestPlanSelection::Best, BestPlanSelection::Last]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(match self {
            BestPlanSelection::Best => "best",
            BestPlanSelection::Last => "last",
        }))
    }
}

/// Planning knobs that only some algorithms read.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlanOptions {
    pub best_selection: BestPlanSelection,
    /// Forced first node for weighted dynamic.
    pub start: Option<NodeId>,
}

/// Ordering algorithm selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderingAlgorithm {
    #[default]
    Naive,
    Degree,
    Dynamic,
    WeightedDynamic,
    BestWeightedDynamic,
}

impl OrderingAlgorithm {
    /// Compute the build plan for `graph`.
    pub fn plan(self, graph: &Graph, opts: &PlanOptions) -> BuildPlan {
        match self {
            OrderingAlgorithm::Naive => naive_plan(graph),
            OrderingAlgorithm::Degree => degree_plan(graph),
            OrderingAlgorithm::Dynamic => dynamic_plan(graph),
            OrderingAlgorithm::WeightedDynamic => weighted_dynamic_plan(graph, opts.start),
            OrderingAlgorithm::BestWeightedDynamic => {
                best_weighted_dynamic_plan(graph, opts.best_selection)
            }
        }
    }

    const fn name(self) -> &'static str {
        match self {
            OrderingAlgorithm::Naive => "naive",
            OrderingAlgorithm::Degree => "degree",
            OrderingAlgorithm::Dynamic => "dynamic",
            OrderingAlgorithm::WeightedDynamic => "weighted-dynamic",
            OrderingAlgorithm::BestWeightedDynamic => "best-weighted-dynamic",
        }
    }
}

impl fmt::Display for OrderingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for OrderingAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('_', "-").as_str() {
            "naive" => Ok(OrderingAlgorithm::Naive),
            "degree" => Ok(OrderingAlgorithm::Degree),
            "dynamic" => Ok(OrderingAlgorithm::Dynamic),
            "weighted-dynamic" => Ok(OrderingAlgorithm::WeightedDynamic),
            "best-weighted-dynamic" => Ok(OrderingAlgorithm::BestWeightedDynamic),
            _ => Err(format!(
                "invalid algorithm '{s}': use naive, degree, dynamic, weighted-dynamic, or \
                 best-weighted-dynamic"
            )),
        }
    }
}

impl clap::ValueEnum for OrderingAlgorithm {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            OrderingAlgorithm::Naive,
            OrderingAlgorithm::Degree,
            OrderingAlgorithm::Dynamic,
            OrderingAlgorithm::WeightedDynamic,
            OrderingAlgorithm::BestWeightedDynamic,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        let value = clap::builder::PossibleValue::new(self.name());
        Some(match self {
            OrderingAlgorithm::WeightedDynamic => value.alias("weighted_dynamic"),
            OrderingAlgorithm::BestWeightedDynamic => value.alias("best_weighted_dynamic"),
            _ => value,
        })
    }
}
