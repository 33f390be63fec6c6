//! Synthetic topology generators. Node ids start at 1.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{FabricError, Result};
use crate::graph::{Graph, NodeId};

/// `x` by `y` torus: every node links to its right and bottom neighbor,
/// wrapping around. A dimension of 1 contributes no wrap edges.
pub fn grid(x: u32, y: u32) -> Result<Graph> {
    if x == 0 || y == 0 {
        return Err(FabricError::Config(format!("grid dimensions must be positive, got {x}x{y}")));
    }
    let count = x.checked_mul(y).ok_or_else(|| {
        FabricError::Config(format!("grid {x}x{y} exceeds the node id range"))
    })?;
    let id = |row: u32, col: u32| -> NodeId { row * x + col + 1 };

    let mut graph = with_nodes(count);
    for row in 0..y {
        for col in 0..x {
            if x > 1 {
                link(&mut graph, id(row, col), id(row, (col + 1) % x))?;
            }
            if y > 1 {
                link(&mut graph, id(row, col), id((row + 1) % y, col))?;
            }
        }
    }
    Ok(graph)
}

/// Node 1 linked to every other node.
pub fn star(n: u32) -> Result<Graph> {
    if n == 0 {
        return Err(FabricError::Config("star needs at least one node".into()));
    }
    let mut graph = with_nodes(n);
    for leaf in 2..=n {
        link(&mut graph, 1, leaf)?;
    }
    Ok(graph)
}

/// Erdős–Rényi `G(n, p)`, reproducible for a given `seed`.
pub fn random(n: u32, p: f64, seed: u64) -> Result<Graph> {
    if !(0.0..=1.0).contains(&p) {
        return Err(FabricError::Config(format!("edge probability {p} not in [0, 1]")));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = with_nodes(n);
    for u in 1..=n {
        for v in (u + 1)..=n {
            if rng.random_bool(p) {
                link(&mut graph, u, v)?;
            }
        }
    }
    Ok(graph)
}

fn with_nodes(n: u32) -> Graph {
    let mut graph = Graph::new();
    for id in 1..=n {
        graph.add_node(id);
    }
    graph
}

fn link(graph: &mut Graph, u: NodeId, v: NodeId) -> Result<()> {
    graph.add_edge(u, v).map_err(FabricError::Config)
}
