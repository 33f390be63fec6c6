//! In-memory topology graph and its text loader.
//!
//! File format: the first line lists whitespace-separated node ids. Every
//! following line holds exactly two tokens, either `u v` for an undirected
//! internal edge, or `u <ext>_external_<server>_<vxlan>` for a dangling edge
//! from local node `u` to node `<ext>` on remote server `<server>`, carried by
//! VXLAN id `<vxlan>`.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{FabricError, Result};

/// Topology node identifier.
pub type NodeId = u32;

/// Largest VXLAN network identifier (24 bits).
pub const MAX_VNI: u32 = (1 << 24) - 1;

const EXTERNAL_MARKER: &str = "_external";

/// Far end of an external edge: a server index and the tunnel carrying it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Remote {
    pub server: usize,
    pub vni: u32,
}

/// A cross-host edge recorded on its single local endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DanglingEdge {
    pub external: NodeId,
    pub server: usize,
    pub vni: u32,
}

/// Edge descriptor as consumed by the fabric builder.
///
/// `remote == None` is an internal edge between two local nodes; otherwise
/// `v` lives on `remote.server` and is reached over VXLAN `remote.vni`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub u: NodeId,
    pub v: NodeId,
    pub remote: Option<Remote>,
}

impl Edge {
    pub const fn internal(u: NodeId, v: NodeId) -> Self {
        Self { u, v, remote: None }
    }

    pub const fn external(u: NodeId, dangling: &DanglingEdge) -> Self {
        Self {
            u,
            v: dangling.external,
            remote: Some(Remote {
                server: dangling.server,
                vni: dangling.vni,
            }),
        }
    }

    pub const fn is_internal(&self) -> bool {
        self.remote.is_none()
    }

    /// Endpoints ordered low to high.
    pub fn canonical(&self) -> (NodeId, NodeId) {
        if self.u <= self.v {
            (self.u, self.v)
        } else {
            (self.v, self.u)
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remote {
            None => write!(f, "({},{},-1,-1)", self.u, self.v),
            Some(r) => write!(f, "({},{},{},{})", self.u, self.v, r.server, r.vni),
        }
    }
}

/// Undirected graph with dangling (cross-host) edges.
///
/// The node set is the key set of the adjacency map. Adjacency is kept
/// symmetric: `u` is listed under `v` as many times as `v` under `u`.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    adjacency: FxHashMap<NodeId, Vec<NodeId>>,
    dangling: FxHashMap<NodeId, SmallVec<[DanglingEdge; 2]>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to the node set. Adding an existing node is a no-op.
    pub fn add_node(&mut self, id: NodeId) {
        self.adjacency.entry(id).or_default();
    }

    /// Add an undirected internal edge. Both endpoints must already exist.
    /// Repeating an edge adds a parallel edge.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId) -> std::result::Result<(), String> {
        if u == v {
            return Err(format!("self-loop on node {u}"));
        }
        for n in [u, v] {
            if !self.contains(n) {
                return Err(format!("edge references undeclared node {n}"));
            }
        }
        self.adjacency.entry(u).or_default().push(v);
        self.adjacency.entry(v).or_default().push(u);
        Ok(())
    }

    /// Record a dangling edge on local node `u`, which must exist.
    pub fn add_dangling(
        &mut self,
        u: NodeId,
        edge: DanglingEdge,
    ) -> std::result::Result<(), String> {
        if !self.contains(u) {
            return Err(format!("dangling edge references undeclared node {u}"));
        }
        if edge.vni > MAX_VNI {
            return Err(format!("vxlan id {} exceeds {MAX_VNI}", edge.vni));
        }
        self.dangling.entry(u).or_default().push(edge);
        Ok(())
    }

    /// Load a topology file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse the topology text format. Blank lines are ignored.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut graph = Graph::new();
        let mut lines = reader.lines().enumerate();

        if let Some((_, first)) = lines.next() {
            for token in first?.split_whitespace() {
                let id = parse_id(token, 1, "node id")?;
                graph.add_node(id);
            }
        }

        for (idx, line) in lines {
            let lineno = idx + 1;
            let line = line?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [] => continue,
                [u, ext] if ext.contains(EXTERNAL_MARKER) => {
                    let u = parse_id(u, lineno, "node id")?;
                    let dangling = parse_dangling(ext, lineno)?;
                    graph
                        .add_dangling(u, dangling)
                        .map_err(|reason| FabricError::graph_format(lineno, reason))?;
                }
                [u, v] => {
                    let u = parse_id(u, lineno, "node id")?;
                    let v = parse_id(v, lineno, "neighbor id")?;
                    graph
                        .add_edge(u, v)
                        .map_err(|reason| FabricError::graph_format(lineno, reason))?;
                }
                _ => {
                    return Err(FabricError::graph_format(
                        lineno,
                        format!("expected 2 tokens, found {}", tokens.len()),
                    ));
                }
            }
        }

        Ok(graph)
    }

    /// Write the graph back out in the topology text format.
    pub fn write_to(&self, mut out: impl Write) -> std::io::Result<()> {
        let nodes = self.nodes();
        let ids: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
        writeln!(out, "{}", ids.join(" "))?;
        for edge in self.internal_edges() {
            writeln!(out, "{} {}", edge.u, edge.v)?;
        }
        for &u in &nodes {
            for d in self.dangling(u) {
                writeln!(out, "{u} {}{EXTERNAL_MARKER}_{}_{}", d.external, d.server, d.vni)?;
            }
        }
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.adjacency.contains_key(&id)
    }

    /// All node ids, ascending.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.adjacency.keys().copied().collect();
        nodes.sort_unstable();
        nodes
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Internal neighbors of `id`, with multiplicity. Empty for unknown ids.
    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        self.adjacency.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn dangling(&self, id: NodeId) -> &[DanglingEdge] {
        self.dangling.get(&id).map(|d| d.as_slice()).unwrap_or_default()
    }

    /// Internal neighbor count plus dangling edge count.
    pub fn degree(&self, id: NodeId) -> usize {
        self.neighbors(id).len() + self.dangling(id).len()
    }

    pub fn max_degree(&self) -> usize {
        self.adjacency
            .keys()
            .map(|&id| self.degree(id))
            .max()
            .unwrap_or(0)
    }

    /// Internal edges counted once per unordered pair (parallel edges kept).
    pub fn internal_edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum::<usize>() / 2
    }

    pub fn dangling_edge_count(&self) -> usize {
        self.dangling.values().map(|d| d.len()).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.internal_edge_count() + self.dangling_edge_count()
    }

    /// Every internal edge once, oriented low id to high id.
    pub fn internal_edges(&self) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(self.internal_edge_count());
        for u in self.nodes() {
            for &v in self.neighbors(u) {
                if u < v {
                    edges.push(Edge::internal(u, v));
                }
            }
        }
        edges
    }

    /// Every dangling entry once, as external edges.
    pub fn dangling_edges(&self) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(self.dangling_edge_count());
        for u in self.nodes() {
            edges.extend(self.dangling(u).iter().map(|d| Edge::external(u, d)));
        }
        edges
    }
}

fn parse_id(token: &str, line: usize, what: &str) -> Result<NodeId> {
    token
        .parse::<NodeId>()
        .map_err(|_| FabricError::graph_format(line, format!("invalid {what} '{token}'")))
}

/// Parse `<ext>_<junk>_<server>_<vxlan>`.
fn parse_dangling(token: &str, line: usize) -> Result<DanglingEdge> {
    let segments: Vec<&str> = token.split('_').collect();
    if segments.len() < 4 {
        return Err(FabricError::graph_format(
            line,
            format!("malformed external token '{token}'"),
        ));
    }

    let external = parse_id(segments[0], line, "external node id")?;
    let server = segments[2].parse::<usize>().map_err(|_| {
        FabricError::graph_format(line, format!("invalid server id '{}'", segments[2]))
    })?;
    let vni = segments[3].parse::<u32>().map_err(|_| {
        FabricError::graph_format(line, format!("invalid vxlan id '{}'", segments[3]))
    })?;

    Ok(DanglingEdge {
        external,
        server,
        vni,
    })
}
