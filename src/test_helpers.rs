#![cfg(any(test, feature = "test-internals"))]
#![allow(dead_code)] // Allow unused helpers - not every helper is used by every test module

use std::io::Write;
use std::sync::Arc;

use netns_kit::NetNs;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::RunContext;
use crate::error::{FabricError, Result};
use crate::fabric::{LinkManager, NodeManager, SyncBarrier};
use crate::graph::{DanglingEdge, Edge, Graph, NodeId};
use crate::order::BuildPlan;

/// Nodes {0,1,2} with edges (0,1) and (1,2).
pub fn path_graph() -> Graph {
    let mut g = Graph::new();
    for n in 0..3 {
        g.add_node(n);
    }
    g.add_edge(0, 1).unwrap();
    g.add_edge(1, 2).unwrap();
    g
}

/// Two triangles joined by a bridge edge, plus dangling edges on 1 and 6.
pub fn clustered_graph() -> Graph {
    Graph::from_reader(
        "1 2 3 4 5 6\n\
         1 2\n2 3\n3 1\n\
         4 5\n5 6\n6 4\n\
         3 4\n\
         1 101_external_1_500\n\
         6 102_external_1_501\n\
         6 103_external_2_502\n"
            .as_bytes(),
    )
    .unwrap()
}

/// Reproducible random graph with occasional parallel and dangling edges.
pub fn random_graph(seed: u64, nodes: u32, p: f64) -> Graph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut g = Graph::new();
    // Sparse, non-contiguous ids.
    let ids: Vec<NodeId> = (0..nodes).map(|i| i * 3 + 1).collect();
    for &id in &ids {
        g.add_node(id);
    }
    for (i, &u) in ids.iter().enumerate() {
        for &v in &ids[i + 1..] {
            if rng.random_bool(p) {
                g.add_edge(u, v).unwrap();
                if rng.random_bool(0.05) {
                    g.add_edge(v, u).unwrap();
                }
            }
        }
        if rng.random_bool(0.2) {
            let dangling = DanglingEdge {
                external: 10_000 + u,
                server: rng.random_range(0..3),
                vni: rng.random_range(1..5000),
            };
            g.add_dangling(u, dangling).unwrap();
        }
    }
    g
}

/// Multiset key for an edge independent of orientation.
pub fn edge_key(edge: &Edge) -> (NodeId, NodeId, Option<(usize, u32)>) {
    match edge.remote {
        None => {
            let (a, b) = edge.canonical();
            (a, b, None)
        }
        Some(r) => (edge.u, edge.v, Some((r.server, r.vni))),
    }
}

fn edge_multiset<'a>(edges: impl Iterator<Item = &'a Edge>) -> FxHashMap<(NodeId, NodeId, Option<(usize, u32)>), usize> {
    let mut counts = FxHashMap::default();
    for e in edges {
        *counts.entry(edge_key(e)).or_insert(0) += 1;
    }
    counts
}

/// Check every structural property a build plan must hold for `graph`.
pub fn assert_plan_invariants(graph: &Graph, plan: &BuildPlan) {
    assert_eq!(plan.node_order.len(), graph.node_count());
    assert_eq!(plan.edge_order.len(), plan.node_order.len());
    assert_eq!(plan.cumulative_edges.len(), plan.node_order.len());

    let mut sorted = plan.node_order.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, graph.nodes(), "node order is not a permutation");

    let expected = edge_multiset(graph.internal_edges().iter().chain(&graph.dangling_edges()));
    let actual = edge_multiset(plan.edge_order.iter().flatten());
    assert_eq!(actual, expected, "batches do not cover the edge set exactly");

    let mut running = 0;
    for (batch, &cum) in plan.edge_order.iter().zip(&plan.cumulative_edges) {
        running += batch.len();
        assert_eq!(cum, running);
    }
    assert_eq!(plan.total_edges(), graph.edge_count());
}

/// Assert no internal edge is emitted before both endpoints are placed, and
/// dangling edges come exactly with their local endpoint.
pub fn assert_edges_follow_endpoints(plan: &BuildPlan) {
    let mut placed = FxHashSet::default();
    for (node, batch) in plan.node_order.iter().zip(&plan.edge_order) {
        placed.insert(*node);
        for edge in batch {
            assert_eq!(edge.u, *node, "edge {edge} emitted away from its selecting node");
            if edge.is_internal() {
                assert!(placed.contains(&edge.v), "edge {edge} emitted before {}", edge.v);
            }
        }
    }
}

/// Context for fabric tests: no servers, no settle barrier.
pub fn test_context(backbones: usize, parallel: usize) -> RunContext {
    RunContext::standalone()
        .with_backbones(backbones)
        .with_parallel(parallel)
        .with_sync(SyncBarrier::disabled())
}

/// In-memory `Write` that can be inspected after being moved into a
/// [`LinkLog`](crate::fabric::LinkLog).
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writer that always fails.
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("disk full"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Collaborator call, as seen by the recording doubles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    NodeInit,
    NodeDelete,
    SetupNode(NodeId),
    CleanNode(NodeId),
    LinkInit,
    LinkDelete,
    SetupBackbone(usize),
    EnterBackbone(usize),
    CleanBackbones,
    SetupLink { edge: Edge, backbone: usize },
    CleanLinks,
}

#[derive(Default)]
pub struct CallLog(Mutex<Vec<Call>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn links(&self) -> Vec<(Edge, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetupLink { edge, backbone } => Some((edge, backbone)),
                _ => None,
            })
            .collect()
    }
}

fn injected(what: impl std::fmt::Display) -> FabricError {
    FabricError::Collaborator(anyhow::anyhow!("injected failure: {what}"))
}

/// Node manager that tracks live nodes in memory. Every node "lives" in the
/// test thread's own namespace.
#[derive(Default)]
pub struct RecordingNodeManager {
    pub log: Arc<CallLog>,
    pub live: Mutex<FxHashSet<NodeId>>,
    pub fail_setup: Option<NodeId>,
    pub fail_clean: Option<NodeId>,
}

impl RecordingNodeManager {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }
}

impl NodeManager for RecordingNodeManager {
    fn init(&self) -> Result<()> {
        self.log.push(Call::NodeInit);
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        self.log.push(Call::NodeDelete);
        Ok(())
    }

    fn setup_node(&self, id: NodeId) -> Result<()> {
        self.log.push(Call::SetupNode(id));
        if self.fail_setup == Some(id) {
            return Err(injected(format!("setup node {id}")));
        }
        self.live.lock().insert(id);
        Ok(())
    }

    fn node_netns(&self, _id: NodeId) -> Result<NetNs> {
        NetNs::current().map_err(|e| FabricError::namespace("current netns", e))
    }

    fn clean_node(&self, id: NodeId) -> Result<()> {
        self.log.push(Call::CleanNode(id));
        if self.fail_clean == Some(id) {
            return Err(injected(format!("clean node {id}")));
        }
        self.live.lock().remove(&id);
        Ok(())
    }

    fn node_exec(&self, _id: NodeId, _argv: &[&str]) -> Result<()> {
        Ok(())
    }
}

/// Link manager that records which backbone each link was built in.
///
/// Every backbone handle points at the test thread's namespace, so entering
/// one is a no-op; backbones are told apart by handle identity.
#[derive(Default)]
pub struct RecordingLinkManager {
    pub log: Arc<CallLog>,
    pub backbones: Mutex<Vec<Arc<NetNs>>>,
    pub live_links: Mutex<usize>,
    pub fail_links: FxHashSet<(NodeId, NodeId)>,
    pub fail_clean_links: bool,
}

impl RecordingLinkManager {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    fn backbone_index(&self, ns: &NetNs) -> usize {
        self.backbones
            .lock()
            .iter()
            .position(|b| std::ptr::eq(b.as_ref(), ns))
            .unwrap_or(usize::MAX)
    }
}

impl LinkManager for RecordingLinkManager {
    fn init(&self, _nodes: Arc<dyn NodeManager>) -> Result<()> {
        self.log.push(Call::LinkInit);
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        self.log.push(Call::LinkDelete);
        Ok(())
    }

    fn setup_backbone_ns(&self) -> Result<Arc<NetNs>> {
        let ns = Arc::new(
            NetNs::current().map_err(|e| FabricError::namespace("current netns", e))?,
        );
        let mut backbones = self.backbones.lock();
        self.log.push(Call::SetupBackbone(backbones.len()));
        backbones.push(Arc::clone(&ns));
        Ok(ns)
    }

    fn enter_backbone_ns(&self, index: usize) -> Result<Arc<NetNs>> {
        self.log.push(Call::EnterBackbone(index));
        let ns = self.backbones.lock().get(index).cloned().ok_or_else(|| {
            FabricError::namespace(
                format!("backbone {index}"),
                anyhow::anyhow!("not created"),
            )
        })?;
        ns.enter()
            .map_err(|e| FabricError::namespace(format!("backbone {index}"), e))?;
        Ok(ns)
    }

    fn clean_all_backbone_ns(&self) -> Result<()> {
        self.log.push(Call::CleanBackbones);
        self.backbones.lock().clear();
        Ok(())
    }

    fn setup_link(&self, edge: &Edge, backbone: &NetNs) -> Result<()> {
        let index = self.backbone_index(backbone);
        self.log.push(Call::SetupLink {
            edge: *edge,
            backbone: index,
        });
        if self.fail_links.contains(&edge.canonical()) {
            return Err(injected(edge));
        }
        *self.live_links.lock() += 1;
        Ok(())
    }

    fn clean_all_links(&self) -> Result<()> {
        self.log.push(Call::CleanLinks);
        if self.fail_clean_links {
            return Err(injected("clean links"));
        }
        *self.live_links.lock() = 0;
        Ok(())
    }
}
