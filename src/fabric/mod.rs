//! Fabric construction and teardown.
//!
//! [`FabricBuilder`] walks a [`BuildPlan`] against two collaborators: a
//! [`NodeManager`] owning each node's execution context, and a
//! [`LinkManager`] owning backbone namespaces and link devices.
//!
//! Setup places nodes in plan order, creates the backbone namespaces, then
//! realises edges batch by batch. The realised-link counter is split into
//! `ceil(E / B)`-sized slices and each slice lands in the next backbone
//! namespace, wrapping modulo `B`. With parallelism enabled the links of one
//! batch run on the [`TaskPool`] and the walk waits for the batch to drain
//! before moving on, so no backbone switch can race in-flight work.
//!
//! Teardown is bulk and best-effort: links by group tag, then backbone
//! namespaces, then nodes, with a netlink settle barrier after each phase.

pub mod bridge;
pub mod linklog;
pub mod node;
pub mod sync;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use netns_kit::NetNs;
use tracing::{debug, info, warn};

use crate::config::RunContext;
use crate::error::{FabricError, Result};
use crate::graph::{Edge, NodeId};
use crate::order::BuildPlan;
use crate::pool::TaskPool;

pub use bridge::NtlBrLinkManager;
pub use linklog::LinkLog;
pub use node::NetnsNodeManager;
pub use sync::SyncBarrier;

/// Owner of per-node execution contexts.
pub trait NodeManager: Send + Sync {
    fn init(&self) -> Result<()>;
    fn delete(&self) -> Result<()>;
    /// Materialise the execution context of node `id`.
    fn setup_node(&self, id: NodeId) -> Result<()>;
    /// Network namespace of node `id`.
    fn node_netns(&self, id: NodeId) -> Result<NetNs>;
    /// Destroy node `id`. Succeeds when there is nothing left to destroy.
    fn clean_node(&self, id: NodeId) -> Result<()>;
    fn node_exec(&self, id: NodeId, argv: &[&str]) -> Result<()>;
}

/// Owner of backbone namespaces and link devices.
pub trait LinkManager: Send + Sync {
    fn init(&self, nodes: Arc<dyn NodeManager>) -> Result<()>;
    fn delete(&self) -> Result<()>;
    /// Create the next backbone namespace.
    fn setup_backbone_ns(&self) -> Result<Arc<NetNs>>;
    /// Move the calling thread into backbone `index` and return its handle.
    fn enter_backbone_ns(&self, index: usize) -> Result<Arc<NetNs>>;
    fn clean_all_backbone_ns(&self) -> Result<()>;
    /// Build `edge` inside `backbone`. May run on any pool worker; the
    /// implementation switches the calling thread as needed.
    fn setup_link(&self, edge: &Edge, backbone: &NetNs) -> Result<()>;
    /// Delete every group-tagged link device.
    fn clean_all_links(&self) -> Result<()>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub nodes: usize,
    pub backbones: usize,
    pub links: usize,
    pub node_time: Duration,
    pub backbone_time: Duration,
    pub link_time: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownPhase {
    Init,
    Links,
    Backbones,
    Nodes,
    Sync,
    Release,
}

impl fmt::Display for TeardownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownPhase::Init => "init",
            TeardownPhase::Links => "links",
            TeardownPhase::Backbones => "backbones",
            TeardownPhase::Nodes => "nodes",
            TeardownPhase::Sync => "sync",
            TeardownPhase::Release => "release",
        };
        f.write_str(name)
    }
}

/// Outcome of a best-effort teardown. Errors are kept per phase; later
/// phases run regardless.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub link_time: Duration,
    pub backbone_time: Duration,
    pub node_time: Duration,
    pub errors: Vec<(TeardownPhase, FabricError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, phase: TeardownPhase, result: Result<()>) {
        if let Err(e) = result {
            warn!(%phase, error = %e, "teardown step failed");
            self.errors.push((phase, e));
        }
    }
}

/// Progress is reported every 1% of `total`.
fn progress_step(total: usize) -> usize {
    (total / 100).max(1)
}

pub struct FabricBuilder {
    ctx: Arc<RunContext>,
    nodes: Arc<dyn NodeManager>,
    links: Arc<dyn LinkManager>,
}

impl FabricBuilder {
    pub fn new(
        ctx: Arc<RunContext>,
        nodes: Arc<dyn NodeManager>,
        links: Arc<dyn LinkManager>,
    ) -> Self {
        Self { ctx, nodes, links }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Materialise `plan`. Aborts on the first error; nothing already built
    /// is rolled back. The calling thread ends up in the namespace it
    /// started in.
    pub fn setup(&self, plan: &BuildPlan, log: &Arc<LinkLog>) -> Result<SetupReport> {
        self.ctx.validate()?;
        let host = NetNs::current().map_err(|e| FabricError::namespace("open host netns", e))?;

        self.nodes.init()?;
        self.links.init(Arc::clone(&self.nodes))?;

        let built = self.setup_inner(plan, log);
        let restored = host
            .enter()
            .map_err(|e| FabricError::namespace("return to host netns", e));
        let links_released = self.links.delete();
        let nodes_released = self.nodes.delete();

        let report = built?;
        restored?;
        links_released?;
        nodes_released?;
        log.flush()?;
        Ok(report)
    }

    fn setup_inner(&self, plan: &BuildPlan, log: &Arc<LinkLog>) -> Result<SetupReport> {
        let mut report = SetupReport::default();
        let pool = match self.ctx.parallel {
            0 => None,
            workers => Some(TaskPool::new(workers)?),
        };

        let started = Instant::now();
        let total_nodes = plan.node_order.len();
        let step = progress_step(total_nodes);
        for (i, &node) in plan.node_order.iter().enumerate() {
            self.nodes.setup_node(node)?;
            log.node(node)?;
            if (i + 1) % step == 0 {
                info!(done = i + 1, total = total_nodes, "node setup progress");
            }
        }
        report.nodes = total_nodes;
        report.node_time = started.elapsed();
        info!(nodes = total_nodes, elapsed_ms = report.node_time.as_millis(), "nodes ready");

        let started = Instant::now();
        for _ in 0..self.ctx.backbones {
            self.links.setup_backbone_ns()?;
        }
        report.backbones = self.ctx.backbones;
        report.backbone_time = started.elapsed();
        info!(
            backbones = report.backbones,
            elapsed_ms = report.backbone_time.as_millis(),
            "backbone namespaces ready"
        );

        let started = Instant::now();
        report.links = self.setup_links(plan, log, pool.as_ref())?;
        report.link_time = started.elapsed();
        info!(links = report.links, elapsed_ms = report.link_time.as_millis(), "links ready");

        Ok(report)
    }

    fn setup_links(
        &self,
        plan: &BuildPlan,
        log: &Arc<LinkLog>,
        pool: Option<&TaskPool>,
    ) -> Result<usize> {
        let total = plan.total_edges();
        let backbones = self.ctx.backbones;
        let per_backbone = total.div_ceil(backbones).max(1);
        let step = progress_step(total);

        let mut link_no = 0usize;
        let mut slice = 0usize;
        let mut active: Option<Arc<NetNs>> = None;

        for batch in &plan.edge_order {
            for edge in batch {
                let backbone = match &active {
                    Some(ns) if link_no % per_backbone != 0 => Arc::clone(ns),
                    _ => {
                        let index = slice % backbones;
                        slice += 1;
                        debug!(backbone = index, link = link_no, "switching backbone namespace");
                        let ns = self.links.enter_backbone_ns(index)?;
                        active = Some(Arc::clone(&ns));
                        ns
                    }
                };
                // Log numbering is 0-based.
                let number = link_no;
                link_no += 1;

                match pool {
                    None => {
                        let started = Instant::now();
                        self.links.setup_link(edge, &backbone)?;
                        log.link(number, started.elapsed())?;
                    }
                    Some(pool) => {
                        let links = Arc::clone(&self.links);
                        let log = Arc::clone(log);
                        let edge = *edge;
                        pool.submit(move || {
                            let started = Instant::now();
                            links.setup_link(&edge, &backbone)?;
                            log.link(number, started.elapsed())
                        })?;
                    }
                }

                if link_no % step == 0 {
                    info!(done = link_no, total, "link setup progress");
                }
            }

            if let Some(pool) = pool
                && !batch.is_empty()
            {
                pool.wait();
                if pool.has_error() {
                    let mut errors = pool.drain_errors().into_iter();
                    let first = errors.next().unwrap_or(FabricError::PoolClosed);
                    for later in errors {
                        warn!(error = %later, "additional link failure in batch");
                    }
                    return Err(first);
                }
            }
        }

        Ok(link_no)
    }

    /// Tear down everything `plan` built. Pass the reversed plan so nodes
    /// go away in mirror order of construction.
    pub fn clean(&self, plan: &BuildPlan) -> TeardownReport {
        let mut report = TeardownReport::default();
        let host = NetNs::current().map_err(|e| FabricError::namespace("open host netns", e));

        report.record(TeardownPhase::Init, self.nodes.init());
        report.record(TeardownPhase::Init, self.links.init(Arc::clone(&self.nodes)));

        let started = Instant::now();
        report.record(TeardownPhase::Links, self.links.clean_all_links());
        report.link_time = started.elapsed();
        info!(elapsed_ms = report.link_time.as_millis(), "links cleaned");
        report.record(TeardownPhase::Sync, self.ctx.sync.run(self.ctx.sync_extra));

        let started = Instant::now();
        report.record(TeardownPhase::Backbones, self.links.clean_all_backbone_ns());
        report.backbone_time = started.elapsed();
        info!(elapsed_ms = report.backbone_time.as_millis(), "backbone namespaces cleaned");
        report.record(TeardownPhase::Sync, self.ctx.sync.run(self.ctx.sync_extra));

        let started = Instant::now();
        for &node in &plan.node_order {
            report.record(TeardownPhase::Nodes, self.nodes.clean_node(node));
        }
        report.node_time = started.elapsed();
        info!(
            nodes = plan.node_order.len(),
            elapsed_ms = report.node_time.as_millis(),
            "nodes cleaned"
        );
        report.record(TeardownPhase::Sync, self.ctx.sync.run(self.ctx.sync_extra));

        match host {
            Ok(host) => report.record(
                TeardownPhase::Release,
                host.enter()
                    .map_err(|e| FabricError::namespace("return to host netns", e)),
            ),
            Err(e) => report.record(TeardownPhase::Init, Err(e)),
        }
        report.record(TeardownPhase::Release, self.links.delete());
        report.record(TeardownPhase::Release, self.nodes.delete());
        report
    }
}
