//! Emulated network fabric builder.
//!
//! Loads a topology graph, computes an incremental build order for its nodes
//! and edges, and realises that order on a Linux host as network namespaces
//! joined by bridge/veth pairs and VXLAN tunnels to peer hosts.

// Use mimalloc as the global allocator for tests (non-Windows only)
#[cfg(not(windows))]
#[cfg(test)]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod error;
pub mod fabric;
pub mod graph;
pub mod order;
pub mod pool;
pub mod topogen;

// Test helpers module - available when test-internals feature is enabled
#[cfg(any(test, feature = "test-internals"))]
pub mod test_helpers;

#[cfg(test)]
pub mod tests;

pub use config::{RunContext, ServerInfo, ServerList};
pub use error::{FabricError, Result};
pub use fabric::{
    FabricBuilder, LinkLog, LinkManager, NetnsNodeManager, NodeManager, NtlBrLinkManager,
    SetupReport, SyncBarrier, TeardownPhase, TeardownReport,
};
pub use graph::{DanglingEdge, Edge, Graph, NodeId, Remote};
pub use order::{BestPlanSelection, BuildPlan, OrderingAlgorithm, PlanOptions};
pub use pool::TaskPool;
