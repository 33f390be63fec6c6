//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use netfab::fabric::SyncBarrier;
use netfab::{
    FabricBuilder, LinkManager, NetnsNodeManager, NodeId, NodeManager, NtlBrLinkManager,
    RunContext,
};
use netns_kit::{NetNs, check_privileges, unique_ns_name};

/// Returns `true` if tests should be skipped (prints the reason to stderr).
/// Use at the top of every test.
pub fn skip_without_privileges() -> bool {
    if check_privileges() {
        false
    } else {
        eprintln!("Skipping: needs root and a working `ip netns`");
        true
    }
}

/// Real managers under a per-test name prefix, torn down on drop.
pub struct Fabric {
    pub prefix: String,
    pub ctx: Arc<RunContext>,
    pub nodes: Arc<NetnsNodeManager>,
    pub links: Arc<NtlBrLinkManager>,
    pub node_ids: Vec<NodeId>,
}

impl Fabric {
    pub fn new(test: &str, ctx: RunContext, node_ids: Vec<NodeId>) -> Self {
        let prefix = unique_ns_name(test);
        let ctx = Arc::new(ctx.with_sync(SyncBarrier::disabled()));
        let nodes = Arc::new(NetnsNodeManager::with_prefix(format!("{prefix}n")));
        let links = Arc::new(NtlBrLinkManager::with_backbone_prefix(
            Arc::clone(&ctx),
            format!("{prefix}b"),
        ));
        Self {
            prefix,
            ctx,
            nodes,
            links,
            node_ids,
        }
    }

    pub fn builder(&self) -> FabricBuilder {
        FabricBuilder::new(
            Arc::clone(&self.ctx),
            self.nodes.clone(),
            self.links.clone(),
        )
    }

    /// Named namespaces belonging to this test.
    pub fn own_namespaces(&self) -> Vec<String> {
        NetNs::list_named()
            .unwrap_or_default()
            .into_iter()
            .filter(|n| n.starts_with(&self.prefix))
            .collect()
    }

    /// Link names inside `ns`, read from the calling thread.
    pub fn links_in(ns: &NetNs) -> Vec<String> {
        let host = NetNs::current().expect("open host netns");
        ns.run_in(&host, netns_kit::link_names)
            .expect("list links")
    }
}

impl Drop for Fabric {
    fn drop(&mut self) {
        let _ = self.links.clean_all_links();
        let _ = self.links.clean_all_backbone_ns();
        for &id in &self.node_ids {
            let _ = self.nodes.clean_node(id);
        }
    }
}
