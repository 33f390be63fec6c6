//! Bridge-per-link manager.
//!
//! Every edge gets its own Linux bridge inside a backbone namespace. An
//! internal edge `(a, b)` with `a < b` becomes
//!
//! ```text
//!   node a ns          backbone ns                 node b ns
//!   [a-b] <--veth--> [a-b-i]--( a-b )--[a-b-j] <--veth--> [b-a]
//! ```
//!
//! An external edge from local `u` to remote `v` swaps one side for a VXLAN
//! device `u-v-v`, created in the host namespace and moved into the backbone.
//! All devices carry group [`LINK_GROUP`] so teardown is one
//! `ip link del group` per backbone.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use netns_kit::{NetNs, ip, ip_checked, link_has_kind};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::RunContext;
use crate::error::{FabricError, Result};
use crate::fabric::{LinkManager, NodeManager};
use crate::graph::{Edge, NodeId, Remote};

pub const LINK_GROUP: &str = "1";
pub const LINK_MTU: &str = "1450";
pub const VXLAN_PORT: &str = "4789";
pub const DEFAULT_BACKBONE_PREFIX: &str = "bbns";

const DISABLE_IPV6: &str = "/proc/sys/net/ipv6/conf/all/disable_ipv6";

/// Disambiguation suffixes for colliding internal links, process-wide.
static REPEAT_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Device names of one internal link.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InternalLinkNames {
    pub bridge: String,
    /// Backbone end of the veth towards the lower node.
    pub outer_lo: String,
    /// Backbone end of the veth towards the higher node.
    pub outer_hi: String,
    /// Lower node's end, inside its namespace.
    pub inner_lo: String,
    /// Higher node's end, inside its namespace.
    pub inner_hi: String,
}

impl InternalLinkNames {
    pub fn new(u: NodeId, v: NodeId) -> Self {
        let (lo, hi) = Edge::internal(u, v).canonical();
        Self {
            bridge: format!("{lo}-{hi}"),
            outer_lo: format!("{lo}-{hi}-i"),
            outer_hi: format!("{lo}-{hi}-j"),
            inner_lo: format!("{lo}-{hi}"),
            inner_hi: format!("{hi}-{lo}"),
        }
    }

    /// Same names with `.n` appended to each.
    pub fn disambiguated(&self, n: u32) -> Self {
        let tag = |name: &str| format!("{name}.{n}");
        Self {
            bridge: tag(&self.bridge),
            outer_lo: tag(&self.outer_lo),
            outer_hi: tag(&self.outer_hi),
            inner_lo: tag(&self.inner_lo),
            inner_hi: tag(&self.inner_hi),
        }
    }
}

/// Device names of one external link from local `u` to remote `v`.
///
/// Backbone-side names use the ordered pair. The node-side end is always
/// `u-v`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExternalLinkNames {
    pub vxlan: String,
    pub bridge: String,
    pub outer: String,
    pub inner: String,
}

impl ExternalLinkNames {
    pub fn new(u: NodeId, v: NodeId) -> Self {
        let (lo, hi) = Edge::internal(u, v).canonical();
        Self {
            vxlan: format!("{lo}-{hi}-v"),
            bridge: format!("{lo}-{hi}"),
            outer: format!("{lo}-{hi}-i"),
            inner: format!("{u}-{v}"),
        }
    }
}

/// Per-category counters, reported on [`LinkManager::delete`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub internal: usize,
    pub external: usize,
    /// Internal links that needed a disambiguated name.
    pub renamed: usize,
    /// VXLAN devices found already present and taken over.
    pub vxlan_adopted: usize,
    pub external_time: Duration,
}

pub struct NtlBrLinkManager {
    ctx: Arc<RunContext>,
    backbone_prefix: String,
    nodes: RwLock<Option<Arc<dyn NodeManager>>>,
    host: RwLock<Option<Arc<NetNs>>>,
    backbones: Mutex<Vec<Arc<NetNs>>>,
    stats: Mutex<LinkStats>,
}

impl NtlBrLinkManager {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self::with_backbone_prefix(ctx, DEFAULT_BACKBONE_PREFIX)
    }

    pub fn with_backbone_prefix(ctx: Arc<RunContext>, prefix: impl Into<String>) -> Self {
        Self {
            ctx,
            backbone_prefix: prefix.into(),
            nodes: RwLock::new(None),
            host: RwLock::new(None),
            backbones: Mutex::new(Vec::new()),
            stats: Mutex::new(LinkStats::default()),
        }
    }

    pub fn stats(&self) -> LinkStats {
        *self.stats.lock()
    }

    pub fn backbone_name(&self, index: usize) -> String {
        format!("{}{index}", self.backbone_prefix)
    }

    fn is_backbone_name(&self, name: &str) -> bool {
        name.strip_prefix(self.backbone_prefix.as_str())
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    }

    fn node_manager(&self) -> Result<Arc<dyn NodeManager>> {
        self.nodes
            .read()
            .clone()
            .ok_or_else(|| FabricError::Config("link manager used before init".into()))
    }

    fn host(&self) -> Result<Arc<NetNs>> {
        self.host
            .read()
            .clone()
            .ok_or_else(|| FabricError::Config("link manager used before init".into()))
    }

    fn setup_internal(&self, u: NodeId, v: NodeId, backbone: &NetNs) -> Result<()> {
        let nodes = self.node_manager()?;
        let (lo, hi) = Edge::internal(u, v).canonical();
        let ns_lo = nodes.node_netns(lo)?;
        let ns_hi = nodes.node_netns(hi)?;

        let mut names = InternalLinkNames::new(lo, hi);
        if let Err(first) = create_internal(&names, &ns_lo, &ns_hi) {
            if !is_name_collision(&first) {
                return Err(FabricError::device(&names.bridge, first));
            }
            let n = REPEAT_COUNTER.fetch_add(1, Ordering::Relaxed);
            let renamed = names.disambiguated(n);
            debug!(
                bridge = %names.bridge,
                retry = %renamed.bridge,
                error = %first,
                "internal link name taken, retrying with suffix"
            );
            create_internal(&renamed, &ns_lo, &ns_hi).map_err(|e| {
                let e = e.context(format!(
                    "retry after name collision on {}: {first:#}",
                    names.bridge
                ));
                FabricError::device(&renamed.bridge, e)
            })?;
            self.stats.lock().renamed += 1;
            names = renamed;
        }

        for (ns, inner) in [(&ns_lo, &names.inner_lo), (&ns_hi, &names.inner_hi)] {
            ns.run_in(backbone, || ip_checked(&["link", "set", inner, "up"]).map(drop))
                .map_err(|e| FabricError::device(inner, e))?;
        }

        self.stats.lock().internal += 1;
        Ok(())
    }

    fn setup_external(&self, u: NodeId, v: NodeId, remote: Remote, backbone: &NetNs) -> Result<()> {
        let started = Instant::now();
        let nodes = self.node_manager()?;
        let host = self.host()?;
        let local = self.ctx.local()?;
        let peer = self.ctx.server(remote.server)?;
        let node_ns = nodes.node_netns(u)?;
        let names = ExternalLinkNames::new(u, v);

        let vni = remote.vni.to_string();
        let peer_ip = peer.ip_addr.to_string();
        let backbone_path = backbone.fd_path();
        let adopted = host
            .run_in(backbone, || {
                let adopted = create_vxlan(
                    &names.vxlan,
                    &vni,
                    &local.phy_intf,
                    &peer_ip,
                    self.ctx.vxlan_retry_limit,
                )?;
                ip_checked(&["link", "set", &names.vxlan, "netns", &backbone_path])?;
                Ok(adopted)
            })
            .map_err(|e| FabricError::device(&names.vxlan, e))?;

        ip_checked(&[
            "link", "add", &names.bridge, "mtu", LINK_MTU, "group", LINK_GROUP, "up", "type",
            "bridge",
        ])
        .map_err(|e| FabricError::device(&names.bridge, e))?;
        add_port_veth(&names.outer, &names.bridge, &names.inner, &node_ns)
            .map_err(|e| FabricError::device(&names.outer, e))?;
        ip_checked(&[
            "link", "set", &names.vxlan, "group", LINK_GROUP, "master", &names.bridge, "up",
        ])
        .map_err(|e| FabricError::device(&names.vxlan, e))?;
        node_ns
            .run_in(backbone, || {
                ip_checked(&["link", "set", &names.inner, "up"]).map(drop)
            })
            .map_err(|e| FabricError::device(&names.inner, e))?;

        let mut stats = self.stats.lock();
        stats.external += 1;
        stats.vxlan_adopted += usize::from(adopted);
        stats.external_time += started.elapsed();
        Ok(())
    }
}

/// Bridge plus both veth pairs; inner ends are created directly inside the
/// node namespaces. On failure, devices made by this call are removed again.
fn create_internal(names: &InternalLinkNames, ns_lo: &NetNs, ns_hi: &NetNs) -> anyhow::Result<()> {
    ip_checked(&[
        "link", "add", &names.bridge, "mtu", LINK_MTU, "group", LINK_GROUP, "up", "type",
        "bridge",
    ])?;
    if let Err(e) = add_port_veth(&names.outer_lo, &names.bridge, &names.inner_lo, ns_lo) {
        discard(&[&names.bridge]);
        return Err(e);
    }
    if let Err(e) = add_port_veth(&names.outer_hi, &names.bridge, &names.inner_hi, ns_hi) {
        // Deleting a veth end takes its peer with it.
        discard(&[&names.outer_lo, &names.bridge]);
        return Err(e);
    }
    Ok(())
}

/// Delete `devices` from the calling thread's namespace, logging failures.
fn discard(devices: &[&str]) {
    for device in devices {
        if let Err(e) = ip_checked(&["link", "del", device]) {
            warn!(device = %device, error = %e, "failed to remove partially built link");
        }
    }
}

/// `ip` reported that a device name is already in use.
fn is_name_collision(err: &anyhow::Error) -> bool {
    format!("{err:#}").contains("File exists")
}

/// `ip link del` stderr that only says there was nothing to remove.
fn is_nothing_to_delete(stderr: &str) -> bool {
    ["Cannot find device", "No such device", "Cannot open network namespace"]
        .iter()
        .any(|pattern| stderr.contains(pattern))
}

fn add_port_veth(outer: &str, bridge: &str, inner: &str, node: &NetNs) -> anyhow::Result<()> {
    let node_path = node.fd_path();
    ip_checked(&[
        "link", "add", outer, "mtu", LINK_MTU, "group", LINK_GROUP, "master", bridge, "up",
        "type", "veth", "peer", "name", inner, "mtu", LINK_MTU, "netns", &node_path,
    ])?;
    Ok(())
}

/// Create the VXLAN device in the calling thread's namespace, retrying up to
/// `limit` times. After a failed attempt an existing device of kind vxlan
/// with the same name is taken over. Returns `true` when adopted.
fn create_vxlan(
    name: &str,
    vni: &str,
    phy: &str,
    remote: &str,
    limit: u32,
) -> anyhow::Result<bool> {
    let mut last = None;
    for attempt in 1..=limit {
        match ip_checked(&[
            "link", "add", name, "type", "vxlan", "id", vni, "dev", phy, "remote", remote,
            "dstport", VXLAN_PORT, "learning",
        ]) {
            Ok(_) => return Ok(false),
            Err(e) => {
                if attempt > 1 && link_has_kind(name, "vxlan") {
                    debug!(device = name, attempt, "adopting existing vxlan device");
                    return Ok(true);
                }
                debug!(device = name, attempt, error = %e, "vxlan creation failed");
                last = Some(e);
            }
        }
    }
    Err(last.unwrap_or_else(|| anyhow::anyhow!("no vxlan creation attempts made")))
}

impl LinkManager for NtlBrLinkManager {
    fn init(&self, nodes: Arc<dyn NodeManager>) -> Result<()> {
        let host = NetNs::current().map_err(|e| FabricError::namespace("open host netns", e))?;
        *self.host.write() = Some(Arc::new(host));
        *self.nodes.write() = Some(nodes);
        self.backbones.lock().clear();
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        let stats = self.stats();
        info!(
            internal = stats.internal,
            external = stats.external,
            renamed = stats.renamed,
            vxlan_adopted = stats.vxlan_adopted,
            external_ms = stats.external_time.as_millis(),
            "link manager released"
        );
        self.backbones.lock().clear();
        *self.nodes.write() = None;
        *self.host.write() = None;
        Ok(())
    }

    fn setup_backbone_ns(&self) -> Result<Arc<NetNs>> {
        let mut backbones = self.backbones.lock();
        let name = self.backbone_name(backbones.len());
        let ns = NetNs::create_named(&name).map_err(|e| FabricError::namespace(&name, e))?;

        if self.ctx.disable_ipv6 {
            let here = NetNs::current().map_err(|e| FabricError::namespace("open current netns", e))?;
            ns.run_in(&here, || {
                fs::write(DISABLE_IPV6, "1").map_err(anyhow::Error::from)
            })
            .map_err(|e| FabricError::namespace(format!("disable ipv6 in {name}"), e))?;
        }

        debug!(ns = %name, "backbone namespace created");
        let ns = Arc::new(ns);
        backbones.push(Arc::clone(&ns));
        Ok(ns)
    }

    fn enter_backbone_ns(&self, index: usize) -> Result<Arc<NetNs>> {
        let ns = self.backbones.lock().get(index).cloned().ok_or_else(|| {
            FabricError::namespace(
                self.backbone_name(index),
                anyhow::anyhow!("backbone namespace was not created"),
            )
        })?;
        ns.enter()
            .map_err(|e| FabricError::namespace(self.backbone_name(index), e))?;
        Ok(ns)
    }

    fn clean_all_backbone_ns(&self) -> Result<()> {
        self.backbones.lock().clear();
        let names = NetNs::list_named().map_err(|e| FabricError::namespace("list netns", e))?;
        let mut first_err = None;
        for name in names.iter().filter(|n| self.is_backbone_name(n)) {
            if let Err(e) = NetNs::delete_named(name) {
                warn!(ns = %name, error = %e, "failed to delete backbone namespace");
                first_err.get_or_insert(FabricError::namespace(name, e));
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn setup_link(&self, edge: &Edge, backbone: &NetNs) -> Result<()> {
        backbone
            .enter()
            .map_err(|e| FabricError::namespace("enter backbone netns", e))?;
        match edge.remote {
            None => self.setup_internal(edge.u, edge.v, backbone),
            Some(remote) => self.setup_external(edge.u, edge.v, remote, backbone),
        }
    }

    fn clean_all_links(&self) -> Result<()> {
        let names = NetNs::list_named().map_err(|e| FabricError::namespace("list netns", e))?;
        let mut first_err = None;
        for name in names.iter().filter(|n| self.is_backbone_name(n)) {
            let outcome = ip(&["-n", name, "link", "del", "group", LINK_GROUP]).and_then(|out| {
                let stderr = String::from_utf8_lossy(&out.stderr);
                if out.status.success() || is_nothing_to_delete(&stderr) {
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("{}: {}", out.status, stderr.trim()))
                }
            });
            match outcome {
                Ok(()) => debug!(ns = %name, "group-tagged links deleted"),
                Err(e) => {
                    warn!(ns = %name, error = %e, "failed to delete group-tagged links");
                    first_err.get_or_insert(FabricError::namespace(
                        format!("delete link group {LINK_GROUP} in {name}"),
                        e,
                    ));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_names_are_canonical() {
        let names = InternalLinkNames::new(7, 3);
        assert_eq!(names, InternalLinkNames::new(3, 7));
        assert_eq!(names.bridge, "3-7");
        assert_eq!(names.outer_lo, "3-7-i");
        assert_eq!(names.outer_hi, "3-7-j");
        assert_eq!(names.inner_lo, "3-7");
        assert_eq!(names.inner_hi, "7-3");
    }

    #[test]
    fn test_disambiguated_names_differ_only_by_suffix() {
        let base = InternalLinkNames::new(1, 2);
        let renamed = base.disambiguated(4);
        for (a, b) in [
            (&base.bridge, &renamed.bridge),
            (&base.outer_lo, &renamed.outer_lo),
            (&base.outer_hi, &renamed.outer_hi),
            (&base.inner_lo, &renamed.inner_lo),
            (&base.inner_hi, &renamed.inner_hi),
        ] {
            assert_ne!(a, b);
            assert_eq!(b.strip_suffix(".4"), Some(a.as_str()));
        }
    }

    #[test]
    fn test_external_names() {
        let names = ExternalLinkNames::new(4, 90);
        assert_eq!(names.vxlan, "4-90-v");
        assert_eq!(names.bridge, "4-90");
        assert_eq!(names.outer, "4-90-i");
        assert_eq!(names.inner, "4-90");
    }

    #[test]
    fn test_external_names_order_backbone_side_only() {
        let names = ExternalLinkNames::new(90, 4);
        assert_eq!(names.vxlan, "4-90-v");
        assert_eq!(names.bridge, "4-90");
        assert_eq!(names.outer, "4-90-i");
        assert_eq!(names.inner, "90-4");
    }

    #[test]
    fn test_only_name_collisions_trigger_a_rename() {
        let taken =
            anyhow::anyhow!("command failed: ip link add 1-2\nRTNETLINK answers: File exists");
        assert!(is_name_collision(&taken));
        let nested = taken.context("create internal link");
        assert!(is_name_collision(&nested));

        let denied = anyhow::anyhow!(
            "command failed: ip link add 1-2\nRTNETLINK answers: Operation not permitted"
        );
        assert!(!is_name_collision(&denied));
    }

    #[test]
    fn test_nothing_to_delete_stderr() {
        assert!(is_nothing_to_delete("Cannot find device \"1-2\""));
        assert!(is_nothing_to_delete(
            "Cannot open network namespace \"bbns0\": No such file or directory"
        ));
        assert!(!is_nothing_to_delete("RTNETLINK answers: Operation not permitted"));
        assert!(!is_nothing_to_delete(""));
    }

    #[test]
    fn test_backbone_name_filter() {
        let lm = NtlBrLinkManager::new(Arc::new(RunContext::standalone()));
        assert_eq!(lm.backbone_name(3), "bbns3");
        assert!(lm.is_backbone_name("bbns0"));
        assert!(lm.is_backbone_name("bbns12"));
        assert!(!lm.is_backbone_name("bbns"));
        assert!(!lm.is_backbone_name("bbnsx"));
        assert!(!lm.is_backbone_name("node3"));
    }

    #[test]
    fn test_use_before_init_is_config_error() {
        let lm = NtlBrLinkManager::new(Arc::new(RunContext::standalone()));
        assert!(matches!(lm.node_manager(), Err(FabricError::Config(_))));
        assert!(matches!(lm.enter_backbone_ns(0), Err(FabricError::Namespace { .. })));
    }
}
