//! External (VXLAN) links and backbone options against the real kernel.
//!
//! The "remote" host is a loopback address, so the tunnel never carries
//! traffic, but device creation, the move into the backbone and the bridge
//! wiring all run exactly as they would between two servers.

mod common;

use std::collections::BTreeSet;
use std::path::Path;

use netfab::fabric::bridge::ExternalLinkNames;
use netfab::{Edge, LinkManager, NodeManager, Remote, RunContext, ServerList};
use netns_kit::{NetNs, ip, ip_checked};

use common::Fabric;

const SERVERS: &str = r#"{
    "servers": [
        { "ipAddr": "127.0.0.1", "phyIntf": "lo" },
        { "ipAddr": "127.0.0.2", "phyIntf": "lo" }
    ]
}"#;

fn two_host_context() -> RunContext {
    let servers = ServerList::from_json(SERVERS).expect("server list");
    RunContext::new(servers, 0).expect("run context")
}

/// VNI unlikely to clash with a concurrently running test process.
fn test_vni(offset: u32) -> u32 {
    10_000 + (std::process::id() % 1_000) * 10 + offset
}

/// Removes a host-side device left behind by a failed run.
struct HostDevice(String);

impl Drop for HostDevice {
    fn drop(&mut self) {
        let _ = ip(&["link", "del", &self.0]);
    }
}

#[test]
fn test_external_link_lands_in_backbone() {
    if common::skip_without_privileges() {
        return;
    }

    let fabric = Fabric::new("nfx", two_host_context(), vec![1]);
    fabric.nodes.setup_node(1).expect("node 1");
    fabric.links.init(fabric.nodes.clone()).expect("init");

    let host = NetNs::current().expect("host netns");
    let backbone = fabric.links.setup_backbone_ns().expect("backbone");

    let names = ExternalLinkNames::new(1, 901);
    let _guard = HostDevice(names.vxlan.clone());
    let edge = Edge {
        u: 1,
        v: 901,
        remote: Some(Remote {
            server: 1,
            vni: test_vni(1),
        }),
    };
    fabric.links.setup_link(&edge, &backbone).expect("external link");
    host.enter().expect("back to host");

    let present: BTreeSet<String> = Fabric::links_in(&backbone).into_iter().collect();
    for name in [&names.vxlan, &names.bridge, &names.outer] {
        assert!(present.contains(name), "missing {name} in backbone: {present:?}");
    }
    // Moved, not copied.
    let in_host = netns_kit::link_names().expect("host links");
    assert!(!in_host.contains(&names.vxlan));

    let node1 = fabric.nodes.node_netns(1).expect("node 1 netns");
    assert!(Fabric::links_in(&node1).contains(&names.inner));

    let stats = fabric.links.stats();
    assert_eq!(stats.external, 1);
    assert_eq!(stats.vxlan_adopted, 0);
}

#[test]
fn test_leftover_vxlan_is_adopted() {
    if common::skip_without_privileges() {
        return;
    }

    let fabric = Fabric::new("nfv", two_host_context(), vec![3]);
    fabric.nodes.setup_node(3).expect("node 3");
    fabric.links.init(fabric.nodes.clone()).expect("init");

    let host = NetNs::current().expect("host netns");
    let backbone = fabric.links.setup_backbone_ns().expect("backbone");

    let vni = test_vni(2).to_string();
    let names = ExternalLinkNames::new(3, 902);
    let _guard = HostDevice(names.vxlan.clone());
    ip_checked(&[
        "link", "add", &names.vxlan, "type", "vxlan", "id", &vni, "dev", "lo", "remote",
        "127.0.0.2", "dstport", "4789",
    ])
    .expect("pre-create vxlan");

    let edge = Edge {
        u: 3,
        v: 902,
        remote: Some(Remote {
            server: 1,
            vni: test_vni(2),
        }),
    };
    fabric.links.setup_link(&edge, &backbone).expect("external link");
    host.enter().expect("back to host");

    let stats = fabric.links.stats();
    assert_eq!(stats.external, 1);
    assert_eq!(stats.vxlan_adopted, 1);

    let present = Fabric::links_in(&backbone);
    assert!(present.contains(&names.vxlan), "adopted vxlan not moved: {present:?}");
}

#[test]
fn test_backbone_ipv6_can_be_disabled() {
    if common::skip_without_privileges() {
        return;
    }
    if !Path::new("/proc/sys/net/ipv6").exists() {
        eprintln!("Skipping: kernel without IPv6");
        return;
    }

    let fabric = Fabric::new(
        "nf6",
        RunContext::standalone().with_disable_ipv6(true),
        Vec::new(),
    );
    fabric.links.init(fabric.nodes.clone()).expect("init");

    let host = NetNs::current().expect("host netns");
    let backbone = fabric.links.setup_backbone_ns().expect("backbone");
    assert!(host.is_current().expect("stat netns"));

    let value = backbone
        .run_in(&host, || {
            std::fs::read_to_string("/proc/sys/net/ipv6/conf/all/disable_ipv6")
                .map_err(anyhow::Error::from)
        })
        .expect("read sysctl");
    assert_eq!(value.trim(), "1");
}
