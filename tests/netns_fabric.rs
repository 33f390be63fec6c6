//! Setup/teardown round trips against the real kernel.
//!
//! Builds small local topologies out of named namespaces, bridges and veths,
//! then tears them down and checks nothing is left behind.

mod common;

use std::sync::Arc;

use netfab::fabric::bridge::InternalLinkNames;
use netfab::order::{degree_plan, naive_plan};
use netfab::{LinkLog, NodeManager, RunContext, topogen};
use netns_kit::NetNs;

use common::Fabric;

#[test]
fn test_sequential_round_trip() {
    if common::skip_without_privileges() {
        return;
    }

    let graph = topogen::grid(3, 3).expect("grid");
    let plan = degree_plan(&graph);
    let fabric = Fabric::new("nfs", RunContext::standalone().with_backbones(2), graph.nodes());
    let builder = fabric.builder();

    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("tmp/link_log.txt");
    let log = Arc::new(LinkLog::create(&log_path).expect("open link log"));

    let report = builder.setup(&plan, &log).expect("setup");
    assert_eq!(report.links, graph.edge_count());
    // 9 nodes + 2 backbones
    assert_eq!(fabric.own_namespaces().len(), 11);

    // Both ends of an internal link exist in the node namespaces.
    let names = InternalLinkNames::new(1, 2);
    let node1 = fabric.nodes.node_netns(1).expect("node 1");
    let node2 = fabric.nodes.node_netns(2).expect("node 2");
    assert!(Fabric::links_in(&node1).contains(&names.inner_lo));
    assert!(Fabric::links_in(&node2).contains(&names.inner_hi));

    let text = std::fs::read_to_string(&log_path).expect("read link log");
    assert_eq!(text.lines().filter(|l| l.starts_with("Node ")).count(), 9);
    assert_eq!(
        text.lines().filter(|l| l.starts_with("Link no.")).count(),
        graph.edge_count()
    );

    drop((node1, node2));
    let first = builder.clean(&plan.reversed());
    assert!(first.is_clean(), "teardown errors: {:?}", first.errors);
    assert!(fabric.own_namespaces().is_empty());

    let second = builder.clean(&plan.reversed());
    assert!(second.is_clean(), "second teardown errors: {:?}", second.errors);
}

#[test]
fn test_parallel_round_trip() {
    if common::skip_without_privileges() {
        return;
    }

    let graph = topogen::random(12, 0.3, 5).expect("random graph");
    let plan = naive_plan(&graph);
    let fabric = Fabric::new(
        "nfp",
        RunContext::standalone().with_backbones(3).with_parallel(4),
        graph.nodes(),
    );
    let builder = fabric.builder();

    let host = NetNs::current().expect("host netns");
    let report = builder
        .setup(&plan, &Arc::new(LinkLog::sink()))
        .expect("parallel setup");
    assert_eq!(report.links, graph.edge_count());
    // The calling thread is back where it started.
    assert!(host.is_current().expect("stat netns"));

    let report = builder.clean(&plan.reversed());
    assert!(report.is_clean(), "teardown errors: {:?}", report.errors);
    assert!(fabric.own_namespaces().is_empty());
}
