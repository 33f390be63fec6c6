use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use netfab::config::DEFAULT_VXLAN_RETRY_LIMIT;
use netfab::{
    BestPlanSelection, BuildPlan, FabricBuilder, Graph, LinkLog, LinkManager, NetnsNodeManager,
    NodeId, NodeManager, NtlBrLinkManager, OrderingAlgorithm, PlanOptions, RunContext,
    ServerList, SyncBarrier, topogen,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator for the binary (non-Windows only)
#[cfg(not(windows))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(
    name = "netfab",
    author,
    version,
    disable_version_flag = true,
    about = "Plan and build emulated network topologies from Linux namespaces"
)]
struct Cli {
    /// Print the version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    print_version: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the fabric described by a topology file
    Setup(FabricArgs),
    /// Tear down a fabric built from the same topology and algorithm
    Clean(FabricArgs),
    /// Print the build plan without touching the host
    Plan {
        #[command(flatten)]
        plan: PlanArgs,
        /// Emit JSON instead of the text report
        #[arg(long = "json")]
        json: bool,
    },
    /// Generate a topology file
    Gen {
        /// Output file (stdout when omitted)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[command(subcommand)]
        shape: Shape,
    },
}

#[derive(Subcommand, Debug)]
enum Shape {
    /// X by Y torus
    Grid { x: u32, y: u32 },
    /// Node 1 linked to every other node
    Star { n: u32 },
    /// G(n, p) random graph
    Random {
        n: u32,
        p: f64,
        #[arg(default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Topology file
    #[arg(short = 't', long = "topology")]
    topology: PathBuf,
    /// Ordering algorithm
    #[arg(short = 'a', long = "algorithm", value_enum, default_value_t = OrderingAlgorithm::Naive)]
    algorithm: OrderingAlgorithm,
    /// Which plan best-weighted-dynamic keeps
    #[arg(long = "best-selection", value_enum, default_value_t = BestPlanSelection::Best)]
    best_selection: BestPlanSelection,
    /// Forced first node for weighted-dynamic
    #[arg(long = "start")]
    start: Option<NodeId>,
}

#[derive(Args, Debug)]
struct FabricArgs {
    #[command(flatten)]
    plan: PlanArgs,
    /// Backbone namespaces to spread links over
    #[arg(short = 'b', long = "backbones", default_value_t = 1)]
    backbones: usize,
    /// Link worker threads (0 builds links inline)
    #[arg(short = 'p', long = "parallel", default_value_t = 0)]
    parallel: usize,
    /// Server list JSON, required for topologies with external edges
    #[arg(short = 's', long = "servers")]
    servers: Option<PathBuf>,
    /// Index of this host in the server list
    #[arg(short = 'i', long = "server-id", default_value_t = 0)]
    server_id: usize,
    /// Disable IPv6 inside backbone namespaces
    #[arg(short = 'd', long = "disable-ipv6")]
    disable_ipv6: bool,
    /// Link log path (defaults to <agentWorkDir>/tmp/link_log.txt)
    #[arg(long = "link-log")]
    link_log: Option<PathBuf>,
    /// Attempts at creating each VXLAN device
    #[arg(long = "vxlan-retries", default_value_t = DEFAULT_VXLAN_RETRY_LIMIT)]
    vxlan_retries: u32,
    /// Skip the netlink settle barrier between teardown phases
    #[arg(long = "no-sync")]
    no_sync: bool,
    /// Extra work for each teardown barrier; one more probe round per 100
    #[arg(long = "sync-extra", default_value_t = 0)]
    sync_extra: usize,
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    algorithm: String,
    nodes: usize,
    edges: usize,
    edge_sum: usize,
    accumulated_depth: u64,
    #[serde(flatten)]
    plan: &'a BuildPlan,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if cli.print_version {
        println!(
            "{} ({}@{}{}) [{}]",
            env!("CARGO_PKG_VERSION"),
            env!("NETFAB_GIT_BRANCH"),
            env!("NETFAB_GIT_HASH"),
            env!("NETFAB_GIT_DIRTY"),
            env!("CARGO_PKG_NAME")
        );
        return Ok(());
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Setup(args) => run_setup(&args),
        Command::Clean(args) => run_clean(&args),
        Command::Plan { plan, json } => run_plan(&plan, json),
        Command::Gen { output, shape } => run_gen(shape, output.as_deref()),
    }
}

fn compute_plan(args: &PlanArgs) -> Result<(Graph, BuildPlan)> {
    let graph = Graph::load(&args.topology)
        .with_context(|| format!("failed to load topology {}", args.topology.display()))?;
    if let Some(start) = args.start
        && !graph.contains(start)
    {
        bail!("start node {start} is not in the topology");
    }

    let started = Instant::now();
    let opts = PlanOptions {
        best_selection: args.best_selection,
        start: args.start,
    };
    let plan = args.algorithm.plan(&graph, &opts);
    info!(
        algorithm = %args.algorithm,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        elapsed_ms = started.elapsed().as_millis(),
        "build plan computed"
    );
    Ok((graph, plan))
}

fn run_context(args: &FabricArgs) -> Result<RunContext> {
    let mut ctx = match &args.servers {
        Some(path) => {
            let servers = ServerList::load(path)
                .with_context(|| format!("failed to load server list {}", path.display()))?;
            RunContext::new(servers, args.server_id)?
        }
        None => RunContext::standalone(),
    }
    .with_parallel(args.parallel)
    .with_backbones(args.backbones)
    .with_disable_ipv6(args.disable_ipv6)
    .with_sync_extra(args.sync_extra);

    ctx.vxlan_retry_limit = args.vxlan_retries;
    if args.no_sync {
        ctx = ctx.with_sync(SyncBarrier::disabled());
    }
    if let Some(path) = &args.link_log {
        ctx = ctx.with_link_log(path);
    }
    ctx.validate()?;
    Ok(ctx)
}

fn fabric_builder(ctx: &Arc<RunContext>) -> FabricBuilder {
    let nodes: Arc<dyn NodeManager> = Arc::new(NetnsNodeManager::new());
    let links: Arc<dyn LinkManager> = Arc::new(NtlBrLinkManager::new(Arc::clone(ctx)));
    FabricBuilder::new(Arc::clone(ctx), nodes, links)
}

fn warn_unless_root() {
    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } != 0 {
        warn!("not running as root; namespace operations will likely fail");
    }
}

fn run_setup(args: &FabricArgs) -> Result<()> {
    let (_, plan) = compute_plan(&args.plan)?;
    let ctx = Arc::new(run_context(args)?);
    warn_unless_root();

    let log = Arc::new(
        LinkLog::create(&ctx.link_log)
            .with_context(|| format!("failed to open link log {}", ctx.link_log.display()))?,
    );
    let report = fabric_builder(&ctx)
        .setup(&plan, &log)
        .context("fabric setup failed")?;

    info!(
        nodes = report.nodes,
        backbones = report.backbones,
        links = report.links,
        node_ms = report.node_time.as_millis(),
        backbone_ms = report.backbone_time.as_millis(),
        link_ms = report.link_time.as_millis(),
        "fabric ready"
    );
    Ok(())
}

fn run_clean(args: &FabricArgs) -> Result<()> {
    let (_, plan) = compute_plan(&args.plan)?;
    let ctx = Arc::new(run_context(args)?);
    warn_unless_root();

    let report = fabric_builder(&ctx).clean(&plan.reversed());
    info!(
        link_ms = report.link_time.as_millis(),
        backbone_ms = report.backbone_time.as_millis(),
        node_ms = report.node_time.as_millis(),
        errors = report.errors.len(),
        "fabric cleaned"
    );
    if !report.is_clean() {
        bail!("teardown finished with {} error(s)", report.errors.len());
    }
    Ok(())
}

fn run_plan(args: &PlanArgs, json: bool) -> Result<()> {
    let (graph, plan) = compute_plan(args)?;
    let mut out = BufWriter::new(io::stdout().lock());
    if json {
        let output = PlanOutput {
            algorithm: args.algorithm.to_string(),
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            edge_sum: plan.edge_sum(),
            accumulated_depth: plan.accumulated_depth(),
            plan: &plan,
        };
        serde_json::to_writer_pretty(&mut out, &output)?;
        writeln!(out)?;
    } else {
        plan.write_report(&mut out)?;
    }
    out.flush()?;
    Ok(())
}

fn run_gen(shape: Shape, output: Option<&Path>) -> Result<()> {
    let graph = match shape {
        Shape::Grid { x, y } => topogen::grid(x, y)?,
        Shape::Star { n } => topogen::star(n)?,
        Shape::Random { n, p, seed } => topogen::random(n, p, seed)?,
    };
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            graph.write_to(&mut out)?;
            out.flush()?;
        }
        None => {
            let mut out = BufWriter::new(io::stdout().lock());
            graph.write_to(&mut out)?;
            out.flush()?;
        }
    }
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "topology generated"
    );
    Ok(())
}
