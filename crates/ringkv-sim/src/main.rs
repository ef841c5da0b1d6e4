//! ringkv-sim: Runs a simulated ringkv cluster and reports quorum outcomes.
//!
//! Every node runs the real core against an in-memory network driven by
//! simulated time.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ringkv_core::CrudKind;
use ringkv_sim::{Cluster, SimConfig};
use ringkv_sim::scenario;

#[derive(Parser, Debug)]
#[command(name = "ringkv-sim")]
#[command(about = "Simulated replicated key/value cluster")]
struct Args {
    /// JSON config file (flags below override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of nodes
    #[arg(short, long)]
    nodes: Option<u32>,

    /// Minimum number of ticks to run
    #[arg(short, long)]
    ticks: Option<i64>,

    /// Seed for the network and the client workload
    #[arg(long)]
    seed: Option<u64>,

    /// Fraction of datagrams to drop
    #[arg(long)]
    drop_rate: Option<f64>,

    /// Number of keys in the client workload
    #[arg(short, long)]
    workload: Option<usize>,

    /// Tick at which a node is crashed
    #[arg(long)]
    fail_at: Option<i64>,

    /// Print every node event as a JSON line
    #[arg(long)]
    json_events: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)?,
            None => SimConfig::default(),
        };
        if let Some(nodes) = self.nodes {
            config.nodes = nodes;
        }
        if let Some(ticks) = self.ticks {
            config.ticks = ticks;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(drop_rate) = self.drop_rate {
            config.drop_rate = drop_rate;
        }
        if let Some(workload) = self.workload {
            config.workload = workload;
        }
        if self.fail_at.is_some() {
            config.fail_at = self.fail_at;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,ringkv_core=debug"
    } else {
        "info,ringkv_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json_events = args.json_events;
    let config = args.into_config().context("Invalid configuration")?;

    info!("Starting ringkv-sim");
    info!(
        nodes = config.nodes,
        ticks = config.ticks,
        seed = config.seed,
        drop_rate = config.drop_rate,
        "Cluster configuration"
    );

    let mut cluster =
        Cluster::new(config.node.clone(), config.seed).with_drop_rate(config.drop_rate);

    let _subscription = json_events.then(|| {
        cluster.events().subscribe(|event| {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
        })
    });

    cluster
        .start_nodes(config.nodes, config.join_stagger)
        .context("Failed to bootstrap cluster")?;

    let summary = scenario::run(&config, &mut cluster);

    println!();
    println!("ticks: {}  converged: {}", summary.ticks, summary.converged);
    if let Some(node) = summary.failed_node {
        println!("failed node: {node}");
    }
    println!(
        "datagrams: {} sent, {} dropped, {} delivered",
        summary.sent, summary.dropped, summary.delivered
    );
    println!("{:<8} {:>6} {:>6}", "op", "ok", "fail");
    for kind in [
        CrudKind::Create,
        CrudKind::Read,
        CrudKind::Update,
        CrudKind::Delete,
    ] {
        let counts = summary.counts(kind);
        println!("{:<8} {:>6} {:>6}", kind.to_string(), counts.ok, counts.fail);
    }

    Ok(())
}
