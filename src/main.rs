//! Command-line entry point: build a configuration from flags, run one
//! simulation, emit the JSON report (summary, timeline, per-node records).

use std::fs::File;
use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dtnsim::{ConfigError, RouterKind, SimConfig, Simulator};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Discrete-event simulator for delay-tolerant networks",
    long_about = None
)]
struct Cli {
    /// Number of nodes in the network
    #[arg(long, default_value_t = 8)]
    num_nodes: usize,

    /// Simulated time horizon, seconds
    #[arg(long, default_value_t = 500.0)]
    simulation_time: f64,

    /// Bundle store capacity per node, bundles
    #[arg(long, default_value_t = 50)]
    max_buffer_size: usize,

    /// Segment size, bytes
    #[arg(long, default_value_t = 1024)]
    ltp_segment_size: u32,

    /// QoS priority levels (the CRITICAL/HIGH/NORMAL/LOW mapping is fixed)
    #[arg(long, default_value_t = 4)]
    qos_priority_levels: u32,

    /// Mean bundles per second generated at each node
    #[arg(long, default_value_t = 0.1)]
    bundle_generation_rate: f64,

    /// Smallest generated bundle, bytes
    #[arg(long, default_value_t = 512)]
    min_bundle_size: u64,

    /// Largest generated bundle, bytes
    #[arg(long, default_value_t = 4096)]
    max_bundle_size: u64,

    /// Bundle time-to-live, seconds
    #[arg(long, default_value_t = 300.0)]
    bundle_ttl: f64,

    /// Probability that a node pair gets contact windows
    #[arg(long, default_value_t = 0.6)]
    contact_probability: f64,

    /// Shortest contact window, seconds
    #[arg(long, default_value_t = 10.0)]
    min_contact_duration: f64,

    /// Longest contact window, seconds
    #[arg(long, default_value_t = 60.0)]
    max_contact_duration: f64,

    /// Baseline per-segment loss probability
    #[arg(long, default_value_t = 0.01)]
    base_error_rate: f64,

    /// Lowest contact bandwidth, bits per second
    #[arg(long, default_value_t = 65_536)]
    min_bandwidth: u64,

    /// Highest contact bandwidth, bits per second
    #[arg(long, default_value_t = 1_048_576)]
    max_bandwidth: u64,

    /// Routing policy: epidemic, spray_and_wait or predictive
    #[arg(long, default_value = "epidemic", value_parser = parse_router_kind)]
    router_kind: RouterKind,

    /// Spray-and-wait replication budget per bundle
    #[arg(long, default_value_t = 4)]
    spray_token_budget: u32,

    /// Retransmissions per segment before a session fails
    #[arg(long, default_value_t = 5)]
    max_ltp_retries: u32,

    /// Seconds between metrics snapshots
    #[arg(long, default_value_t = 100.0)]
    metrics_snapshot_interval: f64,

    /// One-way propagation delay per link, seconds
    #[arg(long, default_value_t = 0.0)]
    propagation_delay: f64,

    /// Master seed; fixed seed and configuration reproduce a run exactly
    #[arg(long, default_value_t = 45)]
    random_seed: u64,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn parse_router_kind(s: &str) -> Result<RouterKind, String> {
    s.parse().map_err(|e: ConfigError| e.to_string())
}

impl Cli {
    fn to_config(&self) -> SimConfig {
        SimConfig {
            num_nodes: self.num_nodes,
            simulation_time: self.simulation_time,
            max_buffer_size: self.max_buffer_size,
            ltp_segment_size: self.ltp_segment_size,
            qos_priority_levels: self.qos_priority_levels,
            bundle_generation_rate: self.bundle_generation_rate,
            bundle_size_range: (self.min_bundle_size, self.max_bundle_size),
            bundle_ttl: self.bundle_ttl,
            contact_probability: self.contact_probability,
            min_contact_duration: self.min_contact_duration,
            max_contact_duration: self.max_contact_duration,
            base_error_rate: self.base_error_rate,
            bandwidth_range: (self.min_bandwidth, self.max_bandwidth),
            router_kind: self.router_kind,
            spray_token_budget: self.spray_token_budget,
            max_ltp_retries: self.max_ltp_retries,
            metrics_snapshot_interval: self.metrics_snapshot_interval,
            propagation_delay: self.propagation_delay,
            random_seed: self.random_seed,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.to_config();
    let mut sim = Simulator::new(config).context("invalid configuration")?;
    let report = sim.run();

    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            serde_json::to_writer_pretty(file, &report)?;
        }
        None => {
            serde_json::to_writer_pretty(io::stdout().lock(), &report)?;
            println!();
        }
    }
    Ok(())
}
