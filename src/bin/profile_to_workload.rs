use clap::Parser;
use std::fs;
use std::path::PathBuf;

use workload_gen_rs::error::CompileError;
use workload_gen_rs::profile::ProfileSpec;
use workload_gen_rs::workload::{
    FlatOptions, RoutingMode, TopologyKind, TopologyOpts, TransportProtocol, convert_flat,
};

#[derive(Debug, Parser)]
#[command(
    name = "profile-to-workload",
    about = "Convert a layer profile into a flat single-stream workload.json"
)]
struct Args {
    /// Path to the profile JSON (rows plus optional model metadata)
    #[arg(long)]
    profile: PathBuf,

    /// Output workload.json path
    #[arg(long, default_value = "workload.json")]
    out: PathBuf,

    /// Source tag recorded in meta
    #[arg(long)]
    source: Option<String>,

    /// Model name (overrides the profile's; drives layer replication anchors)
    #[arg(long)]
    model: Option<String>,

    /// Target transformer layer count after replication
    #[arg(long)]
    num_layers: Option<usize>,

    /// GPU model tag attached to hosts
    #[arg(long)]
    gpu: Option<String>,

    /// Number of hosts participating in every step
    #[arg(long, default_value_t = 2)]
    hosts: usize,

    /// Bytes per numeric element (2 for fp16, 4 for fp32)
    #[arg(long, default_value_t = 4)]
    bytes_per_element: u64,

    /// Topology override: dumbbell or fat_tree
    #[arg(long)]
    topology: Option<String>,

    /// Fat-tree k (even); required when the host count is not an exact k^3/4
    /// for an even k
    #[arg(long)]
    fat_tree_k: Option<u64>,

    /// Fat-tree link bandwidth in Gbps
    #[arg(long, default_value_t = 100)]
    link_gbps: u64,

    /// Link latency in microseconds
    #[arg(long, default_value_t = 2)]
    link_latency_us: u64,

    /// Dumbbell host link bandwidth in Gbps
    #[arg(long, default_value_t = 100)]
    host_link_gbps: u64,

    /// Dumbbell bottleneck bandwidth in Gbps
    #[arg(long, default_value_t = 10)]
    bottleneck_gbps: u64,

    /// Default transport protocol: tcp or dctcp
    #[arg(long, default_value = "tcp")]
    protocol: String,

    /// Default routing: per_flow or per_packet
    #[arg(long, default_value = "per_flow")]
    routing: String,
}

fn run(args: Args) -> Result<(), CompileError> {
    let raw = fs::read_to_string(&args.profile).expect("read profile");
    let profile: ProfileSpec = serde_json::from_str(&raw).expect("parse profile");

    let opts = FlatOptions {
        source: args.source,
        model: args.model,
        gpu: args.gpu,
        num_layers: args.num_layers,
        hosts: args.hosts,
        bytes_per_element: args.bytes_per_element,
        topology: TopologyOpts {
            kind: args.topology.as_deref().and_then(TopologyKind::parse),
            k: args.fat_tree_k,
            link_gbps: args.link_gbps,
            link_latency_us: args.link_latency_us,
            host_link_gbps: args.host_link_gbps,
            bottleneck_gbps: args.bottleneck_gbps,
        },
        protocol: TransportProtocol::parse(&args.protocol).unwrap_or(TransportProtocol::Tcp),
        routing: RoutingMode::parse(&args.routing).unwrap_or(RoutingMode::PerFlow),
    };

    let workload = convert_flat(&profile, &opts)?;
    let json = serde_json::to_string_pretty(&workload).expect("serialize workload");
    fs::write(&args.out, json).expect("write workload.json");
    eprintln!("wrote workload to {}", args.out.display());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
