use clap::Parser;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use workload_gen_rs::error::CompileError;
use workload_gen_rs::profile::{DeviceSpec, ProfileSpec, TimeScaleMode, time_scale};
use workload_gen_rs::sched::{Mode, PipelineSchedule};
use workload_gen_rs::workload::{
    CompileOptions, RoutingMode, TopologyKind, TopologyOpts, TransportProtocol, compile,
};

#[derive(Debug, Parser)]
#[command(
    name = "workload-gen",
    about = "Compile a layer profile into a 3-D-parallel workload.json for htsim-rs"
)]
struct Args {
    /// Path to the profile JSON (rows plus optional model metadata)
    #[arg(long)]
    profile: PathBuf,

    /// Output workload.json path
    #[arg(long, default_value = "workload.json")]
    out: PathBuf,

    /// Model name (overrides the profile's; drives layer replication anchors)
    #[arg(long)]
    model: Option<String>,

    /// Target transformer layer count after replication
    #[arg(long)]
    num_layers: Option<usize>,

    /// GPU model tag attached to hosts and used for device time scaling
    #[arg(long)]
    gpu: Option<String>,

    /// Mode: train or inf
    #[arg(long, default_value = "train")]
    mode: String,

    /// Data-parallel degree
    #[arg(long, default_value_t = 1)]
    dp: usize,

    /// Tensor-parallel degree
    #[arg(long, default_value_t = 1)]
    tp: usize,

    /// Pipeline-parallel degree
    #[arg(long, default_value_t = 1)]
    pp: usize,

    /// Microbatches per pipeline iteration
    #[arg(long, default_value_t = 1)]
    pp_microbatch: usize,

    /// Pipeline discipline: 1f1b or fwd_bwd
    #[arg(long, default_value = "1f1b")]
    pipeline: String,

    /// Sequence length (recorded in meta.profile)
    #[arg(long)]
    seq: Option<u64>,

    /// Global batch size (recorded; checked against dp and pp_microbatch)
    #[arg(long)]
    batch: Option<u64>,

    /// Bytes per numeric element (2 for fp16, 4 for fp32)
    #[arg(long, default_value_t = 4)]
    bytes_per_element: u64,

    /// Append a collective_wait step when async collectives were emitted
    #[arg(long)]
    insert_wait: bool,

    /// Device time scaling: none, compute, memory, mean, or max
    #[arg(long, default_value = "max")]
    device_scale_mode: String,

    /// Device capability table JSON (name -> { SingleFLOPs, Mem_Bw })
    #[arg(long)]
    device_config: Option<PathBuf>,

    /// Expected host count; must equal dp*tp*pp
    #[arg(long)]
    hosts: Option<usize>,

    /// Topology override: dumbbell or fat_tree
    #[arg(long)]
    topology: Option<String>,

    /// Fat-tree k override (even); inference only accepts even k
    #[arg(long)]
    k: Option<u64>,

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

fn load_device_table(path: &PathBuf) -> HashMap<String, DeviceSpec> {
    let raw = fs::read_to_string(path).expect("read device config");
    serde_json::from_str(&raw).expect("parse device config")
}

fn run(args: Args) -> Result<(), CompileError> {
    let raw = fs::read_to_string(&args.profile).expect("read profile");
    let profile: ProfileSpec = serde_json::from_str(&raw).expect("parse profile");

    let mode = Mode::parse(&args.mode)?;
    let pipeline = PipelineSchedule::parse(&args.pipeline)?;
    let device_scale_mode = TimeScaleMode::parse(&args.device_scale_mode)?;

    let devices = args.device_config.as_ref().map(load_device_table);
    let device_scale = match &devices {
        Some(table) => {
            let profiled = profile.device.as_deref().and_then(|name| table.get(name));
            let target = args.gpu.as_deref().and_then(|name| table.get(name));
            time_scale(profiled, target, device_scale_mode)
        }
        None => 1.0,
    };

    let opts = CompileOptions {
        model: args.model,
        gpu: args.gpu,
        num_layers: args.num_layers,
        mode,
        dp: args.dp,
        tp: args.tp,
        pp: args.pp,
        pp_microbatch: args.pp_microbatch,
        pipeline,
        seq: args.seq,
        batch: args.batch,
        bytes_per_element: args.bytes_per_element,
        insert_wait: args.insert_wait,
        device_scale_mode,
        device_scale,
        hosts: args.hosts,
        topology: TopologyOpts {
            kind: args.topology.as_deref().and_then(TopologyKind::parse),
            k: args.k,
            link_gbps: args.link_gbps,
            link_latency_us: args.link_latency_us,
            host_link_gbps: args.host_link_gbps,
            bottleneck_gbps: args.bottleneck_gbps,
        },
        protocol: TransportProtocol::parse(&args.protocol).unwrap_or(TransportProtocol::Tcp),
        routing: RoutingMode::parse(&args.routing).unwrap_or(RoutingMode::PerFlow),
    };

    let workload = compile(&profile, &opts)?;
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
