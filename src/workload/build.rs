//! Assembly of complete workload artifacts from a profile.

use tracing::{debug, info};

use crate::error::CompileError;
use crate::profile::{LayerRecord, ProfileSpec, TimeScaleMode, ingest_rows, split_layers};
use crate::sched::{
    Mode, PipelineSchedule, RankTopology, build_rank_steps, build_stage_stats, round6,
};
use crate::workload::spec::{
    GpuSpec, HostSpec, ParallelMeta, ProfileMeta, RankSpec, RoutingMode, StepSpec, TopologySpec,
    TransportProtocol, WorkloadDefaults, WorkloadMeta, WorkloadSpec,
};

/// Topology selection knobs. Link parameters default to the values the
/// simulator assumes when a field is absent.
#[derive(Debug, Clone)]
pub struct TopologyOpts {
    pub kind: Option<TopologyKind>,
    pub k: Option<u64>,
    pub link_gbps: u64,
    pub link_latency_us: u64,
    pub host_link_gbps: u64,
    pub bottleneck_gbps: u64,
}

impl Default for TopologyOpts {
    fn default() -> Self {
        Self {
            kind: None,
            k: None,
            link_gbps: 100,
            link_latency_us: 2,
            host_link_gbps: 100,
            bottleneck_gbps: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyKind {
    Dumbbell,
    FatTree,
}

impl TopologyKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dumbbell" => Some(Self::Dumbbell),
            "fat_tree" => Some(Self::FatTree),
            _ => None,
        }
    }
}

/// Inverts `hosts = k^3 / 4` exactly; `None` when the host count is not a
/// valid full fat-tree population.
pub fn infer_fat_tree_k(hosts: usize) -> Option<u64> {
    if hosts == 0 {
        return None;
    }
    let k = (4.0 * hosts as f64).cbrt().round() as u64;
    if k > 0 && k % 2 == 0 && k.pow(3) == 4 * hosts as u64 {
        Some(k)
    } else {
        None
    }
}

/// Smallest even `k` whose fat-tree holds at least `hosts` hosts. Exact
/// populations keep their exact `k`.
pub fn fit_fat_tree_k(hosts: usize) -> u64 {
    if let Some(k) = infer_fat_tree_k(hosts) {
        return k;
    }
    let mut k: u64 = 2;
    while k.pow(3) / 4 < hosts as u64 {
        k += 2;
    }
    k
}

fn dumbbell(opts: &TopologyOpts) -> TopologySpec {
    TopologySpec::Dumbbell {
        host_link_gbps: opts.host_link_gbps,
        bottleneck_gbps: opts.bottleneck_gbps,
        link_latency_us: opts.link_latency_us,
    }
}

fn fat_tree(k: u64, opts: &TopologyOpts) -> TopologySpec {
    TopologySpec::FatTree {
        k,
        link_gbps: opts.link_gbps,
        link_latency_us: opts.link_latency_us,
    }
}

fn default_kind(host_count: usize) -> TopologyKind {
    if host_count == 2 {
        TopologyKind::Dumbbell
    } else {
        TopologyKind::FatTree
    }
}

/// Picks a topology that holds `host_count` hosts, sizing the fat-tree up to
/// the next even `k` when the count is not an exact population.
pub fn build_topology(host_count: usize, opts: &TopologyOpts) -> TopologySpec {
    match opts.kind.unwrap_or_else(|| default_kind(host_count)) {
        TopologyKind::Dumbbell => dumbbell(opts),
        TopologyKind::FatTree => {
            let k = opts.k.unwrap_or_else(|| fit_fat_tree_k(host_count));
            fat_tree(k, opts)
        }
    }
}

/// Like [`build_topology`], but refuses to guess: a fat-tree needs an
/// explicit `k` unless the host count inverts exactly.
pub fn build_topology_strict(
    host_count: usize,
    opts: &TopologyOpts,
) -> Result<TopologySpec, CompileError> {
    match opts.kind.unwrap_or_else(|| default_kind(host_count)) {
        TopologyKind::Dumbbell => Ok(dumbbell(opts)),
        TopologyKind::FatTree => {
            let k = opts
                .k
                .or_else(|| infer_fat_tree_k(host_count))
                .ok_or(CompileError::FatTreeK { hosts: host_count })?;
            Ok(fat_tree(k, opts))
        }
    }
}

/// One host entry per rank, mapped one-to-one onto topology slots.
pub fn build_hosts(host_count: usize, gpu: Option<&str>) -> Vec<HostSpec> {
    (0..host_count)
        .map(|id| HostSpec {
            id,
            topo_index: id,
            gpu: gpu.map(|model| GpuSpec {
                model: model.to_string(),
            }),
        })
        .collect()
}

/// Coalesces the record sequence into the flat single-stream trace: compute
/// time accumulates until a record with communication bytes flushes a step,
/// and a trailing `compute_tail` step flushes any remainder.
pub fn build_flat_steps(records: &[LayerRecord], hosts: &[usize]) -> Vec<StepSpec> {
    let mut steps = Vec::new();
    let mut compute_ms = 0.0_f64;
    for record in records {
        let comm_bytes = record.comm_total();
        if comm_bytes > 0 {
            steps.push(StepSpec {
                id: steps.len() as u64,
                label: (!record.name.is_empty()).then(|| record.name.clone()),
                hosts: hosts.to_vec(),
                compute_ms: round6(compute_ms),
                comm_bytes,
            });
            compute_ms = 0.0;
            continue;
        }
        compute_ms += record.fw_ms + record.bw_ms;
    }
    if compute_ms > 0.0 {
        steps.push(StepSpec {
            id: steps.len() as u64,
            label: Some("compute_tail".to_string()),
            hosts: hosts.to_vec(),
            compute_ms: round6(compute_ms),
            comm_bytes: 0,
        });
    }
    steps
}

/// Everything the 3-D-parallel compile needs besides the profile itself.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub model: Option<String>,
    pub gpu: Option<String>,
    pub num_layers: Option<usize>,
    pub mode: Mode,
    pub dp: usize,
    pub tp: usize,
    pub pp: usize,
    pub pp_microbatch: usize,
    pub pipeline: PipelineSchedule,
    pub seq: Option<u64>,
    pub batch: Option<u64>,
    pub bytes_per_element: u64,
    pub insert_wait: bool,
    pub device_scale_mode: TimeScaleMode,
    pub device_scale: f64,
    /// Expected host count; compilation fails if it disagrees with
    /// `dp * tp * pp`.
    pub hosts: Option<usize>,
    pub topology: TopologyOpts,
    pub protocol: TransportProtocol,
    pub routing: RoutingMode,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            model: None,
            gpu: None,
            num_layers: None,
            mode: Mode::Train,
            dp: 1,
            tp: 1,
            pp: 1,
            pp_microbatch: 1,
            pipeline: PipelineSchedule::OneFOneB,
            seq: None,
            batch: None,
            bytes_per_element: 4,
            insert_wait: false,
            device_scale_mode: TimeScaleMode::Max,
            device_scale: 1.0,
            hosts: None,
            topology: TopologyOpts::default(),
            protocol: TransportProtocol::Tcp,
            routing: RoutingMode::PerFlow,
        }
    }
}

/// Compiles a profile into the per-rank (schema 2) workload artifact.
pub fn compile(profile: &ProfileSpec, opts: &CompileOptions) -> Result<WorkloadSpec, CompileError> {
    let topo = RankTopology::new(opts.dp, opts.tp, opts.pp)?;
    if opts.pp_microbatch < 1 {
        return Err(CompileError::DegreeTooSmall {
            name: "pp_microbatch",
        });
    }

    let mut micro_batch = None;
    if let Some(batch) = opts.batch {
        if batch % opts.dp as u64 != 0 {
            return Err(CompileError::BatchNotDivisible {
                batch,
                dp: opts.dp,
            });
        }
        let per_replica = batch / opts.dp as u64;
        if per_replica % opts.pp_microbatch as u64 != 0 {
            return Err(CompileError::MicrobatchNotDivisible {
                micro_batch: per_replica,
                pp_microbatch: opts.pp_microbatch,
            });
        }
        micro_batch = Some(per_replica / opts.pp_microbatch as u64);
    }

    let host_count = topo.host_count();
    if let Some(hosts) = opts.hosts {
        if hosts != host_count {
            return Err(CompileError::HostCountMismatch {
                hosts,
                expected: host_count,
            });
        }
    }

    let records = ingest_rows(
        &profile.rows,
        opts.mode,
        opts.bytes_per_element,
        opts.device_scale,
    );
    if records.is_empty() {
        return Err(CompileError::EmptyProfile);
    }

    let model = opts.model.clone().or_else(|| profile.model.clone());
    let num_layers = opts.num_layers.or(profile.num_layers);
    let segments = split_layers(records, model.as_deref(), num_layers);
    let stage_stats = build_stage_stats(&segments, opts.pp, opts.bytes_per_element)?;

    let mut ranks = Vec::with_capacity(host_count);
    for rank_info in topo.ranks() {
        let steps = build_rank_steps(
            &rank_info,
            &stage_stats,
            &topo,
            opts.pp_microbatch,
            opts.pipeline,
            opts.mode,
            opts.insert_wait,
        );
        debug!(rank = rank_info.id, steps = steps.len(), "built rank steps");
        ranks.push(RankSpec {
            id: rank_info.id,
            steps,
        });
    }

    info!(
        hosts = host_count,
        dp = opts.dp,
        tp = opts.tp,
        pp = opts.pp,
        microbatches = opts.pp_microbatch,
        pipeline = opts.pipeline.as_str(),
        "compiled rank workload"
    );

    Ok(WorkloadSpec {
        schema_version: 2,
        meta: Some(WorkloadMeta {
            source: Some("workload_gen".to_string()),
            model,
            num_layers: num_layers.map(|n| n as u32),
            device: opts.gpu.clone(),
            profile: Some(ProfileMeta {
                mode: opts.mode.as_str().to_string(),
                seq: opts.seq,
                batch: opts.batch,
                micro_batch,
                device_scale_mode: opts.device_scale_mode.as_str().to_string(),
                device_scale: opts.device_scale,
            }),
            parallel: Some(ParallelMeta {
                dp: opts.dp,
                tp: opts.tp,
                pp: opts.pp,
                pp_microbatch: opts.pp_microbatch,
                layout: "dp-pp-tp".to_string(),
                pipeline: opts.pipeline.as_str().to_string(),
            }),
        }),
        topology: build_topology(host_count, &opts.topology),
        defaults: WorkloadDefaults {
            protocol: opts.protocol,
            routing: opts.routing,
            bytes_per_element: opts.bytes_per_element,
        },
        hosts: build_hosts(host_count, opts.gpu.as_deref()),
        steps: Vec::new(),
        ranks,
    })
}

/// Everything the flat converter needs besides the profile itself.
#[derive(Debug, Clone)]
pub struct FlatOptions {
    pub source: Option<String>,
    pub model: Option<String>,
    pub gpu: Option<String>,
    pub num_layers: Option<usize>,
    pub hosts: usize,
    pub bytes_per_element: u64,
    pub topology: TopologyOpts,
    pub protocol: TransportProtocol,
    pub routing: RoutingMode,
}

impl Default for FlatOptions {
    fn default() -> Self {
        Self {
            source: None,
            model: None,
            gpu: None,
            num_layers: None,
            hosts: 1,
            bytes_per_element: 4,
            topology: TopologyOpts::default(),
            protocol: TransportProtocol::Tcp,
            routing: RoutingMode::PerFlow,
        }
    }
}

/// Converts a profile into the flat single-stream (schema 1) artifact.
pub fn convert_flat(
    profile: &ProfileSpec,
    opts: &FlatOptions,
) -> Result<WorkloadSpec, CompileError> {
    if opts.hosts < 1 {
        return Err(CompileError::DegreeTooSmall { name: "hosts" });
    }
    let records = ingest_rows(&profile.rows, Mode::Train, opts.bytes_per_element, 1.0);

    let model = opts.model.clone().or_else(|| profile.model.clone());
    let num_layers = opts.num_layers.or(profile.num_layers);
    let rows = split_layers(records, model.as_deref(), num_layers).into_rows();

    let host_ids: Vec<usize> = (0..opts.hosts).collect();
    let steps = build_flat_steps(&rows, &host_ids);
    info!(hosts = opts.hosts, steps = steps.len(), "converted flat workload");

    Ok(WorkloadSpec {
        schema_version: 1,
        meta: Some(WorkloadMeta {
            source: opts.source.clone(),
            model,
            num_layers: num_layers.map(|n| n as u32),
            device: opts.gpu.clone(),
            profile: None,
            parallel: None,
        }),
        topology: build_topology_strict(opts.hosts, &opts.topology)?,
        defaults: WorkloadDefaults {
            protocol: opts.protocol,
            routing: opts.routing,
            bytes_per_element: opts.bytes_per_element,
        },
        hosts: build_hosts(opts.hosts, opts.gpu.as_deref()),
        steps,
        ranks: Vec::new(),
    })
}
