//! The `workload.json` artifact: schema types and assembly.

mod build;
mod spec;

pub use build::{
    CompileOptions, FlatOptions, TopologyKind, TopologyOpts, build_flat_steps, build_hosts,
    build_topology, build_topology_strict, compile, convert_flat, fit_fat_tree_k,
    infer_fat_tree_k,
};
pub use spec::{
    GpuSpec, HostSpec, ParallelMeta, ProfileMeta, RankSpec, RankStep, RoutingMode,
    SendRecvDirection, StepSpec, TopologySpec, TransportProtocol, WorkloadDefaults, WorkloadMeta,
    WorkloadSpec,
};
