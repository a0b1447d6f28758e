//! The `workload.json` artifact schema.
//!
//! Field names and tag spellings match what the simulator parses; anything
//! emitted here replays without translation.

use serde::{Deserialize, Serialize};

/// The complete artifact. Schema 1 carries a flat per-device step list,
/// schema 2 a per-rank step list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<WorkloadMeta>,
    pub topology: TopologySpec,
    pub defaults: WorkloadDefaults,
    pub hosts: Vec<HostSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranks: Vec<RankSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_layers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelMeta>,
}

/// How the profile was taken and rescaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMeta {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub micro_batch: Option<u64>,
    pub device_scale_mode: String,
    pub device_scale: f64,
}

/// The parallel layout the ranks were generated for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelMeta {
    pub dp: usize,
    pub tp: usize,
    pub pp: usize,
    pub pp_microbatch: usize,
    pub layout: String,
    pub pipeline: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    Dumbbell {
        host_link_gbps: u64,
        bottleneck_gbps: u64,
        link_latency_us: u64,
    },
    FatTree {
        k: u64,
        link_gbps: u64,
        link_latency_us: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadDefaults {
    pub protocol: TransportProtocol,
    pub routing: RoutingMode,
    pub bytes_per_element: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportProtocol {
    Tcp,
    Dctcp,
}

impl TransportProtocol {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "dctcp" => Some(Self::Dctcp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    PerFlow,
    PerPacket,
}

impl RoutingMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "per_flow" => Some(Self::PerFlow),
            "per_packet" => Some(Self::PerPacket),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSpec {
    pub id: usize,
    pub topo_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuSpec {
    pub model: String,
}

/// One step of the flat (schema 1) single-stream trace: coalesced compute
/// followed by an optional communication burst across all hosts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepSpec {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub hosts: Vec<usize>,
    pub compute_ms: f64,
    pub comm_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankSpec {
    pub id: usize,
    pub steps: Vec<RankStep>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendRecvDirection {
    Send,
    Recv,
}

/// One step of a rank's (schema 2) trace. A closed set: consumers can match
/// exhaustively on the kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RankStep {
    Compute {
        id: u64,
        label: String,
        compute_ms: f64,
    },
    Collective {
        id: u64,
        label: String,
        op: String,
        comm_bytes: u64,
        hosts: Vec<usize>,
        comm_id: String,
    },
    Sendrecv {
        id: u64,
        label: String,
        comm_bytes: u64,
        peer: usize,
        direction: SendRecvDirection,
        comm_id: String,
    },
    CollectiveWait {
        id: u64,
        label: String,
    },
}

impl RankStep {
    pub fn id(&self) -> u64 {
        match self {
            Self::Compute { id, .. }
            | Self::Collective { id, .. }
            | Self::Sendrecv { id, .. }
            | Self::CollectiveWait { id, .. } => *id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Compute { label, .. }
            | Self::Collective { label, .. }
            | Self::Sendrecv { label, .. }
            | Self::CollectiveWait { label, .. } => label,
        }
    }

    pub(crate) fn set_id(&mut self, new_id: u64) {
        match self {
            Self::Compute { id, .. }
            | Self::Collective { id, .. }
            | Self::Sendrecv { id, .. }
            | Self::CollectiveWait { id, .. } => *id = new_id,
        }
    }
}
