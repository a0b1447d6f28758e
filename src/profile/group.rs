//! Communication-group classification for layer records.

use crate::profile::ops::CommOp;

/// Megatron-style pipeline send/recv markers in layer names.
const PP_MARKERS: [&str; 4] = [
    "send_forward",
    "recv_forward",
    "send_backward",
    "recv_backward",
];

/// Tensor-model-parallel region markers in layer names.
const TP_MARKERS: [&str; 5] = [
    "reduce_from_tensor_model_parallel_region",
    "gather_from_tensor_model_parallel_region",
    "scatter_to_tensor_model_parallel_region",
    "reduce_scatter_to_tensor_model_parallel_region",
    "reduce_scatter_to_sequence_parallel_region",
];

/// The communication group a record's traffic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommGroup {
    Tp,
    Dp,
    Pp,
}

impl CommGroup {
    /// Parses an explicit group tag. Unrecognized tags return `None` so the
    /// caller falls back to name-based inference.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tp" => Some(Self::Tp),
            "dp" => Some(Self::Dp),
            "pp" => Some(Self::Pp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tp => "tp",
            Self::Dp => "dp",
            Self::Pp => "pp",
        }
    }
}

/// Infers the communication group from a record's name and its op tags.
///
/// Priority order: pipeline send/recv beats gradient all-reduce beats
/// tensor-parallel region markers. Anything else stays unknown and is later
/// treated as tensor-parallel traffic by the stage aggregator.
pub fn infer_comm_group(name: &str, ops: &[CommOp]) -> Option<CommGroup> {
    let name = name.to_ascii_lowercase();
    if ops.contains(&CommOp::Sendrecv) || PP_MARKERS.iter().any(|marker| name.contains(marker)) {
        return Some(CommGroup::Pp);
    }
    let has_allreduce = ops
        .iter()
        .any(|op| matches!(op, CommOp::Allreduce | CommOp::AllreduceAsync));
    if name.ends_with("_grad") && has_allreduce {
        return Some(CommGroup::Dp);
    }
    if TP_MARKERS.iter().any(|marker| name.contains(marker)) {
        return Some(CommGroup::Tp);
    }
    None
}

/// Resolves a record's group: an explicit tag wins, otherwise infer.
pub fn resolve_comm_group(
    explicit: Option<&str>,
    name: &str,
    ops: &[CommOp],
) -> Option<CommGroup> {
    explicit
        .and_then(CommGroup::parse)
        .or_else(|| infer_comm_group(name, ops))
}
