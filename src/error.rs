//! Fatal errors raised while compiling a profile into a workload.

use thiserror::Error;

/// Configuration and input errors. All of these abort the compile before any
/// artifact is produced; heuristic misses (unknown model family, missing layer
/// anchors, unrecognized group tags) are not errors and fall back silently.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("{name} must be >= 1")]
    DegreeTooSmall { name: &'static str },

    #[error("num_layers must be divisible by pp")]
    LayersNotDivisible { layers: usize, pp: usize },

    #[error("batch must be divisible by dp")]
    BatchNotDivisible { batch: u64, dp: usize },

    #[error("batch/dp must be divisible by pp_microbatch")]
    MicrobatchNotDivisible { micro_batch: u64, pp_microbatch: usize },

    #[error("host count {hosts} does not match dp*tp*pp = {expected}")]
    HostCountMismatch { hosts: usize, expected: usize },

    #[error("no layers found in profile")]
    EmptyProfile,

    #[error("mode must be train or inf")]
    InvalidMode { raw: String },

    #[error("pipeline must be 1f1b or fwd_bwd")]
    InvalidPipeline { raw: String },

    #[error("device_scale_mode must be none, compute, memory, mean, or max")]
    InvalidScaleMode { raw: String },

    #[error("fat_tree requires --k (unable to infer from hosts)")]
    FatTreeK { hosts: usize },
}
