//! Stage aggregation, rank topology, and pipeline schedule emission.

mod pipeline;
mod stage;
mod topology;

pub use pipeline::{Mode, PipelineSchedule, build_rank_steps};
pub(crate) use pipeline::round6;
pub use stage::{StageStats, build_stage_stats};
pub use topology::{RankInfo, RankTopology};
