//! Aggregation of layer records into per-pipeline-stage statistics.

use tracing::debug;

use crate::error::CompileError;
use crate::profile::{CommGroup, LayerRecord, ModelSegments, OpBytes};

/// Aggregate statistics for one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageStats {
    pub fw_compute_ms: f64,
    pub bw_compute_ms: f64,
    /// Tensor-parallel collective bytes during forward, per op tag.
    pub tp_fw: OpBytes,
    /// Tensor-parallel collective bytes during backward, per op tag.
    pub tp_bw: OpBytes,
    /// Data-parallel gradient-reduction bytes, per op tag.
    pub dp_bw: OpBytes,
    /// Activation bytes handed to the next stage.
    pub pp_bytes: u64,
}

impl StageStats {
    /// Folds one record's compute time and collective bytes into this stage.
    ///
    /// Pipeline-classified records are skipped here: their byte counts size
    /// the stage hand-off, which the chunk loop tracks separately, and they
    /// never feed the collective maps.
    fn accumulate(&mut self, record: &LayerRecord) {
        self.fw_compute_ms += record.fw_ms;
        self.bw_compute_ms += record.bw_ms;
        match record.group {
            Some(CommGroup::Pp) => {}
            Some(CommGroup::Dp) => {
                self.dp_bw.merge(&record.fw_comm);
                self.dp_bw.merge(&record.bw_comm);
            }
            Some(CommGroup::Tp) | None => {
                self.tp_fw.merge(&record.fw_comm);
                self.tp_bw.merge(&record.bw_comm);
            }
        }
    }
}

/// Partitions the replicated layer list into `pp_degree` equal contiguous
/// chunks and sums each chunk's statistics. Prologue stats fold into stage 0
/// and epilogue stats into the last stage; folding never touches the
/// hand-off size.
///
/// A chunk's hand-off size is the largest explicitly pipeline-classified
/// record in it, or, when none was recorded, the last record's output
/// activation size.
pub fn build_stage_stats(
    segments: &ModelSegments,
    pp_degree: usize,
    bytes_per_element: u64,
) -> Result<Vec<StageStats>, CompileError> {
    if pp_degree < 1 {
        return Err(CompileError::DegreeTooSmall { name: "pp" });
    }
    let layers = &segments.layers;
    if layers.len() % pp_degree != 0 {
        return Err(CompileError::LayersNotDivisible {
            layers: layers.len(),
            pp: pp_degree,
        });
    }
    let per_stage = layers.len() / pp_degree;

    let mut stage_stats = Vec::with_capacity(pp_degree);
    for stage in 0..pp_degree {
        let chunk = &layers[stage * per_stage..(stage + 1) * per_stage];
        let mut stats = StageStats::default();
        let mut explicit_pp: Option<u64> = None;
        for record in chunk {
            stats.accumulate(record);
            if record.group == Some(CommGroup::Pp) {
                let crossing = record.comm_total();
                if crossing > 0 {
                    explicit_pp = Some(explicit_pp.map_or(crossing, |max| max.max(crossing)));
                }
            }
        }
        stats.pp_bytes = explicit_pp.unwrap_or_else(|| {
            chunk
                .last()
                .and_then(|record| record.output_elems)
                .map_or(0, |elems| elems * bytes_per_element)
        });

        if stage == 0 {
            for record in &segments.prologue {
                stats.accumulate(record);
            }
        }
        if stage == pp_degree - 1 {
            for record in &segments.epilogue {
                stats.accumulate(record);
            }
        }
        stage_stats.push(stats);
    }

    debug!(
        stages = stage_stats.len(),
        layers = layers.len(),
        "aggregated stage statistics"
    );
    Ok(stage_stats)
}
