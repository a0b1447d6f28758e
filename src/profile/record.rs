//! Profile input schema and ingestion into per-layer records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::profile::group::{CommGroup, resolve_comm_group};
use crate::profile::ops::{CommOp, OpBytes, extract_elems};
use crate::sched::Mode;

/// One raw communication primitive as recorded by the profiler:
/// an op name plus its loosely-typed argument list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOp {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// One profiled row. All fields are optional on the wire; absent timings and
/// op lists read as zero/empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRow {
    pub name: String,
    #[serde(default)]
    pub fw_ms: f64,
    #[serde(default)]
    pub bw_ms: f64,
    #[serde(default)]
    pub acc_ms: f64,
    #[serde(default)]
    pub fw_ops: Vec<RawOp>,
    #[serde(default)]
    pub bw_ops: Vec<RawOp>,
    #[serde(default)]
    pub output_shape: Option<Vec<u64>>,
    #[serde(default)]
    pub comm_group: Option<String>,
}

/// A profile file: ordered rows plus optional model metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSpec {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub num_layers: Option<usize>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub rows: Vec<ProfileRow>,
}

/// Ingested per-layer statistics, immutable once built. Times are already
/// mode-folded (optimizer/accumulation time counts as backward in training;
/// inference zeroes backward entirely) and device-scaled.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRecord {
    pub name: String,
    pub fw_ms: f64,
    pub bw_ms: f64,
    pub fw_comm: OpBytes,
    pub bw_comm: OpBytes,
    pub output_elems: Option<u64>,
    pub group: Option<CommGroup>,
}

impl LayerRecord {
    /// Builds a record from a raw row.
    ///
    /// A row that carries communication bytes contributes no compute time:
    /// its profiled latency is the communication itself, which the simulator
    /// models from the byte counts.
    pub fn from_row(row: &ProfileRow, mode: Mode, bytes_per_element: u64, time_scale: f64) -> Self {
        let mut fw_comm = OpBytes::new();
        let mut bw_comm = OpBytes::new();
        let mut tags: Vec<CommOp> = Vec::new();
        for (ops, map) in [(&row.fw_ops, &mut fw_comm), (&row.bw_ops, &mut bw_comm)] {
            for op in ops {
                let tag = CommOp::classify(&op.name).unwrap_or_else(|| {
                    debug!(op = %op.name, layer = %row.name, "unclassified comm op");
                    CommOp::Unclassified
                });
                map.add(tag, extract_elems(&op.args) * bytes_per_element);
                tags.push(tag);
            }
        }
        let group = resolve_comm_group(row.comm_group.as_deref(), &row.name, &tags);

        let is_comm = fw_comm.total() + bw_comm.total() > 0;
        let (fw_ms, bw_ms) = if is_comm {
            (0.0, 0.0)
        } else {
            let fw = row.fw_ms * time_scale;
            let bw = match mode {
                Mode::Train => (row.bw_ms + row.acc_ms) * time_scale,
                Mode::Inference => 0.0,
            };
            (fw.max(0.0), bw.max(0.0))
        };

        let output_elems = row
            .output_shape
            .as_ref()
            .filter(|dims| !dims.is_empty())
            .map(|dims| dims.iter().product());

        Self {
            name: row.name.clone(),
            fw_ms,
            bw_ms,
            fw_comm,
            bw_comm,
            output_elems,
            group,
        }
    }

    /// Total communication bytes across both directions.
    pub fn comm_total(&self) -> u64 {
        self.fw_comm.total() + self.bw_comm.total()
    }
}

/// Ingests a whole profile in row order.
pub fn ingest_rows(
    rows: &[ProfileRow],
    mode: Mode,
    bytes_per_element: u64,
    time_scale: f64,
) -> Vec<LayerRecord> {
    rows.iter()
        .map(|row| LayerRecord::from_row(row, mode, bytes_per_element, time_scale))
        .collect()
}
