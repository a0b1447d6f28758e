//! Profile ingestion: op classification, group inference, layer replication,
//! and device time scaling.

mod device;
mod group;
mod layers;
mod ops;
mod record;

pub use device::{DeviceSpec, TimeScaleMode, time_scale};
pub use group::{CommGroup, infer_comm_group, resolve_comm_group};
pub use layers::{
    AnchorBoundaryDetector, LayerBoundaryDetector, ModelFamily, ModelSegments, split_layers,
    split_layers_with,
};
pub use ops::{CommOp, OpBytes, extract_elems, is_async_op};
pub use record::{LayerRecord, ProfileRow, ProfileSpec, RawOp, ingest_rows};
