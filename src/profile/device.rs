//! Scaling profiled times from the profiling device to a target device.

use serde::Deserialize;

use crate::error::CompileError;

/// Device capability figures as stored in the device-config JSON files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceSpec {
    #[serde(rename = "SingleFLOPs", default)]
    pub single_flops: f64,
    #[serde(rename = "Mem_Bw", default)]
    pub mem_bw: f64,
}

/// How profiled times are rescaled between devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeScaleMode {
    None,
    Compute,
    Memory,
    Mean,
    Max,
}

impl TimeScaleMode {
    pub fn parse(raw: &str) -> Result<Self, CompileError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "compute" => Ok(Self::Compute),
            "memory" => Ok(Self::Memory),
            "mean" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            _ => Err(CompileError::InvalidScaleMode {
                raw: raw.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Compute => "compute",
            Self::Memory => "memory",
            Self::Mean => "mean",
            Self::Max => "max",
        }
    }
}

/// A capability ratio; missing or non-positive figures collapse to 1.0 so an
/// incomplete config never zeroes the trace.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 || numerator <= 0.0 {
        return 1.0;
    }
    numerator / denominator
}

/// Factor applied to profiled times: profiled-device capability over
/// target-device capability. Missing configs mean no scaling.
pub fn time_scale(
    profile: Option<&DeviceSpec>,
    target: Option<&DeviceSpec>,
    mode: TimeScaleMode,
) -> f64 {
    let (Some(profile), Some(target)) = (profile, target) else {
        return 1.0;
    };
    let comp_scale = ratio(profile.single_flops, target.single_flops);
    let mem_scale = ratio(profile.mem_bw, target.mem_bw);
    match mode {
        TimeScaleMode::None => 1.0,
        TimeScaleMode::Compute => comp_scale,
        TimeScaleMode::Memory => mem_scale,
        TimeScaleMode::Mean => 0.5 * (comp_scale + mem_scale),
        TimeScaleMode::Max => comp_scale.max(mem_scale),
    }
}
