//! Locating and replicating the repeated transformer-layer region.
//!
//! Profiles usually cover a single layer instance; to materialize a
//! full-depth model the region between two family-specific anchor names is
//! repeated. Matching is heuristic and name-coupled: anything unrecognized
//! falls back to the input unmodified.

use tracing::debug;

use crate::profile::record::LayerRecord;

/// Recognized model families with known layer anchor names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Bert,
    Gpt,
    Opt,
}

impl ModelFamily {
    /// Substring detection on the lowercased model name. Order matters: the
    /// first match wins.
    pub fn detect(model_name: &str) -> Option<Self> {
        let name = model_name.to_ascii_lowercase();
        if name.contains("bert") {
            Some(Self::Bert)
        } else if name.contains("gpt") {
            Some(Self::Gpt)
        } else if name.contains("opt") {
            Some(Self::Opt)
        } else {
            None
        }
    }

    /// Anchor candidates: start names tried in order, then end names.
    fn anchors(self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            Self::Bert => (
                &["bert_encoder_layer_0_attention_self_query"],
                &["bert_encoder_layer_0_output_layer_norm"],
            ),
            Self::Gpt => (
                &["transformer_h_0_ln_1_grad", "transformer_h_0_ln_1"],
                &["add_15"],
            ),
            Self::Opt => (
                &["model_decoder_layers_0_self_attn_layer_norm"],
                &["view_11"],
            ),
        }
    }
}

/// Strategy seam for locating one layer instance inside the record list.
/// Returns inclusive (start, end) indices, or `None` to skip replication.
pub trait LayerBoundaryDetector {
    fn locate(&self, records: &[LayerRecord]) -> Option<(usize, usize)>;
}

/// Exact-name anchor matching for the recognized families.
pub struct AnchorBoundaryDetector {
    family: ModelFamily,
}

impl AnchorBoundaryDetector {
    pub fn new(family: ModelFamily) -> Self {
        Self { family }
    }
}

impl LayerBoundaryDetector for AnchorBoundaryDetector {
    fn locate(&self, records: &[LayerRecord]) -> Option<(usize, usize)> {
        let (start_names, end_names) = self.family.anchors();
        let find = |names: &[&str]| {
            names
                .iter()
                .find_map(|target| records.iter().position(|rec| rec.name == *target))
        };
        let start = find(start_names)?;
        let end = find(end_names)?;
        if end < start {
            return None;
        }
        Some((start, end))
    }
}

/// Record list split into prologue, repeated layer region, and epilogue.
/// The fallback (no replication) keeps everything in `layers`.
#[derive(Debug, Clone, Default)]
pub struct ModelSegments {
    pub prologue: Vec<LayerRecord>,
    pub layers: Vec<LayerRecord>,
    pub epilogue: Vec<LayerRecord>,
}

impl ModelSegments {
    fn unsplit(records: Vec<LayerRecord>) -> Self {
        Self {
            prologue: Vec::new(),
            layers: records,
            epilogue: Vec::new(),
        }
    }

    /// Flattens back into one ordered record list.
    pub fn into_rows(self) -> Vec<LayerRecord> {
        let mut rows = self.prologue;
        rows.extend(self.layers);
        rows.extend(self.epilogue);
        rows
    }

    pub fn len(&self) -> usize {
        self.prologue.len() + self.layers.len() + self.epilogue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits the records around one located layer instance and repeats it
/// `num_layers` times.
///
/// Falls back to the unmodified input when `num_layers <= 1`, when the model
/// is a switch/mixture-of-experts variant, when the family is unrecognized,
/// or when the detector finds no anchors.
pub fn split_layers(
    records: Vec<LayerRecord>,
    model_name: Option<&str>,
    num_layers: Option<usize>,
) -> ModelSegments {
    let n = num_layers.unwrap_or(0);
    if n <= 1 {
        return ModelSegments::unsplit(records);
    }
    let Some(model_name) = model_name else {
        return ModelSegments::unsplit(records);
    };
    if model_name.to_ascii_lowercase().contains("switch") {
        return ModelSegments::unsplit(records);
    }
    let Some(family) = ModelFamily::detect(model_name) else {
        debug!(model = %model_name, "unrecognized model family, skipping layer replication");
        return ModelSegments::unsplit(records);
    };
    split_layers_with(records, &AnchorBoundaryDetector::new(family), n)
}

/// Same as [`split_layers`] but with a caller-supplied boundary detector, so
/// new families plug in without touching aggregation or scheduling.
pub fn split_layers_with(
    records: Vec<LayerRecord>,
    detector: &dyn LayerBoundaryDetector,
    num_layers: usize,
) -> ModelSegments {
    if num_layers <= 1 {
        return ModelSegments::unsplit(records);
    }
    let Some((start, end)) = detector.locate(&records) else {
        debug!("layer anchors not found, skipping layer replication");
        return ModelSegments::unsplit(records);
    };

    let mut records = records;
    let epilogue = records.split_off(end + 1);
    let template = records.split_off(start);
    let prologue = records;

    let mut layers = Vec::with_capacity(template.len() * num_layers);
    for _ in 0..num_layers {
        layers.extend(template.iter().cloned());
    }

    ModelSegments {
        prologue,
        layers,
        epilogue,
    }
}
