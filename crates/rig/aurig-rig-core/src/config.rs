//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::easing::Easing;
use crate::synth::SnippetCategory;

/// Engine-wide defaults and toggles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Mix weight for mixed AUs absent from the profile's `mixWeights`.
    pub default_mix_weight: f32,
    /// Easing for transitions started without an explicit curve.
    pub default_easing: Easing,
    /// Warn once per missing bone or morph target.
    pub warn_missing: bool,

    /// Synthesis defaults.
    pub synth: SynthDefaults,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthDefaults {
    pub intensity_scale: f32,
    pub snippet_category: SnippetCategory,
    pub auto_viseme_jaw: bool,
    /// Multiplier on the per-viseme jaw table.
    pub jaw_scale: f32,
}

impl Default for SynthDefaults {
    fn default() -> Self {
        Self {
            intensity_scale: 1.0,
            snippet_category: SnippetCategory::Expression,
            auto_viseme_jaw: true,
            jaw_scale: 1.0,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_mix_weight: 1.0,
            default_easing: Easing::Linear,
            warn_missing: true,
            synth: SynthDefaults::default(),
        }
    }
}
