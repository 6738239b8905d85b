//! Mapping profile: the per-character AU → morph/bone tables.
//!
//! The profile is plain configuration loaded outside the runtime. Tables keep
//! authoring order so "first listed" rules stay deterministic. The derived
//! [`ProfileIndex`] (AU → affected node axes) is built once per profile.

use hashbrown::HashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::axis::{Axis, NodeAxes};
use crate::error::ProfileError;
use crate::ids::AuId;

/// Bone channel: local rotation around an axis or translation along it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Rx,
    Ry,
    Rz,
    Tx,
    Ty,
    Tz,
}

impl Channel {
    #[inline]
    pub fn is_rotation(self) -> bool {
        matches!(self, Channel::Rx | Channel::Ry | Channel::Rz)
    }

    #[inline]
    pub fn is_translation(self) -> bool {
        !self.is_rotation()
    }

    /// Component index (x=0, y=1, z=2) shared by rotation and translation channels.
    #[inline]
    pub fn component(self) -> usize {
        match self {
            Channel::Rx | Channel::Tx => 0,
            Channel::Ry | Channel::Ty => 1,
            Channel::Rz | Channel::Tz => 2,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// Morph targets driven by one AU, grouped by side.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphBindings {
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub center: Vec<String>,
}

impl MorphBindings {
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty() && self.center.is_empty()
    }
}

fn default_scale() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoneBinding {
    pub node: String,
    pub channel: Channel,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_degrees: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_units: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeAxisDef {
    #[serde(default, rename = "drivingAUs")]
    pub driving_aus: Vec<AuId>,
    #[serde(default, rename = "negativeAU", skip_serializing_if = "Option::is_none")]
    pub negative_au: Option<AuId>,
    #[serde(default, rename = "positiveAU", skip_serializing_if = "Option::is_none")]
    pub positive_au: Option<AuId>,
    /// Rotation channel to use when the active AU binds several on this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAxesDef {
    pub pitch: Option<CompositeAxisDef>,
    pub yaw: Option<CompositeAxisDef>,
    pub roll: Option<CompositeAxisDef>,
}

/// Lets a signed value drive two one-directional AUs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuumPair {
    pub pair_id: AuId,
    pub is_negative: bool,
    pub axis: Axis,
    pub node: String,
}

fn default_jaw_au() -> AuId {
    AuId(26)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub morph_bindings: IndexMap<AuId, MorphBindings>,
    #[serde(default)]
    pub bone_bindings: IndexMap<AuId, Vec<BoneBinding>>,
    #[serde(default)]
    pub composite_axes: IndexMap<String, NodeAxesDef>,
    #[serde(default)]
    pub continuum_pairs: IndexMap<AuId, ContinuumPair>,
    #[serde(default)]
    pub mix_weights: IndexMap<AuId, f32>,
    /// Viseme index → morph target name.
    #[serde(default)]
    pub viseme_keys: Vec<String>,
    /// AU whose composite axis receives viseme-derived jaw motion.
    #[serde(default = "default_jaw_au", rename = "jawAU")]
    pub jaw_au: AuId,
}

impl Default for MappingProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            morph_bindings: IndexMap::new(),
            bone_bindings: IndexMap::new(),
            composite_axes: IndexMap::new(),
            continuum_pairs: IndexMap::new(),
            mix_weights: IndexMap::new(),
            viseme_keys: Vec::new(),
            jaw_au: default_jaw_au(),
        }
    }
}

static NO_BONES: [BoneBinding; 0] = [];

impl MappingProfile {
    #[inline]
    pub fn morphs_for(&self, au: AuId) -> Option<&MorphBindings> {
        self.morph_bindings.get(&au)
    }

    #[inline]
    pub fn bones_for(&self, au: AuId) -> &[BoneBinding] {
        self.bone_bindings
            .get(&au)
            .map(|v| v.as_slice())
            .unwrap_or(&NO_BONES)
    }

    /// An AU with both morph and bone output.
    pub fn is_mixed(&self, au: AuId) -> bool {
        let has_morphs = self.morphs_for(au).is_some_and(|m| !m.is_empty());
        has_morphs && !self.bones_for(au).is_empty()
    }

    /// Mix weight for a mixed AU, clamped to [0, 1].
    pub fn mix_weight(&self, au: AuId, default: f32) -> f32 {
        self.mix_weights
            .get(&au)
            .copied()
            .unwrap_or(default)
            .clamp(0.0, 1.0)
    }

    #[inline]
    pub fn continuum_pair(&self, au: AuId) -> Option<&ContinuumPair> {
        self.continuum_pairs.get(&au)
    }

    /// Rotation binding for `au` on `node`, preferring the pinned channel.
    pub fn rotation_binding(
        &self,
        au: AuId,
        node: &str,
        pinned: Option<Channel>,
    ) -> Option<&BoneBinding> {
        let mut candidates = self
            .bones_for(au)
            .iter()
            .filter(|b| b.node == node && b.channel.is_rotation());
        match pinned {
            Some(ch) => {
                let all: Vec<&BoneBinding> = candidates.collect();
                all.iter()
                    .find(|b| b.channel == ch)
                    .or_else(|| all.first())
                    .copied()
            }
            None => candidates.next(),
        }
    }

    /// Every bone node name referenced by bindings or composite axes, in first-seen order.
    pub fn node_names(&self) -> Vec<String> {
        let mut names: IndexMap<String, ()> = IndexMap::new();
        for bindings in self.bone_bindings.values() {
            for b in bindings {
                names.entry(b.node.clone()).or_insert(());
            }
        }
        for node in self.composite_axes.keys() {
            names.entry(node.clone()).or_insert(());
        }
        names.into_keys().collect()
    }

    /// Viseme morph name for an index.
    #[inline]
    pub fn viseme_key(&self, index: usize) -> Option<&str> {
        self.viseme_keys.get(index).map(|s| s.as_str())
    }

    /// Index of a morph name in the viseme table.
    pub fn viseme_index(&self, name: &str) -> Option<usize> {
        self.viseme_keys.iter().position(|k| k == name)
    }

    /// Structural checks on numeric fields. Cross-table consistency is not
    /// checked here; the runtime degrades gracefully on it.
    pub fn validate(&self) -> Result<(), ProfileError> {
        for (au, bindings) in &self.bone_bindings {
            for b in bindings {
                if !b.scale.is_finite() || b.scale == 0.0 {
                    return Err(ProfileError::InvalidScale {
                        au: *au,
                        node: b.node.clone(),
                        scale: b.scale,
                    });
                }
                let limits_ok = b.max_degrees.map_or(true, f32::is_finite)
                    && b.max_units.map_or(true, f32::is_finite);
                if !limits_ok {
                    return Err(ProfileError::NonFiniteLimit {
                        au: *au,
                        node: b.node.clone(),
                    });
                }
            }
        }
        for (au, w) in &self.mix_weights {
            if !w.is_finite() || !(0.0..=1.0).contains(w) {
                return Err(ProfileError::InvalidMixWeight { au: *au, weight: *w });
            }
        }
        for (node, axes) in &self.composite_axes {
            for (axis, def) in [
                (Axis::Pitch, &axes.pitch),
                (Axis::Yaw, &axes.yaw),
                (Axis::Roll, &axes.roll),
            ] {
                if let Some(def) = def {
                    if def.driving_aus.is_empty()
                        && def.negative_au.is_none()
                        && def.positive_au.is_none()
                    {
                        return Err(ProfileError::EmptyAxis {
                            node: node.clone(),
                            axis: axis.name().to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Parse a mapping profile from JSON and validate it.
pub fn parse_profile_json(s: &str) -> Result<MappingProfile, ProfileError> {
    let profile: MappingProfile = serde_json::from_str(s)?;
    profile.validate()?;
    Ok(profile)
}

/// One (node, axis) slot affected by an AU.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AxisRef {
    pub node: String,
    pub axis: Axis,
}

/// One (node, translation component) slot affected by an AU.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TranslationRef {
    pub node: String,
    /// 0 = x, 1 = y, 2 = z
    pub component: usize,
}

/// Read-only reverse index derived from a profile.
#[derive(Clone, Debug, Default)]
pub struct ProfileIndex {
    node_axes: IndexMap<String, NodeAxes>,
    au_axes: HashMap<AuId, Vec<AxisRef>>,
    // Every AU binding that offsets a slot, in authoring order.
    translation_sources: IndexMap<TranslationRef, Vec<(AuId, BoneBinding)>>,
    au_translations: HashMap<AuId, Vec<TranslationRef>>,
}

impl ProfileIndex {
    pub fn build(profile: &MappingProfile) -> Self {
        let mut node_axes = IndexMap::new();
        let mut au_axes: HashMap<AuId, Vec<AxisRef>> = HashMap::new();
        for (node, def) in &profile.composite_axes {
            let axes = NodeAxes::from_def(def);
            for (axis, resolved) in axes.iter() {
                for au in resolved.kind.driving_aus() {
                    let slot = AxisRef {
                        node: node.clone(),
                        axis,
                    };
                    let refs = au_axes.entry(au).or_default();
                    if !refs.contains(&slot) {
                        refs.push(slot);
                    }
                }
            }
            node_axes.insert(node.clone(), axes);
        }
        for (au, pair) in &profile.continuum_pairs {
            let has_axis = au_axes
                .get(au)
                .is_some_and(|refs| refs.iter().any(|r| r.node == pair.node && r.axis == pair.axis));
            if !has_axis {
                log::debug!(
                    "continuum pair AU {au} -> {} names {} {} without a matching composite axis",
                    pair.pair_id,
                    pair.node,
                    pair.axis.name()
                );
            }
        }
        let mut translation_sources: IndexMap<TranslationRef, Vec<(AuId, BoneBinding)>> =
            IndexMap::new();
        let mut au_translations: HashMap<AuId, Vec<TranslationRef>> = HashMap::new();
        for (au, bindings) in &profile.bone_bindings {
            for binding in bindings {
                if !binding.channel.is_translation() || binding.max_units.is_none() {
                    continue;
                }
                let slot = TranslationRef {
                    node: binding.node.clone(),
                    component: binding.channel.component(),
                };
                translation_sources
                    .entry(slot.clone())
                    .or_default()
                    .push((*au, binding.clone()));
                let refs = au_translations.entry(*au).or_default();
                if !refs.contains(&slot) {
                    refs.push(slot);
                }
            }
        }
        Self {
            node_axes,
            au_axes,
            translation_sources,
            au_translations,
        }
    }

    /// Axes touched by an AU (empty when none).
    pub fn axes_for(&self, au: AuId) -> &[AxisRef] {
        self.au_axes.get(&au).map(|v| v.as_slice()).unwrap_or(&[])
    }

    #[inline]
    pub fn node_axes(&self, node: &str) -> Option<&NodeAxes> {
        self.node_axes.get(node)
    }

    pub fn composite_nodes(&self) -> impl Iterator<Item = (&String, &NodeAxes)> {
        self.node_axes.iter()
    }

    /// Translation slots offset by an AU (empty when none).
    pub fn translations_for(&self, au: AuId) -> &[TranslationRef] {
        self.au_translations
            .get(&au)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Bindings contributing to one translation slot.
    pub fn translation_sources(&self, slot: &TranslationRef) -> &[(AuId, BoneBinding)] {
        self.translation_sources
            .get(slot)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn translation_slots(&self) -> impl Iterator<Item = (&TranslationRef, &[(AuId, BoneBinding)])> {
        self.translation_sources.iter().map(|(k, v)| (k, v.as_slice()))
    }
}
