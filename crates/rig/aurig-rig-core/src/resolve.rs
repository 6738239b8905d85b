//! AU resolution: fan one AU value out into morph weights, composite axis
//! values and translation offsets.
//!
//! [`Resolver::resolve`] is the single entry point used by live control and
//! transitions. The helpers below it (`compute_side_values`, `morph_weights`,
//! `translation_offset`, `translation_total`) are shared with clip synthesis so both paths stay
//! numerically identical.

use serde::{Deserialize, Serialize};

use crate::axis::Axis;
use crate::ids::AuId;
use crate::profile::{BoneBinding, MappingProfile, ProfileIndex, Side, TranslationRef};
use crate::state::{sanitize, AuState};

/// Split a base value into (left, right) by balance in [-1, 1].
///
/// `0` keeps both sides at `base`; a negative balance attenuates the right
/// side, a positive balance attenuates the left side.
#[inline]
pub fn compute_side_values(base: f32, balance: f32) -> (f32, f32) {
    let b = sanitize(balance).clamp(-1.0, 1.0);
    if b < 0.0 {
        (base, base * (1.0 + b))
    } else if b > 0.0 {
        (base * (1.0 - b), base)
    } else {
        (base, base)
    }
}

/// Balance multiplier for a binding carrying an explicit side hint.
#[inline]
pub fn side_factor(side: Option<Side>, balance: f32) -> f32 {
    match side {
        None => 1.0,
        Some(Side::Left) => compute_side_values(1.0, balance).0,
        Some(Side::Right) => compute_side_values(1.0, balance).1,
    }
}

/// Morph weights for an AU value, after mixed-AU scaling and balance split.
pub fn morph_weights(
    profile: &MappingProfile,
    au: AuId,
    value: f32,
    balance: f32,
    default_mix: f32,
) -> Vec<(String, f32)> {
    let Some(bindings) = profile.morphs_for(au) else {
        return Vec::new();
    };
    let base = if profile.is_mixed(au) {
        value * profile.mix_weight(au, default_mix)
    } else {
        value
    };
    let (left, right) = compute_side_values(base, balance);
    let mut out = Vec::with_capacity(bindings.left.len() + bindings.right.len() + bindings.center.len());
    out.extend(bindings.left.iter().map(|m| (m.clone(), left)));
    out.extend(bindings.right.iter().map(|m| (m.clone(), right)));
    out.extend(bindings.center.iter().map(|m| (m.clone(), base)));
    out
}

/// Translation offset for a translation binding; `None` for rotation
/// bindings or bindings without `maxUnits`.
pub fn translation_offset(binding: &BoneBinding, value: f32, balance: f32) -> Option<f32> {
    if !binding.channel.is_translation() {
        return None;
    }
    let max_units = binding.max_units?;
    let scaled = (value * binding.scale * side_factor(binding.side, balance)).clamp(-1.0, 1.0);
    Some(scaled * max_units)
}

/// Accumulated offset of one translation slot: the sum of every binding's
/// offset, each clamped on its own.
pub fn translation_total(
    index: &ProfileIndex,
    slot: &TranslationRef,
    value: impl Fn(AuId) -> f32,
    balance: impl Fn(AuId) -> f32,
) -> f32 {
    index
        .translation_sources(slot)
        .iter()
        .filter_map(|(au, binding)| translation_offset(binding, value(*au), balance(*au)))
        .sum()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MorphDelta {
    pub target: String,
    pub weight: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisDelta {
    pub node: String,
    pub axis: Axis,
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranslationDelta {
    pub node: String,
    /// 0 = x, 1 = y, 2 = z
    pub component: usize,
    pub offset: f32,
}

/// Every output derived from one resolve call. Later writes to the same
/// target replace earlier ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub morphs: Vec<MorphDelta>,
    pub axes: Vec<AxisDelta>,
    pub translations: Vec<TranslationDelta>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.morphs.is_empty() && self.axes.is_empty() && self.translations.is_empty()
    }

    fn push_morph(&mut self, target: String, weight: f32) {
        match self.morphs.iter_mut().find(|m| m.target == target) {
            Some(m) => m.weight = weight,
            None => self.morphs.push(MorphDelta { target, weight }),
        }
    }

    fn push_axis(&mut self, node: &str, axis: Axis, value: f32) {
        match self
            .axes
            .iter_mut()
            .find(|a| a.node == node && a.axis == axis)
        {
            Some(a) => a.value = value,
            None => self.axes.push(AxisDelta {
                node: node.to_string(),
                axis,
                value,
            }),
        }
    }

    fn push_translation(&mut self, node: &str, component: usize, offset: f32) {
        match self
            .translations
            .iter_mut()
            .find(|t| t.node == node && t.component == component)
        {
            Some(t) => t.offset = offset,
            None => self.translations.push(TranslationDelta {
                node: node.to_string(),
                component,
                offset,
            }),
        }
    }

    pub fn morph(&self, target: &str) -> Option<f32> {
        self.morphs
            .iter()
            .find(|m| m.target == target)
            .map(|m| m.weight)
    }

    pub fn axis(&self, node: &str, axis: Axis) -> Option<f32> {
        self.axes
            .iter()
            .find(|a| a.node == node && a.axis == axis)
            .map(|a| a.value)
    }

    pub fn translation(&self, node: &str, component: usize) -> Option<f32> {
        self.translations
            .iter()
            .find(|t| t.node == node && t.component == component)
            .map(|t| t.offset)
    }
}

/// Borrowing view over a profile and its index.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    pub profile: &'a MappingProfile,
    pub index: &'a ProfileIndex,
    pub default_mix: f32,
}

impl<'a> Resolver<'a> {
    pub fn new(profile: &'a MappingProfile, index: &'a ProfileIndex, default_mix: f32) -> Self {
        Self {
            profile,
            index,
            default_mix,
        }
    }

    /// Set `au` to `value` (set semantics) and return every derived output.
    ///
    /// A negative value on a continuum member drives its partner with the
    /// magnitude; a positive value zeroes the partner. Only AU state is mutated.
    pub fn resolve(
        &self,
        state: &mut AuState,
        au: AuId,
        value: f32,
        balance: Option<f32>,
    ) -> Resolution {
        let value = sanitize(value);
        if let Some(b) = balance {
            state.set_balance(au, b);
        }
        let mut out = Resolution::default();
        match self.profile.continuum_pair(au) {
            Some(pair) if value < 0.0 => {
                let partner = pair.pair_id;
                if let Some(b) = balance {
                    state.set_balance(partner, b);
                }
                self.apply(state, au, 0.0, &mut out);
                self.apply(state, partner, -value, &mut out);
            }
            Some(pair) if value > 0.0 => {
                self.apply(state, pair.pair_id, 0.0, &mut out);
                self.apply(state, au, value, &mut out);
            }
            _ => self.apply(state, au, value.max(0.0), &mut out),
        }
        out
    }

    /// Signed control over a continuum pair: negative drives `negative`,
    /// positive drives `positive`, zero clears both.
    pub fn resolve_continuum(
        &self,
        state: &mut AuState,
        negative: AuId,
        positive: AuId,
        value: f32,
        balance: Option<f32>,
    ) -> Resolution {
        let value = sanitize(value).clamp(-1.0, 1.0);
        for au in [negative, positive] {
            if let Some(b) = balance {
                state.set_balance(au, b);
            }
        }
        let mut out = Resolution::default();
        if value < 0.0 {
            self.apply(state, positive, 0.0, &mut out);
            self.apply(state, negative, -value, &mut out);
        } else if value > 0.0 {
            self.apply(state, negative, 0.0, &mut out);
            self.apply(state, positive, value, &mut out);
        } else {
            self.apply(state, negative, 0.0, &mut out);
            self.apply(state, positive, 0.0, &mut out);
        }
        out
    }

    fn apply(&self, state: &mut AuState, au: AuId, value: f32, out: &mut Resolution) {
        state.set_value(au, value);
        let v = state.value(au);
        let balance = state.balance(au);

        for (target, w) in morph_weights(self.profile, au, v, balance, self.default_mix) {
            out.push_morph(target, w);
        }

        for slot in self.index.axes_for(au) {
            let Some(resolved) = self
                .index
                .node_axes(&slot.node)
                .and_then(|axes| axes.get(slot.axis))
            else {
                continue;
            };
            let axis_value = resolved.kind.value(|a| state.value(a));
            out.push_axis(&slot.node, slot.axis, axis_value);
        }

        for slot in self.index.translations_for(au) {
            let offset = translation_total(self.index, slot, |a| state.value(a), |a| state.balance(a));
            out.push_translation(&slot.node, slot.component, offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::parse_profile_json;

    #[test]
    fn side_values_follow_sign_rule() {
        assert_eq!(compute_side_values(0.8, 0.0), (0.8, 0.8));
        assert_eq!(compute_side_values(0.8, -1.0), (0.8, 0.0));
        assert_eq!(compute_side_values(0.8, 1.0), (0.0, 0.8));
        let (l, r) = compute_side_values(0.8, -0.5);
        assert_eq!(l, 0.8);
        assert!((r - 0.4).abs() < 1e-6);
        // out-of-range balance clamps
        assert_eq!(compute_side_values(0.5, -7.0), (0.5, 0.0));
    }

    #[test]
    fn side_factor_only_applies_to_declared_sides() {
        assert_eq!(side_factor(None, 1.0), 1.0);
        assert_eq!(side_factor(Some(Side::Left), 1.0), 0.0);
        assert_eq!(side_factor(Some(Side::Right), 1.0), 1.0);
        assert_eq!(side_factor(Some(Side::Right), -0.25), 0.75);
    }

    #[test]
    fn translation_offset_clamps_before_scaling() {
        let p = parse_profile_json(
            r#"{ "boneBindings": { "17": [
                { "node": "CHIN", "channel": "ty", "scale": -1, "maxUnits": 0.5 },
                { "node": "CHIN", "channel": "rx", "maxDegrees": 5 }
            ] } }"#,
        )
        .unwrap();
        let b = &p.bones_for(AuId(17))[0];
        assert_eq!(translation_offset(b, 0.5, 0.0), Some(-0.25));
        assert_eq!(translation_offset(b, 1.0, 0.0), Some(-0.5));
        assert_eq!(translation_offset(&p.bones_for(AuId(17))[1], 1.0, 0.0), None);
    }

    #[test]
    fn mixed_au_scales_only_morph_output() {
        let p = parse_profile_json(
            r#"{
                "morphBindings": { "26": { "center": ["jawOpen"] } },
                "boneBindings": { "26": [{ "node": "JAW", "channel": "rx", "maxDegrees": 25 }] },
                "compositeAxes": { "JAW": { "pitch": { "drivingAUs": [26] } } },
                "mixWeights": { "26": 0.25 }
            }"#,
        )
        .unwrap();
        let idx = ProfileIndex::build(&p);
        let resolver = Resolver::new(&p, &idx, 1.0);
        let mut state = AuState::new();
        let res = resolver.resolve(&mut state, AuId(26), 0.8, None);
        assert!((res.morph("jawOpen").unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(res.axis("JAW", Axis::Pitch), Some(0.8));
    }

    #[test]
    fn shared_translation_component_sums_active_aus() {
        let p = parse_profile_json(
            r#"{ "boneBindings": {
                "29": [{ "node": "JAW", "channel": "tz", "maxUnits": 0.01 }],
                "30": [{ "node": "JAW", "channel": "tz", "maxUnits": 0.02 }]
            } }"#,
        )
        .unwrap();
        let idx = ProfileIndex::build(&p);
        let resolver = Resolver::new(&p, &idx, 1.0);
        let mut state = AuState::new();
        let res = resolver.resolve(&mut state, AuId(29), 1.0, None);
        assert!((res.translation("JAW", 2).unwrap() - 0.01).abs() < 1e-6);
        let res = resolver.resolve(&mut state, AuId(30), 0.5, None);
        assert!((res.translation("JAW", 2).unwrap() - 0.02).abs() < 1e-6);
        // releasing one AU leaves the other's offset in place
        let res = resolver.resolve(&mut state, AuId(30), 0.0, None);
        assert!((res.translation("JAW", 2).unwrap() - 0.01).abs() < 1e-6);
    }
}
