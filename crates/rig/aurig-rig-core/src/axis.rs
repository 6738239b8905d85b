//! Composite axis kinds and their evaluation.
//!
//! A node's pitch/yaw/roll is driven by one of three axis shapes. Each shape
//! has one evaluation rule for the axis value and one rule for which AU's
//! bone binding is active; live resolution, composition and clip synthesis
//! all go through these two functions.

use serde::{Deserialize, Serialize};

use crate::ids::AuId;
use crate::profile::{Channel, CompositeAxisDef, NodeAxesDef};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Pitch,
    Yaw,
    Roll,
}

impl Axis {
    /// Quaternion composition order. Fixed: multiplication is not commutative.
    pub const COMPOSE_ORDER: [Axis; 3] = [Axis::Yaw, Axis::Pitch, Axis::Roll];

    /// Slot in a `[pitch, yaw, roll]` state triple.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::Pitch => 0,
            Axis::Yaw => 1,
            Axis::Roll => 2,
        }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Axis::Pitch => "pitch",
            Axis::Yaw => "yaw",
            Axis::Roll => "roll",
        }
    }
}

/// How an axis value is derived from its driving AUs.
#[derive(Clone, Debug, PartialEq)]
pub enum AxisKind {
    /// Two one-directional AUs; value = positive - negative.
    Continuum { negative: AuId, positive: AuId },
    /// Several AUs; the largest current value wins, first listed on ties.
    MaxAggregate(Vec<AuId>),
    /// One AU drives the axis directly.
    Single(AuId),
}

impl AxisKind {
    /// Classify a configured axis. Returns `None` for an axis with no AU at all.
    ///
    /// An axis naming only one of negativeAU/positiveAU is inconsistent
    /// configuration; it degrades to the max/single rule over every AU it names.
    pub fn from_def(def: &CompositeAxisDef) -> Option<AxisKind> {
        if let (Some(negative), Some(positive)) = (def.negative_au, def.positive_au) {
            return Some(AxisKind::Continuum { negative, positive });
        }
        let mut aus: Vec<AuId> = def.driving_aus.clone();
        for au in [def.negative_au, def.positive_au].into_iter().flatten() {
            if !aus.contains(&au) {
                log::debug!("composite axis names a lone continuum AU {au}; treating it as a driver");
                aus.push(au);
            }
        }
        match aus.len() {
            0 => None,
            1 => Some(AxisKind::Single(aus[0])),
            _ => Some(AxisKind::MaxAggregate(aus)),
        }
    }

    /// Every AU that can move this axis.
    pub fn driving_aus(&self) -> Vec<AuId> {
        match self {
            AxisKind::Continuum { negative, positive } => vec![*negative, *positive],
            AxisKind::MaxAggregate(aus) => aus.clone(),
            AxisKind::Single(au) => vec![*au],
        }
    }

    #[inline]
    pub fn drives(&self, au: AuId) -> bool {
        match self {
            AxisKind::Continuum { negative, positive } => *negative == au || *positive == au,
            AxisKind::MaxAggregate(aus) => aus.contains(&au),
            AxisKind::Single(a) => *a == au,
        }
    }

    /// Axis value in [-1, 1] given a lookup of current AU values.
    pub fn value(&self, au_value: impl Fn(AuId) -> f32) -> f32 {
        let v = match self {
            AxisKind::Continuum { negative, positive } => au_value(*positive) - au_value(*negative),
            AxisKind::MaxAggregate(aus) => max_driver(aus, &au_value)
                .map(|(_, v)| v)
                .unwrap_or(0.0),
            AxisKind::Single(au) => au_value(*au),
        };
        v.clamp(-1.0, 1.0)
    }

    /// The AU whose bone binding supplies rotation limits for the current value.
    pub fn active_au(&self, axis_value: f32, au_value: impl Fn(AuId) -> f32) -> Option<AuId> {
        match self {
            AxisKind::Continuum { negative, positive } => {
                if axis_value < 0.0 {
                    Some(*negative)
                } else {
                    Some(*positive)
                }
            }
            AxisKind::MaxAggregate(aus) => max_driver(aus, &au_value).map(|(au, _)| au),
            AxisKind::Single(au) => Some(*au),
        }
    }
}

/// Largest value among `aus`; strict comparison keeps the first listed on ties.
fn max_driver(aus: &[AuId], au_value: &impl Fn(AuId) -> f32) -> Option<(AuId, f32)> {
    let mut best: Option<(AuId, f32)> = None;
    for &au in aus {
        let v = au_value(au);
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((au, v)),
        }
    }
    best
}

/// An axis shape plus the rotation channel it is pinned to, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedAxis {
    pub kind: AxisKind,
    pub channel: Option<Channel>,
}

/// Resolved pitch/yaw/roll configuration for one node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeAxes {
    pub pitch: Option<ResolvedAxis>,
    pub yaw: Option<ResolvedAxis>,
    pub roll: Option<ResolvedAxis>,
}

impl NodeAxes {
    pub fn from_def(def: &NodeAxesDef) -> Self {
        let resolve = |d: &Option<CompositeAxisDef>| {
            d.as_ref().and_then(|d| {
                AxisKind::from_def(d).map(|kind| ResolvedAxis {
                    kind,
                    channel: d.channel,
                })
            })
        };
        Self {
            pitch: resolve(&def.pitch),
            yaw: resolve(&def.yaw),
            roll: resolve(&def.roll),
        }
    }

    #[inline]
    pub fn get(&self, axis: Axis) -> Option<&ResolvedAxis> {
        match axis {
            Axis::Pitch => self.pitch.as_ref(),
            Axis::Yaw => self.yaw.as_ref(),
            Axis::Roll => self.roll.as_ref(),
        }
    }

    /// Configured axes in composition order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, &ResolvedAxis)> {
        Axis::COMPOSE_ORDER
            .into_iter()
            .filter_map(move |axis| self.get(axis).map(|r| (axis, r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(values: &[(u32, f32)]) -> impl Fn(AuId) -> f32 {
        let map: HashMap<AuId, f32> = values.iter().map(|(a, v)| (AuId(*a), *v)).collect();
        move |au| map.get(&au).copied().unwrap_or(0.0)
    }

    #[test]
    fn continuum_is_positive_minus_negative() {
        let kind = AxisKind::Continuum {
            negative: AuId(51),
            positive: AuId(52),
        };
        assert_eq!(kind.value(lookup(&[(51, 0.75)])), -0.75);
        assert_eq!(kind.value(lookup(&[(52, 0.5)])), 0.5);
        assert_eq!(kind.active_au(-0.75, lookup(&[])), Some(AuId(51)));
        assert_eq!(kind.active_au(0.5, lookup(&[])), Some(AuId(52)));
    }

    #[test]
    fn max_aggregate_prefers_first_listed_on_ties() {
        let kind = AxisKind::MaxAggregate(vec![AuId(25), AuId(26), AuId(27)]);
        let values = lookup(&[(25, 0.4), (26, 0.4), (27, 0.1)]);
        assert_eq!(kind.value(&values), 0.4);
        assert_eq!(kind.active_au(0.4, &values), Some(AuId(25)));

        let values = lookup(&[(25, 0.4), (26, 0.9)]);
        assert_eq!(kind.active_au(0.9, &values), Some(AuId(26)));
    }

    #[test]
    fn lone_continuum_member_degrades_to_single() {
        let def = CompositeAxisDef {
            driving_aus: vec![],
            negative_au: Some(AuId(61)),
            positive_au: None,
            channel: None,
        };
        assert_eq!(AxisKind::from_def(&def), Some(AxisKind::Single(AuId(61))));

        let empty = CompositeAxisDef::default();
        assert_eq!(AxisKind::from_def(&empty), None);
    }

    #[test]
    fn compose_order_is_yaw_pitch_roll() {
        let def = NodeAxesDef {
            pitch: Some(CompositeAxisDef {
                driving_aus: vec![AuId(53)],
                ..Default::default()
            }),
            yaw: Some(CompositeAxisDef {
                driving_aus: vec![AuId(51)],
                ..Default::default()
            }),
            roll: None,
        };
        let axes = NodeAxes::from_def(&def);
        let order: Vec<Axis> = axes.iter().map(|(a, _)| a).collect();
        assert_eq!(order, vec![Axis::Yaw, Axis::Pitch]);
    }
}
