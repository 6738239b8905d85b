//! Clip synthesis: bake sparse curves into a dense clip.
//!
//! Every output is sampled at the union of all keyframe times, reusing the
//! same resolution helpers and composer as live control.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::clip::{Clip, ClipTrack, LoopMode};
use crate::compose::{to_quat_array, Composer};
use crate::curve::{keyframe_times, normalize_points, sample_curve, CurvePoint, CurveSet};
use crate::ids::AuId;
use crate::profile::{MappingProfile, ProfileIndex};
use crate::resolve::{morph_weights, translation_total};
use crate::rig::{BoneSnapshot, Rig};
use crate::state::sanitize;

/// Upper clamp for baked morph weights; allows exaggerated overshoot.
pub const MAX_BAKED_WEIGHT: f32 = 2.0;

/// Jaw opening per viseme index (sil, PP, FF, TH, DD, kk, CH, SS, nn, RR,
/// aa, E, I, O, U).
pub const VISEME_JAW_AMOUNTS: [f32; 15] = [
    0.0, 0.0, 0.1, 0.15, 0.2, 0.25, 0.2, 0.1, 0.15, 0.2, 0.7, 0.4, 0.3, 0.6, 0.35,
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnippetCategory {
    #[default]
    Expression,
    /// Numeric curve ids are viseme indices instead of AU ids.
    VisemeSnippet,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthOptions {
    pub name: String,
    /// Left/right balance applied to every bilateral output.
    pub balance: f32,
    pub intensity_scale: f32,
    pub snippet_category: SnippetCategory,
    pub auto_viseme_jaw: bool,
    pub jaw_scale: f32,
    pub loop_mode: LoopMode,
    /// Live values keyed by curve id, consumed by `inherit` keyframes.
    pub inherited: IndexMap<String, f32>,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            name: "clip".to_string(),
            balance: 0.0,
            intensity_scale: 1.0,
            snippet_category: SnippetCategory::Expression,
            auto_viseme_jaw: true,
            jaw_scale: 1.0,
            loop_mode: LoopMode::Once,
            inherited: IndexMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum CurveTarget {
    Au(AuId),
    Viseme { index: usize, morph: String },
    Morph(String),
}

fn classify(profile: &MappingProfile, id: &str, category: SnippetCategory) -> Option<CurveTarget> {
    if category == SnippetCategory::VisemeSnippet {
        if let Ok(index) = id.trim().parse::<usize>() {
            return match profile.viseme_key(index) {
                Some(morph) => Some(CurveTarget::Viseme {
                    index,
                    morph: morph.to_string(),
                }),
                None => {
                    log::debug!("viseme index {index} has no key in profile '{}'", profile.name);
                    None
                }
            };
        }
    } else if let Some(au) = AuId::parse(id) {
        return Some(CurveTarget::Au(au));
    }
    match profile.viseme_index(id) {
        Some(index) => Some(CurveTarget::Viseme {
            index,
            morph: id.to_string(),
        }),
        None => Some(CurveTarget::Morph(id.to_string())),
    }
}

/// Keep the larger value per slot.
fn merge_max(into: &mut Vec<f32>, from: &[f32]) {
    if into.is_empty() {
        into.extend_from_slice(from);
        return;
    }
    for (a, b) in into.iter_mut().zip(from) {
        *a = a.max(*b);
    }
}

/// Borrowed inputs for one bake.
#[derive(Clone, Copy)]
pub struct Synthesizer<'a> {
    pub profile: &'a MappingProfile,
    pub index: &'a ProfileIndex,
    pub rig: &'a Rig,
    pub default_mix: f32,
}

impl<'a> Synthesizer<'a> {
    pub fn new(
        profile: &'a MappingProfile,
        index: &'a ProfileIndex,
        rig: &'a Rig,
        default_mix: f32,
    ) -> Self {
        Self {
            profile,
            index,
            rig,
            default_mix,
        }
    }

    fn snapshot(&self, node: &str) -> BoneSnapshot {
        self.rig
            .node_by_name(node)
            .filter(|n| n.bone.is_some())
            .map(|n| n.snapshot)
            .unwrap_or_default()
    }

    /// Bake `curves` into a clip. `None` when there are no keyframes or no
    /// curve produced a track.
    pub fn synthesize(&self, curves: &CurveSet, options: &SynthOptions) -> Option<Clip> {
        let curves: Vec<(&String, Vec<CurvePoint>)> = curves
            .iter()
            .map(|(id, pts)| (id, normalize_points(pts, options.inherited.get(id).copied())))
            .filter(|(_, pts)| !pts.is_empty())
            .collect();
        let times = keyframe_times(curves.iter().map(|(_, pts)| pts.as_slice()));
        let duration = *times.last()?;

        let scale = sanitize(options.intensity_scale);
        let bake = |w: f32| (w * scale).clamp(0.0, MAX_BAKED_WEIGHT);

        let mut morphs: IndexMap<String, Vec<f32>> = IndexMap::new();
        let mut au_samples: IndexMap<AuId, Vec<f32>> = IndexMap::new();
        let mut jaw: Vec<f32> = Vec::new();

        for (id, pts) in &curves {
            let Some(target) = classify(self.profile, id, options.snippet_category) else {
                continue;
            };
            let samples: Vec<f32> = times.iter().map(|&t| sample_curve(pts, t)).collect();
            match target {
                CurveTarget::Au(au) => {
                    let mut per_target: IndexMap<String, Vec<f32>> = IndexMap::new();
                    for &s in &samples {
                        for (name, w) in
                            morph_weights(self.profile, au, s, options.balance, self.default_mix)
                        {
                            per_target.entry(name).or_default().push(bake(w));
                        }
                    }
                    for (name, values) in per_target {
                        merge_max(morphs.entry(name).or_default(), &values);
                    }
                    let clamped: Vec<f32> = samples
                        .iter()
                        .map(|s| (s * scale).clamp(0.0, 1.0))
                        .collect();
                    merge_max(au_samples.entry(au).or_default(), &clamped);
                }
                CurveTarget::Viseme { index, morph } => {
                    let values: Vec<f32> = samples.iter().map(|&s| bake(s)).collect();
                    merge_max(morphs.entry(morph).or_default(), &values);
                    if options.auto_viseme_jaw {
                        let amount = VISEME_JAW_AMOUNTS.get(index).copied().unwrap_or(0.0);
                        let derived: Vec<f32> = samples
                            .iter()
                            .map(|s| (s * amount * options.jaw_scale).clamp(0.0, 1.0))
                            .collect();
                        merge_max(&mut jaw, &derived);
                    }
                }
                CurveTarget::Morph(name) => {
                    let values: Vec<f32> = samples.iter().map(|&s| bake(s)).collect();
                    merge_max(morphs.entry(name).or_default(), &values);
                }
            }
        }
        if !jaw.is_empty() {
            merge_max(au_samples.entry(self.profile.jaw_au).or_default(), &jaw);
        }

        let mut tracks: Vec<ClipTrack> = morphs
            .into_iter()
            .map(|(target, values)| ClipTrack::Morph {
                target,
                times: times.clone(),
                values,
            })
            .collect();
        tracks.extend(self.orientation_tracks(&times, &au_samples, options.balance));
        tracks.extend(self.position_tracks(&times, &au_samples, options.balance));

        if tracks.is_empty() {
            return None;
        }
        Some(Clip {
            name: options.name.clone(),
            duration,
            loop_mode: options.loop_mode,
            tracks,
        })
    }

    fn orientation_tracks(
        &self,
        times: &[f32],
        au_samples: &IndexMap<AuId, Vec<f32>>,
        balance: f32,
    ) -> Vec<ClipTrack> {
        let composer = Composer::new(self.profile, self.index);
        let mut out = Vec::new();
        for (node, axes) in self.index.composite_nodes() {
            let relevant = axes
                .iter()
                .any(|(_, r)| r.kind.driving_aus().iter().any(|au| au_samples.contains_key(au)));
            if !relevant {
                continue;
            }
            let snapshot = self.snapshot(node);
            let values = (0..times.len())
                .map(|i| {
                    let lookup = |au: AuId| au_samples.get(&au).map_or(0.0, |v| v[i]);
                    let mut rotation = [0.0f32; 3];
                    for (axis, resolved) in axes.iter() {
                        rotation[axis.index()] = resolved.kind.value(lookup);
                    }
                    let q = composer.orientation(node, axes, rotation, &snapshot, lookup, |_| balance);
                    to_quat_array(&q)
                })
                .collect();
            out.push(ClipTrack::Orientation {
                node: node.clone(),
                times: times.to_vec(),
                values,
            });
        }
        out
    }

    fn position_tracks(
        &self,
        times: &[f32],
        au_samples: &IndexMap<AuId, Vec<f32>>,
        balance: f32,
    ) -> Vec<ClipTrack> {
        // A component shared by several AUs carries the sum of their offsets.
        let mut offsets: IndexMap<String, Vec<(usize, Vec<f32>)>> = IndexMap::new();
        for (slot, sources) in self.index.translation_slots() {
            if !sources.iter().any(|(au, _)| au_samples.contains_key(au)) {
                continue;
            }
            let values: Vec<f32> = (0..times.len())
                .map(|i| {
                    let lookup = |au: AuId| au_samples.get(&au).map_or(0.0, |v| v[i]);
                    translation_total(self.index, slot, lookup, |_| balance)
                })
                .collect();
            offsets
                .entry(slot.node.clone())
                .or_default()
                .push((slot.component, values));
        }
        offsets
            .into_iter()
            .map(|(node, components)| {
                let base = self.snapshot(&node).base_position;
                let values = (0..times.len())
                    .map(|i| {
                        let mut p = base;
                        for (c, v) in &components {
                            p[*c] += v[i];
                        }
                        p
                    })
                    .collect();
                ClipTrack::Position {
                    node,
                    times: times.to_vec(),
                    values,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::parse_profile_json;

    fn profile() -> MappingProfile {
        parse_profile_json(
            r#"{
                "name": "test",
                "morphBindings": {
                    "12": { "left": ["smileL"], "right": ["smileR"] },
                    "26": { "center": ["jawOpen"] }
                },
                "boneBindings": {
                    "26": [
                        { "node": "JAW", "channel": "rx", "maxDegrees": 20 },
                        { "node": "JAW", "channel": "ty", "scale": -1, "maxUnits": 0.1 }
                    ]
                },
                "compositeAxes": { "JAW": { "pitch": { "drivingAUs": [26] } } },
                "mixWeights": { "26": 0.5 },
                "visemeKeys": ["sil", "PP", "FF", "TH", "DD", "kk", "CH", "SS", "nn", "RR", "aa"]
            }"#,
        )
        .unwrap()
    }

    fn bake(curves: &str, options: &SynthOptions) -> Option<Clip> {
        let p = profile();
        let idx = ProfileIndex::build(&p);
        let rig = Rig::from_names(p.node_names());
        let curves: CurveSet = serde_json::from_str(curves).unwrap();
        Synthesizer::new(&p, &idx, &rig, 1.0).synthesize(&curves, options)
    }

    #[test]
    fn empty_curves_bake_nothing() {
        assert!(bake("{}", &SynthOptions::default()).is_none());
        assert!(bake(r#"{ "12": [] }"#, &SynthOptions::default()).is_none());
    }

    #[test]
    fn au_curve_bakes_bilateral_morph_tracks() {
        let opts = SynthOptions {
            balance: -0.5,
            ..Default::default()
        };
        let clip = bake(
            r#"{ "12": [{ "time": 0, "intensity": 0 }, { "time": 1, "intensity": 0.8 }] }"#,
            &opts,
        )
        .unwrap();
        assert_eq!(clip.duration, 1.0);
        let (_, left) = clip.morph_track("smileL").unwrap();
        let (_, right) = clip.morph_track("smileR").unwrap();
        assert!((left[1] - 0.8).abs() < 1e-6);
        assert!((right[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn overshoot_clamps_at_two() {
        let opts = SynthOptions {
            intensity_scale: 3.0,
            ..Default::default()
        };
        let clip = bake(r#"{ "smileL": [{ "time": 0, "intensity": 1 }] }"#, &opts).unwrap();
        assert_eq!(clip.morph_track("smileL").unwrap().1, &[2.0]);
    }

    #[test]
    fn mixed_au_bakes_morph_rotation_and_position() {
        let clip = bake(
            r#"{ "26": [{ "time": 0, "intensity": 0 }, { "time": 0.5, "intensity": 1 }] }"#,
            &SynthOptions::default(),
        )
        .unwrap();
        assert_eq!(clip.morph_track("jawOpen").unwrap().1, &[0.0, 0.5]);
        let (_, q) = clip.orientation_track("JAW").unwrap();
        let angle = 2.0 * q[1][3].clamp(-1.0, 1.0).acos();
        assert!((angle - 20f32.to_radians()).abs() < 1e-4);
        let (_, p) = clip.position_track("JAW").unwrap();
        assert!((p[1][1] + 0.1).abs() < 1e-6);
    }

    #[test]
    fn viseme_index_drives_jaw_under_viseme_category() {
        let opts = SynthOptions {
            snippet_category: SnippetCategory::VisemeSnippet,
            ..Default::default()
        };
        let clip = bake(r#"{ "10": [{ "time": 0, "intensity": 1 }] }"#, &opts).unwrap();
        assert_eq!(clip.morph_track("aa").unwrap().1, &[1.0]);
        let (_, q) = clip.orientation_track("JAW").unwrap();
        let angle = 2.0 * q[0][3].clamp(-1.0, 1.0).acos();
        assert!((angle - (20.0 * 0.7f32).to_radians()).abs() < 1e-4);
        // viseme jaw feeds rotation only
        assert!(clip.morph_track("jawOpen").is_none());
    }

    #[test]
    fn viseme_index_past_the_jaw_table_adds_no_jaw() {
        let p = parse_profile_json(
            r#"{
                "boneBindings": { "26": [{ "node": "JAW", "channel": "rx", "maxDegrees": 20 }] },
                "compositeAxes": { "JAW": { "pitch": { "drivingAUs": [26] } } },
                "visemeKeys": ["sil", "PP", "FF", "TH", "DD", "kk", "CH", "SS", "nn", "RR",
                               "aa", "E", "I", "O", "U", "extra"]
            }"#,
        )
        .unwrap();
        let idx = ProfileIndex::build(&p);
        let rig = Rig::from_names(p.node_names());
        let curves: CurveSet =
            serde_json::from_str(r#"{ "15": [{ "time": 0, "intensity": 1 }] }"#).unwrap();
        let opts = SynthOptions {
            snippet_category: SnippetCategory::VisemeSnippet,
            ..Default::default()
        };
        let clip = Synthesizer::new(&p, &idx, &rig, 1.0)
            .synthesize(&curves, &opts)
            .unwrap();
        assert_eq!(clip.morph_track("extra").unwrap().1, &[1.0]);
        let (_, q) = clip.orientation_track("JAW").unwrap();
        assert!((q[0][3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn shared_translation_component_bakes_the_sum() {
        let p = parse_profile_json(
            r#"{ "boneBindings": {
                "29": [{ "node": "JAW", "channel": "tz", "maxUnits": 0.01 }],
                "30": [{ "node": "JAW", "channel": "tz", "maxUnits": 0.02 }]
            } }"#,
        )
        .unwrap();
        let idx = ProfileIndex::build(&p);
        let rig = Rig::from_names(p.node_names());
        let curves: CurveSet = serde_json::from_str(
            r#"{
                "29": [{ "time": 0, "intensity": 1 }, { "time": 1, "intensity": 1 }],
                "30": [{ "time": 0, "intensity": 0 }, { "time": 1, "intensity": 1 }]
            }"#,
        )
        .unwrap();
        let clip = Synthesizer::new(&p, &idx, &rig, 1.0)
            .synthesize(&curves, &SynthOptions::default())
            .unwrap();
        let (_, pos) = clip.position_track("JAW").unwrap();
        assert!((pos[0][2] - 0.01).abs() < 1e-6);
        assert!((pos[1][2] - 0.03).abs() < 1e-6);
    }

    #[test]
    fn colliding_curves_keep_the_max() {
        let clip = bake(
            r#"{
                "12": [{ "time": 0, "intensity": 0.3 }],
                "smileL": [{ "time": 0, "intensity": 0.6 }]
            }"#,
            &SynthOptions::default(),
        )
        .unwrap();
        assert_eq!(clip.morph_track("smileL").unwrap().1, &[0.6]);
        assert_eq!(clip.morph_track("smileR").unwrap().1, &[0.3]);
    }

    #[test]
    fn inherited_values_seed_inherit_points() {
        let mut opts = SynthOptions::default();
        opts.inherited.insert("smileL".into(), 0.4);
        let clip = bake(
            r#"{ "smileL": [{ "time": 0, "intensity": 0, "inherit": true }, { "time": 1, "intensity": 0 }] }"#,
            &opts,
        )
        .unwrap();
        assert_eq!(clip.morph_track("smileL").unwrap().1, &[0.4, 0.0]);
    }
}
