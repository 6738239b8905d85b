//! Dense baked clips and their sampling.

use serde::{Deserialize, Serialize};

use crate::rig::IDENTITY_QUAT;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoopMode {
    #[default]
    Once,
    Repeat,
    PingPong,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClipTrack {
    Morph {
        target: String,
        times: Vec<f32>,
        values: Vec<f32>,
    },
    /// `[x, y, z, w]` per key.
    Orientation {
        node: String,
        times: Vec<f32>,
        values: Vec<[f32; 4]>,
    },
    Position {
        node: String,
        times: Vec<f32>,
        values: Vec<[f32; 3]>,
    },
}

impl ClipTrack {
    /// Morph name or node name.
    pub fn target(&self) -> &str {
        match self {
            ClipTrack::Morph { target, .. } => target,
            ClipTrack::Orientation { node, .. } | ClipTrack::Position { node, .. } => node,
        }
    }

    pub fn times(&self) -> &[f32] {
        match self {
            ClipTrack::Morph { times, .. }
            | ClipTrack::Orientation { times, .. }
            | ClipTrack::Position { times, .. } => times,
        }
    }

    pub fn len(&self) -> usize {
        self.times().len()
    }

    pub fn is_empty(&self) -> bool {
        self.times().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub name: String,
    /// Seconds.
    pub duration: f32,
    #[serde(default)]
    pub loop_mode: LoopMode,
    pub tracks: Vec<ClipTrack>,
}

impl Clip {
    pub fn morph_track(&self, target: &str) -> Option<(&[f32], &[f32])> {
        self.tracks.iter().find_map(|t| match t {
            ClipTrack::Morph {
                target: name,
                times,
                values,
            } if name == target => Some((times.as_slice(), values.as_slice())),
            _ => None,
        })
    }

    pub fn orientation_track(&self, node: &str) -> Option<(&[f32], &[[f32; 4]])> {
        self.tracks.iter().find_map(|t| match t {
            ClipTrack::Orientation {
                node: name,
                times,
                values,
            } if name == node => Some((times.as_slice(), values.as_slice())),
            _ => None,
        })
    }

    pub fn position_track(&self, node: &str) -> Option<(&[f32], &[[f32; 3]])> {
        self.tracks.iter().find_map(|t| match t {
            ClipTrack::Position {
                node: name,
                times,
                values,
            } if name == node => Some((times.as_slice(), values.as_slice())),
            _ => None,
        })
    }

    /// Sample every track at clip-local time `t`.
    pub fn sample(&self, t: f32) -> ClipSample {
        let mut out = ClipSample::default();
        for track in &self.tracks {
            match track {
                ClipTrack::Morph {
                    target,
                    times,
                    values,
                } => {
                    if let Some(v) = sample_keys(times, values, t, lerp_f32) {
                        out.morphs.push((target.clone(), v));
                    }
                }
                ClipTrack::Orientation { node, times, values } => {
                    if let Some(q) = sample_keys(times, values, t, nlerp_quat) {
                        out.orientations.push((node.clone(), q));
                    }
                }
                ClipTrack::Position { node, times, values } => {
                    if let Some(p) = sample_keys(times, values, t, lerp_vec3) {
                        out.positions.push((node.clone(), p));
                    }
                }
            }
        }
        out
    }
}

/// Per-target values of one clip at one instant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClipSample {
    pub morphs: Vec<(String, f32)>,
    pub orientations: Vec<(String, [f32; 4])>,
    pub positions: Vec<(String, [f32; 3])>,
}

#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn lerp_vec3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        lerp_f32(a[0], b[0], t),
        lerp_f32(a[1], b[1], t),
        lerp_f32(a[2], b[2], t),
    ]
}

/// Normalized lerp on the shortest arc.
pub fn nlerp_quat(a: [f32; 4], mut b: [f32; 4], t: f32) -> [f32; 4] {
    let d = a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3];
    if d < 0.0 {
        b = [-b[0], -b[1], -b[2], -b[3]];
    }
    let q = [
        lerp_f32(a[0], b[0], t),
        lerp_f32(a[1], b[1], t),
        lerp_f32(a[2], b[2], t),
        lerp_f32(a[3], b[3], t),
    ];
    let len = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if len <= f32::EPSILON {
        return IDENTITY_QUAT;
    }
    [q[0] / len, q[1] / len, q[2] / len, q[3] / len]
}

/// Interpolate between the keys around `t`; ends hold.
fn sample_keys<V: Copy>(times: &[f32], values: &[V], t: f32, mix: fn(V, V, f32) -> V) -> Option<V> {
    let n = times.len().min(values.len());
    if n == 0 {
        return None;
    }
    if n == 1 || t <= times[0] {
        return Some(values[0]);
    }
    if t >= times[n - 1] {
        return Some(values[n - 1]);
    }
    let hi = times[..n].partition_point(|&k| k <= t);
    let lo = hi - 1;
    let span = times[hi] - times[lo];
    if span <= f32::EPSILON {
        return Some(values[hi]);
    }
    Some(mix(values[lo], values[hi], (t - times[lo]) / span))
}
