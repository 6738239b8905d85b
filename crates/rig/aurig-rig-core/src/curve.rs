//! Sparse authoring curves.
//!
//! A curve id is an AU id (`"12"`), a direct morph or viseme name, or a
//! viseme index under the viseme snippet category. Points are sampled
//! linearly and hold their end values outside the keyed range.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::state::sanitize;

/// Times closer than this collapse into one keyframe.
pub const TIME_EPSILON: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub time: f32,
    pub intensity: f32,
    /// Take the intensity from the live value at trigger time.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inherit: bool,
}

impl CurvePoint {
    pub fn new(time: f32, intensity: f32) -> Self {
        Self {
            time,
            intensity,
            inherit: false,
        }
    }
}

/// Curves keyed by id, in authoring order.
pub type CurveSet = IndexMap<String, Vec<CurvePoint>>;

/// Sorted copy with negative times clamped to 0 and non-finite points dropped.
/// `inherited` replaces the intensity of `inherit` points when supplied.
pub fn normalize_points(points: &[CurvePoint], inherited: Option<f32>) -> Vec<CurvePoint> {
    let mut out: Vec<CurvePoint> = points
        .iter()
        .filter(|p| p.time.is_finite() && p.intensity.is_finite())
        .map(|p| {
            let intensity = match (p.inherit, inherited) {
                (true, Some(v)) => sanitize(v),
                _ => p.intensity,
            };
            CurvePoint {
                time: p.time.max(0.0),
                intensity,
                inherit: p.inherit,
            }
        })
        .collect();
    out.sort_by(|a, b| a.time.total_cmp(&b.time));
    out
}

/// Linear sample of sorted points; 0 for an empty curve.
pub fn sample_curve(points: &[CurvePoint], t: f32) -> f32 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    if t <= first.time {
        return first.intensity;
    }
    if t >= last.time {
        return last.intensity;
    }
    // first index with time > t; 1..len by the guards above
    let hi = points.partition_point(|p| p.time <= t);
    let a = points[hi - 1];
    let b = points[hi];
    let span = b.time - a.time;
    if span <= TIME_EPSILON {
        return b.intensity;
    }
    let u = (t - a.time) / span;
    a.intensity + (b.intensity - a.intensity) * u
}

/// Sorted, de-duplicated union of every keyframe time.
pub fn keyframe_times<'a, I>(curves: I) -> Vec<f32>
where
    I: IntoIterator<Item = &'a [CurvePoint]>,
{
    let mut times: Vec<f32> = curves
        .into_iter()
        .flat_map(|pts| pts.iter())
        .filter(|p| p.time.is_finite())
        .map(|p| p.time.max(0.0))
        .collect();
    times.sort_by(f32::total_cmp);
    times.dedup_by(|b, a| (*b - *a).abs() <= TIME_EPSILON);
    times
}
