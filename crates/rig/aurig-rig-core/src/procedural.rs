//! Procedural secondary motion expressed as ordinary curve sets.
//!
//! Idle sway and head-reactive impulses are generated as curves on three
//! hair channels (left, right, front) and baked by the synthesizer like any
//! authored snippet. Impulses are baked once per direction and retriggered
//! through the clip player.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::clip::{Clip, LoopMode};
use crate::curve::{CurvePoint, CurveSet};
use crate::player::{ClipHandle, ClipPlayer, PlaybackOptions};
use crate::synth::{SynthOptions, Synthesizer};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HairConfig {
    pub left_channel: String,
    pub right_channel: String,
    pub front_channel: String,
    pub sway_amplitude: f32,
    /// Hz
    pub sway_frequency: f32,
    pub wind_strength: f32,
    /// Hz
    pub wind_frequency: f32,
    pub turbulence: f32,
    /// Front channel gain on the wind magnitude.
    pub front_gain: f32,
    /// Samples per second for generated curves.
    pub sample_rate: f32,
    /// Seconds of idle loop.
    pub idle_duration: f32,
    /// rad/s
    pub impulse_omega: f32,
    pub impulse_decay: f32,
    pub impulse_duration: f32,
    /// Minimum per-sample head delta (normalized axis units) that triggers.
    pub impulse_threshold: f32,
    /// Head delta → clip weight gain.
    pub impulse_sensitivity: f32,
}

impl Default for HairConfig {
    fn default() -> Self {
        Self {
            left_channel: "hair_L".to_string(),
            right_channel: "hair_R".to_string(),
            front_channel: "hair_F".to_string(),
            sway_amplitude: 0.15,
            sway_frequency: 0.25,
            wind_strength: 0.1,
            wind_frequency: 0.4,
            turbulence: 0.3,
            front_gain: 0.5,
            sample_rate: 30.0,
            idle_duration: 8.0,
            impulse_omega: 12.0,
            impulse_decay: 4.0,
            impulse_duration: 1.5,
            impulse_threshold: 0.02,
            impulse_sensitivity: 4.0,
        }
    }
}

impl HairConfig {
    fn sample_times(&self, duration: f32) -> Vec<f32> {
        let rate = if self.sample_rate.is_finite() && self.sample_rate > 0.0 {
            self.sample_rate
        } else {
            30.0
        };
        // Non-finite durations collapse to zero.
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        let steps = (duration * rate).ceil().max(1.0) as usize;
        (0..=steps)
            .map(|i| (i as f32 / rate).min(duration))
            .collect()
    }

    /// Wind term at time `t`.
    pub fn wind(&self, t: f32) -> f32 {
        let fw = self.wind_frequency;
        self.wind_strength
            * ((TAU * fw * t).sin()
                + 0.5 * (TAU * 1.7 * fw * t).sin()
                + self.turbulence * (TAU * 4.3 * fw * t).sin())
    }

    /// Signed idle displacement at time `t`.
    pub fn idle(&self, t: f32) -> f32 {
        self.sway_amplitude * (TAU * self.sway_frequency * t).sin() + self.wind(t)
    }
}

/// Split a signed value into two unsigned channels.
#[inline]
pub fn split_signed(x: f32) -> (f32, f32) {
    (x.max(0.0), (-x).max(0.0))
}

fn push_points(set: &mut CurveSet, channel: &str, points: Vec<CurvePoint>) {
    set.insert(channel.to_string(), points);
}

/// Looping idle/wind sway on the left, right and front channels.
pub fn idle_wind_curves(cfg: &HairConfig) -> CurveSet {
    let times = cfg.sample_times(cfg.idle_duration);
    let mut left = Vec::with_capacity(times.len());
    let mut right = Vec::with_capacity(times.len());
    let mut front = Vec::with_capacity(times.len());
    for &t in &times {
        let (l, r) = split_signed(cfg.idle(t));
        left.push(CurvePoint::new(t, l));
        right.push(CurvePoint::new(t, r));
        front.push(CurvePoint::new(t, cfg.wind(t).abs() * cfg.front_gain));
    }
    for channel in [&mut left, &mut right, &mut front] {
        let Some(first) = channel.first().map(|p| p.intensity) else {
            continue;
        };
        if let Some(last) = channel.last_mut() {
            last.intensity = first;
        }
    }
    let mut set = CurveSet::new();
    push_points(&mut set, &cfg.left_channel, left);
    push_points(&mut set, &cfg.right_channel, right);
    push_points(&mut set, &cfg.front_channel, front);
    set
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImpulseDirection {
    Left,
    Right,
    Front,
}

impl ImpulseDirection {
    pub const ALL: [ImpulseDirection; 3] = [Self::Left, Self::Right, Self::Front];

    #[inline]
    fn slot(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
            Self::Front => 2,
        }
    }
}

/// Damped cosine `cos(ωt)·e^(−decay·t)`.
#[inline]
pub fn impulse(cfg: &HairConfig, t: f32) -> f32 {
    (cfg.impulse_omega * t).cos() * (-cfg.impulse_decay * t).exp()
}

/// Unit-amplitude impulse for one direction. Sideways impulses swing back
/// through the opposite channel; the front impulse keeps only its forward lobes.
pub fn impulse_curves(direction: ImpulseDirection, cfg: &HairConfig) -> CurveSet {
    let times = cfg.sample_times(cfg.impulse_duration);
    let (primary, opposite) = match direction {
        ImpulseDirection::Left => (&cfg.left_channel, Some(&cfg.right_channel)),
        ImpulseDirection::Right => (&cfg.right_channel, Some(&cfg.left_channel)),
        ImpulseDirection::Front => (&cfg.front_channel, None),
    };
    let mut a = Vec::with_capacity(times.len());
    let mut b = Vec::with_capacity(times.len());
    for &t in &times {
        let (pos, neg) = split_signed(impulse(cfg, t));
        a.push(CurvePoint::new(t, pos));
        b.push(CurvePoint::new(t, neg));
    }
    let mut set = CurveSet::new();
    push_points(&mut set, primary, a);
    if let Some(opposite) = opposite {
        push_points(&mut set, opposite, b);
    }
    set
}

/// A detected head motion pulse.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpulseTrigger {
    pub direction: ImpulseDirection,
    pub weight: f32,
}

/// Turns per-sample head deltas into impulse triggers.
///
/// Steady rotation produces no delta and therefore no trigger.
#[derive(Clone, Debug, Default)]
pub struct HeadImpulseTracker {
    last: Option<(f32, f32)>,
    threshold: f32,
    sensitivity: f32,
}

impl HeadImpulseTracker {
    pub fn new(cfg: &HairConfig) -> Self {
        Self {
            last: None,
            threshold: cfg.impulse_threshold.max(0.0),
            sensitivity: cfg.impulse_sensitivity,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Feed the current head yaw and pitch axis values.
    ///
    /// Turning the head one way throws the hair the other way; pitch changes
    /// trigger the front impulse.
    pub fn observe(&mut self, yaw: f32, pitch: f32) -> Option<ImpulseTrigger> {
        let previous = self.last.replace((yaw, pitch))?;
        let dy = yaw - previous.0;
        let dp = pitch - previous.1;
        let magnitude = dy.abs().max(dp.abs());
        if !magnitude.is_finite() || magnitude < self.threshold || magnitude == 0.0 {
            return None;
        }
        let direction = if dy.abs() >= dp.abs() {
            if dy > 0.0 {
                ImpulseDirection::Left
            } else {
                ImpulseDirection::Right
            }
        } else {
            ImpulseDirection::Front
        };
        Some(ImpulseTrigger {
            direction,
            weight: (magnitude * self.sensitivity).clamp(0.0, 1.0),
        })
    }
}

/// Pre-baked impulse clips plus their live playback handles.
#[derive(Debug)]
pub struct ImpulseClips {
    clips: [Clip; 3],
    handles: [Option<ClipHandle>; 3],
}

impl ImpulseClips {
    /// Bake all three directions. `None` if any direction bakes empty.
    pub fn bake(synth: &Synthesizer<'_>, cfg: &HairConfig) -> Option<Self> {
        let bake_one = |direction: ImpulseDirection| {
            let options = SynthOptions {
                name: format!("hair-impulse-{direction:?}").to_lowercase(),
                loop_mode: LoopMode::Once,
                ..Default::default()
            };
            synth.synthesize(&impulse_curves(direction, cfg), &options)
        };
        Some(Self {
            clips: [
                bake_one(ImpulseDirection::Left)?,
                bake_one(ImpulseDirection::Right)?,
                bake_one(ImpulseDirection::Front)?,
            ],
            handles: [None, None, None],
        })
    }

    pub fn clip(&self, direction: ImpulseDirection) -> &Clip {
        &self.clips[direction.slot()]
    }

    pub fn handle(&self, direction: ImpulseDirection) -> Option<&ClipHandle> {
        self.handles[direction.slot()].as_ref()
    }

    /// Set the clip weight and restart it from 0. A clip that already ran
    /// to completion is replayed from the stored bake.
    pub fn trigger(&mut self, player: &mut dyn ClipPlayer, trigger: ImpulseTrigger) -> ClipHandle {
        let slot = trigger.direction.slot();
        if let Some(h) = &self.handles[slot] {
            if !h.state().is_terminal() {
                h.set_weight(trigger.weight);
                h.restart();
                return h.clone();
            }
        }
        let handle = player.play(
            self.clips[slot].clone(),
            PlaybackOptions {
                weight: trigger.weight,
                start_time: Some(0.0),
                ..Default::default()
            },
        );
        self.handles[slot] = Some(handle.clone());
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::ClipMixer;
    use crate::profile::{MappingProfile, ProfileIndex};
    use crate::rig::Rig;

    #[test]
    fn non_finite_durations_sample_a_single_instant() {
        let cfg = HairConfig {
            sample_rate: f32::INFINITY,
            ..Default::default()
        };
        for d in [f32::INFINITY, f32::NEG_INFINITY, f32::NAN] {
            let times = cfg.sample_times(d);
            assert_eq!(times.len(), 2);
            assert!(times.iter().all(|&t| t == 0.0));
        }
        assert_eq!(HairConfig::default().sample_times(1.0).len(), 31);
    }

    #[test]
    fn idle_curves_loop_seamlessly() {
        let cfg = HairConfig::default();
        let set = idle_wind_curves(&cfg);
        assert_eq!(set.len(), 3);
        for points in set.values() {
            let first = points.first().unwrap();
            let last = points.last().unwrap();
            assert_eq!(first.intensity, last.intensity);
            assert!((last.time - cfg.idle_duration).abs() < 1e-4);
            assert!(points.iter().all(|p| p.intensity >= 0.0));
        }
    }

    #[test]
    fn left_and_right_are_never_both_active() {
        let set = idle_wind_curves(&HairConfig::default());
        let l = &set["hair_L"];
        let r = &set["hair_R"];
        assert!(l.iter().zip(r).all(|(a, b)| a.intensity == 0.0 || b.intensity == 0.0));
    }

    #[test]
    fn impulse_decays() {
        let cfg = HairConfig::default();
        let set = impulse_curves(ImpulseDirection::Left, &cfg);
        let left = &set["hair_L"];
        assert_eq!(left[0].intensity, 1.0);
        assert!(left.last().unwrap().intensity < 0.01);
        assert!(set.contains_key("hair_R"));
        let front = impulse_curves(ImpulseDirection::Front, &cfg);
        assert_eq!(front.len(), 1);
    }

    #[test]
    fn tracker_reacts_to_delta_not_pose() {
        let mut t = HeadImpulseTracker::new(&HairConfig::default());
        assert!(t.observe(0.5, 0.0).is_none());
        assert!(t.observe(0.5, 0.0).is_none());
        let hit = t.observe(0.6, 0.0).unwrap();
        assert_eq!(hit.direction, ImpulseDirection::Left);
        assert!((hit.weight - 0.4).abs() < 1e-5);
        let hit = t.observe(0.6, -0.5).unwrap();
        assert_eq!(hit.direction, ImpulseDirection::Front);
        assert_eq!(hit.weight, 1.0);
        assert_eq!(t.observe(0.1, -0.5).unwrap().direction, ImpulseDirection::Right);
    }

    #[test]
    fn retrigger_restarts_the_same_clip() {
        let profile = MappingProfile::default();
        let index = ProfileIndex::build(&profile);
        let rig = Rig::default();
        let synth = Synthesizer::new(&profile, &index, &rig, 1.0);
        let mut clips = ImpulseClips::bake(&synth, &HairConfig::default()).unwrap();
        let mut mixer = ClipMixer::new();
        let trig = ImpulseTrigger {
            direction: ImpulseDirection::Right,
            weight: 0.3,
        };
        let first = clips.trigger(&mut mixer, trig);
        mixer.advance(0.5);
        let again = clips.trigger(
            &mut mixer,
            ImpulseTrigger {
                weight: 0.8,
                ..trig
            },
        );
        assert_eq!(first.id(), again.id());
        assert_eq!(again.time(), 0.0);
        assert_eq!(again.weight(), 0.8);
        assert_eq!(mixer.len(), 1);
    }
}
