//! Clip playback contract and the built-in mixer.
//!
//! Hosts with their own animation system implement [`ClipPlayer`]; the
//! engine drives a [`ClipMixer`] from its tick otherwise. Time is in seconds.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::clip::{Clip, ClipSample, LoopMode};
use crate::completion::Completion;
use crate::ids::{ClipId, IdAllocator};
use crate::state::sanitize;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackOptions {
    /// Overrides the clip's own loop mode when set.
    pub loop_mode: Option<LoopMode>,
    pub weight: f32,
    /// Negative rates play backwards, starting from the end.
    pub rate: f32,
    pub start_time: Option<f32>,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            loop_mode: None,
            weight: 1.0,
            rate: 1.0,
            start_time: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
    Finished,
}

impl PlaybackState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Finished)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackOutcome {
    Finished,
    Stopped,
}

/// Contract between the engine and whatever plays baked clips.
pub trait ClipPlayer {
    fn play(&mut self, clip: Clip, options: PlaybackOptions) -> ClipHandle;
}

#[derive(Debug)]
struct Playback {
    state: PlaybackState,
    /// Unwrapped playhead; `time` is derived from it by loop mode.
    phase: f32,
    time: f32,
    duration: f32,
    weight: f32,
    rate: f32,
    loop_mode: LoopMode,
}

impl Playback {
    fn start_phase(&self) -> f32 {
        if self.rate < 0.0 {
            self.duration
        } else {
            0.0
        }
    }
}

/// Shared control surface for one playing clip.
#[derive(Clone, Debug)]
pub struct ClipHandle {
    id: ClipId,
    shared: Rc<RefCell<Playback>>,
    completion: Completion<PlaybackOutcome>,
}

impl ClipHandle {
    #[inline]
    pub fn id(&self) -> ClipId {
        self.id
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.borrow().state
    }

    /// Clip-local time in seconds.
    pub fn time(&self) -> f32 {
        self.shared.borrow().time
    }

    pub fn duration(&self) -> f32 {
        self.shared.borrow().duration
    }

    pub fn weight(&self) -> f32 {
        self.shared.borrow().weight
    }

    pub fn rate(&self) -> f32 {
        self.shared.borrow().rate
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.shared.borrow().loop_mode
    }

    /// Resume a paused clip. Terminal handles stay terminal; use `restart`.
    pub fn play(&self) {
        self.resume();
    }

    pub fn pause(&self) {
        let mut p = self.shared.borrow_mut();
        if p.state == PlaybackState::Playing {
            p.state = PlaybackState::Paused;
        }
    }

    pub fn resume(&self) {
        let mut p = self.shared.borrow_mut();
        if p.state == PlaybackState::Paused {
            p.state = PlaybackState::Playing;
        }
    }

    pub fn stop(&self) {
        {
            let mut p = self.shared.borrow_mut();
            if p.state.is_terminal() {
                return;
            }
            p.state = PlaybackState::Stopped;
        }
        self.completion.settle(PlaybackOutcome::Stopped);
    }

    /// Jump back to the start (the end for negative rates) and play.
    ///
    /// A handle the mixer already dropped cannot be revived.
    pub fn restart(&self) {
        let mut p = self.shared.borrow_mut();
        if p.state.is_terminal() {
            return;
        }
        p.phase = p.start_phase();
        p.time = p.phase;
        p.state = PlaybackState::Playing;
    }

    pub fn set_weight(&self, weight: f32) {
        self.shared.borrow_mut().weight = sanitize(weight).clamp(0.0, 1.0);
    }

    pub fn set_rate(&self, rate: f32) {
        self.shared.borrow_mut().rate = sanitize(rate);
    }

    pub fn set_loop_mode(&self, mode: LoopMode) {
        self.shared.borrow_mut().loop_mode = mode;
    }

    /// Settles when a `Once` clip reaches its end or the clip is stopped.
    pub fn completion(&self) -> Completion<PlaybackOutcome> {
        self.completion.clone()
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.completion.is_settled()
    }
}

fn fmod(a: f32, b: f32) -> f32 {
    if b == 0.0 {
        return 0.0;
    }
    let m = a % b;
    if (m < 0.0 && b > 0.0) || (m > 0.0 && b < 0.0) {
        m + b
    } else {
        m
    }
}

/// Reflect `t` into `[0, span]`; the period is `2 * span`.
fn ping_pong(t: f32, span: f32) -> f32 {
    if span <= 0.0 {
        return 0.0;
    }
    let m = fmod(t, 2.0 * span);
    if m <= span {
        m
    } else {
        2.0 * span - m
    }
}

/// One clip's contribution to a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct MixerSample {
    pub clip: ClipId,
    pub weight: f32,
    pub sample: ClipSample,
}

#[derive(Debug)]
struct MixerEntry {
    clip: Clip,
    handle: ClipHandle,
}

/// Plays any number of clips; later clips blend over earlier ones.
#[derive(Debug, Default)]
pub struct ClipMixer {
    entries: Vec<MixerEntry>,
    ids: IdAllocator,
}

impl ClipMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handle(&self, id: ClipId) -> Option<ClipHandle> {
        self.entries
            .iter()
            .find(|e| e.handle.id == id)
            .map(|e| e.handle.clone())
    }

    pub fn stop_all(&mut self) {
        for e in self.entries.drain(..) {
            e.handle.stop();
        }
    }

    /// Advance every clip by `dt` seconds and sample the live ones.
    ///
    /// `Once` clips are sampled at their end on the tick they finish, then
    /// dropped. Stopped clips are dropped without sampling.
    pub fn advance(&mut self, dt: f32) -> Vec<MixerSample> {
        let dt = sanitize(dt).max(0.0);
        let mut out = Vec::with_capacity(self.entries.len());
        self.entries.retain(|entry| {
            let finished = {
                let mut guard = entry.handle.shared.borrow_mut();
                let p = &mut *guard;
                match p.state {
                    PlaybackState::Stopped | PlaybackState::Finished => return false,
                    PlaybackState::Paused => false,
                    PlaybackState::Playing => {
                        p.phase += dt * p.rate;
                        let (time, done) = match p.loop_mode {
                            LoopMode::Once => {
                                let t = p.phase.clamp(0.0, p.duration);
                                let done = (p.rate >= 0.0 && p.phase >= p.duration)
                                    || (p.rate < 0.0 && p.phase <= 0.0);
                                (t, done)
                            }
                            LoopMode::Repeat => {
                                if p.duration > 0.0 {
                                    (fmod(p.phase, p.duration), false)
                                } else {
                                    (0.0, false)
                                }
                            }
                            LoopMode::PingPong => (ping_pong(p.phase, p.duration), false),
                        };
                        p.time = time;
                        if done {
                            p.state = PlaybackState::Finished;
                        }
                        done
                    }
                }
            };
            let (time, weight) = {
                let p = entry.handle.shared.borrow();
                (p.time, p.weight)
            };
            out.push(MixerSample {
                clip: entry.handle.id,
                weight,
                sample: entry.clip.sample(time),
            });
            if finished {
                entry.handle.completion.settle(PlaybackOutcome::Finished);
            }
            !finished
        });
        out
    }
}

impl ClipPlayer for ClipMixer {
    fn play(&mut self, clip: Clip, options: PlaybackOptions) -> ClipHandle {
        let duration = sanitize(clip.duration).max(0.0);
        let mut playback = Playback {
            state: PlaybackState::Playing,
            phase: 0.0,
            time: 0.0,
            duration,
            weight: sanitize(options.weight).clamp(0.0, 1.0),
            rate: sanitize(options.rate),
            loop_mode: options.loop_mode.unwrap_or(clip.loop_mode),
        };
        playback.phase = match options.start_time {
            Some(t) => sanitize(t).clamp(0.0, duration),
            None => playback.start_phase(),
        };
        playback.time = playback.phase;
        let handle = ClipHandle {
            id: self.ids.alloc_clip(),
            shared: Rc::new(RefCell::new(playback)),
            completion: Completion::new(),
        };
        log::debug!("playing clip '{}' ({:.3}s)", clip.name, duration);
        self.entries.push(MixerEntry {
            clip,
            handle: handle.clone(),
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipTrack;

    fn ramp(duration: f32) -> Clip {
        Clip {
            name: "ramp".into(),
            duration,
            loop_mode: LoopMode::Once,
            tracks: vec![ClipTrack::Morph {
                target: "m".into(),
                times: vec![0.0, duration],
                values: vec![0.0, 1.0],
            }],
        }
    }

    fn morph(samples: &[MixerSample]) -> f32 {
        samples[0].sample.morphs[0].1
    }

    #[test]
    fn once_finishes_and_settles() {
        let mut mixer = ClipMixer::new();
        let h = mixer.play(ramp(1.0), PlaybackOptions::default());
        let s = mixer.advance(0.5);
        assert!((morph(&s) - 0.5).abs() < 1e-6);
        let s = mixer.advance(0.75);
        assert_eq!(morph(&s), 1.0);
        assert_eq!(h.state(), PlaybackState::Finished);
        assert_eq!(h.completion().outcome(), Some(PlaybackOutcome::Finished));
        assert!(mixer.is_empty());
        assert!(mixer.advance(0.1).is_empty());
    }

    #[test]
    fn repeat_wraps_time() {
        let mut mixer = ClipMixer::new();
        let h = mixer.play(
            ramp(1.0),
            PlaybackOptions {
                loop_mode: Some(LoopMode::Repeat),
                ..Default::default()
            },
        );
        mixer.advance(1.25);
        assert!((h.time() - 0.25).abs() < 1e-5);
        assert!(!h.is_settled());
    }

    #[test]
    fn ping_pong_reflects() {
        let mut mixer = ClipMixer::new();
        let h = mixer.play(
            ramp(1.0),
            PlaybackOptions {
                loop_mode: Some(LoopMode::PingPong),
                ..Default::default()
            },
        );
        let s = mixer.advance(1.25);
        assert!((h.time() - 0.75).abs() < 1e-5);
        assert!((morph(&s) - 0.75).abs() < 1e-5);
        mixer.advance(1.0);
        assert!((h.time() - 0.25).abs() < 1e-5);
    }

    #[test]
    fn negative_rate_plays_backwards_from_end() {
        let mut mixer = ClipMixer::new();
        let h = mixer.play(
            ramp(1.0),
            PlaybackOptions {
                rate: -1.0,
                ..Default::default()
            },
        );
        assert_eq!(h.time(), 1.0);
        let s = mixer.advance(0.25);
        assert!((morph(&s) - 0.75).abs() < 1e-6);
        mixer.advance(1.0);
        assert_eq!(h.time(), 0.0);
        assert!(h.is_settled());
    }

    #[test]
    fn pause_holds_and_stop_settles() {
        let mut mixer = ClipMixer::new();
        let h = mixer.play(ramp(2.0), PlaybackOptions::default());
        mixer.advance(0.5);
        h.pause();
        let s = mixer.advance(1.0);
        assert_eq!(h.time(), 0.5);
        assert_eq!(s.len(), 1);
        h.stop();
        assert_eq!(h.completion().outcome(), Some(PlaybackOutcome::Stopped));
        assert!(mixer.advance(0.1).is_empty());
        assert!(mixer.is_empty());
    }

    #[test]
    fn restart_and_weight_controls() {
        let mut mixer = ClipMixer::new();
        let h = mixer.play(ramp(1.0), PlaybackOptions::default());
        mixer.advance(0.6);
        h.restart();
        assert_eq!(h.time(), 0.0);
        h.set_weight(4.0);
        let s = mixer.advance(0.1);
        assert_eq!(s[0].weight, 1.0);
        assert!((h.time() - 0.1).abs() < 1e-6);
    }
}
