#![allow(dead_code)]
//! aurig rig core (engine-agnostic)
//!
//! Action-unit (AU) driven character rigging. One scalar AU value fans out
//! through a [`MappingProfile`] into bilateral morph weights, composite bone
//! rotations and translations. The same resolution and composition code runs
//! live through [`Engine`] and offline through the clip [`Synthesizer`].
//!
//! Hosts plug in through two traits: [`SceneGraph`] for bones and morph
//! targets, and optionally [`ClipPlayer`] for baked clip playback.

pub mod axis;
pub mod clip;
pub mod completion;
pub mod compose;
pub mod config;
pub mod curve;
pub mod easing;
pub mod engine;
pub mod error;
pub mod ids;
pub mod player;
pub mod procedural;
pub mod profile;
pub mod resolve;
pub mod rig;
pub mod scene;
pub mod scheduler;
pub mod state;
pub mod synth;

// Re-exports for hosts
pub use axis::{Axis, AxisKind, NodeAxes};
pub use clip::{Clip, ClipSample, ClipTrack, LoopMode};
pub use completion::{AllCompletions, Completion};
pub use compose::{ComposedPose, Composer};
pub use config::{EngineConfig, SynthDefaults};
pub use curve::{sample_curve, CurvePoint, CurveSet};
pub use easing::Easing;
pub use engine::{Engine, TransitionTarget, UpdateStats};
pub use error::ProfileError;
pub use ids::{AuId, ClipId, NodeId, TransitionId};
pub use player::{
    ClipHandle, ClipMixer, ClipPlayer, PlaybackOptions, PlaybackOutcome, PlaybackState,
};
pub use procedural::{
    idle_wind_curves, impulse_curves, HairConfig, HeadImpulseTracker, ImpulseClips,
    ImpulseDirection, ImpulseTrigger,
};
pub use profile::{
    parse_profile_json, BoneBinding, Channel, MappingProfile, MorphBindings, ProfileIndex, Side,
    TranslationRef,
};
pub use resolve::{compute_side_values, Resolution, Resolver};
pub use rig::{BoneSnapshot, Rig};
pub use scene::{BoneRef, MemoryScene, MeshRef, SceneGraph};
pub use scheduler::{
    TransitionGroup, TransitionHandle, TransitionOutcome, TransitionScheduler, TransitionState,
};
pub use state::AuState;
pub use synth::{SnippetCategory, SynthOptions, Synthesizer};
