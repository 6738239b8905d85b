//! Engine: owns profile, AU state, rig, transitions and clip playback, and
//! flushes dirty output to the scene graph once per tick.

use hashbrown::{HashMap, HashSet};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::axis::Axis;
use crate::clip::{lerp_f32, lerp_vec3, nlerp_quat, Clip};
use crate::compose::{ComposedPose, Composer};
use crate::config::EngineConfig;
use crate::curve::CurveSet;
use crate::easing::Easing;
use crate::ids::{AuId, NodeId};
use crate::player::{ClipHandle, ClipMixer, ClipPlayer, MixerSample, PlaybackOptions};
use crate::procedural::{HairConfig, ImpulseClips};
use crate::profile::{MappingProfile, ProfileIndex};
use crate::resolve::{translation_total, Resolution, Resolver};
use crate::rig::{BoneSnapshot, Rig};
use crate::scene::{MorphCache, SceneGraph};
use crate::scheduler::{TransitionGroup, TransitionHandle, TransitionScheduler};
use crate::state::{sanitize, AuState};
use crate::synth::{SynthOptions, Synthesizer};

/// What a scheduled transition writes to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransitionTarget {
    Morph(String),
    Axis(NodeId, Axis),
    Translation(NodeId, usize),
}

impl TransitionTarget {
    fn key(&self) -> String {
        match self {
            TransitionTarget::Morph(name) => format!("morph:{name}"),
            TransitionTarget::Axis(id, axis) => format!("axis:{}:{}", id.0, axis.name()),
            TransitionTarget::Translation(id, c) => format!("translation:{}:{c}", id.0),
        }
    }
}

/// Counts from one `update`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStats {
    pub nodes_written: usize,
    pub morphs_written: usize,
    pub transitions_active: usize,
    pub clips_active: usize,
}

fn write_morph(morphs: &mut IndexMap<String, f32>, dirty: &mut IndexSet<String>, name: &str, w: f32) {
    let w = sanitize(w).max(0.0);
    match morphs.get_mut(name) {
        Some(slot) => *slot = w,
        None => {
            morphs.insert(name.to_string(), w);
        }
    }
    if !dirty.contains(name) {
        dirty.insert(name.to_string());
    }
}

/// Per-node clip contributions, in play order.
#[derive(Default)]
struct NodeBlend {
    orientation: Vec<(f32, [f32; 4])>,
    position: Vec<(f32, [f32; 3])>,
}

#[derive(Debug)]
pub struct Engine {
    cfg: EngineConfig,
    profile: MappingProfile,
    index: ProfileIndex,
    state: AuState,
    rig: Rig,
    bound: bool,
    // Bind pose per bone name, captured on first sight and kept across rebinds.
    baselines: IndexMap<String, BoneSnapshot>,

    morphs: IndexMap<String, f32>,
    morph_dirty: IndexSet<String>,
    morph_cache: MorphCache,

    scheduler: TransitionScheduler<TransitionTarget>,
    mixer: ClipMixer,
    // Targets written by clips on the previous tick; re-flushed when a clip lets go.
    clip_nodes: HashSet<NodeId>,
    clip_morphs: HashSet<String>,
}

impl Engine {
    pub fn new(profile: MappingProfile, cfg: EngineConfig) -> Self {
        let index = ProfileIndex::build(&profile);
        let rig = Rig::from_names(profile.node_names());
        Self {
            cfg,
            profile,
            index,
            state: AuState::new(),
            rig,
            bound: false,
            baselines: IndexMap::new(),
            morphs: IndexMap::new(),
            morph_dirty: IndexSet::new(),
            morph_cache: MorphCache::default(),
            scheduler: TransitionScheduler::new(),
            mixer: ClipMixer::new(),
            clip_nodes: HashSet::new(),
            clip_morphs: HashSet::new(),
        }
    }

    pub fn with_profile(profile: MappingProfile) -> Self {
        Self::new(profile, EngineConfig::default())
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    #[inline]
    pub fn profile(&self) -> &MappingProfile {
        &self.profile
    }

    #[inline]
    pub fn index(&self) -> &ProfileIndex {
        &self.index
    }

    #[inline]
    pub fn rig(&self) -> &Rig {
        &self.rig
    }

    #[inline]
    pub fn state(&self) -> &AuState {
        &self.state
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Swap the mapping profile. Current output is zeroed and the rig is
    /// rebuilt; it binds again on the next `update` or `bind`.
    ///
    /// Bind poses survive the swap, so the next bind writes every bone back
    /// to rest, including bones the new profile no longer drives.
    pub fn set_profile(&mut self, profile: MappingProfile) {
        log::debug!("switching profile '{}' -> '{}'", self.profile.name, profile.name);
        self.reset_to_neutral();
        self.index = ProfileIndex::build(&profile);
        self.rig = Rig::from_names(profile.node_names());
        self.profile = profile;
        self.morph_cache.clear();
        self.clip_nodes.clear();
        // Clip-only morphs fall back to live weight on the next flush.
        for name in self.clip_morphs.drain() {
            self.morph_dirty.insert(name);
        }
        self.bound = false;
    }

    /// Drop remembered bind poses. Call before binding to a different scene.
    pub fn clear_baselines(&mut self) {
        self.baselines.clear();
        self.bound = false;
    }

    /// Resolve rig nodes against the scene and capture their snapshots.
    ///
    /// A bone's snapshot is captured the first time its name is bound and
    /// reused afterwards. Rotation and translation state is rebuilt from the
    /// current AU state, and every node and known morph is written on the
    /// next flush.
    pub fn bind(&mut self, scene: &mut dyn SceneGraph) -> usize {
        self.morph_cache.clear();
        self.clip_nodes.clear();
        let bound = self.rig.bind(scene, &mut self.baselines);
        self.bound = true;
        self.rederive_rig();
        self.rig.mark_all_dirty();
        for name in self.morphs.keys() {
            if !self.morph_dirty.contains(name.as_str()) {
                self.morph_dirty.insert(name.clone());
            }
        }
        log::debug!(
            "bound {bound}/{} rig nodes for profile '{}'",
            self.rig.len(),
            self.profile.name
        );
        bound
    }

    /// Derive every composite axis and translation slot from AU state.
    fn rederive_rig(&mut self) {
        let state = &self.state;
        for (node, axes) in self.index.composite_nodes() {
            let Some(id) = self.rig.id(node) else {
                continue;
            };
            for (axis, resolved) in axes.iter() {
                self.rig.set_axis(id, axis, resolved.kind.value(|a| state.value(a)));
            }
        }
        for (slot, _) in self.index.translation_slots() {
            let Some(id) = self.rig.id(&slot.node) else {
                continue;
            };
            let offset = translation_total(&self.index, slot, |a| state.value(a), |a| state.balance(a));
            self.rig.set_translation(id, slot.component, offset);
        }
    }

    fn zero_morphs(&mut self) {
        let names: Vec<String> = self.morphs.keys().cloned().collect();
        for name in names {
            write_morph(&mut self.morphs, &mut self.morph_dirty, &name, 0.0);
        }
    }

    // ----- live control -------------------------------------------------

    /// Preview: update AU state and return derived outputs without applying them.
    pub fn resolve(&mut self, au: AuId, value: f32, balance: Option<f32>) -> Resolution {
        let resolver = Resolver::new(&self.profile, &self.index, self.cfg.default_mix_weight);
        resolver.resolve(&mut self.state, au, value, balance)
    }

    /// Set an AU and apply every derived output.
    pub fn set_au(&mut self, au: AuId, value: f32, balance: Option<f32>) -> Resolution {
        let res = self.resolve(au, value, balance);
        self.apply_resolution(&res);
        res
    }

    /// Signed control of a continuum pair.
    pub fn set_continuum(
        &mut self,
        negative: AuId,
        positive: AuId,
        value: f32,
        balance: Option<f32>,
    ) -> Resolution {
        let resolver = Resolver::new(&self.profile, &self.index, self.cfg.default_mix_weight);
        let res = resolver.resolve_continuum(&mut self.state, negative, positive, value, balance);
        self.apply_resolution(&res);
        res
    }

    /// Write a morph target directly, bypassing AU resolution.
    pub fn set_morph(&mut self, name: &str, weight: f32) {
        self.scheduler
            .cancel(&TransitionTarget::Morph(name.to_string()).key());
        write_morph(
            &mut self.morphs,
            &mut self.morph_dirty,
            name,
            sanitize(weight).clamp(0.0, 1.0),
        );
    }

    /// Apply a resolution to output state. Running transitions on the same
    /// targets are cancelled.
    pub fn apply_resolution(&mut self, res: &Resolution) {
        for m in &res.morphs {
            self.scheduler
                .cancel(&TransitionTarget::Morph(m.target.clone()).key());
            write_morph(&mut self.morphs, &mut self.morph_dirty, &m.target, m.weight);
        }
        for a in &res.axes {
            let Some(id) = self.rig.id(&a.node) else {
                continue;
            };
            self.scheduler.cancel(&TransitionTarget::Axis(id, a.axis).key());
            self.rig.set_axis(id, a.axis, a.value);
        }
        for t in &res.translations {
            let Some(id) = self.rig.id(&t.node) else {
                continue;
            };
            self.scheduler
                .cancel(&TransitionTarget::Translation(id, t.component).key());
            self.rig.set_translation(id, t.component, t.offset);
        }
    }

    // ----- transitions --------------------------------------------------

    pub fn transition_au(
        &mut self,
        au: AuId,
        target: f32,
        duration_ms: f32,
        balance: Option<f32>,
    ) -> TransitionGroup {
        self.transition_au_eased(au, target, duration_ms, balance, None)
    }

    /// Like [`Engine::transition_au`] with an explicit easing.
    ///
    /// AU state jumps to `target` immediately; outputs interpolate from
    /// their live values.
    pub fn transition_au_eased(
        &mut self,
        au: AuId,
        target: f32,
        duration_ms: f32,
        balance: Option<f32>,
        easing: Option<Easing>,
    ) -> TransitionGroup {
        let res = self.resolve(au, target, balance);
        self.schedule_resolution(&res, duration_ms, easing)
    }

    pub fn transition_continuum(
        &mut self,
        negative: AuId,
        positive: AuId,
        value: f32,
        duration_ms: f32,
        balance: Option<f32>,
    ) -> TransitionGroup {
        let resolver = Resolver::new(&self.profile, &self.index, self.cfg.default_mix_weight);
        let res = resolver.resolve_continuum(&mut self.state, negative, positive, value, balance);
        self.schedule_resolution(&res, duration_ms, None)
    }

    pub fn transition_morph(&mut self, name: &str, weight: f32, duration_ms: f32) -> TransitionHandle {
        let from = self.morph_weight(name);
        let target = TransitionTarget::Morph(name.to_string());
        let easing = self.cfg.default_easing;
        self.scheduler.start(
            target.key(),
            from,
            sanitize(weight).clamp(0.0, 1.0),
            duration_ms,
            Some(easing),
            target,
        )
    }

    fn schedule_resolution(
        &mut self,
        res: &Resolution,
        duration_ms: f32,
        easing: Option<Easing>,
    ) -> TransitionGroup {
        let easing = easing.unwrap_or(self.cfg.default_easing);
        let mut group = TransitionGroup::default();
        for m in &res.morphs {
            let from = self.morph_weight(&m.target);
            let target = TransitionTarget::Morph(m.target.clone());
            group.push(self.scheduler.start(
                target.key(),
                from,
                m.weight,
                duration_ms,
                Some(easing),
                target,
            ));
        }
        for a in &res.axes {
            let Some(id) = self.rig.id(&a.node) else {
                continue;
            };
            let from = self.rig.node(id).map_or(0.0, |n| n.axis(a.axis));
            let target = TransitionTarget::Axis(id, a.axis);
            group.push(self.scheduler.start(
                target.key(),
                from,
                a.value,
                duration_ms,
                Some(easing),
                target,
            ));
        }
        for t in &res.translations {
            let Some(id) = self.rig.id(&t.node) else {
                continue;
            };
            let from = self
                .rig
                .node(id)
                .and_then(|n| n.translation.get(t.component).copied())
                .unwrap_or(0.0);
            let target = TransitionTarget::Translation(id, t.component);
            group.push(self.scheduler.start(
                target.key(),
                from,
                t.offset,
                duration_ms,
                Some(easing),
                target,
            ));
        }
        group
    }

    /// Cancel transitions, stop clips and return every output to rest.
    pub fn reset_to_neutral(&mut self) {
        self.scheduler.cancel_all();
        self.mixer.stop_all();
        self.state.clear();
        self.zero_morphs();
        self.rig.reset_state();
    }

    // ----- clips --------------------------------------------------------

    /// Synthesis options seeded from the engine config.
    pub fn synth_options(&self) -> SynthOptions {
        let d = &self.cfg.synth;
        SynthOptions {
            intensity_scale: d.intensity_scale,
            snippet_category: d.snippet_category,
            auto_viseme_jaw: d.auto_viseme_jaw,
            jaw_scale: d.jaw_scale,
            ..Default::default()
        }
    }

    /// Live value per curve id (AU value or morph weight), for `inherit` keyframes.
    pub fn inherited_values(&self, curves: &CurveSet) -> IndexMap<String, f32> {
        curves
            .keys()
            .map(|id| {
                let v = match AuId::parse(id) {
                    Some(au) => self.state.value(au),
                    None => self.morph_weight(id),
                };
                (id.clone(), v)
            })
            .collect()
    }

    pub fn synthesizer(&self) -> Synthesizer<'_> {
        Synthesizer::new(&self.profile, &self.index, &self.rig, self.cfg.default_mix_weight)
    }

    pub fn synthesize(&self, curves: &CurveSet, options: &SynthOptions) -> Option<Clip> {
        self.synthesizer().synthesize(curves, options)
    }

    pub fn play_clip(&mut self, clip: Clip, options: PlaybackOptions) -> ClipHandle {
        self.mixer.play(clip, options)
    }

    pub fn mixer_mut(&mut self) -> &mut ClipMixer {
        &mut self.mixer
    }

    /// Bake the three hair impulse clips against this engine's rig.
    pub fn bake_impulses(&self, cfg: &HairConfig) -> Option<ImpulseClips> {
        ImpulseClips::bake(&self.synthesizer(), cfg)
    }

    // ----- accessors ----------------------------------------------------

    pub fn au_value(&self, au: AuId) -> f32 {
        self.state.value(au)
    }

    pub fn au_balance(&self, au: AuId) -> f32 {
        self.state.balance(au)
    }

    /// Live (pre-clip) morph weight.
    pub fn morph_weight(&self, name: &str) -> f32 {
        self.morphs.get(name).copied().unwrap_or(0.0)
    }

    /// `[pitch, yaw, roll]` of a rig node.
    pub fn rotation(&self, node: &str) -> Option<[f32; 3]> {
        self.rig.node_by_name(node).map(|n| n.rotation)
    }

    pub fn axis(&self, node: &str, axis: Axis) -> Option<f32> {
        self.rig.node_by_name(node).map(|n| n.axis(axis))
    }

    /// Live composed pose of a node, without clip contributions.
    pub fn pose(&self, node: &str) -> Option<ComposedPose> {
        let record = self.rig.node_by_name(node)?;
        Some(Composer::new(&self.profile, &self.index).compose(record, &self.state))
    }

    pub fn active_transitions(&self) -> usize {
        self.scheduler.len()
    }

    // ----- tick ---------------------------------------------------------

    /// Advance transitions by `dt` seconds, advance clips, then flush dirty
    /// nodes and morphs to `scene`. Binds first if needed.
    pub fn update(&mut self, dt: f32, scene: &mut dyn SceneGraph) -> UpdateStats {
        if !self.bound {
            self.bind(scene);
        }
        let dt = sanitize(dt).max(0.0);

        {
            let morphs = &mut self.morphs;
            let morph_dirty = &mut self.morph_dirty;
            let rig = &mut self.rig;
            self.scheduler.update(dt * 1000.0, |target, v| match target {
                TransitionTarget::Morph(name) => write_morph(morphs, morph_dirty, name, v),
                TransitionTarget::Axis(id, axis) => rig.set_axis(*id, *axis, v),
                TransitionTarget::Translation(id, c) => rig.set_translation(*id, *c, v),
            });
        }

        let samples = self.mixer.advance(dt);
        let (node_blends, morph_blends) = self.collect_clip_blends(&samples);

        let mut stats = UpdateStats {
            nodes_written: self.flush_nodes(scene, &node_blends),
            ..Default::default()
        };
        stats.morphs_written = self.flush_morphs(scene, &morph_blends);
        stats.transitions_active = self.scheduler.len();
        stats.clips_active = self.mixer.len();
        stats
    }

    fn collect_clip_blends(
        &mut self,
        samples: &[MixerSample],
    ) -> (HashMap<NodeId, NodeBlend>, IndexMap<String, Vec<(f32, f32)>>) {
        let mut nodes: HashMap<NodeId, NodeBlend> = HashMap::new();
        let mut morphs: IndexMap<String, Vec<(f32, f32)>> = IndexMap::new();
        for s in samples {
            for (name, q) in &s.sample.orientations {
                if let Some(id) = self.rig.id(name) {
                    nodes.entry(id).or_default().orientation.push((s.weight, *q));
                }
            }
            for (name, p) in &s.sample.positions {
                if let Some(id) = self.rig.id(name) {
                    nodes.entry(id).or_default().position.push((s.weight, *p));
                }
            }
            for (name, v) in &s.sample.morphs {
                morphs.entry(name.clone()).or_default().push((s.weight, *v));
            }
        }

        // Targets a clip released since last tick go back to live output.
        let released: Vec<NodeId> = self
            .clip_nodes
            .iter()
            .filter(|id| !nodes.contains_key(*id))
            .copied()
            .collect();
        for id in released {
            self.rig.mark_dirty(id);
        }
        self.clip_nodes = nodes.keys().copied().collect();

        let released: Vec<String> = self
            .clip_morphs
            .iter()
            .filter(|name| !morphs.contains_key(name.as_str()))
            .cloned()
            .collect();
        for name in released {
            self.morph_dirty.insert(name);
        }
        self.clip_morphs = morphs.keys().cloned().collect();

        (nodes, morphs)
    }

    fn flush_nodes(&mut self, scene: &mut dyn SceneGraph, blends: &HashMap<NodeId, NodeBlend>) -> usize {
        let mut ids = self.rig.take_dirty();
        for id in blends.keys() {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        let composer = Composer::new(&self.profile, &self.index);
        let mut written = 0;
        for id in ids {
            let Some(record) = self.rig.node(id) else {
                continue;
            };
            let Some(bone) = record.bone else {
                let name = record.name.clone();
                if self.cfg.warn_missing && self.rig.note_missing(id) {
                    log::warn!("bone '{name}' not found in scene; skipping");
                }
                continue;
            };
            let mut pose = composer.compose(record, &self.state);
            if let Some(blend) = blends.get(&id) {
                for &(w, q) in &blend.orientation {
                    pose.orientation = nlerp_quat(pose.orientation, q, w);
                }
                for &(w, p) in &blend.position {
                    pose.position = lerp_vec3(pose.position, p, w);
                }
            }
            scene.set_local_orientation(bone, pose.orientation);
            scene.set_local_position(bone, pose.position);
            written += 1;
        }
        written
    }

    fn flush_morphs(
        &mut self,
        scene: &mut dyn SceneGraph,
        blends: &IndexMap<String, Vec<(f32, f32)>>,
    ) -> usize {
        let mut names: Vec<String> = self.morph_dirty.drain(..).collect();
        for name in blends.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        let mut written = 0;
        for name in names {
            let mut w = self.morph_weight(&name);
            if let Some(layers) = blends.get(&name) {
                for &(weight, v) in layers {
                    w = lerp_f32(w, v, weight);
                }
            }
            if self
                .morph_cache
                .write(scene, &name, w, self.cfg.warn_missing)
            {
                written += 1;
            }
        }
        written
    }
}
