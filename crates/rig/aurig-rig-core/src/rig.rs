//! Rig arena: one plain record per bone node referenced by the profile.
//!
//! Records hold the bind-time snapshot plus the mutable rotation/translation
//! state. Writes mark the record dirty; the engine flushes the dirty list
//! once per tick.

use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;

use crate::axis::Axis;
use crate::ids::NodeId;
use crate::scene::{BoneRef, SceneGraph};

pub const IDENTITY_QUAT: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Baseline transform captured the first time a bone is bound. Never mutated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneSnapshot {
    pub base_position: [f32; 3],
    /// `[x, y, z, w]`
    pub base_orientation: [f32; 4],
}

impl Default for BoneSnapshot {
    fn default() -> Self {
        Self {
            base_position: [0.0; 3],
            base_orientation: IDENTITY_QUAT,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeRecord {
    pub name: String,
    /// Host handle; `None` until bound or when the host lacks the bone.
    pub bone: Option<BoneRef>,
    pub snapshot: BoneSnapshot,
    /// `[pitch, yaw, roll]`, each in [-1, 1].
    pub rotation: [f32; 3],
    /// Accumulated translation offsets `[x, y, z]`.
    pub translation: [f32; 3],
}

impl NodeRecord {
    fn new(name: String) -> Self {
        Self {
            name,
            bone: None,
            snapshot: BoneSnapshot::default(),
            rotation: [0.0; 3],
            translation: [0.0; 3],
        }
    }

    #[inline]
    pub fn axis(&self, axis: Axis) -> f32 {
        self.rotation[axis.index()]
    }
}

#[derive(Debug, Default)]
pub struct Rig {
    nodes: Vec<NodeRecord>,
    by_name: HashMap<String, NodeId>,
    dirty: Vec<NodeId>,
    dirty_flags: Vec<bool>,
    warned: HashSet<NodeId>,
}

impl Rig {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rig = Rig::default();
        for name in names {
            let name = name.into();
            if rig.by_name.contains_key(&name) {
                continue;
            }
            let id = NodeId(rig.nodes.len() as u32);
            rig.by_name.insert(name.clone(), id);
            rig.nodes.push(NodeRecord::new(name));
            rig.dirty_flags.push(false);
        }
        rig
    }

    #[inline]
    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id.index())
    }

    pub fn node_by_name(&self, name: &str) -> Option<&NodeRecord> {
        self.id(name).and_then(|id| self.node(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodeRecord)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Resolve every node against the scene and take its snapshot from
    /// `baselines`, capturing from the scene only for names not seen before.
    /// Baselines of bones this rig no longer holds are written back to the
    /// scene and forgotten.
    ///
    /// Clears all rotation/translation state. Returns the number of bound nodes.
    pub(crate) fn bind(
        &mut self,
        scene: &mut dyn SceneGraph,
        baselines: &mut IndexMap<String, BoneSnapshot>,
    ) -> usize {
        self.warned.clear();
        let by_name = &self.by_name;
        baselines.retain(|name, snapshot| {
            if by_name.contains_key(name.as_str()) {
                return true;
            }
            if let Some(bone) = scene.resolve_bone(name) {
                scene.set_local_position(bone, snapshot.base_position);
                scene.set_local_orientation(bone, snapshot.base_orientation);
            }
            false
        });
        let mut bound = 0;
        for node in &mut self.nodes {
            node.rotation = [0.0; 3];
            node.translation = [0.0; 3];
            node.bone = scene.resolve_bone(&node.name);
            node.snapshot = match node.bone {
                Some(bone) => {
                    bound += 1;
                    *baselines
                        .entry(node.name.clone())
                        .or_insert_with(|| BoneSnapshot {
                            base_position: scene.local_position(bone),
                            base_orientation: scene.local_orientation(bone),
                        })
                }
                None => BoneSnapshot::default(),
            };
        }
        self.dirty.clear();
        self.dirty_flags.iter_mut().for_each(|f| *f = false);
        bound
    }

    pub(crate) fn mark_dirty(&mut self, id: NodeId) {
        if let Some(flag) = self.dirty_flags.get_mut(id.index()) {
            if !*flag {
                *flag = true;
                self.dirty.push(id);
            }
        }
    }

    pub(crate) fn mark_all_dirty(&mut self) {
        for i in 0..self.nodes.len() {
            self.mark_dirty(NodeId(i as u32));
        }
    }

    pub(crate) fn take_dirty(&mut self) -> Vec<NodeId> {
        for id in &self.dirty {
            self.dirty_flags[id.index()] = false;
        }
        std::mem::take(&mut self.dirty)
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.dirty_flags.get(id.index()).copied().unwrap_or(false)
    }

    pub(crate) fn set_axis(&mut self, id: NodeId, axis: Axis, value: f32) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.rotation[axis.index()] = crate::state::sanitize(value).clamp(-1.0, 1.0);
            self.mark_dirty(id);
        }
    }

    pub(crate) fn set_translation(&mut self, id: NodeId, component: usize, offset: f32) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            if let Some(slot) = node.translation.get_mut(component) {
                *slot = crate::state::sanitize(offset);
                self.mark_dirty(id);
            }
        }
    }

    /// Zero rotation/translation state; every node is re-flushed next tick.
    pub(crate) fn reset_state(&mut self) {
        for node in &mut self.nodes {
            node.rotation = [0.0; 3];
            node.translation = [0.0; 3];
        }
        self.mark_all_dirty();
    }

    /// Returns true the first time an unbound node is reported.
    pub(crate) fn note_missing(&mut self, id: NodeId) -> bool {
        self.warned.insert(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MemoryScene;

    #[test]
    fn names_are_deduplicated_and_stable() {
        let rig = Rig::from_names(["HEAD", "JAW", "HEAD"]);
        assert_eq!(rig.len(), 2);
        assert_eq!(rig.id("HEAD"), Some(NodeId(0)));
        assert_eq!(rig.id("JAW"), Some(NodeId(1)));
        assert_eq!(rig.id("EYE_L"), None);
    }

    #[test]
    fn bind_captures_snapshot_and_clears_state() {
        let mut scene = MemoryScene::new().with_bone("HEAD", [0.0, 1.6, 0.0], IDENTITY_QUAT);
        let mut rig = Rig::from_names(["HEAD", "TAIL"]);
        let head = rig.id("HEAD").unwrap();
        rig.set_axis(head, Axis::Yaw, 0.5);
        let mut baselines = IndexMap::new();
        assert_eq!(rig.bind(&mut scene, &mut baselines), 1);
        let rec = rig.node(head).unwrap();
        assert_eq!(rec.snapshot.base_position, [0.0, 1.6, 0.0]);
        assert_eq!(rec.axis(Axis::Yaw), 0.0);
        assert!(rig.node_by_name("TAIL").unwrap().bone.is_none());
        assert!(!rig.is_dirty(head));
        assert_eq!(baselines.len(), 1);
    }

    #[test]
    fn rebind_reuses_baselines_and_restores_dropped_bones() {
        let mut scene = MemoryScene::new()
            .with_bone("HEAD", [0.0, 1.6, 0.0], IDENTITY_QUAT)
            .with_bone("JAW", [0.0, -0.05, 0.0], IDENTITY_QUAT);
        let mut baselines = IndexMap::new();
        let mut rig = Rig::from_names(["HEAD", "JAW"]);
        rig.bind(&mut scene, &mut baselines);

        let posed = [0.0, 0.5, 0.0, 0.866_025_4];
        let head = scene.resolve_bone("HEAD").unwrap();
        let jaw = scene.resolve_bone("JAW").unwrap();
        scene.set_local_orientation(head, posed);
        scene.set_local_position(jaw, [0.0, -0.1, 0.0]);

        let mut rig = Rig::from_names(["HEAD"]);
        rig.bind(&mut scene, &mut baselines);
        assert_eq!(rig.node_by_name("HEAD").unwrap().snapshot.base_orientation, IDENTITY_QUAT);
        assert_eq!(scene.bone("JAW").unwrap().position, [0.0, -0.05, 0.0]);
        assert!(!baselines.contains_key("JAW"));
    }

    #[test]
    fn dirty_list_holds_each_node_once() {
        let mut rig = Rig::from_names(["A", "B"]);
        let a = rig.id("A").unwrap();
        rig.set_axis(a, Axis::Pitch, 2.0);
        rig.set_axis(a, Axis::Roll, -0.25);
        assert_eq!(rig.node(a).unwrap().rotation, [1.0, 0.0, -0.25]);
        assert_eq!(rig.take_dirty(), vec![a]);
        assert!(rig.take_dirty().is_empty());
    }
}
