//! Scene graph collaborator contract and an in-memory implementation.
//!
//! Hosts (game engines, web viewers) implement [`SceneGraph`] over their own
//! node and mesh storage. The engine resolves names once, caches the handles
//! and writes transforms and morph weights directly through the trait.

use hashbrown::{HashMap, HashSet};

/// Opaque host handle for a bone node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BoneRef(pub u32);

/// Opaque host handle for a mesh carrying blend shapes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MeshRef(pub u32);

/// Narrow view of a host scene.
///
/// Quaternions are `[x, y, z, w]`.
pub trait SceneGraph {
    fn resolve_bone(&mut self, name: &str) -> Option<BoneRef>;
    fn local_position(&self, bone: BoneRef) -> [f32; 3];
    fn local_orientation(&self, bone: BoneRef) -> [f32; 4];
    fn set_local_position(&mut self, bone: BoneRef, position: [f32; 3]);
    fn set_local_orientation(&mut self, bone: BoneRef, orientation: [f32; 4]);

    /// Meshes that may carry morph targets.
    fn meshes(&self) -> Vec<MeshRef>;
    /// Look up a blend shape by name in a mesh's morph dictionary.
    fn morph_index(&self, mesh: MeshRef, name: &str) -> Option<usize>;
    /// Live weight array of a mesh, mutated in place.
    fn morph_weights_mut(&mut self, mesh: MeshRef) -> Option<&mut [f32]>;
}

/// Resolved morph target locations keyed by morph name.
///
/// A name that resolves to nothing is cached as empty so the lookup and the
/// warning happen once.
#[derive(Debug, Default)]
pub(crate) struct MorphCache {
    targets: HashMap<String, Vec<(MeshRef, usize)>>,
    warned: HashSet<String>,
}

impl MorphCache {
    pub(crate) fn clear(&mut self) {
        self.targets.clear();
        self.warned.clear();
    }

    /// Write one morph weight to every mesh carrying it.
    pub(crate) fn write(
        &mut self,
        scene: &mut dyn SceneGraph,
        name: &str,
        weight: f32,
        warn_missing: bool,
    ) -> bool {
        if !self.targets.contains_key(name) {
            let mut found = Vec::new();
            for mesh in scene.meshes() {
                if let Some(idx) = scene.morph_index(mesh, name) {
                    found.push((mesh, idx));
                }
            }
            self.targets.insert(name.to_string(), found);
        }
        let Some(locations) = self.targets.get(name) else {
            return false;
        };
        if locations.is_empty() {
            if warn_missing && self.warned.insert(name.to_string()) {
                log::warn!("morph target '{name}' not found on any mesh; skipping");
            }
            return false;
        }
        for &(mesh, idx) in locations {
            if let Some(weights) = scene.morph_weights_mut(mesh) {
                if let Some(slot) = weights.get_mut(idx) {
                    *slot = weight;
                }
            }
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemoryBone {
    pub name: String,
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemoryMesh {
    pub name: String,
    pub morphs: Vec<String>,
    pub weights: Vec<f32>,
}

/// Flat in-memory scene. Useful for tests, benches and headless baking.
#[derive(Clone, Debug, Default)]
pub struct MemoryScene {
    bones: Vec<MemoryBone>,
    meshes: Vec<MemoryMesh>,
    /// Number of transform writes received, for observing flush behavior.
    pub transform_writes: usize,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bone(mut self, name: &str, position: [f32; 3], orientation: [f32; 4]) -> Self {
        self.bones.push(MemoryBone {
            name: name.to_string(),
            position,
            orientation,
        });
        self
    }

    pub fn with_mesh(mut self, name: &str, morphs: &[&str]) -> Self {
        self.meshes.push(MemoryMesh {
            name: name.to_string(),
            morphs: morphs.iter().map(|m| m.to_string()).collect(),
            weights: vec![0.0; morphs.len()],
        });
        self
    }

    pub fn bone(&self, name: &str) -> Option<&MemoryBone> {
        self.bones.iter().find(|b| b.name == name)
    }

    /// Weight of a morph on the first mesh that carries it.
    pub fn morph_weight(&self, name: &str) -> Option<f32> {
        self.meshes.iter().find_map(|m| {
            m.morphs
                .iter()
                .position(|n| n == name)
                .map(|idx| m.weights[idx])
        })
    }
}

impl SceneGraph for MemoryScene {
    fn resolve_bone(&mut self, name: &str) -> Option<BoneRef> {
        self.bones
            .iter()
            .position(|b| b.name == name)
            .map(|i| BoneRef(i as u32))
    }

    fn local_position(&self, bone: BoneRef) -> [f32; 3] {
        self.bones
            .get(bone.0 as usize)
            .map(|b| b.position)
            .unwrap_or([0.0; 3])
    }

    fn local_orientation(&self, bone: BoneRef) -> [f32; 4] {
        self.bones
            .get(bone.0 as usize)
            .map(|b| b.orientation)
            .unwrap_or([0.0, 0.0, 0.0, 1.0])
    }

    fn set_local_position(&mut self, bone: BoneRef, position: [f32; 3]) {
        if let Some(b) = self.bones.get_mut(bone.0 as usize) {
            b.position = position;
            self.transform_writes += 1;
        }
    }

    fn set_local_orientation(&mut self, bone: BoneRef, orientation: [f32; 4]) {
        if let Some(b) = self.bones.get_mut(bone.0 as usize) {
            b.orientation = orientation;
            self.transform_writes += 1;
        }
    }

    fn meshes(&self) -> Vec<MeshRef> {
        (0..self.meshes.len() as u32).map(MeshRef).collect()
    }

    fn morph_index(&self, mesh: MeshRef, name: &str) -> Option<usize> {
        self.meshes
            .get(mesh.0 as usize)
            .and_then(|m| m.morphs.iter().position(|n| n == name))
    }

    fn morph_weights_mut(&mut self, mesh: MeshRef) -> Option<&mut [f32]> {
        self.meshes
            .get_mut(mesh.0 as usize)
            .map(|m| m.weights.as_mut_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn morph_cache_writes_every_mesh_with_the_target() {
        let mut scene = MemoryScene::new()
            .with_mesh("face", &["smileL", "smileR"])
            .with_mesh("teeth", &["smileL"]);
        let mut cache = MorphCache::default();
        assert!(cache.write(&mut scene, "smileL", 0.7, true));
        assert_eq!(scene.meshes[0].weights, vec![0.7, 0.0]);
        assert_eq!(scene.meshes[1].weights, vec![0.7]);
    }

    #[test]
    fn missing_morph_is_cached_and_skipped() {
        let mut scene = MemoryScene::new().with_mesh("face", &["smileL"]);
        let mut cache = MorphCache::default();
        assert!(!cache.write(&mut scene, "nope", 1.0, true));
        assert!(!cache.write(&mut scene, "nope", 1.0, true));
        assert_eq!(cache.warned.len(), 1);
        assert_eq!(scene.morph_weight("smileL"), Some(0.0));
    }
}
