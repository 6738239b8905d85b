//! Composite rotation: recombine a node's pitch/yaw/roll state into one
//! orientation relative to its bind-time snapshot.
//!
//! Axes are always applied yaw → pitch → roll, each post-multiplied in the
//! node's local frame: `base * yaw * pitch * roll`.

use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::axis::NodeAxes;
use crate::ids::AuId;
use crate::profile::{BoneBinding, Channel, MappingProfile, ProfileIndex};
use crate::resolve::side_factor;
use crate::rig::{BoneSnapshot, NodeRecord};
use crate::state::AuState;

/// `[x, y, z, w]` → nalgebra unit quaternion. Degenerate input becomes identity.
#[inline]
pub fn to_unit_quat(q: [f32; 4]) -> UnitQuaternion<f32> {
    let raw = Quaternion::new(q[3], q[0], q[1], q[2]);
    if raw.norm_squared() <= f32::EPSILON {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::new_normalize(raw)
}

/// nalgebra unit quaternion → `[x, y, z, w]`.
#[inline]
pub fn to_quat_array(q: &UnitQuaternion<f32>) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

#[inline]
fn local_axis(channel: Channel) -> Option<Unit<Vector3<f32>>> {
    match channel {
        Channel::Rx => Some(Vector3::x_axis()),
        Channel::Ry => Some(Vector3::y_axis()),
        Channel::Rz => Some(Vector3::z_axis()),
        _ => None,
    }
}

/// Rotation contributed by one binding at a given axis value.
///
/// Bindings without `maxDegrees` or without a rotation channel contribute nothing.
pub fn binding_rotation(
    binding: &BoneBinding,
    axis_value: f32,
    balance: f32,
) -> Option<UnitQuaternion<f32>> {
    let axis = local_axis(binding.channel)?;
    let max_degrees = binding.max_degrees?;
    let radians = max_degrees.to_radians()
        * axis_value.abs()
        * binding.scale
        * side_factor(binding.side, balance);
    Some(UnitQuaternion::from_axis_angle(&axis, radians))
}

/// Final pose for one node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComposedPose {
    /// `[x, y, z, w]`
    pub orientation: [f32; 4],
    pub position: [f32; 3],
}

#[derive(Clone, Copy)]
pub struct Composer<'a> {
    pub profile: &'a MappingProfile,
    pub index: &'a ProfileIndex,
}

impl<'a> Composer<'a> {
    pub fn new(profile: &'a MappingProfile, index: &'a ProfileIndex) -> Self {
        Self { profile, index }
    }

    /// Orientation for `node` given its axis state, baseline and AU lookups.
    ///
    /// Shared by live flushing and clip synthesis.
    pub fn orientation(
        &self,
        node: &str,
        axes: &NodeAxes,
        rotation: [f32; 3],
        snapshot: &BoneSnapshot,
        au_value: impl Fn(AuId) -> f32,
        au_balance: impl Fn(AuId) -> f32,
    ) -> UnitQuaternion<f32> {
        let mut q = to_unit_quat(snapshot.base_orientation);
        for (axis, resolved) in axes.iter() {
            let v = rotation[axis.index()];
            if v == 0.0 {
                continue;
            }
            let Some(au) = resolved.kind.active_au(v, &au_value) else {
                continue;
            };
            let Some(binding) = self.profile.rotation_binding(au, node, resolved.channel) else {
                continue;
            };
            if let Some(r) = binding_rotation(binding, v, au_balance(au)) {
                q *= r;
            }
        }
        q
    }

    /// Compose a rig record against the current AU state.
    pub fn compose(&self, record: &NodeRecord, state: &AuState) -> ComposedPose {
        let base = &record.snapshot;
        let orientation = match self.index.node_axes(&record.name) {
            Some(axes) => self.orientation(
                &record.name,
                axes,
                record.rotation,
                base,
                |au| state.value(au),
                |au| state.balance(au),
            ),
            None => to_unit_quat(base.base_orientation),
        };
        let p = base.base_position;
        let t = record.translation;
        ComposedPose {
            orientation: to_quat_array(&orientation),
            position: [p[0] + t[0], p[1] + t[1], p[2] + t[2]],
        }
    }
}
