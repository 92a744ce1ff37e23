//! Bones and joint limits

use crate::types::{BoneId, Transform};
use bitflags::bitflags;
use glam::{EulerRot, Mat4, Quat, Vec3};
use std::f32::consts::PI;

bitflags! {
    /// Rotation axes of a joint, in the bone's local space
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
    pub struct Axes: u8 {
        const X = 0x01;
        const Y = 0x02;
        const Z = 0x04;
    }
}

/// Per-axis rotation bounds used by the IK solver
///
/// Angles are XYZ Euler angles in radians. Only axes in `axes` are limited;
/// the others rotate freely.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct DofLimits {
    /// Axes that are limited
    pub axes: Axes,
    /// Lower bound per axis
    pub min: Vec3,
    /// Upper bound per axis
    pub max: Vec3,
}

impl DofLimits {
    /// Limits with no constrained axis
    pub fn new() -> Self {
        Self {
            axes: Axes::empty(),
            min: Vec3::splat(-PI),
            max: Vec3::splat(PI),
        }
    }

    /// Limit the given axes to `[min, max]`
    pub fn with_axis(mut self, axes: Axes, min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        for (axis, slot) in [(Axes::X, 0), (Axes::Y, 1), (Axes::Z, 2)] {
            if axes.contains(axis) {
                self.min[slot] = min;
                self.max[slot] = max;
            }
        }
        self.axes |= axes;
        self
    }

    /// Lock the given axes at zero rotation
    pub fn locked(axes: Axes) -> Self {
        Self::new().with_axis(axes, 0.0, 0.0)
    }

    fn euler(rotation: Quat) -> Vec3 {
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        Vec3::new(x, y, z)
    }

    fn limited(&self, slot: usize) -> bool {
        match slot {
            0 => self.axes.contains(Axes::X),
            1 => self.axes.contains(Axes::Y),
            _ => self.axes.contains(Axes::Z),
        }
    }

    /// Clamp a local rotation into these limits
    ///
    /// Returns the rotation unchanged when it already lies inside the limits.
    pub fn clamp(&self, rotation: Quat) -> Quat {
        if self.axes.is_empty() {
            return rotation;
        }

        let angles = Self::euler(rotation);
        let mut clamped = angles;
        for slot in 0..3 {
            if self.limited(slot) {
                clamped[slot] = angles[slot].clamp(self.min[slot], self.max[slot]);
            }
        }

        if clamped == angles {
            rotation
        } else {
            Quat::from_euler(EulerRot::XYZ, clamped.x, clamped.y, clamped.z)
        }
    }

    /// Check whether a local rotation lies inside these limits
    pub fn contains(&self, rotation: Quat, tolerance: f32) -> bool {
        if self.axes.is_empty() {
            return true;
        }

        let angles = Self::euler(rotation);
        (0..3).all(|slot| {
            !self.limited(slot)
                || (angles[slot] >= self.min[slot] - tolerance
                    && angles[slot] <= self.max[slot] + tolerance)
        })
    }
}

impl Default for DofLimits {
    fn default() -> Self {
        Self::new()
    }
}

/// A joint in the skeletal hierarchy
///
/// Parent and child links are ids into the owning skeleton's bone table.
#[derive(Debug, Clone)]
pub struct Bone {
    /// Stable id, also the index in the bone table
    pub id: BoneId,
    /// Name from the source asset
    pub name: String,
    /// Parent bone (None for the root)
    pub parent: Option<BoneId>,
    /// Child bones in declaration order
    pub children: Vec<BoneId>,
    /// Rest local transform as authored
    pub bind: Transform,
    /// Current local transform, rewritten each frame by sampling and IK
    pub local: Transform,
    /// Model-space transform, derived from the parent chain
    pub global: Mat4,
    /// Inverse bind matrix (mesh space to bone space)
    pub offset: Mat4,
    /// Optional joint limits for IK
    pub dof: Option<DofLimits>,
}

impl Bone {
    /// Create a bone resting at `bind`
    pub fn new(id: BoneId, name: impl Into<String>, bind: Transform, parent: Option<BoneId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            children: Vec::new(),
            bind,
            local: bind,
            global: Mat4::IDENTITY,
            offset: Mat4::IDENTITY,
            dof: None,
        }
    }

    /// Check if this is the root bone
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Model-space position of the joint
    pub fn global_position(&self) -> Vec3 {
        self.global.w_axis.truncate()
    }

    /// Model-space rotation of the joint
    pub fn global_rotation(&self) -> Quat {
        let (_, rotation, _) = self.global.to_scale_rotation_translation();
        rotation.normalize()
    }

    /// Restore the local transform to the bind pose
    pub fn reset_to_bind(&mut self) {
        self.local = self.bind;
    }

    /// Final matrix for vertex skinning
    pub fn skinning_matrix(&self, global_inverse: &Mat4) -> Mat4 {
        *global_inverse * self.global * self.offset
    }
}
