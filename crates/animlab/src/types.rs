//! Common types for the animation core

use glam::{Mat4, Quat, Vec3};
use std::fmt;

/// Tolerance used when comparing transforms and detecting degenerate vectors
pub const EPSILON: f32 = 1e-6;

/// Index of a bone within its skeleton
///
/// Ids are dense: a skeleton with `n` bones uses ids `0..n`, assigned in
/// pre-order from the root during import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneId(pub u32);

impl BoneId {
    /// Create an id from its raw value
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Convert to a bone table index
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Trait for values that can be blended toward another value
///
/// `t = 0.0` yields `self`, `t = 1.0` yields `other`.
pub trait Blend: Clone {
    /// Blend between self and other
    fn blend(&self, other: &Self, t: f32) -> Self;
}

impl Blend for f32 {
    fn blend(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Blend for Vec3 {
    fn blend(&self, other: &Self, t: f32) -> Self {
        self.lerp(*other, t)
    }
}

impl Blend for Quat {
    fn blend(&self, other: &Self, t: f32) -> Self {
        // glam flips the end quaternion when the dot product is negative,
        // so this always follows the shorter arc
        self.slerp(*other, t).normalize()
    }
}

/// Translation, rotation and scale of a bone relative to its parent
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    /// Identity transform (no translation, rotation or scale)
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create a transform from its parts
    pub const fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Pure translation
    pub const fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Translation plus rotation, unit scale
    pub const fn from_translation_rotation(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Decompose an affine matrix
    ///
    /// A zero scale axis leaves the rotation undefined; it comes back as
    /// identity.
    pub fn from_mat4(matrix: &Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        let rotation = if rotation.is_finite() && rotation.length_squared() > EPSILON {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Compose as translation * rotation * scale
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Compare with a tolerance, treating `q` and `-q` as the same rotation
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        self.translation.abs_diff_eq(other.translation, tolerance)
            && self.scale.abs_diff_eq(other.scale, tolerance)
            && self.rotation.dot(other.rotation).abs() >= 1.0 - tolerance
    }
}

/// Inverse of `matrix`, or identity when it is singular
///
/// Zero-scale helper nodes have no inverse; skinning them to identity keeps
/// NaNs out of the palette.
pub fn inverse_or_identity(matrix: Mat4) -> Mat4 {
    let det = matrix.determinant();
    if det.is_finite() && det.abs() > f32::EPSILON * f32::EPSILON {
        matrix.inverse()
    } else {
        log::debug!("Singular matrix (determinant {det}), using identity for its inverse");
        Mat4::IDENTITY
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Blend for Transform {
    fn blend(&self, other: &Self, t: f32) -> Self {
        if t <= 0.0 {
            return *self;
        }
        if t >= 1.0 {
            return *other;
        }
        Self {
            translation: self.translation.blend(&other.translation, t),
            rotation: self.rotation.blend(&other.rotation, t),
            scale: self.scale.blend(&other.scale, t),
        }
    }
}
