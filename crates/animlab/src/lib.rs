//! Skeletal animation core
//!
//! This crate holds the runtime side of a skinned character:
//!
//! - a bone hierarchy with bind, local and global transforms
//! - keyframe tracks sampled with linear and spherical interpolation
//! - a queued state machine that cuts or cross-fades between animations
//! - CCD inverse kinematics over named bone chains, with optional joint limits
//! - import glue that turns a scene node tree plus mesh weights into a
//!   skeleton and packed per-vertex influences
//!
//! # Example
//!
//! ```rust
//! use animlab::animation::{Animation, Keyframe, Track, TransitionType};
//! use animlab::{Skeleton, Transform};
//! use glam::{Quat, Vec3};
//! use std::collections::HashMap;
//!
//! let mut skeleton = Skeleton::new();
//! let hips = skeleton.add_bone("hips", Transform::IDENTITY, None)?;
//! let spine = skeleton.add_bone("spine", Transform::from_translation(Vec3::Y), Some(hips))?;
//!
//! let twist = Track::new(vec![
//!     Keyframe::new(0.0, Vec3::Y, Quat::IDENTITY),
//!     Keyframe::new(10.0, Vec3::Y, Quat::from_rotation_y(1.0)),
//! ]);
//! let index = skeleton.add_animation(Animation::new(
//!     "twist",
//!     10.0,
//!     10.0,
//!     HashMap::from([(spine, twist)]),
//! )?);
//!
//! skeleton.add_to_animation_queue(index, true, 0.0, TransitionType::Immediate)?;
//! skeleton.animate(0.0);
//! skeleton.animate(0.5);
//!
//! let matrices = skeleton.skinning_matrices();
//! assert_eq!(matrices.len(), 2);
//! # Ok::<(), animlab::AnimError>(())
//! ```

pub mod animation;
pub mod bone;
pub mod error;
pub mod ik;
pub mod import;
pub mod skeleton;
pub mod types;

pub use bone::{Axes, Bone, DofLimits};
pub use error::{AnimError, Result};
pub use ik::{ConstraintMode, IkConfig, IkOutcome, IkRequest};
pub use import::{
    ImportOptions, ImportedModel, MAX_INFLUENCES, SkinWeights, SourceAnimation, SourceBone,
    SourceChannel, SourceMesh, SourceNode, VertexInfluence, import_skeleton,
};
pub use skeleton::Skeleton;
pub use types::{Blend, BoneId, EPSILON, Transform};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
