//! Keyframe animation playback
//!
//! This module provides:
//! - Keyframe tracks with linear/slerp interpolation, clamped or looped
//! - Animation clips with a playback cursor, loop flag and blend weight
//! - A command-queue state machine that cuts or cross-fades between clips
//!
//! # Example
//!
//! ```rust
//! use animlab::animation::{
//!     Animation, AnimationCommand, AnimationController, ControllerConfig, Keyframe, Track,
//! };
//! use animlab::BoneId;
//! use glam::{Quat, Vec3};
//! use std::collections::HashMap;
//!
//! let track = Track::new(vec![
//!     Keyframe::new(0.0, Vec3::ZERO, Quat::IDENTITY),
//!     Keyframe::new(1.0, Vec3::Y, Quat::IDENTITY),
//! ]);
//! let walk = Animation::new("walk", 1.0, 1.0, HashMap::from([(BoneId::new(0), track)]))?;
//! let mut animations = vec![walk];
//!
//! let mut controller = AnimationController::new(ControllerConfig::default());
//! controller.enqueue(AnimationCommand::immediate(0, true), animations.len())?;
//! controller.update(0.5, &mut animations);
//!
//! assert_eq!(controller.current(), Some(0));
//! assert!((animations[0].timer() - 0.5).abs() < 1e-9);
//! # Ok::<(), animlab::AnimError>(())
//! ```

mod interpolation;
mod manager;
mod state;

pub use interpolation::{KeyPose, Keyframe, Track, find_keyframe_index};
pub use manager::{
    AnimationCommand, AnimationController, ControllerConfig, ControllerState, TransitionType,
    smoothstep,
};
pub use state::{Animation, DEFAULT_TICKS_PER_SECOND};
