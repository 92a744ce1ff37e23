//! Shared fixtures for the integration tests

#![allow(dead_code)]

use animlab::animation::{Animation, Keyframe, Track};
use animlab::{BoneId, Skeleton, Transform};
use glam::{Quat, Vec3};
use std::collections::HashMap;

/// Route `log` output through the test harness
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Three bones in a vertical line: base at the origin, mid and tip one unit apart
pub fn two_bone_arm() -> Skeleton {
    let mut skeleton = Skeleton::new();
    let base = skeleton.add_bone("base", Transform::IDENTITY, None).unwrap();
    let mid = skeleton
        .add_bone("mid", Transform::from_translation(Vec3::Y), Some(base))
        .unwrap();
    let tip = skeleton
        .add_bone("tip", Transform::from_translation(Vec3::Y), Some(mid))
        .unwrap();
    skeleton.define_ik_chain("arm", &[base, mid, tip]).unwrap();
    skeleton
}

/// A clip turning `bone` about Z from 0 to `angle` over `duration` ticks at one tick per second
pub fn swing(skeleton: &Skeleton, name: &str, bone: &str, angle: f32, duration: f64) -> Animation {
    let id = skeleton.bone_id(bone).unwrap();
    let offset = skeleton.bone(id).unwrap().bind.translation;
    let track = Track::new(vec![
        Keyframe::new(0.0, offset, Quat::IDENTITY),
        Keyframe::new(duration, offset, Quat::from_rotation_z(angle)),
    ]);
    Animation::new(name, duration, 1.0, HashMap::from([(id, track)])).unwrap()
}

/// Locals and globals of every bone, for exact before/after comparisons
pub fn snapshot(skeleton: &Skeleton) -> Vec<(Transform, glam::Mat4)> {
    skeleton.bones().iter().map(|b| (b.local, b.global)).collect()
}

pub fn position(skeleton: &Skeleton, bone: &str) -> Vec3 {
    skeleton.bone_by_name(bone).unwrap().global_position()
}

pub fn id(skeleton: &Skeleton, bone: &str) -> BoneId {
    skeleton.bone_id(bone).unwrap()
}
