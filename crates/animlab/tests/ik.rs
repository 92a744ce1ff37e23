//! CCD solver behavior on small chains

mod common;

use animlab::{AnimError, Axes, ConstraintMode, DofLimits, IkConfig, Skeleton, Transform};
use glam::Vec3;
use pretty_assertions::assert_eq;
use test_case::test_case;

fn with_mode(mut skeleton: Skeleton, constraints: ConstraintMode) -> Skeleton {
    skeleton.ik_config_mut().constraints = constraints;
    skeleton
}

#[test_case(Vec3::new(0.0, 1.5, 0.0) ; "along rest direction")]
#[test_case(Vec3::new(1.0, 1.0, 0.0) ; "off axis")]
#[test_case(Vec3::new(0.0, -1.5, 0.0) ; "behind the root")]
#[test_case(Vec3::new(-0.7, 1.1, 0.3) ; "out of plane")]
fn test_reachable_target_converges(target: Vec3) {
    common::init_logger();
    let mut skeleton = common::two_bone_arm();

    let outcome = skeleton.compute_ik("arm", target, 10).unwrap();

    assert!(outcome.converged, "{outcome:?}");
    assert!(outcome.iterations <= 10);
    assert!(common::position(&skeleton, "tip").distance(target) < 0.01);
}

#[test_case(Vec3::new(1.0, 0.2, 0.0) ; "low")]
#[test_case(Vec3::new(-0.7, 1.1, 0.3) ; "out of plane")]
#[test_case(Vec3::new(5.0, 0.0, 0.0) ; "unreachable")]
fn test_distance_never_grows_between_passes(target: Vec3) {
    let mut previous = f32::INFINITY;
    for steps in 0..10 {
        let mut skeleton = common::two_bone_arm();
        let outcome = skeleton.compute_ik("arm", target, steps).unwrap();
        assert!(outcome.distance <= previous + 1e-6);
        previous = outcome.distance;
    }
}

#[test]
fn test_unreachable_target_extends_chain() {
    let mut skeleton = common::two_bone_arm();
    let target = Vec3::new(5.0, 0.0, 0.0);

    let outcome = skeleton.compute_ik("arm", target, 20).unwrap();

    assert!(!outcome.converged);
    assert!((outcome.distance - 3.0).abs() < 0.01);
    assert!(common::position(&skeleton, "tip").abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 0.05));
}

#[test]
fn test_unreachable_target_respects_limits() {
    let mut skeleton = with_mode(common::two_bone_arm(), ConstraintMode::Clamp);
    let mid = common::id(&skeleton, "mid");
    let limits = DofLimits::new().with_axis(Axes::Z, -0.3, 0.3).with_axis(Axes::X | Axes::Y, 0.0, 0.0);
    skeleton.set_dof_limits(mid, Some(limits)).unwrap();

    skeleton.compute_ik("arm", Vec3::new(-4.0, -1.0, 0.0), 20).unwrap();

    let mid = skeleton.bone(mid).unwrap();
    assert!(limits.contains(mid.local.rotation, 1e-4));
}

#[test]
fn test_reject_mode_restores_pose() {
    let mut skeleton = with_mode(common::two_bone_arm(), ConstraintMode::Reject);
    let mid = common::id(&skeleton, "mid");
    skeleton
        .set_dof_limits(mid, Some(DofLimits::locked(Axes::Z)))
        .unwrap();
    let before = common::snapshot(&skeleton);

    let err = skeleton
        .compute_ik("arm", Vec3::new(1.0, 1.0, 0.0), 10)
        .unwrap_err();

    assert!(matches!(err, AnimError::ConstraintViolation { ref bone, .. } if bone == "mid"));
    assert_eq!(common::snapshot(&skeleton), before);
}

#[test]
fn test_reject_mode_accepts_legal_solution() {
    let mut skeleton = with_mode(common::two_bone_arm(), ConstraintMode::Reject);
    let base = common::id(&skeleton, "base");
    skeleton
        .set_dof_limits(base, Some(DofLimits::locked(Axes::X | Axes::Y)))
        .unwrap();

    // The whole solve stays in the XY plane, so the base only turns about Z
    let outcome = skeleton.compute_ik("arm", Vec3::new(1.0, 1.0, 0.0), 10).unwrap();
    assert!(outcome.converged);
}

#[test]
fn test_lookup_failures_change_nothing() {
    let mut skeleton = common::two_bone_arm();
    let before = common::snapshot(&skeleton);

    assert_eq!(
        skeleton.compute_ik("leg", Vec3::X, 10).unwrap_err(),
        AnimError::UnknownChain("leg".into())
    );
    assert!(skeleton.set_ik_target("leg", Vec3::X, 10).unwrap_err().is_lookup_error());
    assert_eq!(common::snapshot(&skeleton), before);
}

#[test]
fn test_ik_target_applies_every_frame() {
    let mut skeleton = common::two_bone_arm();
    let raise = common::swing(&skeleton, "raise", "base", 1.0, 2.0);
    let raise = skeleton.add_animation(raise);
    skeleton
        .add_to_animation_queue(raise, true, 0.0, animlab::animation::TransitionType::Immediate)
        .unwrap();

    let target = Vec3::new(1.0, 1.0, 0.0);
    skeleton.set_ik_target("arm", target, 10).unwrap();

    for _ in 0..5 {
        skeleton.animate(0.25);
        assert!(common::position(&skeleton, "tip").distance(target) < 0.01);
    }

    assert!(skeleton.clear_ik_target("arm"));
    skeleton.animate(0.0);
    assert!(common::position(&skeleton, "tip").distance(target) > 0.01);
}

#[test]
fn test_longer_chain_with_helper_bone() {
    let mut skeleton = Skeleton::new();
    let root = skeleton.add_bone("root", Transform::IDENTITY, None).unwrap();
    let mut parent = root;
    for i in 0..4 {
        parent = skeleton
            .add_bone(format!("seg{i}"), Transform::from_translation(Vec3::Y * 0.5), Some(parent))
            .unwrap();
    }
    skeleton
        .define_ik_chain_by_names("spine", &["root", "seg1", "seg3"])
        .unwrap();

    let target = Vec3::new(0.6, 1.0, 0.2);
    let outcome = skeleton.compute_ik("spine", target, 10).unwrap();
    assert!(outcome.converged, "{outcome:?}");

    // seg0 and seg2 are not chain joints and keep their pose
    assert_eq!(skeleton.bone_by_name("seg0").unwrap().local, skeleton.bone_by_name("seg0").unwrap().bind);
    assert_eq!(skeleton.bone_by_name("seg2").unwrap().local, skeleton.bone_by_name("seg2").unwrap().bind);
}

#[test]
fn test_default_config() {
    let config = IkConfig::default();
    assert_eq!(config.tolerance, 0.01);
    assert_eq!(config.constraints, ConstraintMode::Clamp);
}
