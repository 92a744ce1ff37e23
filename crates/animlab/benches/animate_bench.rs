use animlab::animation::{Animation, Keyframe, Track, TransitionType};
use animlab::{BoneId, Skeleton, Transform};
use criterion::{Criterion, criterion_group, criterion_main};
use glam::{Quat, Vec3};
use std::collections::HashMap;
use std::hint::black_box;

const BONES: u32 = 64;

fn create_test_skeleton() -> Skeleton {
    // A single long spine keeps every bone on the propagation path
    let mut skeleton = Skeleton::new();
    let mut parent = None;
    for i in 0..BONES {
        let id = skeleton
            .add_bone(format!("bone{i}"), Transform::from_translation(Vec3::Y * 0.1), parent)
            .unwrap();
        parent = Some(id);
    }

    for (name, angle) in [("sway", 0.2f32), ("twist", -0.3)] {
        let tracks: HashMap<_, _> = (0..BONES)
            .map(|i| {
                let track = Track::new(
                    (0..=8)
                        .map(|k| {
                            let phase = k as f32 / 8.0 * std::f32::consts::TAU;
                            Keyframe::new(
                                f64::from(k) * 4.0,
                                Vec3::Y * 0.1,
                                Quat::from_rotation_z(angle * phase.sin()),
                            )
                        })
                        .collect(),
                );
                (BoneId::new(i), track)
            })
            .collect();
        let animation = Animation::new(name, 32.0, 30.0, tracks).unwrap();
        skeleton.add_animation(animation);
    }

    skeleton
        .define_ik_chain_by_names("reach", &["bone40", "bone52", "bone63"])
        .unwrap();
    skeleton
}

fn bench_animate(c: &mut Criterion) {
    let mut skeleton = create_test_skeleton();
    skeleton
        .add_to_animation_queue(0, true, 0.0, TransitionType::Immediate)
        .unwrap();
    skeleton.animate(0.0);

    c.bench_function("animate_single", |b| {
        b.iter(|| skeleton.animate(black_box(1.0 / 60.0)));
    });
}

fn bench_animate_blend(c: &mut Criterion) {
    let mut skeleton = create_test_skeleton();
    skeleton
        .add_to_animation_queue(0, true, 0.0, TransitionType::Immediate)
        .unwrap();
    skeleton
        .add_to_animation_queue(1, true, 1.0e9, TransitionType::Smooth)
        .unwrap();
    skeleton.animate(0.0);
    skeleton.animate(0.0);

    c.bench_function("animate_blend", |b| {
        b.iter(|| skeleton.animate(black_box(1.0 / 60.0)));
    });
}

fn bench_compute_ik(c: &mut Criterion) {
    let mut skeleton = create_test_skeleton();
    skeleton.animate(0.0);

    c.bench_function("compute_ik", |b| {
        b.iter(|| {
            skeleton.animate(0.0);
            let _outcome = skeleton
                .compute_ik("reach", black_box(Vec3::new(1.0, 5.0, 0.5)), 10)
                .unwrap();
        })
    });
}

criterion_group!(benches, bench_animate, bench_animate_blend, bench_compute_ik);
criterion_main!(benches);
