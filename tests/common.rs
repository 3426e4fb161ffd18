#![allow(dead_code)]

use glam::{Quat, Vec3};
use pxanim::{ContainerDescriptor, RigidTransform, SampleMatrix, BLOB_OFFSET, BLOB_ONLY_TRAILER};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Smooth random motion: every bone spins around a random axis, drifts and
/// breathes its scale at its own speed.
pub fn random_matrix(seed: u64, frame_count: u32, bone_count: u32, duration: f32) -> SampleMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let bones: Vec<_> = (0..bone_count)
        .map(|_| {
            let axis = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(0.1..1.0)).normalize();
            let base = Quat::from_euler(
                glam::EulerRot::XYZ,
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(-3.0..3.0),
            );
            let spin: f32 = rng.gen_range(-4.0..4.0);
            let origin = Vec3::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0));
            let velocity = Vec3::new(rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0));
            let scale: f32 = rng.gen_range(0.5..1.5);
            (axis, base, spin, origin, velocity, scale)
        })
        .collect();

    let mut transforms = Vec::with_capacity((frame_count * bone_count) as usize);
    for frame in 0..frame_count {
        let t = if frame_count > 1 {
            duration * frame as f32 / (frame_count - 1) as f32
        } else {
            0.0
        };
        for (axis, base, spin, origin, velocity, scale) in &bones {
            transforms.push(RigidTransform::new(
                (Quat::from_axis_angle(*axis, spin * t) * *base).normalize(),
                *origin + *velocity * t,
                Vec3::splat(scale + 0.25 * (t * 3.0).sin()),
            ));
        }
    }
    SampleMatrix::new(duration, frame_count, bone_count, transforms).unwrap()
}

/// Header-stripped image of a container: header, blob, then a 0x34 byte trailer.
pub fn blob_only_file(container: &[u8]) -> Vec<u8> {
    let desc = ContainerDescriptor::parse(container).unwrap();
    let blob_end = BLOB_OFFSET + desc.blob_len as usize;
    let mut bytes = container[..blob_end].to_vec();
    bytes.extend((0..BLOB_ONLY_TRAILER).map(|i| i as u8));
    bytes
}

pub fn assert_matrix_near(expected: &SampleMatrix, actual: &SampleMatrix, diff: f32, angle_diff: f32) {
    assert_eq!(expected.frame_count(), actual.frame_count());
    assert_eq!(expected.bone_count(), actual.bone_count());
    assert!((expected.duration() - actual.duration()).abs() < 1e-5);
    for frame in 0..expected.frame_count() {
        for bone in 0..expected.bone_count() {
            let a = expected.get(frame, bone).unwrap();
            let b = actual.get(frame, bone).unwrap();
            assert!(
                a.abs_diff_eq(b, diff, angle_diff),
                "frame {} bone {}: expected {:?}, actual {:?}",
                frame,
                bone,
                a,
                b
            );
        }
    }
}
