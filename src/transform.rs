//!
//! Rigid transform definition.
//!

use glam::{Quat, Vec3};
use static_assertions::const_assert_eq;

/// Serialized size of a `RigidTransform`: rotation xyzw, translation xyz, scale xyz.
pub const TRANSFORM_SIZE: usize = 40;

const_assert_eq!(TRANSFORM_SIZE, (4 + 3 + 3) * std::mem::size_of::<f32>());

/// Pose of one bone at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RigidTransform {
    /// Unit quaternion rotation.
    pub rotation: Quat,
    pub translation: Vec3,
    pub scale: Vec3,
}

impl Default for RigidTransform {
    fn default() -> RigidTransform {
        RigidTransform::IDENTITY
    }
}

impl RigidTransform {
    pub const IDENTITY: RigidTransform = RigidTransform {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    #[inline]
    pub const fn new(rotation: Quat, translation: Vec3, scale: Vec3) -> RigidTransform {
        RigidTransform {
            rotation,
            translation,
            scale,
        }
    }

    /// Flattens the transform into its 10 serialized floats.
    #[inline]
    pub fn to_array(&self) -> [f32; 10] {
        let r = self.rotation;
        let t = self.translation;
        let s = self.scale;
        [r.x, r.y, r.z, r.w, t.x, t.y, t.z, s.x, s.y, s.z]
    }

    /// Builds a transform from its 10 serialized floats.
    #[inline]
    pub fn from_array(v: [f32; 10]) -> RigidTransform {
        RigidTransform {
            rotation: Quat::from_xyzw(v[0], v[1], v[2], v[3]),
            translation: Vec3::new(v[4], v[5], v[6]),
            scale: Vec3::new(v[7], v[8], v[9]),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.rotation.is_finite() && self.translation.is_finite() && self.scale.is_finite()
    }

    /// Compares translation and scale with `diff`, and rotation by angle with `angle_diff` radians.
    /// Rotations `q` and `-q` are considered equal.
    pub fn abs_diff_eq(&self, other: &RigidTransform, diff: f32, angle_diff: f32) -> bool {
        self.translation.abs_diff_eq(other.translation, diff)
            && self.scale.abs_diff_eq(other.scale, diff)
            && quat_angle(self.rotation, other.rotation) <= angle_diff
    }
}

/// Angle in radians of the rotation taking `a` to `b`, shortest arc.
#[inline]
pub fn quat_angle(a: Quat, b: Quat) -> f32 {
    let d = b * a.conjugate();
    2.0 * Vec3::new(d.x, d.y, d.z).length().atan2(d.w.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_layout() {
        let t = RigidTransform::new(
            Quat::from_xyzw(0.1, 0.2, 0.3, 0.9),
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(4.0, 5.0, 6.0),
        );
        let arr = t.to_array();
        assert_eq!(arr, [0.1, 0.2, 0.3, 0.9, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(RigidTransform::from_array(arr), t);
    }

    #[test]
    fn test_abs_diff_eq() {
        let a = RigidTransform::new(Quat::from_rotation_y(0.5), Vec3::new(1.0, 0.0, 0.0), Vec3::ONE);
        let mut b = a;
        b.rotation = -b.rotation;
        assert!(a.abs_diff_eq(&b, 1e-6, 1e-3));

        b.translation.x += 0.002;
        assert!(!a.abs_diff_eq(&b, 0.001, 1e-3));
        assert!(a.abs_diff_eq(&b, 0.003, 1e-3));

        let c = RigidTransform::new(Quat::from_rotation_y(0.51), a.translation, a.scale);
        assert!(!a.abs_diff_eq(&c, 0.001, 1e-3));
        assert!(a.abs_diff_eq(&c, 0.001, 0.02));
    }

    #[test]
    fn test_quat_angle() {
        let a = Quat::from_rotation_x(0.25);
        let b = Quat::from_rotation_x(0.75);
        assert!((quat_angle(a, b) - 0.5).abs() < 1e-5);
        assert!(quat_angle(a, a) < 1e-6);
        assert!(!RigidTransform::IDENTITY.to_array().iter().any(|v| v.is_nan()));
        assert!(RigidTransform::IDENTITY.is_finite());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde() {
        let t = RigidTransform::new(Quat::from_rotation_z(1.0), Vec3::new(0.5, -0.5, 2.0), Vec3::splat(2.0));
        let json = serde_json::to_string(&t).unwrap();
        let back: RigidTransform = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
