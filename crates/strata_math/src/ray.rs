use crate::{Mat4, Vec3};

/// A ray in 3D space.
///
/// The direction is not required to be unit length. Transforming a ray into
/// an instance's local frame keeps the direction unnormalized so a parameter
/// `t` names the same point in both frames.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Re-express the ray in the frame that `matrix` maps into.
    ///
    /// Used with an instance's world-to-local matrix before descending into
    /// a bottom-level structure.
    #[inline]
    pub fn transformed(&self, matrix: &Mat4) -> Ray {
        Ray {
            origin: matrix.transform_point3(self.origin),
            direction: matrix.transform_vector3(self.direction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);

        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(2.0), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(-1.0), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_transformed_ray_preserves_parameter() {
        let to_world = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 0.5, 3.0),
            crate::Quat::from_rotation_y(0.7),
            Vec3::new(4.0, -1.0, 2.0),
        );
        let to_local = to_world.inverse();

        let world = Ray::new(Vec3::new(1.0, 2.0, 30.0), Vec3::new(0.1, -0.2, -1.0));
        let local = world.transformed(&to_local);

        for t in [0.0, 1.5, 12.0] {
            let back = to_world.transform_point3(local.at(t));
            assert!((back - world.at(t)).length() < 1e-3);
        }
    }
}
