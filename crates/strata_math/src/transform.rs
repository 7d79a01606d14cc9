// Transform utilities for Mat4
//
// Extends glam::Mat4 with the helpers instancing needs on top of
// transform_point3 / transform_vector3 / inverse, which glam already provides.

use crate::Aabb;
use glam::{Mat3, Mat4, Vec3};

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;

    /// Inverse-transpose of the upper-left 3x3 (linear) part.
    ///
    /// Normals must be carried through this matrix, not the transform
    /// itself, to stay perpendicular under non-uniform scale.
    fn normal_matrix(&self) -> Mat3;

    /// Transform a normal and re-normalize it.
    fn transform_normal(&self, normal: Vec3) -> Vec3;
}

impl Mat4Ext for Mat4 {
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return Aabb::EMPTY;
        }

        let corners = aabb.corners();
        let first = self.transform_point3(corners[0]);
        let (min, max) = corners[1..]
            .iter()
            .map(|&corner| self.transform_point3(corner))
            .fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));

        Aabb::from_points(min, max)
    }

    fn normal_matrix(&self) -> Mat3 {
        Mat3::from_mat4(*self).inverse().transpose()
    }

    fn transform_normal(&self, normal: Vec3) -> Vec3 {
        (self.normal_matrix() * normal).normalize()
    }
}
