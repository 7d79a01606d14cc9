//! Hittable trait and HitRecord for ray-object intersection.

use strata_core::{AssetHandle, NodeId};
use strata_math::{Aabb, Interval, Ray, Vec2, Vec3};

/// Record of a ray-object intersection.
///
/// Filled in the frame of the structure being traversed; an instance
/// rewrites `p` and `normal` into its parent frame on the way out.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HitRecord {
    /// Ray parameter of the intersection
    pub t: f32,
    /// Point of intersection
    pub p: Vec3,
    /// Unit outward shading normal
    pub normal: Vec3,
    /// Barycentric coordinates within the hit triangle
    pub uv: Vec2,
    /// Primitive node that placed the hit triangle
    pub primitive: Option<NodeId>,
    /// Triangle index within the primitive's mesh
    pub face: u32,
    pub material: Option<AssetHandle>,
    /// Whether the ray arrived from the outside of the surface
    pub front_face: bool,
}

impl HitRecord {
    /// Normal flipped to face against the incoming ray.
    pub fn facing_normal(&self) -> Vec3 {
        if self.front_face {
            self.normal
        } else {
            -self.normal
        }
    }
}

/// Trait for objects that can be hit by rays.
pub trait Hittable: Send + Sync {
    /// Test if a ray hits this object within the given interval.
    ///
    /// Returns true if hit, and fills in the hit record.
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool;

    /// Get the axis-aligned bounding box of this object.
    fn bounding_box(&self) -> Aabb;
}
