//! Bottom-level structures and their placements.
//!
//! A [`Blas`] holds the geometry of one instance group (or of the ungrouped
//! primitives under the root) in the group's own frame. An [`InstanceRef`]
//! places a shared `Blas` somewhere else by transform: the ray is carried
//! into the group frame instead of copying triangles out of it.
//!
//! Instance references are themselves hittable, so a group nested inside
//! another group is just one more object in the outer group's BVH.

use std::sync::Arc;

use strata_core::{NodeId, SceneResult};
use strata_math::{Aabb, Interval, Mat3, Mat4, Mat4Ext, Ray};

use crate::bvh::{BoxedHittable, BvhNode};
use crate::hittable::{HitRecord, Hittable};
use crate::triangle::check_transform;

/// Bottom-level acceleration structure.
pub struct Blas {
    /// Group this structure was built for; `None` for the root content
    group: Option<NodeId>,
    bvh: BvhNode,
    triangle_count: usize,
    instance_count: usize,
}

impl Blas {
    /// Build over triangles (already in the group frame) and references to
    /// nested groups.
    pub fn new(group: Option<NodeId>, triangles: Vec<BoxedHittable>, instances: Vec<InstanceRef>) -> Self {
        let triangle_count = triangles.len();
        let instance_count = instances.len();

        let mut objects = triangles;
        objects.extend(
            instances
                .into_iter()
                .map(|instance| Box::new(instance) as BoxedHittable),
        );

        Self {
            group,
            bvh: BvhNode::new(objects),
            triangle_count,
            instance_count,
        }
    }

    pub fn group(&self) -> Option<NodeId> {
        self.group
    }

    /// Triangles stored directly in this structure.
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    /// References to nested groups stored in this structure.
    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    pub fn is_empty(&self) -> bool {
        self.bvh.is_empty()
    }
}

impl Hittable for Blas {
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
        self.bvh.hit(ray, ray_t, rec)
    }

    fn bounding_box(&self) -> Aabb {
        self.bvh.bounding_box()
    }
}

/// A shared bottom-level structure placed at a transform.
pub struct InstanceRef {
    blas: Arc<Blas>,
    /// Local-to-parent transform
    transform: Mat4,
    /// Parent-to-local transform, applied to incoming rays
    inv_transform: Mat4,
    /// Carries local normals into the parent frame
    normal_matrix: Mat3,
    /// Bounds of the placed structure in the parent frame
    bbox: Aabb,
}

impl InstanceRef {
    pub fn new(blas: Arc<Blas>, transform: Mat4) -> SceneResult<Self> {
        match blas.group() {
            Some(group) => check_transform(&transform, group)?,
            None => check_transform(&transform, "root content")?,
        }

        let bbox = transform.transform_aabb(&blas.bounding_box());
        Ok(Self {
            inv_transform: transform.inverse(),
            normal_matrix: transform.normal_matrix(),
            transform,
            bbox,
            blas,
        })
    }

    pub fn blas(&self) -> &Arc<Blas> {
        &self.blas
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }
}

impl Hittable for InstanceRef {
    /// The local ray keeps its unnormalized direction, so `t` found in the
    /// group frame is the same `t` in the parent frame and the search
    /// interval passes through unchanged.
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
        if !self.bbox.hit(ray, ray_t) {
            return false;
        }

        let local_ray = ray.transformed(&self.inv_transform);
        let mut local = HitRecord::default();
        if !self.blas.hit(&local_ray, ray_t, &mut local) {
            return false;
        }

        // n·d is invariant under (M^-T n)·(M d), so front_face carries over
        *rec = HitRecord {
            p: ray.at(local.t),
            normal: (self.normal_matrix * local.normal).normalize_or_zero(),
            ..local
        };
        true
    }

    fn bounding_box(&self) -> Aabb {
        self.bbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangle::Placement;
    use strata_core::{Material, Mesh, Scene};
    use strata_math::Vec3;

    /// Unit sphere BLAS for a fresh group in `scene`.
    fn sphere_blas(scene: &mut Scene) -> Arc<Blas> {
        let mesh = scene
            .insert_asset("sphere", Mesh::uv_sphere(1.0, 16, 32))
            .unwrap();
        let material = scene.insert_asset("grey", Material::default()).unwrap();
        let group = scene.create_instance_group();
        let p = scene.create_primitive(mesh, material).unwrap();
        scene.add_child(group, p).unwrap();

        let mesh = Arc::clone(scene.assets().mesh(mesh).unwrap());
        let placement = Arc::new(Placement::new(p, mesh, material, Mat4::IDENTITY).unwrap());
        let triangles = placement
            .triangles()
            .map(|t| Box::new(t) as BoxedHittable)
            .collect();
        Arc::new(Blas::new(Some(group), triangles, Vec::new()))
    }

    #[test]
    fn test_translated_instance() {
        let mut scene = Scene::new();
        let blas = sphere_blas(&mut scene);
        let instance = InstanceRef::new(blas, Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0))).unwrap();

        let ray = Ray::new(Vec3::new(5.0, 0.0, 50.0), Vec3::new(0.0, 0.0, -1.0));
        let mut rec = HitRecord::default();
        assert!(instance.hit(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
        assert!((rec.t - 49.0).abs() < 1e-3);
        assert!((rec.p - Vec3::new(5.0, 0.0, 1.0)).length() < 1e-3);
        assert!(rec.normal.dot(Vec3::Z) > 0.99);

        // The untransformed location is empty
        let ray = Ray::new(Vec3::new(0.0, 0.0, 50.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(!instance.hit(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
    }

    #[test]
    fn test_scaled_instance_keeps_world_distance() {
        let mut scene = Scene::new();
        let blas = sphere_blas(&mut scene);
        let instance = InstanceRef::new(blas, Mat4::from_scale(Vec3::new(3.0, 1.0, 2.0))).unwrap();

        // Ellipsoid front at z = 2
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let mut rec = HitRecord::default();
        assert!(instance.hit(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
        assert!((rec.t - 8.0).abs() < 1e-2);
        assert!((rec.normal.length() - 1.0).abs() < 1e-5);
        assert!(rec.normal.dot(Vec3::Z) > 0.99);

        // Side of the ellipsoid: normal stays perpendicular to the squashed
        // surface instead of following the stretched local normal
        let ray = Ray::new(Vec3::new(10.0, 0.0, 1.0), Vec3::new(-1.0, 0.0, 0.0));
        assert!(instance.hit(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
        let expected = Vec3::new(rec.p.x / 9.0, rec.p.y, rec.p.z / 4.0).normalize();
        assert!(rec.normal.dot(expected) > 0.99);
    }

    #[test]
    fn test_nested_instances_compose() {
        let mut scene = Scene::new();
        let inner = sphere_blas(&mut scene);
        let placed = InstanceRef::new(inner, Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0))).unwrap();
        let outer = Arc::new(Blas::new(None, Vec::new(), vec![placed]));
        assert_eq!(outer.instance_count(), 1);
        assert_eq!(outer.triangle_count(), 0);

        let top = InstanceRef::new(outer, Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0))).unwrap();
        let ray = Ray::new(Vec3::new(3.0, 2.0, 50.0), Vec3::new(0.0, 0.0, -1.0));
        let mut rec = HitRecord::default();
        assert!(top.hit(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
        assert!((rec.t - 49.0).abs() < 1e-3);
        assert!((rec.p - Vec3::new(3.0, 2.0, 1.0)).length() < 1e-3);
    }
}
