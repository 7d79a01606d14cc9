//! Mesh triangles for ray tracing.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection.
//! Triangle vertices are stored in the frame of the structure that owns
//! them; mesh attributes (normals) stay in the shared `Mesh` and are carried
//! into that frame through the placement's normal matrix.

use std::sync::Arc;

use strata_core::{AssetHandle, Mesh, NodeId, SceneError, SceneResult};
use strata_math::{Aabb, Interval, Mat3, Mat4, Mat4Ext, Ray, Vec2, Vec3};

use crate::hittable::{HitRecord, Hittable};

/// Barycentric slack so rays through shared edges never fall in a crack.
const BARY_EPSILON: f32 = 1e-6;

/// Squared Möller-Trumbore determinant, relative to the edge and ray sizes,
/// below which a ray counts as parallel.
const PARALLEL_EPSILON: f32 = 1e-14;

/// Determinant of the linear part, relative to the product of its column
/// lengths, below which a transform is treated as singular. Independent of
/// overall scale.
const MIN_RELATIVE_DETERMINANT: f32 = 1e-6;

/// Check that a placement transform can be inverted.
pub(crate) fn check_transform(transform: &Mat4, what: impl std::fmt::Display) -> SceneResult<()> {
    if !transform.is_finite() {
        return Err(SceneError::build(format!("{}: transform is not finite", what)));
    }
    let linear = Mat3::from_mat4(*transform);
    let volume = linear.x_axis.length() * linear.y_axis.length() * linear.z_axis.length();
    let det = linear.determinant().abs();
    if !(volume > 0.0 && det > MIN_RELATIVE_DETERMINANT * volume) || !linear.inverse().is_finite() {
        return Err(SceneError::build(format!("{}: transform is not invertible", what)));
    }
    Ok(())
}

/// One placement of a mesh inside a bottom-level structure.
///
/// Shared by every triangle the placement contributes.
#[derive(Debug)]
pub struct Placement {
    pub node: NodeId,
    pub mesh: Arc<Mesh>,
    pub material: AssetHandle,
    /// Mesh-to-structure transform
    pub transform: Mat4,
    normal_matrix: Mat3,
}

impl Placement {
    pub fn new(
        node: NodeId,
        mesh: Arc<Mesh>,
        material: AssetHandle,
        transform: Mat4,
    ) -> SceneResult<Self> {
        check_transform(&transform, node)?;
        Ok(Self {
            node,
            mesh,
            material,
            transform,
            normal_matrix: transform.normal_matrix(),
        })
    }

    /// Triangles of the placed mesh, vertices transformed into the
    /// structure's frame.
    pub fn triangles(self: &Arc<Self>) -> impl Iterator<Item = MeshTriangle> + '_ {
        (0..self.mesh.triangle_count()).map(move |face| {
            let [v0, v1, v2] = self
                .mesh
                .triangle(face)
                .map(|v| self.transform.transform_point3(v));
            MeshTriangle::new(v0, v1, v2, face as u32, Arc::clone(self))
        })
    }

    /// Unit shading normal at barycentric `uv` of `face`, in the structure's
    /// frame.
    pub fn shading_normal(&self, face: usize, uv: Vec2) -> Vec3 {
        let n = self.mesh.shading_normal(face, uv.x, uv.y);
        (self.normal_matrix * n).normalize_or_zero()
    }
}

/// A triangle of a placed mesh.
pub struct MeshTriangle {
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    face: u32,
    placement: Arc<Placement>,
    bbox: Aabb,
}

impl MeshTriangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, face: u32, placement: Arc<Placement>) -> Self {
        Self {
            v0,
            v1,
            v2,
            face,
            placement,
            bbox: Aabb::from_triangle(v0, v1, v2),
        }
    }
}

impl Hittable for MeshTriangle {
    /// Möller-Trumbore ray-triangle intersection algorithm.
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);

        // Ray is parallel to triangle, measured against the triangle's own size
        if a * a <= PARALLEL_EPSILON * edge1.length_squared() * h.length_squared() {
            return false;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(h);
        if !(-BARY_EPSILON..=1.0 + BARY_EPSILON).contains(&u) {
            return false;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);
        if v < -BARY_EPSILON || u + v > 1.0 + BARY_EPSILON {
            return false;
        }

        let t = f * edge2.dot(q);
        if !ray_t.surrounds(t) {
            return false;
        }

        let uv = Vec2::new(u, v);
        let normal = self.placement.shading_normal(self.face as usize, uv);

        // Orient the geometric normal like the shading normal, then decide
        // which side the ray came from
        let mut geometric = edge1.cross(edge2);
        if geometric.dot(normal) < 0.0 {
            geometric = -geometric;
        }

        rec.t = t;
        rec.p = ray.at(t);
        rec.normal = normal;
        rec.uv = uv;
        rec.primitive = Some(self.placement.node);
        rec.face = self.face;
        rec.material = Some(self.placement.material);
        rec.front_face = ray.direction.dot(geometric) < 0.0;

        true
    }

    fn bounding_box(&self) -> Aabb {
        self.bbox
    }
}
