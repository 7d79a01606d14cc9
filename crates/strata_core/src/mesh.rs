//! Triangle mesh geometry for the Strata asset table.
//!
//! Faces index positions, normals and texture coordinates independently,
//! so a vertex shared between faces may carry a different normal per face
//! (hard edges) without duplicating its position.

use strata_math::{Aabb, Vec2, Vec3};
use thiserror::Error;

/// Errors detected while validating mesh data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    #[error("{attribute} array length {len} is not a multiple of {stride}")]
    Ragged {
        attribute: &'static str,
        len: usize,
        stride: usize,
    },

    #[error("face index arrays have mismatched lengths: p={p}, {attribute}={len}")]
    FaceArityMismatch {
        p: usize,
        attribute: &'static str,
        len: usize,
    },

    #[error("face {face} references {attribute} {index}, but only {len} exist")]
    IndexOutOfBounds {
        face: usize,
        attribute: &'static str,
        index: u32,
        len: usize,
    },
}

/// One corner of a triangular face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceVertex {
    /// Index into `positions`
    pub p: u32,
    /// Index into `normals`
    pub n: Option<u32>,
    /// Index into `texcoords`
    pub t: Option<u32>,
}

impl FaceVertex {
    /// Corner that uses the same index for every attribute.
    pub fn shared(index: u32) -> Self {
        Self {
            p: index,
            n: Some(index),
            t: Some(index),
        }
    }
}

/// A triangle mesh with independently indexed attributes.
///
/// Immutable once built: the asset table hands it out behind an `Arc` and
/// every placement of the mesh in the scene shares the same data.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions
    pub positions: Vec<Vec3>,

    /// Vertex normals (may be empty)
    pub normals: Vec<Vec3>,

    /// Texture coordinates (may be empty)
    pub texcoords: Vec<Vec2>,

    /// Triangles, three corners each
    pub faces: Vec<[FaceVertex; 3]>,

    /// Axis-aligned bounding box of the positions
    pub bounds: Aabb,
}

impl Mesh {
    /// Create a mesh, checking that every face index is in bounds.
    pub fn new(
        positions: Vec<Vec3>,
        normals: Vec<Vec3>,
        texcoords: Vec<Vec2>,
        faces: Vec<[FaceVertex; 3]>,
    ) -> Result<Self, MeshError> {
        for (face, corners) in faces.iter().enumerate() {
            for corner in corners {
                check_index(face, "position", Some(corner.p), positions.len())?;
                check_index(face, "normal", corner.n, normals.len())?;
                check_index(face, "texcoord", corner.t, texcoords.len())?;
            }
        }

        let bounds = Self::compute_bounds(&positions);
        Ok(Self {
            positions,
            normals,
            texcoords,
            faces,
            bounds,
        })
    }

    /// Create a mesh from positions and a flat triangle index list, using
    /// the same index for normals when they are given.
    pub fn from_indexed(
        positions: Vec<Vec3>,
        indices: &[u32],
        normals: Option<Vec<Vec3>>,
    ) -> Result<Self, MeshError> {
        if indices.len() % 3 != 0 {
            return Err(MeshError::Ragged {
                attribute: "index",
                len: indices.len(),
                stride: 3,
            });
        }

        let has_normals = normals.is_some();
        let faces = indices
            .chunks_exact(3)
            .map(|tri| {
                [tri[0], tri[1], tri[2]].map(|i| FaceVertex {
                    p: i,
                    n: has_normals.then_some(i),
                    t: None,
                })
            })
            .collect();

        Self::new(positions, normals.unwrap_or_default(), Vec::new(), faces)
    }

    /// Tessellated sphere centered at the origin with outward unit normals.
    ///
    /// `stacks` rings from pole to pole, `slices` segments around the Y axis.
    /// Triangles wind counter-clockwise seen from outside.
    pub fn uv_sphere(radius: f32, stacks: u32, slices: u32) -> Self {
        let stacks = stacks.max(2);
        let slices = slices.max(3);

        let mut positions = Vec::with_capacity(((stacks + 1) * slices) as usize);
        let mut normals = Vec::with_capacity(positions.capacity());
        let mut texcoords = Vec::with_capacity(positions.capacity());
        for i in 0..=stacks {
            let theta = i as f32 * std::f32::consts::PI / stacks as f32;
            for j in 0..slices {
                let phi = j as f32 * std::f32::consts::TAU / slices as f32;
                let n = Vec3::new(theta.sin() * phi.sin(), theta.cos(), theta.sin() * phi.cos());
                positions.push(n * radius);
                normals.push(n);
                texcoords.push(Vec2::new(j as f32 / slices as f32, i as f32 / stacks as f32));
            }
        }

        // Skip the degenerate triangle of each quad touching a pole
        let mut faces = Vec::with_capacity((2 * slices * (stacks - 1)) as usize);
        for i in 1..=stacks {
            for j in 1..=slices {
                let p00 = (i - 1) * slices + j - 1;
                let p01 = (i - 1) * slices + j % slices;
                let p10 = i * slices + j - 1;
                let p11 = i * slices + j % slices;
                if i > 1 {
                    faces.push([p10, p01, p00].map(FaceVertex::shared));
                }
                if i < stacks {
                    faces.push([p11, p01, p10].map(FaceVertex::shared));
                }
            }
        }

        let bounds = Self::compute_bounds(&positions);
        Self {
            positions,
            normals,
            texcoords,
            faces,
            bounds,
        }
    }

    /// Compute axis-aligned bounding box from positions.
    fn compute_bounds(positions: &[Vec3]) -> Aabb {
        if positions.is_empty() {
            return Aabb::EMPTY;
        }

        let (min, max) = positions.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(lo, hi), p| (lo.min(*p), hi.max(*p)),
        );
        Aabb::from_points(min, max)
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.faces.len()
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    /// Positions of the three corners of `face`.
    pub fn triangle(&self, face: usize) -> [Vec3; 3] {
        self.faces[face].map(|c| self.positions[c.p as usize])
    }

    /// Unit normal of the triangle plane (counter-clockwise winding).
    pub fn geometric_normal(&self, face: usize) -> Vec3 {
        let [v0, v1, v2] = self.triangle(face);
        (v1 - v0).cross(v2 - v0).normalize_or_zero()
    }

    /// Interpolated shading normal at barycentric `(u, v)`, falling back to
    /// the geometric normal when the face has no normal indices.
    pub fn shading_normal(&self, face: usize, u: f32, v: f32) -> Vec3 {
        let corners = &self.faces[face];
        match (corners[0].n, corners[1].n, corners[2].n) {
            (Some(a), Some(b), Some(c)) => {
                let n = self.normals[a as usize] * (1.0 - u - v)
                    + self.normals[b as usize] * u
                    + self.normals[c as usize] * v;
                n.try_normalize()
                    .unwrap_or_else(|| self.geometric_normal(face))
            }
            _ => self.geometric_normal(face),
        }
    }

    /// Interpolated texture coordinate at barycentric `(u, v)`.
    pub fn texcoord(&self, face: usize, u: f32, v: f32) -> Option<Vec2> {
        let corners = &self.faces[face];
        match (corners[0].t, corners[1].t, corners[2].t) {
            (Some(a), Some(b), Some(c)) => Some(
                self.texcoords[a as usize] * (1.0 - u - v)
                    + self.texcoords[b as usize] * u
                    + self.texcoords[c as usize] * v,
            ),
            _ => None,
        }
    }
}

fn check_index(
    face: usize,
    attribute: &'static str,
    index: Option<u32>,
    len: usize,
) -> Result<(), MeshError> {
    match index {
        Some(index) if index as usize >= len => Err(MeshError::IndexOutOfBounds {
            face,
            attribute,
            index,
            len,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> Mesh {
        Mesh::from_indexed(vec![Vec3::ZERO, Vec3::X, Vec3::Y], &[0, 1, 2], None).unwrap()
    }

    #[test]
    fn test_mesh_creation() {
        let mesh = unit_triangle();

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert!(!mesh.has_normals());
    }

    #[test]
    fn test_out_of_bounds_index_is_rejected() {
        let err = Mesh::from_indexed(vec![Vec3::ZERO, Vec3::X, Vec3::Y], &[0, 1, 3], None)
            .unwrap_err();

        assert_eq!(
            err,
            MeshError::IndexOutOfBounds {
                face: 0,
                attribute: "position",
                index: 3,
                len: 3
            }
        );
    }

    #[test]
    fn test_out_of_bounds_normal_index_is_rejected() {
        let faces = vec![[
            FaceVertex { p: 0, n: Some(0), t: None },
            FaceVertex { p: 1, n: Some(1), t: None },
            FaceVertex { p: 2, n: Some(2), t: None },
        ]];
        let err = Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Vec3::Z],
            Vec::new(),
            faces,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            MeshError::IndexOutOfBounds { attribute: "normal", index: 1, .. }
        ));
    }

    #[test]
    fn test_geometric_normal_is_counter_clockwise() {
        let mesh = unit_triangle();
        assert!((mesh.geometric_normal(0) - Vec3::Z).length() < 1e-6);
        // No normal indices: shading falls back to the face normal
        assert!((mesh.shading_normal(0, 0.2, 0.3) - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_bounds_computation() {
        let mesh = Mesh::from_indexed(
            vec![
                Vec3::new(-1.0, -2.0, -3.0),
                Vec3::new(4.0, 5.0, 6.0),
                Vec3::new(0.0, 0.0, 0.0),
            ],
            &[0, 1, 2],
            None,
        )
        .unwrap();

        assert!((mesh.bounds.min() - Vec3::new(-1.0, -2.0, -3.0)).length() < 0.001);
        assert!((mesh.bounds.max() - Vec3::new(4.0, 5.0, 6.0)).length() < 0.001);
    }

    #[test]
    fn test_uv_sphere_normals_point_outward() {
        let sphere = Mesh::uv_sphere(2.0, 10, 20);

        assert_eq!(sphere.triangle_count(), 2 * 20 * (10 - 1));
        for face in 0..sphere.triangle_count() {
            let [v0, v1, v2] = sphere.triangle(face);
            let centroid = (v0 + v1 + v2) / 3.0;
            assert!(sphere.geometric_normal(face).dot(centroid) > 0.0);
            assert!(sphere.shading_normal(face, 1.0 / 3.0, 1.0 / 3.0).dot(centroid) > 0.0);
        }
        assert!((sphere.bounds.max().y - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_shading_normal_interpolates_corners() {
        let sphere = Mesh::uv_sphere(1.0, 4, 8);
        let corners = sphere.faces[3];

        // At u = v = 0 the normal is the first corner's normal
        let n0 = sphere.normals[corners[0].n.unwrap() as usize];
        assert!((sphere.shading_normal(3, 0.0, 0.0) - n0).length() < 1e-5);
    }
}
