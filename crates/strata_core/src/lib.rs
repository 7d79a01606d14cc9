//! Strata Core - Assets, instanced scene graph and flattening.
//!
//! This crate provides:
//!
//! - **Assets**: `Mesh`, `Material`, `Camera`, `Film`, stored by name in an
//!   `AssetTable` and constructed from JSON parameters through an
//!   `AssetRegistry`
//! - **Scene graph**: primitive, transform and instance-group nodes in an
//!   arena, kept acyclic at construction time
//! - **Flattening**: resolving the graph into placed primitives, either fully
//!   expanded or stopping at instance groups for two-level builds
//!
//! # Example
//!
//! ```ignore
//! use strata_core::{Flattener, Scene};
//! use strata_math::{Mat4, Vec3};
//!
//! let mut scene = Scene::new();
//! let mesh = scene.insert_asset("sphere", Mesh::uv_sphere(1.0, 10, 20))?;
//! let white = scene.create_asset("white", "material::diffuse", &json!({"Kd": [1, 1, 1]}))?;
//! scene.primitive(Mat4::from_translation(Vec3::X), mesh, white)?;
//!
//! let instances = Flattener::new(&scene).flatten()?;
//! ```

pub mod asset;
pub mod camera;
pub mod error;
pub mod film;
pub mod flatten;
pub mod graph;
pub mod handle;
pub mod mesh;
pub mod registry;
pub mod scene;

// Re-export commonly used types
pub use asset::{Asset, AssetKind, AssetTable, Material};
pub use camera::Camera;
pub use error::{SceneError, SceneResult};
pub use film::{Film, FilmBuffer};
pub use flatten::{FlattenedContent, FlattenedInstance, Flattener, GroupReference, MAX_DEPTH};
pub use graph::{Primitive, SceneGraph, SceneNode};
pub use handle::{AssetHandle, NodeId};
pub use mesh::{FaceVertex, Mesh, MeshError};
pub use registry::{AssetConstructor, AssetRegistry};
pub use scene::Scene;
