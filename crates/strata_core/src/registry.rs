//! Asset constructors keyed by type name (`"mesh::raw"`, `"camera::pinhole"`, ...).
//!
//! Parameters arrive as JSON and are deserialized with serde into one
//! parameter struct per asset type.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use strata_math::{Vec2, Vec3};

use crate::asset::{Asset, Material};
use crate::camera::Camera;
use crate::error::{SceneError, SceneResult};
use crate::film::Film;
use crate::mesh::{FaceVertex, Mesh, MeshError};

/// Builds an asset from its JSON parameters.
pub type AssetConstructor = fn(&Value) -> SceneResult<Asset>;

/// Map from asset type key to constructor.
#[derive(Clone)]
pub struct AssetRegistry {
    constructors: HashMap<String, AssetConstructor>,
}

impl fmt::Debug for AssetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.constructors.keys().collect();
        keys.sort();
        f.debug_struct("AssetRegistry").field("types", &keys).finish()
    }
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl AssetRegistry {
    /// Registry with no constructors.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the built-in asset types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("mesh::raw", construct_raw_mesh);
        registry.register("material::diffuse", construct_diffuse);
        registry.register("camera::pinhole", construct_pinhole);
        registry.register("film::bitmap", construct_bitmap);
        registry
    }

    /// Register (or replace) the constructor for `type_key`.
    pub fn register(&mut self, type_key: impl Into<String>, constructor: AssetConstructor) {
        self.constructors.insert(type_key.into(), constructor);
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.constructors.contains_key(type_key)
    }

    pub fn construct(&self, type_key: &str, params: &Value) -> SceneResult<Asset> {
        let constructor = self
            .constructors
            .get(type_key)
            .ok_or_else(|| SceneError::NotFound(format!("asset type '{}'", type_key)))?;
        constructor(params)
    }
}

fn parse<T: DeserializeOwned>(type_key: &str, params: &Value) -> SceneResult<T> {
    T::deserialize(params).map_err(|e| SceneError::invalid_params(type_key, e))
}

#[derive(Deserialize)]
struct RawMeshParams {
    ps: Vec<f32>,
    #[serde(default)]
    ns: Vec<f32>,
    #[serde(default)]
    ts: Vec<f32>,
    fs: RawFaceParams,
}

/// One entry per face corner, three corners per triangle.
#[derive(Deserialize)]
struct RawFaceParams {
    p: Vec<u32>,
    #[serde(default)]
    t: Option<Vec<u32>>,
    #[serde(default)]
    n: Option<Vec<u32>>,
}

fn construct_raw_mesh(params: &Value) -> SceneResult<Asset> {
    const KEY: &str = "mesh::raw";
    let raw: RawMeshParams = parse(KEY, params)?;
    let mesh = raw_mesh(raw).map_err(|e| SceneError::invalid_params(KEY, e))?;
    Ok(mesh.into())
}

fn raw_mesh(raw: RawMeshParams) -> Result<Mesh, MeshError> {
    let positions = chunk_vec3(&raw.ps, "ps")?;
    let normals = chunk_vec3(&raw.ns, "ns")?;
    if raw.ts.len() % 2 != 0 {
        return Err(MeshError::Ragged {
            attribute: "ts",
            len: raw.ts.len(),
            stride: 2,
        });
    }
    let texcoords = raw.ts.chunks_exact(2).map(Vec2::from_slice).collect();

    let corners = raw.fs.p.len();
    if corners % 3 != 0 {
        return Err(MeshError::Ragged {
            attribute: "fs.p",
            len: corners,
            stride: 3,
        });
    }
    for (attribute, indices) in [("fs.t", &raw.fs.t), ("fs.n", &raw.fs.n)] {
        if let Some(indices) = indices {
            if indices.len() != corners {
                return Err(MeshError::FaceArityMismatch {
                    p: corners,
                    attribute,
                    len: indices.len(),
                });
            }
        }
    }

    let corner = |i: usize| FaceVertex {
        p: raw.fs.p[i],
        n: raw.fs.n.as_ref().map(|n| n[i]),
        t: raw.fs.t.as_ref().map(|t| t[i]),
    };
    let faces = (0..corners / 3)
        .map(|f| [corner(3 * f), corner(3 * f + 1), corner(3 * f + 2)])
        .collect();

    Mesh::new(positions, normals, texcoords, faces)
}

fn chunk_vec3(values: &[f32], attribute: &'static str) -> Result<Vec<Vec3>, MeshError> {
    if values.len() % 3 != 0 {
        return Err(MeshError::Ragged {
            attribute,
            len: values.len(),
            stride: 3,
        });
    }
    Ok(values.chunks_exact(3).map(Vec3::from_slice).collect())
}

#[derive(Deserialize)]
struct DiffuseParams {
    #[serde(rename = "Kd", default = "default_diffuse")]
    kd: Vec3,
}

fn default_diffuse() -> Vec3 {
    Material::default().diffuse_color
}

fn construct_diffuse(params: &Value) -> SceneResult<Asset> {
    let p: DiffuseParams = parse("material::diffuse", params)?;
    Ok(Material::new(p.kd).into())
}

#[derive(Deserialize)]
struct PinholeParams {
    position: Vec3,
    center: Vec3,
    up: Vec3,
    vfov: f32,
    #[serde(default)]
    aspect: Option<f32>,
}

fn construct_pinhole(params: &Value) -> SceneResult<Asset> {
    const KEY: &str = "camera::pinhole";
    let p: PinholeParams = parse(KEY, params)?;
    if !(p.vfov > 0.0 && p.vfov < 180.0) {
        return Err(SceneError::invalid_params(
            KEY,
            format!("vfov must be in (0, 180), got {}", p.vfov),
        ));
    }

    let mut camera = Camera::new(p.position, p.center, p.up, p.vfov);
    if let Some(aspect) = p.aspect {
        if !(aspect > 0.0) {
            return Err(SceneError::invalid_params(KEY, "aspect must be positive"));
        }
        camera = camera.with_aspect(aspect);
    }
    if !camera.is_valid() {
        return Err(SceneError::invalid_params(
            KEY,
            "position, center and up do not define a camera frame",
        ));
    }
    Ok(camera.into())
}

#[derive(Deserialize)]
struct BitmapParams {
    w: u32,
    h: u32,
}

/// Largest film the bitmap constructor will allocate (16k × 16k).
const MAX_FILM_PIXELS: u64 = 1 << 28;

fn construct_bitmap(params: &Value) -> SceneResult<Asset> {
    let p: BitmapParams = parse("film::bitmap", params)?;
    if p.w == 0 || p.h == 0 {
        return Err(SceneError::invalid_params(
            "film::bitmap",
            format!("film size must be non-zero, got {}x{}", p.w, p.h),
        ));
    }
    if u64::from(p.w) * u64::from(p.h) > MAX_FILM_PIXELS {
        return Err(SceneError::invalid_params(
            "film::bitmap",
            format!("film size {}x{} exceeds {} pixels", p.w, p.h, MAX_FILM_PIXELS),
        ));
    }
    Ok(Film::new(p.w, p.h).into())
}
