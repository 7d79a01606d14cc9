//! Named asset storage.
//!
//! Assets are immutable once created and shared behind `Arc`, so any number
//! of primitives (and any number of acceleration structure builds) can refer
//! to the same mesh without copying it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use strata_math::Vec3;

use crate::camera::Camera;
use crate::error::{SceneError, SceneResult};
use crate::film::Film;
use crate::handle::AssetHandle;
use crate::mesh::Mesh;
use crate::registry::AssetRegistry;

/// A diffuse surface description.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    /// Diffuse/albedo color (RGB, 0-1)
    pub diffuse_color: Vec3,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse_color: Vec3::splat(0.5), // Grey default
        }
    }
}

impl Material {
    pub fn new(diffuse_color: Vec3) -> Self {
        Self { diffuse_color }
    }
}

/// Category of an asset, used to validate node references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Mesh,
    Material,
    Camera,
    Film,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Mesh => "mesh",
            AssetKind::Material => "material",
            AssetKind::Camera => "camera",
            AssetKind::Film => "film",
        };
        f.write_str(name)
    }
}

/// A constructed asset.
#[derive(Clone, Debug)]
pub enum Asset {
    Mesh(Arc<Mesh>),
    Material(Arc<Material>),
    Camera(Arc<Camera>),
    Film(Arc<Film>),
}

impl Asset {
    pub fn kind(&self) -> AssetKind {
        match self {
            Asset::Mesh(_) => AssetKind::Mesh,
            Asset::Material(_) => AssetKind::Material,
            Asset::Camera(_) => AssetKind::Camera,
            Asset::Film(_) => AssetKind::Film,
        }
    }
}

impl From<Mesh> for Asset {
    fn from(mesh: Mesh) -> Self {
        Asset::Mesh(Arc::new(mesh))
    }
}

impl From<Material> for Asset {
    fn from(material: Material) -> Self {
        Asset::Material(Arc::new(material))
    }
}

impl From<Camera> for Asset {
    fn from(camera: Camera) -> Self {
        Asset::Camera(Arc::new(camera))
    }
}

impl From<Film> for Asset {
    fn from(film: Film) -> Self {
        Asset::Film(Arc::new(film))
    }
}

#[derive(Debug)]
struct AssetEntry {
    name: String,
    asset: Asset,
}

/// Table of named assets for one scene generation.
///
/// Names are unique. Handles issued by the table carry its generation and
/// are rejected as stale after [`AssetTable::reset`].
#[derive(Debug, Default)]
pub struct AssetTable {
    generation: u32,
    entries: Vec<AssetEntry>,
    by_name: HashMap<String, AssetHandle>,
}

impl AssetTable {
    pub fn new(generation: u32) -> Self {
        Self {
            generation,
            ..Default::default()
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Drop every asset and start issuing handles for `generation`.
    pub fn reset(&mut self, generation: u32) {
        self.entries.clear();
        self.by_name.clear();
        self.generation = generation;
    }

    /// Construct an asset of type `type_key` from JSON parameters and store
    /// it under `name`.
    ///
    /// On any error the table is left unchanged.
    pub fn create(
        &mut self,
        registry: &AssetRegistry,
        name: &str,
        type_key: &str,
        params: &Value,
    ) -> SceneResult<AssetHandle> {
        if self.by_name.contains_key(name) {
            return Err(SceneError::DuplicateName(name.to_string()));
        }
        let asset = registry.construct(type_key, params)?;
        log::debug!("Created {} asset '{}' ({})", asset.kind(), name, type_key);
        self.insert(name, asset)
    }

    /// Store an already constructed asset under `name`.
    pub fn insert(&mut self, name: &str, asset: Asset) -> SceneResult<AssetHandle> {
        if self.by_name.contains_key(name) {
            return Err(SceneError::DuplicateName(name.to_string()));
        }

        let handle = AssetHandle::new(self.entries.len() as u32, self.generation);
        self.entries.push(AssetEntry {
            name: name.to_string(),
            asset,
        });
        self.by_name.insert(name.to_string(), handle);
        Ok(handle)
    }

    pub fn lookup(&self, name: &str) -> Option<AssetHandle> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, handle: AssetHandle) -> SceneResult<&Asset> {
        self.entry(handle).map(|e| &e.asset)
    }

    pub fn name(&self, handle: AssetHandle) -> SceneResult<&str> {
        self.entry(handle).map(|e| e.name.as_str())
    }

    fn entry(&self, handle: AssetHandle) -> SceneResult<&AssetEntry> {
        if handle.generation() != self.generation {
            return Err(SceneError::StaleHandle {
                handle: handle.to_string(),
                current: self.generation,
            });
        }
        self.entries
            .get(handle.index())
            .ok_or_else(|| SceneError::NotFound(handle.to_string()))
    }

    pub fn kind(&self, handle: AssetHandle) -> SceneResult<AssetKind> {
        self.get(handle).map(Asset::kind)
    }

    pub fn mesh(&self, handle: AssetHandle) -> SceneResult<&Arc<Mesh>> {
        match self.get(handle)? {
            Asset::Mesh(mesh) => Ok(mesh),
            other => Err(kind_mismatch(handle, AssetKind::Mesh, other.kind())),
        }
    }

    pub fn material(&self, handle: AssetHandle) -> SceneResult<&Arc<Material>> {
        match self.get(handle)? {
            Asset::Material(material) => Ok(material),
            other => Err(kind_mismatch(handle, AssetKind::Material, other.kind())),
        }
    }

    pub fn camera(&self, handle: AssetHandle) -> SceneResult<&Arc<Camera>> {
        match self.get(handle)? {
            Asset::Camera(camera) => Ok(camera),
            other => Err(kind_mismatch(handle, AssetKind::Camera, other.kind())),
        }
    }

    pub fn film(&self, handle: AssetHandle) -> SceneResult<&Arc<Film>> {
        match self.get(handle)? {
            Asset::Film(film) => Ok(film),
            other => Err(kind_mismatch(handle, AssetKind::Film, other.kind())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn kind_mismatch(handle: AssetHandle, expected: AssetKind, found: AssetKind) -> SceneError {
    SceneError::InvalidParams {
        type_key: expected.to_string(),
        message: format!("{} is a {} asset", handle, found),
    }
}
