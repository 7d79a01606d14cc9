//! Session: the upward-facing API.
//!
//! Owns a [`Scene`], the acceleration structures built from it and the
//! progress sink renders report to. Handles returned by a session are only
//! valid until the next [`Session::reset`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use strata_core::{Asset, AssetHandle, FilmBuffer, NodeId, Scene, SceneError, SceneResult};
use strata_math::Mat4;

use crate::accel::{Accel, AccelerationBuilder, BuildOptions};
use crate::progress::{LogProgress, ProgressSink};
use crate::renderer::{self, RenderOptions};

/// Reference to an acceleration structure built by a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccelHandle {
    generation: u32,
    index: u32,
}

impl fmt::Display for AccelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "accel#{}@{}", self.index, self.generation)
    }
}

pub struct Session {
    scene: Scene,
    accels: Vec<Arc<Accel>>,
    progress: Arc<dyn ProgressSink>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Session reporting render progress to the log.
    pub fn new() -> Self {
        Self::with_progress(Arc::new(LogProgress::default()))
    }

    pub fn with_progress(progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            scene: Scene::new(),
            accels: Vec::new(),
            progress,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn set_progress(&mut self, progress: Arc<dyn ProgressSink>) {
        self.progress = progress;
    }

    /// Drop every asset, node and acceleration structure. Handles from
    /// before the reset become stale.
    pub fn reset(&mut self) {
        self.accels.clear();
        self.scene.reset();
    }

    /// Create an asset from a registered type and JSON parameters.
    pub fn asset(&mut self, name: &str, type_key: &str, params: &Value) -> SceneResult<AssetHandle> {
        self.scene.create_asset(name, type_key, params)
    }

    /// Insert an already constructed asset.
    pub fn insert_asset(&mut self, name: &str, asset: impl Into<Asset>) -> SceneResult<AssetHandle> {
        self.scene.insert_asset(name, asset)
    }

    pub fn lookup(&self, name: &str) -> SceneResult<AssetHandle> {
        self.scene.lookup_asset(name)
    }

    pub fn root_node(&self) -> NodeId {
        self.scene.root()
    }

    pub fn primitive_node(&mut self, mesh: AssetHandle, material: AssetHandle) -> SceneResult<NodeId> {
        self.scene.create_primitive(mesh, material)
    }

    pub fn camera_node(&mut self, camera: AssetHandle) -> SceneResult<NodeId> {
        self.scene.create_camera_primitive(camera)
    }

    pub fn transform_node(&mut self, matrix: Mat4) -> NodeId {
        self.scene.create_transform(matrix)
    }

    pub fn instance_group_node(&mut self) -> NodeId {
        self.scene.create_instance_group()
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        self.scene.add_child(parent, child)
    }

    /// Place `mesh` under the root at `transform`.
    pub fn primitive(
        &mut self,
        transform: Mat4,
        mesh: AssetHandle,
        material: AssetHandle,
    ) -> SceneResult<NodeId> {
        self.scene.primitive(transform, mesh, material)
    }

    /// Build an acceleration structure over the current scene.
    pub fn build(&mut self, options: &BuildOptions) -> SceneResult<AccelHandle> {
        let accel = AccelerationBuilder::build(&self.scene, options)?;
        let handle = AccelHandle {
            generation: self.scene.generation(),
            index: self.accels.len() as u32,
        };
        self.accels.push(Arc::new(accel));
        log::debug!("Registered acceleration structure {}", handle);
        Ok(handle)
    }

    /// Built structure behind `handle`.
    pub fn accel(&self, handle: AccelHandle) -> SceneResult<&Arc<Accel>> {
        if handle.generation != self.scene.generation() {
            return Err(SceneError::build(format!(
                "{} is stale: scene generation is {}",
                handle,
                self.scene.generation()
            )));
        }
        self.accels
            .get(handle.index as usize)
            .ok_or_else(|| SceneError::build(format!("{} was never built", handle)))
    }

    /// Render through `camera` into `film`.
    pub fn render(
        &self,
        accel: AccelHandle,
        camera: AssetHandle,
        film: AssetHandle,
        options: &RenderOptions,
    ) -> SceneResult<()> {
        let accel = self.accel(accel)?;
        let assets = self.scene.assets();
        let camera = assets.camera(camera)?;
        let film = assets.film(film)?;
        renderer::render(accel, assets, camera, film, options, self.progress.as_ref())
    }

    /// Copy of a film's linear contents.
    pub fn buffer(&self, film: AssetHandle) -> SceneResult<FilmBuffer> {
        Ok(self.scene.assets().film(film)?.buffer())
    }

    /// Write a film to an 8-bit image file.
    pub fn save(&self, film: AssetHandle, path: impl AsRef<Path>) -> SceneResult<()> {
        self.scene.assets().film(film)?.save(path)
    }
}
