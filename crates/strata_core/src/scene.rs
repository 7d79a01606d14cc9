//! Scene: the asset table and node graph of one scene generation.
//!
//! All construction goes through [`Scene`] so that node creation can check
//! asset kinds and every call is atomic: on error nothing is created.

use serde_json::Value;
use strata_math::Mat4;

use crate::asset::{Asset, AssetKind, AssetTable};
use crate::error::{SceneError, SceneResult};
use crate::graph::{SceneGraph, SceneNode};
use crate::handle::{AssetHandle, NodeId};
use crate::registry::AssetRegistry;

#[derive(Debug)]
pub struct Scene {
    generation: u32,
    registry: AssetRegistry,
    assets: AssetTable,
    graph: SceneGraph,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Empty scene using the built-in asset types.
    pub fn new() -> Self {
        Self::with_registry(AssetRegistry::with_defaults())
    }

    pub fn with_registry(registry: AssetRegistry) -> Self {
        Self {
            generation: 0,
            registry,
            assets: AssetTable::new(0),
            graph: SceneGraph::new(0),
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Discard all assets and nodes. Handles issued before the reset become
    /// stale.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.assets.reset(self.generation);
        self.graph.reset(self.generation);
        log::info!("Scene reset (generation {})", self.generation);
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AssetRegistry {
        &mut self.registry
    }

    pub fn assets(&self) -> &AssetTable {
        &self.assets
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    #[cfg(test)]
    pub(crate) fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    // ---- Assets ----

    pub fn create_asset(
        &mut self,
        name: &str,
        type_key: &str,
        params: &Value,
    ) -> SceneResult<AssetHandle> {
        self.assets.create(&self.registry, name, type_key, params)
    }

    pub fn insert_asset(&mut self, name: &str, asset: impl Into<Asset>) -> SceneResult<AssetHandle> {
        self.assets.insert(name, asset.into())
    }

    pub fn lookup_asset(&self, name: &str) -> SceneResult<AssetHandle> {
        self.assets
            .lookup(name)
            .ok_or_else(|| SceneError::NotFound(format!("asset '{}'", name)))
    }

    fn expect_kind(&self, handle: AssetHandle, expected: AssetKind) -> SceneResult<()> {
        let found = self.assets.kind(handle)?;
        if found != expected {
            return Err(SceneError::InvalidParams {
                type_key: expected.to_string(),
                message: format!("{} is a {} asset", handle, found),
            });
        }
        Ok(())
    }

    // ---- Nodes ----

    pub fn root(&self) -> NodeId {
        self.graph.root()
    }

    pub fn node(&self, id: NodeId) -> SceneResult<&SceneNode> {
        self.graph.node(id)
    }

    pub fn children(&self, id: NodeId) -> SceneResult<&[NodeId]> {
        self.graph.children(id)
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.graph.len()
    }

    pub fn create_primitive(
        &mut self,
        mesh: AssetHandle,
        material: AssetHandle,
    ) -> SceneResult<NodeId> {
        self.expect_kind(mesh, AssetKind::Mesh)?;
        self.expect_kind(material, AssetKind::Material)?;
        Ok(self.graph.create_primitive(mesh, material))
    }

    pub fn create_camera_primitive(&mut self, camera: AssetHandle) -> SceneResult<NodeId> {
        self.expect_kind(camera, AssetKind::Camera)?;
        Ok(self.graph.create_camera_primitive(camera))
    }

    pub fn create_transform(&mut self, matrix: Mat4) -> NodeId {
        self.graph.create_transform(matrix)
    }

    pub fn create_instance_group(&mut self) -> NodeId {
        self.graph.create_instance_group()
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        self.graph.add_child(parent, child)
    }

    /// Place a mesh under the root: creates `transform -> primitive` and
    /// attaches the transform to the root. Returns the primitive node.
    pub fn primitive(
        &mut self,
        transform: Mat4,
        mesh: AssetHandle,
        material: AssetHandle,
    ) -> SceneResult<NodeId> {
        self.expect_kind(mesh, AssetKind::Mesh)?;
        self.expect_kind(material, AssetKind::Material)?;

        let t = self.graph.create_transform(transform);
        let p = self.graph.create_primitive(mesh, material);
        self.graph.add_child(t, p)?;
        self.graph.add_child(self.graph.root(), t)?;
        Ok(p)
    }

    /// Place a camera under the root. Returns the primitive node.
    pub fn camera_primitive(&mut self, transform: Mat4, camera: AssetHandle) -> SceneResult<NodeId> {
        self.expect_kind(camera, AssetKind::Camera)?;

        let t = self.graph.create_transform(transform);
        let p = self.graph.create_camera_primitive(camera);
        self.graph.add_child(t, p)?;
        self.graph.add_child(self.graph.root(), t)?;
        Ok(p)
    }

    /// True when at least one mesh primitive is reachable from the root.
    pub fn is_renderable(&self) -> bool {
        let mut visited = vec![false; self.graph.len()];
        let mut stack = vec![self.graph.root()];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut visited[id.index()], true) {
                continue;
            }
            match self.graph.node(id) {
                Ok(SceneNode::Primitive(p)) if p.is_geometry() => return true,
                Ok(node) => stack.extend_from_slice(node.children()),
                Err(_) => {}
            }
        }
        false
    }
}
