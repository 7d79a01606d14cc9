//! Scene flattening.
//!
//! Walks the node graph depth-first from a start node, composing transforms
//! on the way down (`accumulated = parent * matrix`, column vectors), and
//! emits one [`FlattenedInstance`] per mesh primitive and path.
//!
//! Two modes:
//!
//! - [`Flattener::flatten`] expands every instance group in place, so a group
//!   referenced N times produces N copies of its content.
//! - [`Flattener::flatten_instanced`] stops at nested instance groups and
//!   records a [`GroupReference`] instead. The caller builds each group once
//!   (in [`Flattener::group_build_order`]) and places it by reference.
//!
//! Both walks fail with [`SceneError::Cycle`] on a malformed graph instead of
//! looping.

use strata_math::Mat4;

use crate::error::{SceneError, SceneResult};
use crate::graph::SceneNode;
use crate::handle::{AssetHandle, NodeId};
use crate::scene::Scene;

/// Maximum nesting depth of a traversal.
pub const MAX_DEPTH: usize = 1024;

/// A mesh primitive placed in the frame of the traversal start node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlattenedInstance {
    /// Primitive node that produced this placement
    pub node: NodeId,
    pub mesh: AssetHandle,
    pub material: AssetHandle,
    /// Product of every transform on the path from the start node
    pub transform: Mat4,
}

/// A reference to a nested instance group, placed at `transform`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupReference {
    pub group: NodeId,
    pub transform: Mat4,
}

/// Content of one level of a two-level build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlattenedContent {
    pub primitives: Vec<FlattenedInstance>,
    pub groups: Vec<GroupReference>,
}

impl FlattenedContent {
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty() && self.groups.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Expand {
    All,
    StopAtGroups,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

pub struct Flattener<'a> {
    scene: &'a Scene,
}

impl<'a> Flattener<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        Self { scene }
    }

    /// Expand the whole scene from the root.
    pub fn flatten(&self) -> SceneResult<Vec<FlattenedInstance>> {
        self.flatten_from(self.scene.root())
    }

    /// Expand everything reachable from `start`, groups included.
    pub fn flatten_from(&self, start: NodeId) -> SceneResult<Vec<FlattenedInstance>> {
        let mut out = FlattenedContent::default();
        self.walk(start, Expand::All, &mut out)?;
        Ok(out.primitives)
    }

    /// Flatten the content of `start` without entering nested instance
    /// groups.
    ///
    /// `start` itself is expanded even when it is a group, which is how a
    /// group's own bottom-level content is gathered.
    pub fn flatten_instanced(&self, start: NodeId) -> SceneResult<FlattenedContent> {
        let mut out = FlattenedContent::default();
        self.walk(start, Expand::StopAtGroups, &mut out)?;
        Ok(out)
    }

    fn walk(&self, start: NodeId, expand: Expand, out: &mut FlattenedContent) -> SceneResult<()> {
        let mut on_path = vec![false; self.scene.node_count()];
        self.visit(start, Mat4::IDENTITY, 0, expand, &mut on_path, out)
    }

    fn visit(
        &self,
        id: NodeId,
        transform: Mat4,
        depth: usize,
        expand: Expand,
        on_path: &mut [bool],
        out: &mut FlattenedContent,
    ) -> SceneResult<()> {
        let node = self.scene.node(id)?;
        if depth > MAX_DEPTH || on_path[id.index()] {
            return Err(SceneError::Cycle(id));
        }

        match node {
            SceneNode::Primitive(p) => {
                // Camera-only primitives carry no geometry
                if let (Some(mesh), Some(material)) = (p.mesh, p.material) {
                    self.scene.assets().mesh(mesh)?;
                    self.scene.assets().material(material)?;
                    out.primitives.push(FlattenedInstance {
                        node: id,
                        mesh,
                        material,
                        transform,
                    });
                }
                return Ok(());
            }
            SceneNode::InstanceGroup { .. } if depth > 0 && expand == Expand::StopAtGroups => {
                out.groups.push(GroupReference {
                    group: id,
                    transform,
                });
                return Ok(());
            }
            _ => {}
        }

        let transform = match node {
            SceneNode::Transform { matrix, .. } => transform * *matrix,
            _ => transform,
        };

        on_path[id.index()] = true;
        for &child in node.children() {
            self.visit(child, transform, depth + 1, expand, on_path, out)?;
        }
        on_path[id.index()] = false;
        Ok(())
    }

    /// Every instance group reachable from `start`, each listed after all
    /// groups it contains, so building in this order always finds nested
    /// groups already built.
    pub fn group_build_order(&self, start: NodeId) -> SceneResult<Vec<NodeId>> {
        let mut marks = vec![Mark::Unvisited; self.scene.node_count()];
        let mut order = Vec::new();
        self.order_visit(start, 0, &mut marks, &mut order)?;
        Ok(order)
    }

    fn order_visit(
        &self,
        id: NodeId,
        depth: usize,
        marks: &mut [Mark],
        order: &mut Vec<NodeId>,
    ) -> SceneResult<()> {
        let node = self.scene.node(id)?;
        match marks[id.index()] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(SceneError::Cycle(id)),
            Mark::Unvisited if depth > MAX_DEPTH => return Err(SceneError::Cycle(id)),
            Mark::Unvisited => {}
        }

        marks[id.index()] = Mark::InProgress;
        for &child in node.children() {
            self.order_visit(child, depth + 1, marks, order)?;
        }
        marks[id.index()] = Mark::Done;

        if node.is_instance_group() {
            order.push(id);
        }
        Ok(())
    }
}
