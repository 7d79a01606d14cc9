//! Scene node arena.
//!
//! Nodes live in a flat table and refer to each other by [`NodeId`]. Transform
//! and primitive nodes have at most one parent; instance groups may be
//! referenced from any number of parents, which makes the graph a DAG.
//! Every `add_child` keeps it acyclic.

use strata_math::Mat4;

use crate::error::{SceneError, SceneResult};
use crate::handle::{AssetHandle, NodeId};

/// Leaf node binding assets together.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Primitive {
    pub mesh: Option<AssetHandle>,
    pub material: Option<AssetHandle>,
    pub camera: Option<AssetHandle>,
}

impl Primitive {
    /// True when the primitive carries geometry.
    pub fn is_geometry(&self) -> bool {
        self.mesh.is_some()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SceneNode {
    /// Unique entry point of the graph
    Root { children: Vec<NodeId> },

    Primitive(Primitive),

    /// Places its single child at `matrix` relative to the parent frame
    Transform { matrix: Mat4, child: Option<NodeId> },

    /// Reusable sub-scene shared by every node that references it
    InstanceGroup { children: Vec<NodeId> },
}

impl SceneNode {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SceneNode::Root { .. } => "root",
            SceneNode::Primitive(_) => "primitive",
            SceneNode::Transform { .. } => "transform",
            SceneNode::InstanceGroup { .. } => "instance group",
        }
    }

    /// Child references in insertion order.
    pub fn children(&self) -> &[NodeId] {
        match self {
            SceneNode::Root { children } | SceneNode::InstanceGroup { children } => children,
            SceneNode::Transform { child, .. } => child.as_slice(),
            SceneNode::Primitive(_) => &[],
        }
    }

    pub fn is_instance_group(&self) -> bool {
        matches!(self, SceneNode::InstanceGroup { .. })
    }
}

#[derive(Clone, Debug)]
struct NodeSlot {
    node: SceneNode,
    parents: u32,
}

/// Arena of scene nodes for one scene generation.
#[derive(Clone, Debug)]
pub struct SceneGraph {
    generation: u32,
    nodes: Vec<NodeSlot>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SceneGraph {
    /// Empty graph holding only the root node.
    pub fn new(generation: u32) -> Self {
        Self {
            generation,
            nodes: vec![NodeSlot {
                node: SceneNode::Root {
                    children: Vec::new(),
                },
                parents: 0,
            }],
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn root(&self) -> NodeId {
        NodeId::new(0, self.generation)
    }

    /// Discard every node and start a new generation with a fresh root.
    pub fn reset(&mut self, generation: u32) {
        *self = Self::new(generation);
    }

    fn push(&mut self, node: SceneNode) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32, self.generation);
        self.nodes.push(NodeSlot { node, parents: 0 });
        id
    }

    /// Primitive binding a mesh and a material.
    ///
    /// Asset kinds are not checked here; [`Scene`](crate::Scene) validates
    /// them against its asset table.
    pub fn create_primitive(&mut self, mesh: AssetHandle, material: AssetHandle) -> NodeId {
        self.push(SceneNode::Primitive(Primitive {
            mesh: Some(mesh),
            material: Some(material),
            camera: None,
        }))
    }

    /// Primitive carrying only a camera binding.
    pub fn create_camera_primitive(&mut self, camera: AssetHandle) -> NodeId {
        self.push(SceneNode::Primitive(Primitive {
            mesh: None,
            material: None,
            camera: Some(camera),
        }))
    }

    pub fn create_transform(&mut self, matrix: Mat4) -> NodeId {
        self.push(SceneNode::Transform {
            matrix,
            child: None,
        })
    }

    pub fn create_instance_group(&mut self) -> NodeId {
        self.push(SceneNode::InstanceGroup {
            children: Vec::new(),
        })
    }

    /// Validate a node id against this generation.
    pub fn check(&self, id: NodeId) -> SceneResult<()> {
        if id.generation() != self.generation {
            return Err(SceneError::StaleHandle {
                handle: id.to_string(),
                current: self.generation,
            });
        }
        if id.index() >= self.nodes.len() {
            return Err(SceneError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> SceneResult<&SceneNode> {
        self.check(id)?;
        Ok(&self.nodes[id.index()].node)
    }

    pub fn children(&self, id: NodeId) -> SceneResult<&[NodeId]> {
        self.node(id).map(SceneNode::children)
    }

    /// Attach `child` under `parent`.
    ///
    /// Fails without modifying the graph when the link is not allowed:
    /// primitives take no children, transforms take one, root is never a
    /// child, only instance groups may have several parents and no link may
    /// close a cycle.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        let parent_node = self.node(parent)?;
        let child_node = self.node(child)?;

        if matches!(child_node, SceneNode::Root { .. }) {
            return Err(SceneError::InvalidTopology(
                "root cannot be the child of another node".into(),
            ));
        }
        if parent == child {
            return Err(SceneError::InvalidTopology(format!(
                "{} cannot be its own child",
                parent
            )));
        }
        match parent_node {
            SceneNode::Primitive(_) => {
                return Err(SceneError::InvalidTopology(format!(
                    "primitive {} cannot have children",
                    parent
                )));
            }
            SceneNode::Transform { child: Some(_), .. } => {
                return Err(SceneError::Capacity(parent));
            }
            _ => {}
        }
        if !child_node.is_instance_group() && self.nodes[child.index()].parents > 0 {
            return Err(SceneError::InvalidTopology(format!(
                "{} {} already has a parent; only instance groups can be shared",
                child_node.kind_name(),
                child
            )));
        }
        if self.reaches(child, parent) {
            return Err(SceneError::InvalidTopology(format!(
                "linking {} under {} would create a cycle",
                child, parent
            )));
        }

        self.link(parent, child);
        Ok(())
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        match &mut self.nodes[parent.index()].node {
            SceneNode::Root { children } | SceneNode::InstanceGroup { children } => {
                children.push(child)
            }
            SceneNode::Transform { child: slot, .. } => *slot = Some(child),
            SceneNode::Primitive(_) => return,
        }
        self.nodes[child.index()].parents += 1;
    }

    /// Link without any topology check, for building malformed graphs in
    /// traversal tests.
    #[cfg(test)]
    pub(crate) fn link_unchecked(&mut self, parent: NodeId, child: NodeId) {
        self.link(parent, child);
    }

    /// Whether `target` is reachable from `from` by following child links.
    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if std::mem::replace(&mut visited[id.index()], true) {
                continue;
            }
            stack.extend_from_slice(self.nodes[id.index()].node.children());
        }
        false
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Ids of every node in creation order, root first.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(|i| NodeId::new(i, self.generation))
    }
}
