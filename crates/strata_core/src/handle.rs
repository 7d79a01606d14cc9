//! Generation-tagged handles into the asset table and the scene graph.
//!
//! Every handle remembers the scene generation it was issued in. Resetting
//! the scene bumps the generation, so a handle kept across a reset is
//! detected as stale instead of silently aliasing a new resource.

use std::fmt;

/// Handle to an asset stored in an [`AssetTable`](crate::AssetTable).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AssetHandle {
    index: u32,
    generation: u32,
}

impl AssetHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}@{}", self.index, self.generation)
    }
}

/// Identifier of a node in a [`SceneGraph`](crate::SceneGraph).
///
/// Also serves as the identity of an instance group when memoizing its
/// bottom-level structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}@{}", self.index, self.generation)
    }
}
