//! Error taxonomy shared by scene construction, flattening and acceleration
//! structure builds.

use std::fmt::Display;

use thiserror::Error;

use crate::handle::NodeId;

/// Errors raised by the asset table, the scene graph, the flattener and the
/// acceleration builder.
///
/// The type is `Clone` so that a failed memoized build can be handed to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Asset name already exists: '{0}'")]
    DuplicateName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters for '{type_key}': {message}")]
    InvalidParams { type_key: String, message: String },

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Node {0} cannot take another child")]
    Capacity(NodeId),

    #[error("Stale handle {handle}: scene generation is {current}")]
    StaleHandle { handle: String, current: u32 },

    #[error("Cycle detected in scene graph at node {0}")]
    Cycle(NodeId),

    #[error("Acceleration structure build failed: {0}")]
    Build(String),

    #[error("Failed to write image: {0}")]
    Image(String),
}

impl SceneError {
    pub fn invalid_params(type_key: impl Into<String>, message: impl Display) -> Self {
        SceneError::InvalidParams {
            type_key: type_key.into(),
            message: message.to_string(),
        }
    }

    pub fn build(message: impl Display) -> Self {
        SceneError::Build(message.to_string())
    }
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
