//! Scene graph: entities, their components and the world that owns them

mod component;
pub mod components;
mod entity;
mod world;

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub use component::{
    Component, ComponentContext, ComponentData, ComponentId, ComponentKind, ComponentVariant, Lifecycle,
};
pub use entity::Entity;
pub use world::{Scene, PREFAB_EXTENSION, SCENE_EXTENSION};

use crate::io::StreamError;

/// Entity identifier, unique within a scene and persisted with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scene errors
#[derive(Error, Debug)]
pub enum SceneError {
    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary data was malformed
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// No entity has this id
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),

    /// Parenting would create a cycle
    #[error("Entity {parent} can't become the parent of {child}")]
    InvalidParent {
        /// Entity being moved
        child: EntityId,
        /// Requested parent
        parent: EntityId,
    },

    /// File has the wrong extension for the requested operation
    #[error("Unexpected file extension: {0}")]
    InvalidExtension(PathBuf),
}
