//! Local position, rotation and scale of an entity
//!
//! The hierarchy itself (parent, children) and the resolved world matrix live
//! on the entity; the transform only carries the local part.

use crate::foundation::math::{compose, decompose, Mat4, Quat, Vec3};
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::scene::component::{ComponentContext, Lifecycle};

/// Local transform, relative to the parent entity
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Local position
    pub position: Vec3,
    /// Local rotation
    pub rotation: Quat,
    /// Local scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Builder pattern: Set position
    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Builder pattern: Set rotation
    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Builder pattern: Set scale
    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Local matrix (TRS order)
    pub fn local_matrix(&self) -> Mat4 {
        compose(&self.position, &self.rotation, &self.scale)
    }

    /// Overwrite from a local matrix
    pub fn set_local_matrix(&mut self, matrix: &Mat4) {
        let (position, rotation, scale) = decompose(matrix);
        self.position = position;
        self.rotation = rotation;
        self.scale = scale;
    }
}

impl Lifecycle for Transform {
    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        writer.write_vec3(&self.position)?;
        writer.write_quat(&self.rotation)?;
        writer.write_vec3(&self.scale)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        self.position = reader.read_vec3()?;
        self.rotation = reader.read_quat()?;
        self.scale = reader.read_vec3()?;
        Ok(())
    }
}
