//! Component variants

mod audio;
mod camera;
mod light;
mod line_renderer;
mod physics;
mod renderable;
mod script;
mod skybox;
mod transform;

use std::path::{Path, PathBuf};

pub use audio::{AudioListener, AudioSource};
pub use camera::{Camera, Projection};
pub use light::{Light, LightType};
pub use line_renderer::{Line, LineRenderer};
pub use physics::{Collider, ColliderShape, Constraint, ConstraintType, RigidBody};
pub use renderable::Renderable;
pub use script::Script;
pub use skybox::Skybox;
pub use transform::Transform;

use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::resource::NOT_ASSIGNED;

pub(crate) fn write_path(writer: &mut BinaryWriter<'_>, path: Option<&Path>) -> Result<(), StreamError> {
    match path {
        Some(path) => writer.write_str(&path.to_string_lossy()),
        None => writer.write_str(NOT_ASSIGNED),
    }
}

pub(crate) fn read_path(reader: &mut BinaryReader<'_>) -> Result<Option<PathBuf>, StreamError> {
    let text = reader.read_string()?;
    Ok((text != NOT_ASSIGNED).then(|| PathBuf::from(text)))
}

pub(crate) fn write_bool3(writer: &mut BinaryWriter<'_>, values: [bool; 3]) -> Result<(), StreamError> {
    values.iter().try_for_each(|value| writer.write_bool(*value))
}

pub(crate) fn read_bool3(reader: &mut BinaryReader<'_>) -> Result<[bool; 3], StreamError> {
    Ok([reader.read_bool()?, reader.read_bool()?, reader.read_bool()?])
}
