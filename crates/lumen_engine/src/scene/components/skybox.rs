//! Environment cube map

use std::path::PathBuf;

use super::{read_path, write_path};
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::scene::component::{ComponentContext, Lifecycle};

/// Sky rendered behind everything else
#[derive(Debug, Clone, Default)]
pub struct Skybox {
    /// Cube map texture
    pub cube_map: Option<PathBuf>,
}

impl Lifecycle for Skybox {
    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        write_path(writer, self.cube_map.as_deref())
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        self.cube_map = read_path(reader)?;
        Ok(())
    }
}
