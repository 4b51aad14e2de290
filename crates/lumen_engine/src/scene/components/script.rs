//! Script reference

use std::path::PathBuf;

use super::{read_path, write_path};
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::scene::component::{ComponentContext, Lifecycle};

/// Script attached to an entity; an entity may carry several
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Script source file
    pub path: Option<PathBuf>,
}

impl Lifecycle for Script {
    fn on_start(&mut self, ctx: &ComponentContext<'_>) {
        if self.path.is_none() {
            log::debug!("Script on entity {} has no source", ctx.owner);
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        write_path(writer, self.path.as_deref())
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        self.path = read_path(reader)?;
        Ok(())
    }
}
