//! Raw audio data
//!
//! Playback and mixing live outside the engine core; a clip only keeps the
//! encoded bytes of its file so audio sources can hand them to a player.

use std::path::Path;

use super::{impl_resource_kind, name_from_path, LoadState, Resource, ResourceError, ResourceHeader};

/// Encoded audio file contents
pub struct AudioClip {
    header: ResourceHeader,
    data: Vec<u8>,
}

impl AudioClip {
    /// Create an empty clip
    pub const fn new(header: ResourceHeader) -> Self {
        Self {
            header,
            data: Vec::new(),
        }
    }

    /// Read the whole file into memory
    pub fn load_from_file(&mut self, path: &Path) -> Result<(), ResourceError> {
        self.header.load_state = LoadState::Started;
        match std::fs::read(path) {
            Ok(data) => {
                self.data = data;
                self.header.name = name_from_path(path);
                self.header.file_path = Some(path.to_path_buf());
                self.header.load_state = LoadState::Completed;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load audio clip {}: {e}", path.display());
                self.header.load_state = LoadState::Failed;
                Err(e.into())
            }
        }
    }

    /// Encoded bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the encoded bytes
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }
}

impl Resource for AudioClip {
    impl_resource_kind!(AudioClip);

    fn header(&self) -> &ResourceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        &mut self.header
    }

    fn memory_usage(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reads_bytes_and_names_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laser.wav");
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();

        let mut clip = AudioClip::new(ResourceHeader::new(1));
        clip.load_from_file(&path).unwrap();
        assert_eq!(clip.name(), "laser");
        assert_eq!(clip.data(), &[1, 2, 3, 4]);
        assert_eq!(clip.load_state(), LoadState::Completed);
    }

    #[test]
    fn test_missing_file_marks_failed() {
        let mut clip = AudioClip::new(ResourceHeader::new(1));
        assert!(clip.load_from_file(Path::new("does/not/exist.wav")).is_err());
        assert_eq!(clip.load_state(), LoadState::Failed);
    }
}
