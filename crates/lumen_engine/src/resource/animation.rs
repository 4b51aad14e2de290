//! Keyframe animations extracted from imported models

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{impl_resource_kind, LoadState, Resource, ResourceError, ResourceHeader};
use crate::foundation::math::{Quat, Vec3};

/// Ticks per second assumed when the source file does not say
pub const DEFAULT_TICKS_PER_SECOND: f32 = 25.0;

/// Vector keyframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorKey {
    /// Time in ticks
    pub time: f32,
    /// Value
    pub value: Vec3,
}

/// Rotation keyframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuatKey {
    /// Time in ticks
    pub time: f32,
    /// Value
    pub value: Quat,
}

/// Keys affecting one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationChannel {
    /// Name of the animated node
    pub node_name: String,
    /// Translation keys
    pub position_keys: Vec<VectorKey>,
    /// Rotation keys
    pub rotation_keys: Vec<QuatKey>,
    /// Scale keys
    pub scale_keys: Vec<VectorKey>,
}

#[derive(Serialize, Deserialize)]
struct AnimationFile {
    name: String,
    duration: f32,
    ticks_per_second: f32,
    channels: Vec<AnimationChannel>,
}

/// Named set of channels
pub struct Animation {
    header: ResourceHeader,
    /// Length in ticks
    pub duration: f32,
    /// Playback rate
    pub ticks_per_second: f32,
    /// Per-node keys
    pub channels: Vec<AnimationChannel>,
}

impl Animation {
    /// Create an empty animation
    pub const fn new(header: ResourceHeader) -> Self {
        Self {
            header,
            duration: 0.0,
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            channels: Vec::new(),
        }
    }

    /// Set the playback rate; zero falls back to the default
    pub fn set_ticks_per_second(&mut self, ticks: f32) {
        self.ticks_per_second = if ticks > 0.0 { ticks } else { DEFAULT_TICKS_PER_SECOND };
    }

    /// Length in seconds
    pub fn duration_seconds(&self) -> f32 {
        self.duration / self.ticks_per_second
    }

    /// Load from a RON animation file
    pub fn load_from_file(&mut self, path: &Path) -> Result<(), ResourceError> {
        self.header.load_state = LoadState::Started;
        let result = std::fs::read_to_string(path)
            .map_err(ResourceError::from)
            .and_then(|text| ron::from_str::<AnimationFile>(&text).map_err(|e| ResourceError::Parse(e.to_string())));

        match result {
            Ok(file) => {
                self.header.name = file.name;
                self.header.file_path = Some(path.to_path_buf());
                self.duration = file.duration;
                self.set_ticks_per_second(file.ticks_per_second);
                self.channels = file.channels;
                self.header.load_state = LoadState::Completed;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load animation {}: {e}", path.display());
                self.header.load_state = LoadState::Failed;
                Err(e)
            }
        }
    }
}

impl Resource for Animation {
    impl_resource_kind!(Animation);

    fn header(&self) -> &ResourceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        &mut self.header
    }

    fn memory_usage(&self) -> usize {
        self.channels
            .iter()
            .map(|c| {
                c.position_keys.len() * std::mem::size_of::<VectorKey>()
                    + c.rotation_keys.len() * std::mem::size_of::<QuatKey>()
                    + c.scale_keys.len() * std::mem::size_of::<VectorKey>()
            })
            .sum()
    }

    fn save_to_file(&self, path: &Path) -> Result<(), ResourceError> {
        let file = AnimationFile {
            name: self.header.name.clone(),
            duration: self.duration,
            ticks_per_second: self.ticks_per_second,
            channels: self.channels.clone(),
        };
        let text = ron::ser::to_string_pretty(&file, ron::ser::PrettyConfig::default())
            .map_err(|e| ResourceError::Parse(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_ticks_fall_back_to_default() {
        let mut animation = Animation::new(ResourceHeader::new(1));
        animation.set_ticks_per_second(0.0);
        assert_relative_eq!(animation.ticks_per_second, 25.0);

        animation.duration = 50.0;
        assert_relative_eq!(animation.duration_seconds(), 2.0);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walk.animation");

        let mut animation = Animation::new(ResourceHeader::new(1).with_name("walk"));
        animation.duration = 10.0;
        animation.channels.push(AnimationChannel {
            node_name: "hip".to_string(),
            position_keys: vec![VectorKey { time: 0.0, value: Vec3::new(0.0, 1.0, 0.0) }],
            rotation_keys: vec![QuatKey { time: 0.0, value: Quat::identity() }],
            scale_keys: Vec::new(),
        });
        animation.save_to_file(&path).unwrap();

        let mut loaded = Animation::new(ResourceHeader::new(2));
        loaded.load_from_file(&path).unwrap();
        assert_eq!(loaded.name(), "walk");
        assert_eq!(loaded.channels, animation.channels);
        assert!(loaded.memory_usage() > 0);
    }
}
