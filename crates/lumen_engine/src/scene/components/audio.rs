//! Audio emitter and listener
//!
//! Only state lives here; mixing and playback belong to an audio backend.

use std::path::PathBuf;

use super::{read_path, write_path};
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::scene::component::{ComponentContext, Lifecycle};

/// Point that hears audio sources
#[derive(Debug, Clone, Default)]
pub struct AudioListener;

impl Lifecycle for AudioListener {}

/// Emits an audio clip
#[derive(Debug, Clone)]
pub struct AudioSource {
    /// Clip to play
    pub clip: Option<PathBuf>,
    /// Muted sources keep playing silently
    pub mute: bool,
    /// Start playing when the world starts
    pub play_on_start: bool,
    /// Restart at the end of the clip
    pub looping: bool,
    /// 0 is the highest priority
    pub priority: i32,
    /// Volume in 0..=1
    pub volume: f32,
    /// Playback speed multiplier
    pub pitch: f32,
    /// Stereo pan in -1..=1
    pub pan: f32,
    playing: bool,
}

impl Default for AudioSource {
    fn default() -> Self {
        Self {
            clip: None,
            mute: false,
            play_on_start: true,
            looping: false,
            priority: 128,
            volume: 1.0,
            pitch: 1.0,
            pan: 0.0,
            playing: false,
        }
    }
}

impl AudioSource {
    /// Whether the source is currently playing
    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    /// Start playback; false when there is no clip
    pub fn play(&mut self) -> bool {
        self.playing = self.clip.is_some();
        self.playing
    }

    /// Stop playback
    pub fn stop(&mut self) {
        self.playing = false;
    }
}

impl Lifecycle for AudioSource {
    fn on_start(&mut self, _ctx: &ComponentContext<'_>) {
        if self.play_on_start {
            self.play();
        }
    }

    fn on_stop(&mut self, _ctx: &ComponentContext<'_>) {
        self.stop();
    }

    fn on_remove(&mut self, _ctx: &ComponentContext<'_>) {
        self.stop();
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        write_path(writer, self.clip.as_deref())?;
        writer.write_bool(self.mute)?;
        writer.write_bool(self.play_on_start)?;
        writer.write_bool(self.looping)?;
        writer.write_i32(self.priority)?;
        writer.write_f32(self.volume)?;
        writer.write_f32(self.pitch)?;
        writer.write_f32(self.pan)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        self.clip = read_path(reader)?;
        self.mute = reader.read_bool()?;
        self.play_on_start = reader.read_bool()?;
        self.looping = reader.read_bool()?;
        self.priority = reader.read_i32()?;
        self.volume = reader.read_f32()?;
        self.pitch = reader.read_f32()?;
        self.pan = reader.read_f32()?;
        Ok(())
    }
}
