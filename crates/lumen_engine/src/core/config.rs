//! # Unified Configuration System
//!
//! All configuration structures for the engine core in one place. Every
//! structure is serializable through the [`Config`] trait (TOML or RON) and
//! carries sensible defaults.
//!
//! ## Configuration Categories
//!
//! - **Engine Config**: logging, debug features, frame pacing
//! - **Asset Config**: standard resource directories and supported formats
//! - **Threading Config**: worker pool size
//! - **Shader Config**: deferred G-buffer shader source

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use crate::config::{Config, ConfigError};

/// # Shader Configuration
///
/// Location of the deferred G-buffer shader every shader variation compiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the G-buffer shader source
    pub gbuffer_shader_path: PathBuf,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(gbuffer_shader_path: impl Into<PathBuf>) -> Self {
        Self {
            gbuffer_shader_path: gbuffer_shader_path.into(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gbuffer_shader_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("G-buffer shader path cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::new("Data/Shaders/GBuffer.shader")
    }
}

/// # Engine Configuration
///
/// Core engine behavior: logging, debug features and frame pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default log filter for the engine
    pub log_level: String,
    /// Whether to enable debug features
    pub debug_mode: bool,
    /// Target FPS for frame rate limiting
    pub target_fps: Option<u32>,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_mode: cfg!(debug_assertions),
            target_fps: None,
        }
    }

    /// Set log level
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable debug mode
    #[must_use]
    pub const fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    /// Set target FPS
    #[must_use]
    pub const fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard directories resources are saved to and searched in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardDirectories {
    /// Engine-format textures
    pub textures: PathBuf,
    /// Engine-format models
    pub models: PathBuf,
    /// Material files
    pub materials: PathBuf,
    /// Shader sources
    pub shaders: PathBuf,
    /// Font descriptions
    pub fonts: PathBuf,
    /// Scene files
    pub scenes: PathBuf,
    /// Audio clips
    pub audio: PathBuf,
    /// Scripts
    pub scripts: PathBuf,
}

impl StandardDirectories {
    /// Build the standard layout under `root`
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            textures: root.join("Textures"),
            models: root.join("Models"),
            materials: root.join("Materials"),
            shaders: root.join("Shaders"),
            fonts: root.join("Fonts"),
            scenes: root.join("Scenes"),
            audio: root.join("Audio"),
            scripts: root.join("Scripts"),
        }
    }
}

impl Default for StandardDirectories {
    fn default() -> Self {
        Self::under("Data")
    }
}

/// # Asset Configuration
///
/// Resource directories and the image formats the importer accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Standard resource directories
    pub directories: StandardDirectories,
    /// Supported image extensions, lower case with leading dot
    pub supported_image_formats: Vec<String>,
    /// Whether imported images get a full mip chain
    pub generate_mipmaps: bool,
}

impl AssetConfig {
    /// Create a new asset configuration
    pub fn new() -> Self {
        Self {
            directories: StandardDirectories::default(),
            supported_image_formats: [".jpg", ".jpeg", ".png", ".bmp", ".tga", ".tif", ".tiff"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            generate_mipmaps: true,
        }
    }

    /// Place every standard directory under `root`
    #[must_use]
    pub fn with_data_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.directories = StandardDirectories::under(root);
        self
    }

    /// Enable or disable mip-map generation
    #[must_use]
    pub const fn with_mipmaps(mut self, enabled: bool) -> Self {
        self.generate_mipmaps = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self
            .supported_image_formats
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(ConfigError::Invalid(format!(
                "Image format '{bad}' must look like '.png'"
            )));
        }
        Ok(())
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Threading Configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadingConfig {
    /// Number of worker threads; `None` picks one per core minus the main thread
    pub worker_count: Option<usize>,
}

impl ThreadingConfig {
    /// Set an explicit worker count
    #[must_use]
    pub const fn with_workers(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Resolve the worker count, never less than one
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map_or(2, |n| n.get().saturating_sub(1))
            })
            .max(1)
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration that encompasses all engine subsystems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Asset system configuration
    pub assets: AssetConfig,
    /// Worker pool configuration
    pub threading: ThreadingConfig,
    /// Shader configuration
    pub shaders: ShaderConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.assets.validate()?;
        self.shaders.validate()?;
        Ok(())
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ApplicationConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.threading.resolved_worker_count() >= 1);
    }

    #[test]
    fn test_bad_image_format_rejected() {
        let mut config = ApplicationConfig::default();
        config.assets.supported_image_formats.push("png".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_and_ron_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = ApplicationConfig {
            engine: EngineConfig::new().with_log_level("debug").with_target_fps(30),
            threading: ThreadingConfig::default().with_workers(3),
            ..ApplicationConfig::default()
        };

        for name in ["engine.toml", "engine.ron"] {
            let path = dir.path().join(name);
            config.save_to_file(&path).unwrap();
            let loaded = ApplicationConfig::load_from_file(&path).unwrap();
            assert_eq!(loaded.engine.log_level, "debug");
            assert_eq!(loaded.engine.target_fps, Some(30));
            assert_eq!(loaded.threading.worker_count, Some(3));
        }
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let result = ApplicationConfig::default().save_to_file(&path);
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ApplicationConfig::load_or_default(dir.path().join("missing.toml"));
        assert_eq!(config.engine.log_level, "info");
    }
}
