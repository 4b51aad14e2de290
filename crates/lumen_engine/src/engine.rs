//! Engine: subsystem wiring and the per-frame tick

use std::path::Path;
use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;

use crate::core::{ApplicationConfig, ConfigError, Context};
use crate::events::{EventSystem, EventType};
use crate::foundation::logging;
use crate::import::{ImportError, ModelImporter, ObjImporter};
use crate::rendering::{GraphicsDevice, RenderStats, Renderer};
use crate::resource::{handle, name_from_path, Model, ResourceError, ResourceHeader, ResourceManager, MODEL_EXTENSION};
use crate::scene::{EntityId, Scene, SceneError};

bitflags! {
    /// What the engine does each tick
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EngineFlags: u32 {
        /// Update entities
        const UPDATE = 1 << 0;
        /// Render the scene
        const RENDER = 1 << 1;
        /// Step physics
        const PHYSICS = 1 << 2;
        /// Game mode: the world is started
        const GAME = 1 << 3;
    }
}

impl Default for EngineFlags {
    fn default() -> Self {
        Self::UPDATE | Self::RENDER | Self::PHYSICS
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Model import error
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Scene error
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Resource error
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
}

/// Main engine struct
///
/// Owns the [`Context`] and drives it one frame per [`Engine::tick`].
pub struct Engine {
    context: Context,
    importer: ModelImporter,
    flags: EngineFlags,
    config: ApplicationConfig,
    frame: u64,
}

impl Engine {
    /// Validate `config`, install logging and build every subsystem
    pub fn new(config: ApplicationConfig, device: Arc<dyn GraphicsDevice>) -> Result<Self, EngineError> {
        config.validate()?;
        logging::init(&config.engine.log_level);
        log::info!("Initializing engine...");

        let context = Context::new(&config, device);
        let importer = ModelImporter::new(
            Arc::new(ObjImporter::new()),
            context.subsystem::<ResourceManager>().clone(),
            context.subsystem::<EventSystem>().sender(),
        );

        log::info!("Engine initialized");
        Ok(Self {
            context,
            importer,
            flags: EngineFlags::default(),
            config,
            frame: 0,
        })
    }

    /// Subsystem owner
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable subsystem owner
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// The world
    pub fn scene(&self) -> &Scene {
        self.context.subsystem()
    }

    /// The world, mutably
    pub fn scene_mut(&mut self) -> &mut Scene {
        self.context.subsystem_mut()
    }

    /// Resource manager
    pub fn resources(&self) -> &ResourceManager {
        self.context.subsystem()
    }

    /// Renderer
    pub fn renderer_mut(&mut self) -> &mut Renderer {
        self.context.subsystem_mut()
    }

    /// Model importer and its progress report
    pub const fn importer(&self) -> &ModelImporter {
        &self.importer
    }

    /// Configuration the engine was built from
    pub const fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Frames ticked so far
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Current mode flags
    pub const fn flags(&self) -> EngineFlags {
        self.flags
    }

    /// Turn mode flags on or off; toggling [`EngineFlags::GAME`] starts or stops the world
    pub fn set_flags(&mut self, flags: EngineFlags, enabled: bool) {
        let was_game = self.flags.contains(EngineFlags::GAME);
        self.flags.set(flags, enabled);
        let is_game = self.flags.contains(EngineFlags::GAME);

        match (was_game, is_game) {
            (false, true) => self.scene_mut().start(),
            (true, false) => self.scene_mut().stop(),
            _ => {}
        }
    }

    /// Import a model file into the scene; returns the root entity
    ///
    /// The imported model is cached so its materials and geometry can be
    /// saved alongside the scene.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<EntityId, EngineError> {
        let path = path.as_ref();
        if !self.importer.supports(path) {
            return Err(ImportError::Unsupported(path.to_path_buf()).into());
        }

        let resources = self.resources().clone();
        let name = name_from_path(path);
        let model_path = resources.directories().models.join(format!("{name}.{MODEL_EXTENSION}"));
        let model = handle(Model::new(
            ResourceHeader::new(resources.next_id())
                .with_name(name)
                .with_path(model_path),
        ));

        let running = self.scene().is_running();
        if running {
            self.scene_mut().stop();
        }
        let scene: &mut Scene = self.context.subsystem_mut();
        let result = self.importer.load(&model, path, scene);
        if running {
            self.scene_mut().start();
        }
        result?;

        let model = resources.cache_resource(model);
        let root = model.read().root_entity();
        root.ok_or_else(|| ImportError::Empty(path.to_path_buf()).into())
    }

    /// Save the scene and every cached resource that has a file path
    pub fn save_scene(&mut self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let saved = self.resources().save_resources_to_files();
        log::info!("Saved {saved} resources");
        self.scene().save_to_file(path.as_ref())?;
        Ok(())
    }

    /// Replace the scene with the one stored at `path`
    pub fn load_scene(&mut self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let resources = self.resources().clone();
        let cache = resources.cache().clone();
        self.scene_mut().load_from_file(path.as_ref(), Some(&cache))?;
        Ok(())
    }

    /// Advance one frame
    ///
    /// Dispatches queued events, re-resolves the scene when it changed,
    /// then updates and renders according to the mode flags.
    pub fn tick(&mut self, delta_time: f32) -> RenderStats {
        let events = self.context.subsystem_mut::<EventSystem>();
        events.sender().fire(EventType::FrameStart);
        let dispatched = events.dispatch();

        let needs_resolve = dispatched
            .iter()
            .any(|event| matches!(event.event_type, EventType::SceneResolve | EventType::WorldLoaded));
        if needs_resolve {
            self.scene_mut().resolve();
        }

        if self.flags.contains(EngineFlags::UPDATE) {
            self.scene_mut().update(delta_time);
        }
        let stats = if self.flags.contains(EngineFlags::RENDER) {
            self.context.render()
        } else {
            RenderStats::default()
        };

        self.context.subsystem::<EventSystem>().sender().fire(EventType::FrameEnd);
        self.frame += 1;
        stats
    }

    /// Stop the world and release the scene and cached resources
    pub fn shutdown(&mut self) {
        log::info!("Engine shutdown requested");
        if self.scene().is_running() {
            self.scene_mut().stop();
        }
        self.scene_mut().clear();
        self.resources().cache().clear();
        self.context.subsystem_mut::<EventSystem>().clear();
        log::info!("Engine shutdown complete");
    }
}
