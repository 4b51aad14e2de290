//! # Lumen Engine
//!
//! Core of a component-based 3D engine with a deferred renderer.
//!
//! ## Features
//!
//! - **Scene Graph**: entities owning a closed set of component kinds
//! - **Resource Cache**: typed, deduplicating, thread-safe asset storage
//! - **Materials**: texture slots driving shader variation selection
//! - **Shader Variations**: lazily compiled programs keyed by feature bitmask
//! - **Model Import**: external scene graphs converted into entities and shared geometry
//!
//! The GPU is reached only through the [`rendering::GraphicsDevice`] capability,
//! so the whole core runs headless in tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lumen_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::default();
//!     let device = Arc::new(HeadlessDevice::new());
//!     let mut engine = Engine::new(config, device)?;
//!
//!     let root = engine.load_model("Data/Models/sponza.obj")?;
//!     log::info!("Imported model root {root}");
//!
//!     engine.tick(1.0 / 60.0);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod events;
pub mod foundation;
pub mod import;
pub mod io;
pub mod rendering;
pub mod resource;
pub mod scene;
pub mod threading;

mod engine;

pub use engine::{Engine, EngineError, EngineFlags};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        Engine, EngineError, EngineFlags,
        core::{
            config::{ApplicationConfig, AssetConfig, EngineConfig, ShaderConfig, ThreadingConfig},
            Context,
        },
        foundation::math::{BoundingBox, Mat4, Quat, Vec2, Vec3, Vec4},
        import::{ModelImporter, ObjImporter, ProgressReport},
        rendering::{GraphicsDevice, HeadlessDevice, ShaderFlags, ShaderVariationCache},
        resource::{
            Material, Model, Resource, ResourceCache, ResourceHandle, ResourceManager, Texture,
            TextureKind,
        },
        scene::{ComponentKind, Entity, EntityId, Scene},
    };
}
