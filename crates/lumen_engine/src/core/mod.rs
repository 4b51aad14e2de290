//! # Core Engine Module
//!
//! Configuration and the [`Context`] that owns every subsystem. Subsystems
//! are plain typed fields; [`Context::subsystem`] picks one at compile time
//! through the [`Subsystem`] trait, so there is no runtime type lookup and
//! no process-wide state.

pub mod config;

use std::sync::Arc;

pub use config::{ApplicationConfig, AssetConfig, Config, ConfigError, EngineConfig, ShaderConfig, ThreadingConfig};

use crate::events::EventSystem;
use crate::foundation::ids::IdGenerator;
use crate::rendering::{GraphicsDevice, RenderStats, Renderer};
use crate::resource::ResourceManager;
use crate::scene::Scene;
use crate::threading::Threading;

/// A subsystem owned by the [`Context`]
pub trait Subsystem {
    /// Borrow this subsystem out of `context`
    fn get(context: &Context) -> &Self;
}

/// A subsystem that can be borrowed mutably
pub trait SubsystemMut: Subsystem {
    /// Mutably borrow this subsystem out of `context`
    fn get_mut(context: &mut Context) -> &mut Self;
}

/// Owner of all engine subsystems
pub struct Context {
    events: EventSystem,
    ids: Arc<IdGenerator>,
    threading: Arc<Threading>,
    resources: ResourceManager,
    renderer: Renderer,
    scene: Scene,
}

impl Context {
    /// Build every subsystem: threading, then resources, renderer and scene
    pub fn new(config: &ApplicationConfig, device: Arc<dyn GraphicsDevice>) -> Self {
        let events = EventSystem::new();
        let ids = Arc::new(IdGenerator::new());

        let threading = Arc::new(Threading::new(config.threading.resolved_worker_count()));
        log::debug!("Threading: {} workers", threading.thread_count());

        let resources = ResourceManager::new(&config.assets, &config.shaders, device.clone(), threading.clone());
        let renderer = Renderer::new(device);
        let scene = Scene::new(events.sender(), ids.clone());

        Self {
            events,
            ids,
            threading,
            resources,
            renderer,
            scene,
        }
    }

    /// Borrow subsystem `T`
    pub fn subsystem<T: Subsystem>(&self) -> &T {
        T::get(self)
    }

    /// Mutably borrow subsystem `T`
    pub fn subsystem_mut<T: SubsystemMut>(&mut self) -> &mut T {
        T::get_mut(self)
    }

    /// Entity and component id source shared by the scene
    pub const fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    /// Render the scene with the renderer
    pub fn render(&mut self) -> RenderStats {
        self.renderer.render(&self.scene)
    }
}

macro_rules! subsystem {
    ($ty:ty, $field:ident) => {
        impl Subsystem for $ty {
            fn get(context: &Context) -> &Self {
                &context.$field
            }
        }
    };
    ($ty:ty, $field:ident, mut) => {
        subsystem!($ty, $field);

        impl SubsystemMut for $ty {
            fn get_mut(context: &mut Context) -> &mut Self {
                &mut context.$field
            }
        }
    };
}

subsystem!(EventSystem, events, mut);
subsystem!(ResourceManager, resources, mut);
subsystem!(Renderer, renderer, mut);
subsystem!(Scene, scene, mut);

// Shared with worker closures, so only ever borrowed
impl Subsystem for Threading {
    fn get(context: &Context) -> &Self {
        &context.threading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::HeadlessDevice;

    fn context() -> Context {
        let mut config = ApplicationConfig::default();
        config.threading.worker_count = Some(2);
        Context::new(&config, Arc::new(HeadlessDevice::new()))
    }

    #[test]
    fn test_subsystems_are_reachable_by_type() {
        let mut context = context();
        assert_eq!(context.subsystem::<Threading>().thread_count(), 2);
        assert!(context.subsystem::<ResourceManager>().cache().is_empty());

        let id = context.subsystem_mut::<Scene>().create_entity("marker");
        assert!(context.subsystem::<Scene>().contains(id));
    }

    #[test]
    fn test_scene_events_reach_the_event_system() {
        let mut context = context();
        context.subsystem_mut::<Scene>().create_entity("marker");
        let events = context.subsystem_mut::<EventSystem>().dispatch();
        assert!(!events.is_empty());
    }

    #[test]
    fn test_render_without_camera_draws_nothing() {
        let mut context = context();
        context.subsystem_mut::<Scene>().create_entity("marker");
        assert_eq!(context.render().draw_calls, 0);
    }
}
