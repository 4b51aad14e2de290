//! Rendering: device capability, shader variations and draw batching
//!
//! Nothing here talks to a graphics API directly. All GPU work goes through
//! the [`GraphicsDevice`] trait.

mod device;
mod renderer;
mod shader_cache;
mod shader_variation;
mod vertex;

pub use device::{
    BufferId, BufferKind, DeviceCall, DeviceError, GraphicsDevice, HeadlessDevice, RenderTarget,
    ShaderId, TextureId,
};
pub use renderer::{RenderFlags, RenderStats, Renderer};
pub use shader_cache::ShaderVariationCache;
pub use shader_variation::{PerObjectBuffer, ShaderFlags, ShaderState, ShaderVariation};
pub use vertex::Vertex;
