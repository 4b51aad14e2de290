//! Resources: loadable, cacheable assets
//!
//! Every asset type implements [`Resource`] and is shared as a
//! [`ResourceHandle`]. The set of resource kinds is closed; [`AnyResource`]
//! carries a handle of any kind and typed access goes through
//! [`Resource::from_any`], so lookups never inspect types at runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::StreamError;
use crate::rendering::{DeviceError, ShaderVariation};

mod animation;
mod audio_clip;
mod cache;
mod font;
mod image_importer;
mod manager;
mod material;
mod model;
mod texture;

pub use animation::{Animation, AnimationChannel, QuatKey, VectorKey};
pub use audio_clip::AudioClip;
pub use cache::ResourceCache;
pub use font::{Font, FontDescription, Glyph};
pub use image_importer::ImageImporter;
pub use manager::{Loadable, ResourceManager};
pub use material::{CullMode, Material, ShadingMode, TextureSlot, MATERIAL_EXTENSION};
pub use model::{Model, MODEL_EXTENSION};
pub use texture::{Texture, TextureKind, TEXTURE_EXTENSION};

/// Name given to resources and paths that were never assigned
pub const NOT_ASSIGNED: &str = "N/A";

/// Shared, lockable handle to a resource
pub type ResourceHandle<T> = Arc<RwLock<T>>;

/// Wrap a resource into a fresh handle
pub fn handle<T: Resource>(resource: T) -> ResourceHandle<T> {
    Arc::new(RwLock::new(resource))
}

/// Resource kinds, one cache group each
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Image data
    Texture,
    /// Shared geometry plus materials
    Model,
    /// Surface description
    Material,
    /// Compiled shader variation
    Shader,
    /// Glyph atlas
    Font,
    /// Raw audio data
    AudioClip,
    /// Keyframe animation
    Animation,
}

/// Loading progress of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Never loaded
    #[default]
    Idle,
    /// Loading in progress
    Started,
    /// Loaded successfully
    Completed,
    /// Loading failed; the resource holds partial data
    Failed,
}

/// Data every resource carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHeader {
    /// Unique identifier
    pub id: u64,
    /// Name used for deduplication
    pub name: String,
    /// Where the resource is persisted, if anywhere
    pub file_path: Option<PathBuf>,
    /// Loading progress
    pub load_state: LoadState,
}

impl ResourceHeader {
    /// Create a header with an unassigned name and path
    pub fn new(id: u64) -> Self {
        Self {
            id,
            name: NOT_ASSIGNED.to_string(),
            file_path: None,
            load_state: LoadState::Idle,
        }
    }

    /// Set name and path
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the file path
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Whether the path matches `path`
    pub fn has_path(&self, path: &Path) -> bool {
        self.file_path.as_deref() == Some(path)
    }
}

/// Resource errors
#[derive(Error, Debug)]
pub enum ResourceError {
    /// File system failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Engine binary format failure
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
    /// Text format failure
    #[error("Parse error: {0}")]
    Parse(String),
    /// Image decoding failure
    #[error("Image error: {0}")]
    Image(String),
    /// Extension or content not handled
    #[error("Unsupported format: {0}")]
    Unsupported(String),
    /// GPU resource creation failure
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    /// Resource has no file path to save to
    #[error("Resource '{0}' has no file path")]
    NoPath(String),
}

/// A cacheable asset
pub trait Resource: Send + Sync + Sized + 'static {
    /// Cache group of this type
    const KIND: ResourceKind;

    /// Shared header
    fn header(&self) -> &ResourceHeader;

    /// Shared header, mutable
    fn header_mut(&mut self) -> &mut ResourceHeader;

    /// Estimated memory footprint in bytes
    fn memory_usage(&self) -> usize {
        0
    }

    /// Persist to `path` in the engine format
    fn save_to_file(&self, _path: &Path) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Erase the type of a handle
    fn into_any(handle: ResourceHandle<Self>) -> AnyResource;

    /// Recover a typed handle, `None` when the kinds differ
    fn from_any(any: &AnyResource) -> Option<ResourceHandle<Self>>;

    /// Name of the resource
    fn name(&self) -> &str {
        &self.header().name
    }

    /// Identifier of the resource
    fn id(&self) -> u64 {
        self.header().id
    }

    /// Loading progress
    fn load_state(&self) -> LoadState {
        self.header().load_state
    }
}

macro_rules! any_resource {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        /// A resource handle of any kind
        #[derive(Clone)]
        pub enum AnyResource {
            $(
                #[doc = concat!("A `", stringify!($ty), "` handle")]
                $variant(ResourceHandle<$ty>),
            )*
        }

        impl AnyResource {
            /// Kind of the wrapped resource
            pub const fn kind(&self) -> ResourceKind {
                match self {
                    $(Self::$variant(_) => ResourceKind::$variant,)*
                }
            }

            /// Copy of the wrapped resource's header
            pub fn header(&self) -> ResourceHeader {
                match self {
                    $(Self::$variant(h) => h.read().header().clone(),)*
                }
            }

            /// Estimated memory footprint of the wrapped resource
            pub fn memory_usage(&self) -> usize {
                match self {
                    $(Self::$variant(h) => h.read().memory_usage(),)*
                }
            }

            /// Persist the wrapped resource to its own file path
            pub fn save(&self) -> Result<(), ResourceError> {
                match self {
                    $(Self::$variant(h) => {
                        let resource = h.read();
                        let path = resource
                            .header()
                            .file_path
                            .clone()
                            .ok_or_else(|| ResourceError::NoPath(resource.name().to_string()))?;
                        resource.save_to_file(&path)
                    })*
                }
            }
        }

        $(
            impl From<ResourceHandle<$ty>> for AnyResource {
                fn from(handle: ResourceHandle<$ty>) -> Self {
                    Self::$variant(handle)
                }
            }
        )*
    };
}

any_resource! {
    Texture => Texture,
    Model => Model,
    Material => Material,
    Shader => ShaderVariation,
    Font => Font,
    AudioClip => AudioClip,
    Animation => Animation,
}

/// Implements the kind plumbing of [`Resource`] for a type
macro_rules! impl_resource_kind {
    ($variant:ident) => {
        const KIND: $crate::resource::ResourceKind = $crate::resource::ResourceKind::$variant;

        fn into_any(handle: $crate::resource::ResourceHandle<Self>) -> $crate::resource::AnyResource {
            $crate::resource::AnyResource::$variant(handle)
        }

        fn from_any(
            any: &$crate::resource::AnyResource,
        ) -> Option<$crate::resource::ResourceHandle<Self>> {
            match any {
                $crate::resource::AnyResource::$variant(handle) => Some(handle.clone()),
                _ => None,
            }
        }
    };
}
pub(crate) use impl_resource_kind;

/// File stem of `path`, used as the default resource name
pub fn name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map_or_else(|| NOT_ASSIGNED.to_string(), ToString::to_string)
}
