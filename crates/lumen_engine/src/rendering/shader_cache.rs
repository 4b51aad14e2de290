//! Deduplicating store of shader variations
//!
//! Variations live in the shared [`ResourceCache`] under the shader group.
//! Lookup is a linear scan comparing bitmasks; creation happens under a
//! mutex so two threads asking for the same bitmask get one variation.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use super::device::GraphicsDevice;
use super::shader_variation::{ShaderFlags, ShaderVariation};
use crate::foundation::ids::IdGenerator;
use crate::resource::{handle, ResourceCache, ResourceHandle};

/// Owner of every compiled shader variation
pub struct ShaderVariationCache {
    cache: Arc<ResourceCache>,
    device: Arc<dyn GraphicsDevice>,
    ids: Arc<IdGenerator>,
    source: PathBuf,
    creation: Mutex<()>,
}

impl ShaderVariationCache {
    /// Create a cache compiling `source` on `device`
    pub fn new(
        cache: Arc<ResourceCache>,
        device: Arc<dyn GraphicsDevice>,
        ids: Arc<IdGenerator>,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            device,
            ids,
            source: source.into(),
            creation: Mutex::new(()),
        }
    }

    /// Existing variation for `flags`, first match in insertion order
    pub fn find_matching(&self, flags: ShaderFlags) -> Option<ResourceHandle<ShaderVariation>> {
        self.cache
            .get_by_type::<ShaderVariation>()
            .into_iter()
            .find(|variation| variation.read().flags() == flags)
    }

    /// Existing variation for `flags`, or a freshly compiled and cached one
    ///
    /// A variation whose compilation failed is still cached and returned; it
    /// is never recompiled.
    pub fn get_or_create(&self, flags: ShaderFlags) -> ResourceHandle<ShaderVariation> {
        let _guard = self.creation.lock();
        if let Some(existing) = self.find_matching(flags) {
            return existing;
        }

        let mut variation = ShaderVariation::new(self.ids.next_id(), flags);
        variation.compile(self.device.as_ref(), &self.source);
        let variation = handle(variation);
        self.cache.add(&variation);
        log::info!("Created shader variation for {flags:?}");
        variation
    }

    /// Number of cached variations
    pub fn len(&self) -> usize {
        self.cache.get_by_type::<ShaderVariation>().len()
    }

    /// True when no variation was created yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device variations are compiled on
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }
}
