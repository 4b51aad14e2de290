//! Resource manager: loads, deduplicates and caches assets
//!
//! The manager is a cheap-to-clone bundle of shared handles (cache, device,
//! worker pool, shader variations), so background loads simply carry a clone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{
    handle, name_from_path, Animation, AudioClip, ImageImporter, Resource, ResourceCache, ResourceError,
    ResourceHandle, ResourceHeader, Texture,
};
use crate::core::config::{AssetConfig, ShaderConfig, StandardDirectories};
use crate::foundation::ids::IdGenerator;
use crate::rendering::{GraphicsDevice, ShaderVariationCache};
use crate::threading::Threading;

/// A resource that can be constructed from a file
pub trait Loadable: Resource {
    /// Build and load a new instance from `path`
    fn load(manager: &ResourceManager, path: &Path) -> Result<Self, ResourceError>;
}

/// Front door for every asset load
#[derive(Clone)]
pub struct ResourceManager {
    cache: Arc<ResourceCache>,
    ids: Arc<IdGenerator>,
    device: Arc<dyn GraphicsDevice>,
    threading: Arc<Threading>,
    image_importer: Arc<ImageImporter>,
    shaders: Arc<ShaderVariationCache>,
    directories: Arc<StandardDirectories>,
}

impl ResourceManager {
    /// Create a manager with an empty cache
    pub fn new(
        assets: &AssetConfig,
        shader_config: &ShaderConfig,
        device: Arc<dyn GraphicsDevice>,
        threading: Arc<Threading>,
    ) -> Self {
        let cache = Arc::new(ResourceCache::new());
        let ids = Arc::new(IdGenerator::new());
        let shaders = Arc::new(ShaderVariationCache::new(
            cache.clone(),
            device.clone(),
            ids.clone(),
            shader_config.gbuffer_shader_path.clone(),
        ));
        let image_importer = Arc::new(ImageImporter::new(
            threading.clone(),
            assets.supported_image_formats.clone(),
            assets.generate_mipmaps,
        ));

        log::info!("Resource manager initialized");
        Self {
            cache,
            ids,
            device,
            threading,
            image_importer,
            shaders,
            directories: Arc::new(assets.directories.clone()),
        }
    }

    /// The shared cache
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// Shader variations
    pub fn shaders(&self) -> &ShaderVariationCache {
        &self.shaders
    }

    /// Device GPU resources are created on
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Worker pool
    pub fn threading(&self) -> &Arc<Threading> {
        &self.threading
    }

    /// Image decoder
    pub fn image_importer(&self) -> &ImageImporter {
        &self.image_importer
    }

    /// Standard resource directories
    pub fn directories(&self) -> &StandardDirectories {
        &self.directories
    }

    /// Fresh resource id
    pub fn next_id(&self) -> u64 {
        self.ids.next_id()
    }

    /// Load `path` as `T`, or return the cached instance
    ///
    /// A resource is already cached when one of its kind has the same path or
    /// the same name (file stem). Failures are logged and yield `None`.
    pub fn load<T: Loadable>(&self, path: &Path) -> Option<ResourceHandle<T>> {
        let name = name_from_path(path);
        if let Some(cached) = self
            .cache
            .get_by_path::<T>(path)
            .or_else(|| self.cache.get_by_name::<T>(&name))
        {
            return Some(cached);
        }

        match T::load(self, path) {
            Ok(resource) => Some(self.cache_resource(handle(resource))),
            Err(e) => {
                log::warn!("Failed to load {:?} from {}: {e}", T::KIND, path.display());
                None
            }
        }
    }

    /// Load on the worker pool; the result lands in the cache
    pub fn load_async<T: Loadable>(&self, path: impl Into<PathBuf>) {
        self.load_async_with::<T, _>(path, |_| {});
    }

    /// Load on the worker pool and hand the result to `on_done`
    pub fn load_async_with<T, F>(&self, path: impl Into<PathBuf>, on_done: F)
    where
        T: Loadable,
        F: FnOnce(Option<ResourceHandle<T>>) + Send + 'static,
    {
        let manager = self.clone();
        let path = path.into();
        self.threading.add_task(move || {
            let resource = manager.load::<T>(&path);
            on_done(resource);
        });
    }

    /// Add `resource` unless one with its name is cached; returns the cached one
    pub fn cache_resource<T: Resource>(&self, resource: ResourceHandle<T>) -> ResourceHandle<T> {
        self.cache.add_if_absent(&resource)
    }

    /// Save every resource that has a file path
    pub fn save_resources_to_files(&self) -> usize {
        self.cache.save_resources_to_files()
    }

    /// File paths of every cached resource
    pub fn resource_file_paths(&self) -> Vec<PathBuf> {
        self.cache.resource_file_paths()
    }
}

impl Loadable for Texture {
    fn load(manager: &ResourceManager, path: &Path) -> Result<Self, ResourceError> {
        let mut texture = Self::new(ResourceHeader::new(manager.next_id()).with_name(name_from_path(path)));
        texture.load_from_file(path, manager.image_importer(), Some(manager.device().as_ref()))?;
        Ok(texture)
    }
}

impl Loadable for AudioClip {
    fn load(manager: &ResourceManager, path: &Path) -> Result<Self, ResourceError> {
        let mut clip = Self::new(ResourceHeader::new(manager.next_id()));
        clip.load_from_file(path)?;
        Ok(clip)
    }
}

impl Loadable for Animation {
    fn load(manager: &ResourceManager, path: &Path) -> Result<Self, ResourceError> {
        let mut animation = Self::new(ResourceHeader::new(manager.next_id()));
        animation.load_from_file(path)?;
        Ok(animation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::{HeadlessDevice, ShaderFlags};
    use crate::resource::{Material, Model, ResourceKind, TextureKind};
    use image::RgbaImage;
    use std::time::Duration;

    fn manager() -> ResourceManager {
        ResourceManager::new(
            &AssetConfig::default(),
            &ShaderConfig::default(),
            Arc::new(HeadlessDevice::new()),
            Arc::new(Threading::new(2)),
        )
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(4, 4, image::Rgba([200, 20, 20, 255])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_second_load_returns_cached_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "brick.png");
        let manager = manager();

        let first = manager.load::<Texture>(&path).unwrap();
        let second = manager.load::<Texture>(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.cache().get_by_type::<Texture>().len(), 1);
        assert!(first.read().gpu_texture().is_some());
    }

    #[test]
    fn test_concurrent_loads_share_one_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "crowd.png");
        let manager = manager();
        let barrier = std::sync::Barrier::new(8);

        let loaded: Vec<ResourceHandle<Texture>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        manager.load::<Texture>(&path).unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|worker| worker.join().unwrap()).collect()
        });

        assert_eq!(manager.cache().len_of(ResourceKind::Texture), 1);
        let cached = manager.cache().get_by_name::<Texture>("crowd").unwrap();
        assert!(loaded.iter().all(|texture| Arc::ptr_eq(texture, &cached)));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let manager = manager();
        assert!(manager.load::<Texture>(Path::new("missing/gone.png")).is_none());
        assert!(manager.cache().is_empty());
    }

    #[test]
    fn test_async_load_lands_in_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "async.png");
        let manager = manager();

        let (tx, rx) = crossbeam::channel::bounded(1);
        manager.load_async_with::<Texture, _>(path, move |texture| {
            tx.send(texture.is_some()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(10)).unwrap());
        assert!(manager.cache().is_cached::<Texture>("async"));
    }

    #[test]
    fn test_material_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let texture_path = write_png(dir.path(), "albedo.png");
        let manager = manager();

        let texture = manager.load::<Texture>(&texture_path).unwrap();
        texture.write().set_kind(TextureKind::Albedo);

        let material_path = dir.path().join("painted.material");
        {
            let mut material = Material::new(ResourceHeader::new(manager.next_id()).with_name("painted"));
            material.roughness_multiplier = 0.3;
            material.set_texture(Some(&texture), manager.shaders());
            material.save_to_file(&material_path).unwrap();
        }

        let loaded = manager.load::<Material>(&material_path).unwrap();
        let loaded = loaded.read();
        assert_eq!(loaded.name(), "painted");
        assert!((loaded.roughness_multiplier - 0.3).abs() < f32::EPSILON);
        assert_eq!(loaded.shader_flags(), ShaderFlags::ALBEDO);
        assert!(loaded.texture(TextureKind::Albedo).is_some());
        // Both materials resolve to the single cached variation
        assert_eq!(manager.shaders().len(), 1);
    }

    #[test]
    fn test_cache_resource_keeps_first_by_name() {
        let manager = manager();
        let first = manager.cache_resource(handle(Model::new(ResourceHeader::new(1).with_name("ship"))));
        let second = manager.cache_resource(handle(Model::new(ResourceHeader::new(2).with_name("ship"))));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_save_resources_writes_engine_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "saved.png");
        let manager = manager();
        manager.load::<Texture>(&path).unwrap();

        assert_eq!(manager.save_resources_to_files(), 1);
        assert!(dir.path().join("saved.texture").exists());
        assert_eq!(manager.resource_file_paths(), vec![dir.path().join("saved.texture")]);
    }
}
