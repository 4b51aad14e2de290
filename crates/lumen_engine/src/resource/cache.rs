//! Typed, deduplicating store of loaded resources
//!
//! Resources are grouped by [`ResourceKind`]; each group is an append-only
//! list in insertion order. Name and path are recorded when a resource is
//! added, so lookups never lock the resources themselves.
//!
//! Locking discipline: one reader-writer lock guards all groups. Writers
//! (`add`, `add_if_absent`, `clear`) take it exclusively; every read takes it shared and
//! returns cloned handles, so callers work on a snapshot. The cache lock is
//! never held while a resource lock is taken.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::{AnyResource, Resource, ResourceHandle, ResourceKind, NOT_ASSIGNED};

struct CacheEntry {
    id: u64,
    name: String,
    path: Option<PathBuf>,
    resource: AnyResource,
}

impl CacheEntry {
    fn new(resource: AnyResource) -> Self {
        let header = resource.header();
        Self {
            id: header.id,
            name: header.name,
            path: header.file_path,
            resource,
        }
    }
}

/// Kind-partitioned resource store
#[derive(Default)]
pub struct ResourceCache {
    groups: RwLock<BTreeMap<ResourceKind, Vec<CacheEntry>>>,
}

impl ResourceCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource to its kind group
    pub fn add<T: Resource>(&self, resource: &ResourceHandle<T>) {
        self.add_any(Some(T::into_any(resource.clone())));
    }

    /// Append a type-erased resource; `None` is ignored
    pub fn add_any(&self, resource: Option<AnyResource>) {
        let Some(resource) = resource else {
            log::trace!("Ignoring empty resource");
            return;
        };

        let entry = CacheEntry::new(resource);
        log::debug!("Caching {:?} '{}'", entry.resource.kind(), entry.name);
        self.groups
            .write()
            .entry(entry.resource.kind())
            .or_default()
            .push(entry);
    }

    /// Append `resource` unless one of its kind already has the same name
    ///
    /// Lookup and insert happen under one write lock, so concurrent callers
    /// agree on a single instance. Returns the instance that is cached.
    pub fn add_if_absent<T: Resource>(&self, resource: &ResourceHandle<T>) -> ResourceHandle<T> {
        let entry = CacheEntry::new(T::into_any(resource.clone()));
        let mut groups = self.groups.write();
        let group = groups.entry(T::KIND).or_default();
        if let Some(existing) = group
            .iter()
            .find(|cached| cached.name == entry.name)
            .and_then(|cached| T::from_any(&cached.resource))
        {
            return existing;
        }
        log::debug!("Caching {:?} '{}'", T::KIND, entry.name);
        group.push(entry);
        resource.clone()
    }

    fn find<T: Resource>(&self, matches: impl Fn(&CacheEntry) -> bool) -> Option<ResourceHandle<T>> {
        self.groups
            .read()
            .get(&T::KIND)?
            .iter()
            .find(|entry| matches(entry))
            .and_then(|entry| T::from_any(&entry.resource))
    }

    /// First resource of kind `T` named `name`
    pub fn get_by_name<T: Resource>(&self, name: &str) -> Option<ResourceHandle<T>> {
        self.find(|entry| entry.name == name)
    }

    /// First resource of kind `T` stored at `path`
    pub fn get_by_path<T: Resource>(&self, path: &Path) -> Option<ResourceHandle<T>> {
        self.find(|entry| entry.path.as_deref() == Some(path))
    }

    /// Resource of kind `T` with identifier `id`
    pub fn get_by_id<T: Resource>(&self, id: u64) -> Option<ResourceHandle<T>> {
        self.find(|entry| entry.id == id)
    }

    /// Every resource of kind `T`, in insertion order
    pub fn get_by_type<T: Resource>(&self) -> Vec<ResourceHandle<T>> {
        self.groups
            .read()
            .get(&T::KIND)
            .map(|group| group.iter().filter_map(|e| T::from_any(&e.resource)).collect())
            .unwrap_or_default()
    }

    /// Every cached resource
    pub fn get_all(&self) -> Vec<AnyResource> {
        self.groups
            .read()
            .values()
            .flatten()
            .map(|entry| entry.resource.clone())
            .collect()
    }

    /// Whether a resource of kind `T` named `name` is cached
    pub fn is_cached<T: Resource>(&self, name: &str) -> bool {
        if name == NOT_ASSIGNED {
            log::warn!("Can't check if a resource with an unassigned name is cached");
            return false;
        }
        self.get_by_name::<T>(name).is_some()
    }

    /// File paths of every cached resource that has one
    pub fn resource_file_paths(&self) -> Vec<PathBuf> {
        self.groups
            .read()
            .values()
            .flatten()
            .filter_map(|entry| entry.path.clone())
            .collect()
    }

    /// Save every resource with a file path; returns how many were written
    pub fn save_resources_to_files(&self) -> usize {
        let mut saved = 0;
        for resource in self.get_all() {
            if resource.header().file_path.is_none() {
                continue;
            }
            match resource.save() {
                Ok(()) => saved += 1,
                Err(e) => log::error!("Failed to save {:?}: {e}", resource.kind()),
            }
        }
        saved
    }

    /// Summed memory footprint of every cached resource
    pub fn memory_usage(&self) -> usize {
        self.get_all().iter().map(AnyResource::memory_usage).sum()
    }

    /// Summed memory footprint of one kind group
    pub fn memory_usage_of(&self, kind: ResourceKind) -> usize {
        let group: Vec<AnyResource> = self
            .groups
            .read()
            .get(&kind)
            .map(|group| group.iter().map(|e| e.resource.clone()).collect())
            .unwrap_or_default();
        group.iter().map(AnyResource::memory_usage).sum()
    }

    /// Number of cached resources of one kind
    pub fn len_of(&self, kind: ResourceKind) -> usize {
        self.groups.read().get(&kind).map_or(0, Vec::len)
    }

    /// Number of cached resources
    pub fn len(&self) -> usize {
        self.groups.read().values().map(Vec::len).sum()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every handle the cache holds
    pub fn clear(&self) {
        self.groups.write().clear();
        log::debug!("Resource cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{handle, AudioClip, ResourceHeader, Texture};
    use std::sync::Arc;

    fn clip(id: u64, name: &str, bytes: usize) -> ResourceHandle<AudioClip> {
        let mut clip = AudioClip::new(ResourceHeader::new(id).with_name(name).with_path(format!("{name}.wav")));
        clip.set_data(vec![0; bytes]);
        handle(clip)
    }

    #[test]
    fn test_added_resource_is_found() {
        let cache = ResourceCache::new();
        let resource = clip(3, "explosion", 16);
        cache.add(&resource);

        assert!(cache.is_cached::<AudioClip>("explosion"));
        let found = cache.get_by_name::<AudioClip>("explosion").unwrap();
        assert!(Arc::ptr_eq(&found, &resource));
        assert_eq!(found.read().id(), 3);
        assert!(cache.get_by_path::<AudioClip>(Path::new("explosion.wav")).is_some());
        assert!(cache.get_by_id::<AudioClip>(3).is_some());
    }

    #[test]
    fn test_add_if_absent_keeps_the_first_instance() {
        let cache = ResourceCache::new();
        let first = clip(1, "engine_hum", 8);
        let second = clip(2, "engine_hum", 8);

        assert!(Arc::ptr_eq(&cache.add_if_absent(&first), &first));
        assert!(Arc::ptr_eq(&cache.add_if_absent(&second), &first));
        assert_eq!(cache.len_of(ResourceKind::AudioClip), 1);
    }

    #[test]
    fn test_kinds_are_partitioned() {
        let cache = ResourceCache::new();
        cache.add(&clip(1, "shared_name", 0));

        assert!(cache.get_by_name::<Texture>("shared_name").is_none());
        assert_eq!(cache.len_of(ResourceKind::AudioClip), 1);
        assert_eq!(cache.len_of(ResourceKind::Texture), 0);
    }

    #[test]
    fn test_duplicate_names_resolve_to_first_inserted() {
        let cache = ResourceCache::new();
        cache.add(&clip(1, "dup", 0));
        cache.add(&clip(2, "dup", 0));

        assert_eq!(cache.get_by_name::<AudioClip>("dup").unwrap().read().id(), 1);
        assert_eq!(cache.get_by_type::<AudioClip>().len(), 2);
    }

    #[test]
    fn test_unassigned_name_is_never_cached() {
        let cache = ResourceCache::new();
        cache.add(&handle(AudioClip::new(ResourceHeader::new(1))));
        assert!(!cache.is_cached::<AudioClip>(NOT_ASSIGNED));
    }

    #[test]
    fn test_empty_add_is_ignored() {
        let cache = ResourceCache::new();
        cache.add_any(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_memory_accounting_and_clear() {
        let cache = ResourceCache::new();
        let kept = clip(1, "a", 100);
        cache.add(&kept);
        cache.add(&clip(2, "b", 50));

        assert_eq!(cache.memory_usage_of(ResourceKind::AudioClip), 150);
        assert_eq!(cache.memory_usage(), 150);
        assert_eq!(cache.resource_file_paths().len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        // Handles held elsewhere outlive the cache entry
        assert_eq!(kept.read().name(), "a");
    }

    #[test]
    fn test_concurrent_adds_and_reads() {
        let cache = Arc::new(ResourceCache::new());
        let writers: Vec<_> = (0..4u64)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache.add(&clip(t * 100 + i, &format!("clip_{t}_{i}"), 1));
                        let _ = cache.get_all();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(cache.len_of(ResourceKind::AudioClip), 200);
        assert!(cache.is_cached::<AudioClip>("clip_3_49"));
    }
}
