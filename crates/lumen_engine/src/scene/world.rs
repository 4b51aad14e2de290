//! The scene (world): owner of every entity and of the hierarchy
//!
//! Entities are stored in a slot map and addressed by their persisted
//! [`EntityId`]. World matrices and the renderable list are rebuilt by
//! [`Scene::resolve`], which the engine runs whenever a scene-resolve event
//! was posted.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use super::components::Camera;
use super::{Component, ComponentId, ComponentKind, Entity, EntityId, SceneError};
use crate::events::{Event, EventArg, EventSender, EventType};
use crate::foundation::ids::IdGenerator;
use crate::foundation::math::Mat4;
use crate::io::{BinaryReader, BinaryWriter};
use crate::resource::{ResourceCache, NOT_ASSIGNED};

/// Extension of prefab files
pub const PREFAB_EXTENSION: &str = "prefab";

/// Extension of scene files
pub const SCENE_EXTENSION: &str = "scene";

new_key_type! {
    struct EntityKey;
}

/// Owner of all entities
pub struct Scene {
    entities: SlotMap<EntityKey, Entity>,
    index: HashMap<EntityId, EntityKey>,
    renderables: Vec<EntityId>,
    events: EventSender,
    ids: Arc<IdGenerator>,
    running: bool,
}

impl Scene {
    /// Create an empty scene
    pub fn new(events: EventSender, ids: Arc<IdGenerator>) -> Self {
        Self {
            entities: SlotMap::with_key(),
            index: HashMap::new(),
            renderables: Vec::new(),
            events,
            ids,
            running: false,
        }
    }

    /// Create a root entity with a transform
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityId {
        let id = EntityId(self.ids.next_id());
        let entity = Entity::new(id, name, self.events.clone(), self.ids.clone());
        self.insert(entity)
    }

    /// Create an entity under `parent`
    pub fn create_child(&mut self, parent: EntityId, name: impl Into<String>) -> Result<EntityId, SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::EntityNotFound(parent));
        }
        let child = self.create_entity(name);
        self.link(child, parent);
        Ok(child)
    }

    fn insert(&mut self, mut entity: Entity) -> EntityId {
        if self.index.contains_key(&entity.id()) {
            let fresh = EntityId(self.ids.next_id());
            log::debug!("Entity id {} already in use, reassigned to {fresh}", entity.id());
            entity.set_id(fresh);
        }
        let id = entity.id();
        if self.running {
            entity.start();
        }
        let key = self.entities.insert(entity);
        self.index.insert(id, key);
        id
    }

    fn link(&mut self, child: EntityId, parent: EntityId) {
        if let Some(entity) = self.entity_mut(child) {
            entity.set_parent_link(Some(parent));
        }
        if let Some(entity) = self.entity_mut(parent) {
            entity.add_child_link(child);
        }
    }

    /// Whether an entity with `id` exists
    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Entity by id
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.index.get(&id).and_then(|key| self.entities.get(*key))
    }

    /// Mutable entity by id
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let key = *self.index.get(&id)?;
        self.entities.get_mut(key)
    }

    /// Entity with the lowest id among those called `name`
    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities
            .values()
            .filter(|entity| entity.name() == name)
            .min_by_key(|entity| entity.id())
    }

    /// Every entity, in no particular order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when the scene holds no entity
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities without a parent, by id
    pub fn roots(&self) -> Vec<EntityId> {
        let mut roots: Vec<EntityId> = self
            .entities
            .values()
            .filter(|entity| entity.parent().is_none())
            .map(Entity::id)
            .collect();
        roots.sort_unstable();
        roots
    }

    /// `id` followed by every entity below it, depth first
    pub fn descendants(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(entity) = self.entity(current) {
                out.push(current);
                stack.extend(entity.children().iter().rev());
            }
        }
        out
    }

    /// Move `child` under `parent`, or to the root when `parent` is `None`
    pub fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) -> Result<(), SceneError> {
        let old_parent = self.entity(child).ok_or(SceneError::EntityNotFound(child))?.parent();
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(SceneError::EntityNotFound(parent));
            }
            if self.descendants(child).contains(&parent) {
                return Err(SceneError::InvalidParent { child, parent });
            }
        }

        if let Some(old) = old_parent.and_then(|old| self.entity_mut(old)) {
            old.remove_child_link(child);
        }
        match parent {
            Some(parent) => self.link(child, parent),
            None => {
                if let Some(entity) = self.entity_mut(child) {
                    entity.set_parent_link(None);
                }
            }
        }
        self.fire(Event::new(EventType::SceneResolve).with_arg("entity", EventArg::EntityId(child.0)));
        Ok(())
    }

    /// Remove `id` and its whole subtree; returns the number of entities removed
    pub fn remove_entity(&mut self, id: EntityId) -> usize {
        let Some(parent) = self.entity(id).map(Entity::parent) else {
            return 0;
        };
        if let Some(parent) = parent.and_then(|parent| self.entity_mut(parent)) {
            parent.remove_child_link(id);
        }

        let subtree = self.descendants(id);
        for removed in &subtree {
            if let Some(key) = self.index.remove(removed) {
                self.entities.remove(key);
            }
        }
        self.renderables.retain(|entity| !subtree.contains(entity));
        self.fire(Event::new(EventType::SceneResolve));
        subtree.len()
    }

    /// Drop every entity
    pub fn clear(&mut self) {
        self.entities.clear();
        self.index.clear();
        self.renderables.clear();
    }

    /// Re-flatten world matrices top-down and rebuild the renderable list
    pub fn resolve(&mut self) {
        self.renderables.clear();
        let mut stack: Vec<(EntityId, Mat4)> = self
            .roots()
            .into_iter()
            .rev()
            .map(|root| (root, Mat4::identity()))
            .collect();

        while let Some((id, parent_world)) = stack.pop() {
            let Some(entity) = self.entity_mut(id) else {
                continue;
            };
            let world = parent_world * entity.local_matrix();
            entity.set_world_matrix(world);

            let renders = entity.is_active()
                && entity
                    .components()
                    .any(|c| c.enabled && c.kind() == ComponentKind::Renderable);
            let children = entity.children().to_vec();
            if renders {
                self.renderables.push(id);
            }
            stack.extend(children.into_iter().rev().map(|child| (child, world)));
        }
        log::trace!("Scene resolved: {} entities, {} renderables", self.len(), self.renderables.len());
    }

    /// Entities drawn by the renderer, in hierarchy order
    pub fn renderables(&self) -> &[EntityId] {
        &self.renderables
    }

    /// First active entity (by id) with an enabled camera
    pub fn main_camera(&self) -> Option<(&Entity, &Camera)> {
        self.entities
            .values()
            .filter(|entity| entity.is_active())
            .filter_map(|entity| {
                let camera = entity
                    .components()
                    .find(|c| c.enabled && c.get::<Camera>().is_some())?
                    .get::<Camera>()?;
                Some((entity, camera))
            })
            .min_by_key(|(entity, _)| entity.id())
    }

    /// Whether the world is running
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Start every entity
    pub fn start(&mut self) {
        self.running = true;
        self.entities.values_mut().for_each(Entity::start);
        self.fire(Event::new(EventType::WorldStart));
    }

    /// Stop every entity
    pub fn stop(&mut self) {
        self.running = false;
        self.entities.values_mut().for_each(Entity::stop);
        self.fire(Event::new(EventType::WorldStop));
    }

    /// Update every active entity
    pub fn update(&mut self, delta_time: f32) {
        for entity in self.entities.values_mut() {
            entity.update(delta_time);
        }
    }

    fn fire(&self, event: Event) {
        self.events.send(event);
    }

    /// Write `id`, then its child count, child ids and child bodies, recursively
    pub fn serialize_entity(&self, id: EntityId, writer: &mut BinaryWriter<'_>) -> Result<(), SceneError> {
        self.write_entity(id, writer, false)
    }

    fn write_entity(&self, id: EntityId, writer: &mut BinaryWriter<'_>, as_prefab: bool) -> Result<(), SceneError> {
        let entity = self.entity(id).ok_or(SceneError::EntityNotFound(id))?;
        entity.serialize_self(writer, as_prefab)?;

        writer.write_len(entity.children().len())?;
        for child in entity.children() {
            writer.write_u64(child.0)?;
        }
        for child in entity.children() {
            self.write_entity(*child, writer, false)?;
        }
        Ok(())
    }

    /// Read an entity subtree written by [`Scene::serialize_entity`]
    ///
    /// The whole subtree is read before anything enters the scene, so a
    /// malformed stream leaves the scene untouched. Entity and component ids
    /// already present in the scene are replaced by fresh ones. `cache` lets
    /// renderables find their model and material again.
    pub fn deserialize_entity(
        &mut self,
        reader: &mut BinaryReader<'_>,
        parent: Option<EntityId>,
        cache: Option<&ResourceCache>,
    ) -> Result<EntityId, SceneError> {
        if let Some(parent) = parent.filter(|parent| !self.contains(*parent)) {
            return Err(SceneError::EntityNotFound(parent));
        }
        let mut staging = Staging {
            entities: Vec::new(),
            component_ids: self
                .entities
                .values()
                .flat_map(|entity| entity.components().map(Component::id))
                .collect(),
        };
        let root = self.stage_entity(reader, None, cache, &mut staging)?;
        let id = self.commit(staging.entities, parent)[root];
        self.fire(Event::new(EventType::SceneResolve).with_arg("entity", EventArg::EntityId(id.0)));
        Ok(id)
    }

    fn stage_entity(
        &self,
        reader: &mut BinaryReader<'_>,
        parent: Option<usize>,
        cache: Option<&ResourceCache>,
        staging: &mut Staging,
    ) -> Result<usize, SceneError> {
        let mut entity = Entity::new(EntityId(0), NOT_ASSIGNED, self.events.clone(), self.ids.clone());
        let ids = &self.ids;
        let taken = &mut staging.component_ids;
        entity.deserialize_remapped(reader, cache, |id| {
            let id = if taken.contains(&id) { ComponentId(ids.next_id()) } else { id };
            taken.insert(id);
            id
        })?;
        let index = staging.entities.len();
        staging.entities.push((entity, parent));

        let child_count = reader.read_len()?;
        for _ in 0..child_count {
            reader.read_u64()?;
        }
        for _ in 0..child_count {
            self.stage_entity(reader, Some(index), cache, staging)?;
        }
        Ok(index)
    }

    /// Insert staged entities in order and link them; returns their final ids
    fn commit(&mut self, staged: Vec<(Entity, Option<usize>)>, parent: Option<EntityId>) -> Vec<EntityId> {
        let mut committed: Vec<EntityId> = Vec::with_capacity(staged.len());
        for (entity, staged_parent) in staged {
            let stored = entity.id();
            let id = self.insert(entity);
            let parent = match staged_parent {
                Some(index) => committed.get(index).copied(),
                None => parent,
            };
            if let Some(parent) = parent {
                self.link(id, parent);
            }
            if id != stored {
                log::debug!("Entity {stored} loaded as {id}");
            }
            committed.push(id);
        }
        committed
    }

    /// Save `id` and its subtree as a prefab; returns the written path
    pub fn save_as_prefab(&self, id: EntityId, path: &Path) -> Result<PathBuf, SceneError> {
        let path = path.with_extension(PREFAB_EXTENSION);
        let mut file = BufWriter::new(File::create(&path)?);
        self.write_entity(id, &mut BinaryWriter::new(&mut file), true)?;
        file.flush()?;
        log::info!("Saved prefab {}", path.display());
        Ok(path)
    }

    /// Instantiate a prefab as a new root
    pub fn load_prefab(&mut self, path: &Path, cache: Option<&ResourceCache>) -> Result<EntityId, SceneError> {
        require_extension(path, PREFAB_EXTENSION)?;
        let mut file = BufReader::new(File::open(path)?);
        self.deserialize_entity(&mut BinaryReader::new(&mut file), None, cache)
    }

    /// Save every root and its subtree; returns the written path
    pub fn save_to_file(&self, path: &Path) -> Result<PathBuf, SceneError> {
        let path = path.with_extension(SCENE_EXTENSION);
        let mut file = BufWriter::new(File::create(&path)?);
        let mut writer = BinaryWriter::new(&mut file);

        let roots = self.roots();
        writer.write_len(roots.len())?;
        for root in &roots {
            writer.write_u64(root.0)?;
        }
        for root in &roots {
            self.serialize_entity(*root, &mut writer)?;
        }
        file.flush()?;
        log::info!("Saved scene {} ({} entities)", path.display(), self.len());
        Ok(path)
    }

    /// Replace the scene with the contents of a scene file
    ///
    /// The current entities are kept when the file can't be read.
    pub fn load_from_file(&mut self, path: &Path, cache: Option<&ResourceCache>) -> Result<(), SceneError> {
        require_extension(path, SCENE_EXTENSION)?;
        let mut file = BufReader::new(File::open(path)?);
        let mut reader = BinaryReader::new(&mut file);

        let root_count = reader.read_len()?;
        for _ in 0..root_count {
            reader.read_u64()?;
        }
        let mut staging = Staging::default();
        for _ in 0..root_count {
            self.stage_entity(&mut reader, None, cache, &mut staging)?;
        }
        self.clear();
        self.commit(staging.entities, None);

        self.fire(Event::new(EventType::SceneResolve));
        self.fire(
            Event::new(EventType::WorldLoaded).with_arg("path", EventArg::Path(path.display().to_string())),
        );
        log::info!("Loaded scene {} ({} entities)", path.display(), self.len());
        Ok(())
    }
}

/// Entities read from a stream but not yet in the scene
#[derive(Default)]
struct Staging {
    /// Entity with the staging index of its parent
    entities: Vec<(Entity, Option<usize>)>,
    component_ids: HashSet<ComponentId>,
}

fn require_extension(path: &Path, extension: &str) -> Result<(), SceneError> {
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case(extension)) {
        Ok(())
    } else {
        Err(SceneError::InvalidExtension(path.to_path_buf()))
    }
}
