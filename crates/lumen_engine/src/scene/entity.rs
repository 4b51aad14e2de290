//! Entity: a named scene node owning its components
//!
//! Components live in a kind-keyed multimap. Every entity carries exactly
//! one [`Transform`]; scripts may repeat, every other kind is unique.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::component::{Component, ComponentContext, ComponentData, ComponentId, ComponentKind, ComponentVariant};
use super::components::{Renderable, Transform};
use super::EntityId;
use crate::events::{Event, EventArg, EventSender, EventType};
use crate::foundation::ids::IdGenerator;
use crate::foundation::math::Mat4;
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::resource::ResourceCache;

/// Scene node
pub struct Entity {
    id: EntityId,
    name: String,
    active: bool,
    hierarchy_visible: bool,
    prefab: bool,
    components: BTreeMap<ComponentKind, Vec<Component>>,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    world: Mat4,
    events: EventSender,
    ids: Arc<IdGenerator>,
}

impl Entity {
    /// Create an entity holding only a transform
    pub fn new(id: EntityId, name: impl Into<String>, events: EventSender, ids: Arc<IdGenerator>) -> Self {
        let mut entity = Self {
            id,
            name: name.into(),
            active: true,
            hierarchy_visible: true,
            prefab: false,
            components: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
            world: Mat4::identity(),
            events,
            ids,
        };
        entity.add_component::<Transform>();
        entity
    }

    /// Identifier
    pub const fn id(&self) -> EntityId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Inactive entities are neither updated nor rendered
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Activate or deactivate
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Whether editors list this entity
    pub const fn is_visible_in_hierarchy(&self) -> bool {
        self.hierarchy_visible
    }

    /// Show or hide in editor listings
    pub fn set_visible_in_hierarchy(&mut self, visible: bool) {
        self.hierarchy_visible = visible;
    }

    /// Whether this entity was read from a prefab root
    pub const fn is_prefab(&self) -> bool {
        self.prefab
    }

    /// Parent entity
    pub const fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Children in insertion order
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub(crate) fn set_parent_link(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
    }

    pub(crate) fn add_child_link(&mut self, child: EntityId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child_link(&mut self, child: EntityId) {
        self.children.retain(|id| *id != child);
    }

    /// World matrix as of the last scene resolve
    pub const fn world_matrix(&self) -> &Mat4 {
        &self.world
    }

    pub(crate) fn set_world_matrix(&mut self, world: Mat4) {
        self.world = world;
    }

    /// The transform
    pub fn transform(&self) -> Option<&Transform> {
        self.get_component::<Transform>()
    }

    /// The mutable transform
    pub fn transform_mut(&mut self) -> Option<&mut Transform> {
        self.get_component_mut::<Transform>()
    }

    /// The renderable, if any
    pub fn renderable(&self) -> Option<&Renderable> {
        self.get_component::<Renderable>()
    }

    /// Local matrix of the transform
    pub fn local_matrix(&self) -> Mat4 {
        self.transform().map_or_else(Mat4::identity, Transform::local_matrix)
    }

    /// `(kind, id)` of every component, in storage order
    pub fn descriptors(&self) -> Vec<(ComponentKind, ComponentId)> {
        self.components().map(|c| (c.kind(), c.id())).collect()
    }

    /// Every component, ordered by kind then insertion
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values().flatten()
    }

    /// Number of components
    pub fn component_count(&self) -> usize {
        self.components.values().map(Vec::len).sum()
    }

    /// Add a component of kind `T`, returning its id
    ///
    /// For every kind but scripts an existing component is kept and its id
    /// returned instead.
    pub fn add_component<T: ComponentVariant>(&mut self) -> ComponentId {
        self.add_component_of_kind(T::KIND)
    }

    /// Add a component by kind tag
    pub fn add_component_of_kind(&mut self, kind: ComponentKind) -> ComponentId {
        if !kind.allows_multiple() {
            if let Some(existing) = self.components.get(&kind).and_then(|list| list.first()) {
                return existing.id();
            }
        }
        let id = ComponentId(self.ids.next_id());
        self.attach(Component::new(id, ComponentData::new(kind)))
    }

    fn attach(&mut self, component: Component) -> ComponentId {
        let id = component.id();
        let kind = component.kind();
        self.components.entry(kind).or_default().push(component);

        let siblings = self.descriptors();
        let ctx = ComponentContext {
            owner: self.id,
            world: self.world,
            siblings: &siblings,
            cache: None,
        };
        if let Some(component) = self.component_mut(id) {
            component.data_mut().lifecycle_mut().on_initialize(&ctx);
        }

        log::trace!("Entity {} gained {kind} {}", self.id, id.0);
        self.fire_resolve();
        id
    }

    /// First component of kind `T`
    pub fn get_component<T: ComponentVariant>(&self) -> Option<&T> {
        self.components.get(&T::KIND)?.first()?.get::<T>()
    }

    /// First component of kind `T`, mutably
    pub fn get_component_mut<T: ComponentVariant>(&mut self) -> Option<&mut T> {
        self.components.get_mut(&T::KIND)?.first_mut()?.get_mut::<T>()
    }

    /// Every component of kind `T`
    pub fn get_components<T: ComponentVariant>(&self) -> Vec<&T> {
        self.components
            .get(&T::KIND)
            .map(|list| list.iter().filter_map(Component::get::<T>).collect())
            .unwrap_or_default()
    }

    /// Whether a component of `kind` is attached
    pub fn has_component(&self, kind: ComponentKind) -> bool {
        self.components.contains_key(&kind)
    }

    /// Component with the given id
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components().find(|c| c.id() == id)
    }

    /// Component with the given id, mutably
    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.values_mut().flatten().find(|c| c.id() == id)
    }

    /// Remove the component with `id`
    ///
    /// The transform can't be removed. Returns whether something was removed.
    pub fn remove_component_by_id(&mut self, id: ComponentId) -> bool {
        let Some(kind) = self.component(id).map(Component::kind) else {
            return false;
        };
        if kind == ComponentKind::Transform {
            log::warn!("Entity {}: the transform can't be removed", self.id);
            return false;
        }

        let removed = self.components.get_mut(&kind).and_then(|list| {
            let position = list.iter().position(|c| c.id() == id)?;
            Some(list.remove(position))
        });
        if self.components.get(&kind).is_some_and(Vec::is_empty) {
            self.components.remove(&kind);
        }

        match removed {
            Some(component) => {
                self.notify_removed(vec![component]);
                true
            }
            None => false,
        }
    }

    /// Remove every component of kind `T`; returns how many were removed
    pub fn remove_component<T: ComponentVariant>(&mut self) -> usize {
        if T::KIND == ComponentKind::Transform {
            log::warn!("Entity {}: the transform can't be removed", self.id);
            return 0;
        }
        let removed = self.components.remove(&T::KIND).unwrap_or_default();
        let count = removed.len();
        if count > 0 {
            self.notify_removed(removed);
        }
        count
    }

    fn notify_removed(&mut self, mut removed: Vec<Component>) {
        let siblings = self.descriptors();
        let ctx = ComponentContext {
            owner: self.id,
            world: self.world,
            siblings: &siblings,
            cache: None,
        };
        for component in &mut removed {
            component.data_mut().lifecycle_mut().on_remove(&ctx);
        }
        self.fire_resolve();
    }

    /// Forward the world start to every enabled component
    pub fn start(&mut self) {
        self.for_each_enabled(|component, ctx| component.data_mut().lifecycle_mut().on_start(ctx));
    }

    /// Forward the world stop to every enabled component
    pub fn stop(&mut self) {
        self.for_each_enabled(|component, ctx| component.data_mut().lifecycle_mut().on_stop(ctx));
    }

    /// Update every enabled component; inactive entities are skipped
    pub fn update(&mut self, delta_time: f32) {
        if !self.active {
            return;
        }
        self.for_each_enabled(|component, ctx| {
            component.data_mut().lifecycle_mut().on_update(ctx, delta_time);
        });
    }

    fn for_each_enabled(&mut self, mut hook: impl FnMut(&mut Component, &ComponentContext<'_>)) {
        let siblings = self.descriptors();
        let ctx = ComponentContext {
            owner: self.id,
            world: self.world,
            siblings: &siblings,
            cache: None,
        };
        for component in self.components.values_mut().flatten().filter(|c| c.enabled) {
            hook(component, &ctx);
        }
    }

    fn fire_resolve(&self) {
        self.events
            .send(Event::new(EventType::SceneResolve).with_arg("entity", EventArg::EntityId(self.id.0)));
    }

    /// Write the entity's own part: flags, id, name, descriptors, then bodies
    ///
    /// Children are written by the scene.
    pub fn serialize_self(&self, writer: &mut BinaryWriter<'_>, as_prefab: bool) -> Result<(), StreamError> {
        writer.write_bool(as_prefab)?;
        writer.write_bool(self.active)?;
        writer.write_bool(self.hierarchy_visible)?;
        writer.write_u64(self.id.0)?;
        writer.write_str(&self.name)?;

        writer.write_len(self.component_count())?;
        for component in self.components() {
            writer.write_u32(component.kind().as_u32())?;
            writer.write_u64(component.id().0)?;
        }
        for component in self.components() {
            component.data().lifecycle().serialize(writer)?;
        }
        Ok(())
    }

    /// Read what [`Entity::serialize_self`] wrote
    ///
    /// The component set is rebuilt from the stored descriptors. Every
    /// component is created before any body is read, so a body may refer to
    /// its siblings.
    pub fn deserialize_self(
        &mut self,
        reader: &mut BinaryReader<'_>,
        cache: Option<&ResourceCache>,
    ) -> Result<(), StreamError> {
        self.deserialize_remapped(reader, cache, |id| id)
    }

    /// [`Entity::deserialize_self`], passing every stored component id through `remap`
    pub(crate) fn deserialize_remapped<F>(
        &mut self,
        reader: &mut BinaryReader<'_>,
        cache: Option<&ResourceCache>,
        mut remap: F,
    ) -> Result<(), StreamError>
    where
        F: FnMut(ComponentId) -> ComponentId,
    {
        self.prefab = reader.read_bool()?;
        self.active = reader.read_bool()?;
        self.hierarchy_visible = reader.read_bool()?;
        self.id = EntityId(reader.read_u64()?);
        self.ids.observe(self.id.0);
        self.name = reader.read_string()?;

        let count = reader.read_len()?;
        let mut components: BTreeMap<ComponentKind, Vec<Component>> = BTreeMap::new();
        let mut order = Vec::with_capacity(count);
        for _ in 0..count {
            let raw_kind = reader.read_u32()?;
            let kind = ComponentKind::from_u32(raw_kind)
                .ok_or_else(|| StreamError::InvalidData(format!("component kind {raw_kind}")))?;
            let stored = reader.read_u64()?;
            self.ids.observe(stored);
            let id = remap(ComponentId(stored));

            if components.values().flatten().any(|c| c.id() == id) {
                return Err(StreamError::InvalidData(format!("duplicate component {}", id.0)));
            }
            let list = components.entry(kind).or_default();
            if !list.is_empty() && !kind.allows_multiple() {
                return Err(StreamError::InvalidData(format!("second {kind} on entity {}", self.id)));
            }
            order.push((kind, list.len()));
            list.push(Component::new(id, ComponentData::new(kind)));
        }

        let previous = std::mem::replace(&mut self.components, components);
        self.notify_removed(previous.into_values().flatten().collect());
        if !self.components.contains_key(&ComponentKind::Transform) {
            log::warn!("Entity {} was stored without a transform", self.id);
            let id = ComponentId(self.ids.next_id());
            self.components
                .entry(ComponentKind::Transform)
                .or_default()
                .push(Component::new(id, ComponentData::new(ComponentKind::Transform)));
        }

        let siblings = self.descriptors();
        let ctx = ComponentContext {
            owner: self.id,
            world: self.world,
            siblings: &siblings,
            cache,
        };
        for component in self.components.values_mut().flatten() {
            component.data_mut().lifecycle_mut().on_initialize(&ctx);
        }
        for (kind, index) in order {
            let component = self
                .components
                .get_mut(&kind)
                .and_then(|list| list.get_mut(index))
                .ok_or_else(|| StreamError::InvalidData(format!("missing {kind} component")))?;
            component.data_mut().lifecycle_mut().deserialize(reader, &ctx)?;
        }
        Ok(())
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        let siblings = self.descriptors();
        let ctx = ComponentContext {
            owner: self.id,
            world: self.world,
            siblings: &siblings,
            cache: None,
        };
        for component in self.components.values_mut().flatten() {
            component.data_mut().lifecycle_mut().on_remove(&ctx);
        }
    }
}
