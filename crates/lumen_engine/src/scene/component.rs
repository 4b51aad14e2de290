//! Component kinds, lifecycle hooks and the closed component sum type
//!
//! Every behavior an entity can carry is one variant of [`ComponentData`].
//! Hooks are dispatched through [`Lifecycle`], whose methods all default to
//! no-ops, so each variant implements only what it needs. Typed access goes
//! through [`ComponentVariant`], which is resolved at compile time.

use std::fmt;

use super::components::{
    AudioListener, AudioSource, Camera, Collider, Constraint, Light, LineRenderer, Renderable, RigidBody,
    Script, Skybox, Transform,
};
use super::EntityId;
use crate::foundation::math::Mat4;
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::resource::ResourceCache;

/// Kind tag of a component
///
/// The discriminants are persisted; the order must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentKind {
    /// Receives spatial audio
    AudioListener,
    /// Emits an audio clip
    AudioSource,
    /// Point of view for rendering
    Camera,
    /// Physics collision shape
    Collider,
    /// Physics joint between bodies
    Constraint,
    /// Light emitter
    Light,
    /// Runtime debug lines
    LineRenderer,
    /// Geometry range plus material
    Renderable,
    /// Physics body
    RigidBody,
    /// Script reference
    Script,
    /// Environment cube map
    Skybox,
    /// Local position, rotation and scale
    Transform,
}

impl ComponentKind {
    /// Every kind in persisted order
    pub const ALL: [Self; 12] = [
        Self::AudioListener,
        Self::AudioSource,
        Self::Camera,
        Self::Collider,
        Self::Constraint,
        Self::Light,
        Self::LineRenderer,
        Self::Renderable,
        Self::RigidBody,
        Self::Script,
        Self::Skybox,
        Self::Transform,
    ];

    /// Persisted value
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Kind for a persisted value
    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Whether an entity may hold more than one component of this kind
    pub const fn allows_multiple(self) -> bool {
        matches!(self, Self::Script)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Component identifier, unique within a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u64);

/// What a hook can see of the entity it runs on
#[derive(Clone, Copy)]
pub struct ComponentContext<'a> {
    /// Owning entity
    pub owner: EntityId,
    /// World matrix of the owner as of the last scene resolve
    pub world: Mat4,
    /// Every component of the owner at hook time
    pub siblings: &'a [(ComponentKind, ComponentId)],
    /// Loaded resources, when the hook runs during a load
    pub cache: Option<&'a ResourceCache>,
}

impl ComponentContext<'_> {
    /// First sibling of `kind`
    pub fn sibling(&self, kind: ComponentKind) -> Option<ComponentId> {
        self.siblings
            .iter()
            .find(|(sibling_kind, _)| *sibling_kind == kind)
            .map(|(_, id)| *id)
    }
}

/// Lifecycle and persistence hooks; all optional
pub trait Lifecycle {
    /// Right after the component is attached
    fn on_initialize(&mut self, _ctx: &ComponentContext<'_>) {}

    /// The world starts simulating
    fn on_start(&mut self, _ctx: &ComponentContext<'_>) {}

    /// The world stops simulating
    fn on_stop(&mut self, _ctx: &ComponentContext<'_>) {}

    /// Right before the component is detached or its entity is dropped
    fn on_remove(&mut self, _ctx: &ComponentContext<'_>) {}

    /// Once per frame while the owner is active
    fn on_update(&mut self, _ctx: &ComponentContext<'_>, _delta_time: f32) {}

    /// Write the component body
    fn serialize(&self, _writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        Ok(())
    }

    /// Read the component body; every sibling exists already
    fn deserialize(&mut self, _reader: &mut BinaryReader<'_>, _ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        Ok(())
    }
}

/// A concrete component type stored in [`ComponentData`]
pub trait ComponentVariant: Lifecycle + Default + Sized + 'static {
    /// Kind tag of this variant
    const KIND: ComponentKind;

    /// Borrow the variant out of `data` when the kinds match
    fn from_data(data: &ComponentData) -> Option<&Self>;

    /// Mutably borrow the variant out of `data` when the kinds match
    fn from_data_mut(data: &mut ComponentData) -> Option<&mut Self>;

    /// Wrap into the sum type
    fn into_data(self) -> ComponentData;
}

macro_rules! component_variants {
    ($($variant:ident),* $(,)?) => {
        /// Data of a single component, one variant per [`ComponentKind`]
        #[derive(Debug, Clone)]
        pub enum ComponentData {
            $(
                #[doc = concat!("[`", stringify!($variant), "`] data")]
                $variant($variant),
            )*
        }

        impl ComponentData {
            /// Default data for `kind`
            pub fn new(kind: ComponentKind) -> Self {
                match kind {
                    $(ComponentKind::$variant => Self::$variant($variant::default()),)*
                }
            }

            /// Kind tag of the stored variant
            pub const fn kind(&self) -> ComponentKind {
                match self {
                    $(Self::$variant(_) => ComponentKind::$variant,)*
                }
            }

            /// Hooks of the stored variant
            pub fn lifecycle(&self) -> &dyn Lifecycle {
                match self {
                    $(Self::$variant(data) => data,)*
                }
            }

            /// Mutable hooks of the stored variant
            pub fn lifecycle_mut(&mut self) -> &mut dyn Lifecycle {
                match self {
                    $(Self::$variant(data) => data,)*
                }
            }
        }

        $(
            impl ComponentVariant for $variant {
                const KIND: ComponentKind = ComponentKind::$variant;

                fn from_data(data: &ComponentData) -> Option<&Self> {
                    match data {
                        ComponentData::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn from_data_mut(data: &mut ComponentData) -> Option<&mut Self> {
                    match data {
                        ComponentData::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn into_data(self) -> ComponentData {
                    ComponentData::$variant(self)
                }
            }
        )*
    };
}

component_variants!(
    AudioListener,
    AudioSource,
    Camera,
    Collider,
    Constraint,
    Light,
    LineRenderer,
    Renderable,
    RigidBody,
    Script,
    Skybox,
    Transform,
);

/// A component attached to an entity
#[derive(Debug, Clone)]
pub struct Component {
    id: ComponentId,
    /// Disabled components are skipped by update and rendering
    pub enabled: bool,
    data: ComponentData,
}

impl Component {
    /// Wrap `data`; the kind tag always follows the variant
    pub const fn new(id: ComponentId, data: ComponentData) -> Self {
        Self {
            id,
            enabled: true,
            data,
        }
    }

    /// Identifier
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Kind tag
    pub const fn kind(&self) -> ComponentKind {
        self.data.kind()
    }

    /// Stored data
    pub const fn data(&self) -> &ComponentData {
        &self.data
    }

    /// Mutable stored data
    pub fn data_mut(&mut self) -> &mut ComponentData {
        &mut self.data
    }

    /// Typed view of the data
    pub fn get<T: ComponentVariant>(&self) -> Option<&T> {
        T::from_data(&self.data)
    }

    /// Mutable typed view of the data
    pub fn get_mut<T: ComponentVariant>(&mut self) -> Option<&mut T> {
        T::from_data_mut(&mut self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persisted_order_is_fixed() {
        assert_eq!(ComponentKind::AudioListener.as_u32(), 0);
        assert_eq!(ComponentKind::Renderable.as_u32(), 7);
        assert_eq!(ComponentKind::Transform.as_u32(), 11);
        for kind in ComponentKind::ALL {
            assert_eq!(ComponentKind::from_u32(kind.as_u32()), Some(kind));
        }
        assert_eq!(ComponentKind::from_u32(12), None);
    }

    #[test]
    fn test_data_kind_matches_variant() {
        for kind in ComponentKind::ALL {
            assert_eq!(ComponentData::new(kind).kind(), kind);
        }
    }

    #[test]
    fn test_typed_access_checks_variant() {
        let component = Component::new(ComponentId(3), Camera::default().into_data());
        assert!(component.get::<Camera>().is_some());
        assert!(component.get::<Light>().is_none());
        assert_eq!(component.kind(), ComponentKind::Camera);
    }

    #[test]
    fn test_only_scripts_allow_multiple() {
        let multiple: Vec<_> = ComponentKind::ALL.into_iter().filter(|k| k.allows_multiple()).collect();
        assert_eq!(multiple, vec![ComponentKind::Script]);
    }
}
