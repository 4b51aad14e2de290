//! Physics description: bodies, collision shapes and joints
//!
//! Simulation is not part of the core. These components hold what a physics
//! backend needs and keep their links to the owning rigid body.

use super::{read_bool3, write_bool3};
use crate::foundation::math::{Quat, Vec2, Vec3};
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::scene::component::{ComponentContext, ComponentId, ComponentKind, Lifecycle};
use crate::scene::EntityId;

/// Physics body
#[derive(Debug, Clone)]
pub struct RigidBody {
    /// Mass in kilograms; zero means static
    pub mass: f32,
    /// Friction coefficient
    pub friction: f32,
    /// Bounciness
    pub restitution: f32,
    /// Whether gravity applies
    pub use_gravity: bool,
    /// Driven by the transform instead of the simulation
    pub is_kinematic: bool,
    /// Frozen translation axes
    pub position_lock: [bool; 3],
    /// Frozen rotation axes
    pub rotation_lock: [bool; 3],
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            mass: 0.0,
            friction: 0.5,
            restitution: 0.0,
            use_gravity: true,
            is_kinematic: false,
            position_lock: [false; 3],
            rotation_lock: [false; 3],
        }
    }
}

impl RigidBody {
    /// Zero mass bodies never move
    pub fn is_static(&self) -> bool {
        self.mass <= 0.0
    }
}

impl Lifecycle for RigidBody {
    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        writer.write_f32(self.mass)?;
        writer.write_f32(self.friction)?;
        writer.write_f32(self.restitution)?;
        writer.write_bool(self.use_gravity)?;
        writer.write_bool(self.is_kinematic)?;
        write_bool3(writer, self.position_lock)?;
        write_bool3(writer, self.rotation_lock)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        self.mass = reader.read_f32()?;
        self.friction = reader.read_f32()?;
        self.restitution = reader.read_f32()?;
        self.use_gravity = reader.read_bool()?;
        self.is_kinematic = reader.read_bool()?;
        self.position_lock = read_bool3(reader)?;
        self.rotation_lock = read_bool3(reader)?;
        Ok(())
    }
}

/// Collision shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColliderShape {
    /// Axis-aligned box
    #[default]
    Box,
    /// Sphere of radius `extents.x`
    Sphere,
    /// Infinite plane
    StaticPlane,
    /// Cylinder along Y
    Cylinder,
    /// Capsule along Y
    Capsule,
    /// Cone along Y
    Cone,
    /// Triangle mesh of the renderable
    Mesh,
}

impl ColliderShape {
    const ALL: [Self; 7] = [
        Self::Box,
        Self::Sphere,
        Self::StaticPlane,
        Self::Cylinder,
        Self::Capsule,
        Self::Cone,
        Self::Mesh,
    ];

    const fn as_u32(self) -> u32 {
        self as u32
    }

    fn from_u32(value: u32) -> Result<Self, StreamError> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| StreamError::InvalidData(format!("collider shape {value}")))
    }
}

/// Collision shape attached to the entity's rigid body
#[derive(Debug, Clone)]
pub struct Collider {
    /// Shape kind
    pub shape: ColliderShape,
    /// Half extents (or radius/height, depending on the shape)
    pub extents: Vec3,
    /// Offset from the entity origin
    pub center: Vec3,
    rigid_body: Option<ComponentId>,
}

impl Default for Collider {
    fn default() -> Self {
        Self {
            shape: ColliderShape::Box,
            extents: Vec3::new(1.0, 1.0, 1.0),
            center: Vec3::zeros(),
            rigid_body: None,
        }
    }
}

impl Collider {
    /// Rigid body this shape belongs to, if the entity has one
    pub const fn rigid_body(&self) -> Option<ComponentId> {
        self.rigid_body
    }
}

impl Lifecycle for Collider {
    fn on_initialize(&mut self, ctx: &ComponentContext<'_>) {
        self.rigid_body = ctx.sibling(ComponentKind::RigidBody);
    }

    fn on_start(&mut self, ctx: &ComponentContext<'_>) {
        if self.rigid_body.is_none() {
            self.rigid_body = ctx.sibling(ComponentKind::RigidBody);
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        writer.write_u32(self.shape.as_u32())?;
        writer.write_vec3(&self.extents)?;
        writer.write_vec3(&self.center)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        self.shape = ColliderShape::from_u32(reader.read_u32()?)?;
        self.extents = reader.read_vec3()?;
        self.center = reader.read_vec3()?;
        self.rigid_body = ctx.sibling(ComponentKind::RigidBody);
        Ok(())
    }
}

/// Joint type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstraintType {
    /// Ball and socket
    #[default]
    Point,
    /// Rotation around one axis
    Hinge,
    /// Translation along one axis
    Slider,
    /// Cone limited swing plus twist
    ConeTwist,
}

impl ConstraintType {
    const ALL: [Self; 4] = [Self::Point, Self::Hinge, Self::Slider, Self::ConeTwist];

    const fn as_u32(self) -> u32 {
        self as u32
    }

    fn from_u32(value: u32) -> Result<Self, StreamError> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| StreamError::InvalidData(format!("constraint type {value}")))
    }
}

/// Joint between the entity's rigid body and another entity's body
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Joint type
    pub constraint_type: ConstraintType,
    /// Pivot relative to the entity
    pub position: Vec3,
    /// Pivot orientation
    pub rotation: Quat,
    /// Upper limits
    pub high_limit: Vec2,
    /// Lower limits
    pub low_limit: Vec2,
    /// Entity whose body is linked
    pub other_body: Option<EntityId>,
    /// Whether the linked bodies collide with each other
    pub collision_with_linked: bool,
    body: Option<ComponentId>,
}

impl Default for Constraint {
    fn default() -> Self {
        Self {
            constraint_type: ConstraintType::Point,
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            high_limit: Vec2::zeros(),
            low_limit: Vec2::zeros(),
            other_body: None,
            collision_with_linked: false,
            body: None,
        }
    }
}

impl Constraint {
    /// Rigid body of the owning entity
    pub const fn body(&self) -> Option<ComponentId> {
        self.body
    }
}

impl Lifecycle for Constraint {
    fn on_initialize(&mut self, ctx: &ComponentContext<'_>) {
        self.body = ctx.sibling(ComponentKind::RigidBody);
    }

    fn on_start(&mut self, ctx: &ComponentContext<'_>) {
        if self.body.is_none() {
            self.body = ctx.sibling(ComponentKind::RigidBody);
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        writer.write_u32(self.constraint_type.as_u32())?;
        writer.write_vec3(&self.position)?;
        writer.write_quat(&self.rotation)?;
        writer.write_vec2(&self.high_limit)?;
        writer.write_vec2(&self.low_limit)?;
        writer.write_u64(self.other_body.map_or(0, |id| id.0))?;
        writer.write_bool(self.collision_with_linked)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        self.constraint_type = ConstraintType::from_u32(reader.read_u32()?)?;
        self.position = reader.read_vec3()?;
        self.rotation = reader.read_quat()?;
        self.high_limit = reader.read_vec2()?;
        self.low_limit = reader.read_vec2()?;
        let other = reader.read_u64()?;
        self.other_body = (other != 0).then_some(EntityId(other));
        self.collision_with_linked = reader.read_bool()?;
        self.body = ctx.sibling(ComponentKind::RigidBody);
        Ok(())
    }
}
