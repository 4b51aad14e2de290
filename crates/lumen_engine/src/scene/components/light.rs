//! Light emitter

use crate::foundation::math::Vec4;
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::scene::component::{ComponentContext, Lifecycle};

/// Light model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightType {
    /// Parallel rays along the entity's forward axis
    #[default]
    Directional,
    /// Omnidirectional with a range
    Point,
    /// Cone with a range and angle
    Spot,
}

impl LightType {
    const fn as_u32(self) -> u32 {
        match self {
            Self::Directional => 0,
            Self::Point => 1,
            Self::Spot => 2,
        }
    }

    fn from_u32(value: u32) -> Result<Self, StreamError> {
        match value {
            0 => Ok(Self::Directional),
            1 => Ok(Self::Point),
            2 => Ok(Self::Spot),
            other => Err(StreamError::InvalidData(format!("light type {other}"))),
        }
    }
}

/// Light component
#[derive(Debug, Clone)]
pub struct Light {
    /// Light model
    pub light_type: LightType,
    /// RGBA color
    pub color: Vec4,
    /// Brightness multiplier
    pub intensity: f32,
    /// Reach of point and spot lights
    pub range: f32,
    /// Spot cone angle in radians
    pub angle: f32,
    /// Whether the light casts shadows
    pub cast_shadows: bool,
    /// Shadow depth bias
    pub bias: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            light_type: LightType::Directional,
            color: Vec4::new(1.0, 0.76, 0.57, 1.0),
            intensity: 2.0,
            range: 10.0,
            angle: 0.5,
            cast_shadows: true,
            bias: 0.0008,
        }
    }
}

impl Lifecycle for Light {
    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        writer.write_u32(self.light_type.as_u32())?;
        writer.write_vec4(&self.color)?;
        writer.write_f32(self.intensity)?;
        writer.write_f32(self.range)?;
        writer.write_f32(self.angle)?;
        writer.write_bool(self.cast_shadows)?;
        writer.write_f32(self.bias)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        self.light_type = LightType::from_u32(reader.read_u32()?)?;
        self.color = reader.read_vec4()?;
        self.intensity = reader.read_f32()?;
        self.range = reader.read_f32()?;
        self.angle = reader.read_f32()?;
        self.cast_shadows = reader.read_bool()?;
        self.bias = reader.read_f32()?;
        Ok(())
    }
}
