//! Camera component

use crate::foundation::math::{Mat4, Vec4};
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::scene::component::{ComponentContext, Lifecycle};

/// Projection model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// Perspective with a vertical field of view
    #[default]
    Perspective,
    /// Orthographic, sized by the field of view value in world units
    Orthographic,
}

impl Projection {
    const fn as_u32(self) -> u32 {
        match self {
            Self::Perspective => 0,
            Self::Orthographic => 1,
        }
    }

    fn from_u32(value: u32) -> Result<Self, StreamError> {
        match value {
            0 => Ok(Self::Perspective),
            1 => Ok(Self::Orthographic),
            other => Err(StreamError::InvalidData(format!("projection {other}"))),
        }
    }
}

/// Point of view the renderer draws from
#[derive(Debug, Clone)]
pub struct Camera {
    /// Vertical field of view in radians
    pub fov: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Projection model
    pub projection: Projection,
    /// Color the G-buffer is cleared to
    pub clear_color: Vec4,
    /// Viewport width over height
    pub aspect: f32,
    view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov: 60f32.to_radians(),
            near: 0.3,
            far: 1000.0,
            projection: Projection::Perspective,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            aspect: 16.0 / 9.0,
            view: Mat4::identity(),
        }
    }
}

impl Camera {
    /// Projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective => Mat4::new_perspective(self.aspect, self.fov, self.near, self.far),
            Projection::Orthographic => {
                let half_height = self.fov * 0.5;
                let half_width = half_height * self.aspect;
                Mat4::new_orthographic(-half_width, half_width, -half_height, half_height, self.near, self.far)
            }
        }
    }

    /// View matrix as of the last update
    pub const fn view_matrix(&self) -> &Mat4 {
        &self.view
    }

    /// Recompute the view from the camera's world matrix
    pub fn update_view(&mut self, world: &Mat4) {
        self.view = world.try_inverse().unwrap_or_else(Mat4::identity);
    }

    /// Projection times view
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view
    }
}

impl Lifecycle for Camera {
    fn on_initialize(&mut self, ctx: &ComponentContext<'_>) {
        self.update_view(&ctx.world);
    }

    fn on_update(&mut self, ctx: &ComponentContext<'_>, _delta_time: f32) {
        self.update_view(&ctx.world);
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        writer.write_f32(self.fov)?;
        writer.write_f32(self.near)?;
        writer.write_f32(self.far)?;
        writer.write_u32(self.projection.as_u32())?;
        writer.write_vec4(&self.clear_color)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        self.fov = reader.read_f32()?;
        self.near = reader.read_f32()?;
        self.far = reader.read_f32()?;
        self.projection = Projection::from_u32(reader.read_u32()?)?;
        self.clear_color = reader.read_vec4()?;
        self.update_view(&ctx.world);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::scene::EntityId;
    use approx::assert_relative_eq;

    #[test]
    fn test_view_is_inverse_world() {
        let world = Mat4::new_translation(&Vec3::new(0.0, 0.0, 5.0));
        let ctx = ComponentContext {
            owner: EntityId(1),
            world,
            siblings: &[],
            cache: None,
        };
        let mut camera = Camera::default();
        camera.on_update(&ctx, 0.016);
        assert_relative_eq!(camera.view_matrix() * world, Mat4::identity(), epsilon = 1e-5);
    }
}
