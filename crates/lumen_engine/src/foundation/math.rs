//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Compose a translation, rotation and scale into a single matrix (T * R * S)
pub fn compose(position: &Vec3, rotation: &Quat, scale: &Vec3) -> Mat4 {
    Mat4::new_translation(position) * rotation.to_homogeneous() * Mat4::new_nonuniform_scaling(scale)
}

/// Split a matrix back into translation, rotation and scale
///
/// Assumes the matrix carries no shear.
pub fn decompose(matrix: &Mat4) -> (Vec3, Quat, Vec3) {
    let position = Vec3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);

    let column = |i: usize| Vec3::new(matrix[(0, i)], matrix[(1, i)], matrix[(2, i)]);
    let (x, y, z) = (column(0), column(1), column(2));
    let scale = Vec3::new(x.norm(), y.norm(), z.norm());

    let safe = |v: Vec3, s: f32| if s > f32::EPSILON { v / s } else { v };
    let rotation_matrix = nalgebra::Matrix3::from_columns(&[
        safe(x, scale.x),
        safe(y, scale.y),
        safe(z, scale.z),
    ]);
    let rotation = Quat::from_rotation_matrix(&nalgebra::Rotation3::from_matrix_unchecked(
        rotation_matrix,
    ));

    (position, rotation, scale)
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl BoundingBox {
    /// An inverted box that any point will expand
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// Smallest box containing every point
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut aabb = Self::empty();
        for point in points {
            aabb.expand(point);
        }
        aabb
    }

    /// Grow the box to contain `point`
    pub fn expand(&mut self, point: &Vec3) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Grow the box to contain `other`
    pub fn merge(&mut self, other: &Self) {
        if other.is_valid() {
            self.expand(&other.min);
            self.expand(&other.max);
        }
    }

    /// True once at least one point has been added
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Edge lengths of the box
    pub fn size(&self) -> Vec3 {
        if self.is_valid() {
            self.max - self.min
        } else {
            Vec3::zeros()
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vec3::zeros(),
            max: Vec3::zeros(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_compose_decompose() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let rotation = Quat::from_euler_angles(0.3, 0.2, 0.1);
        let scale = Vec3::new(2.0, 2.0, 2.0);

        let matrix = compose(&position, &rotation, &scale);
        let (p, r, s) = decompose(&matrix);

        assert_relative_eq!(p, position, epsilon = 1e-5);
        assert_relative_eq!(s, scale, epsilon = 1e-5);
        assert_relative_eq!(r.angle_to(&rotation), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_bounding_box_from_points() {
        let points = [Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, -4.0, 1.0)];
        let aabb = BoundingBox::from_points(points.iter());

        assert_eq!(aabb.min, Vec3::new(-1.0, -4.0, 1.0));
        assert_eq!(aabb.max, Vec3::new(3.0, 0.0, 2.0));
        assert_relative_eq!(aabb.size(), Vec3::new(4.0, 4.0, 1.0));
    }

    #[test]
    fn test_empty_box_has_zero_size() {
        let aabb = BoundingBox::empty();
        assert!(!aabb.is_valid());
        assert_eq!(aabb.size(), Vec3::zeros());
    }
}
