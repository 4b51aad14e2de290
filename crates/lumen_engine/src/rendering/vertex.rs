//! Vertex layout shared by models, the binary stream and the device

use bytemuck::{Pod, Zeroable};

/// Vertex with position, texture coordinate and tangent frame
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
    /// Surface normal
    pub normal: [f32; 3],
    /// Tangent
    pub tangent: [f32; 3],
    /// Bitangent
    pub bitangent: [f32; 3],
}

impl Vertex {
    /// Create a vertex with an empty tangent frame
    pub const fn new(position: [f32; 3], uv: [f32; 2], normal: [f32; 3]) -> Self {
        Self {
            position,
            uv,
            normal,
            tangent: [0.0; 3],
            bitangent: [0.0; 3],
        }
    }
}
