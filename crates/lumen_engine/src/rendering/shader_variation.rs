//! Shader variations of the deferred G-buffer shader
//!
//! A variation is the G-buffer shader compiled with one preprocessor define
//! per optional material texture channel. Its identity is the [`ShaderFlags`]
//! bitmask; [`super::ShaderVariationCache`] keeps at most one per bitmask.

use std::path::Path;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::device::{BufferId, BufferKind, DeviceError, DeviceResult, GraphicsDevice, ShaderId};
use crate::foundation::math::Mat4;
use crate::resource::{impl_resource_kind, LoadState, Material, Resource, ResourceHeader, ShadingMode};

bitflags! {
    /// Optional texture channels a variation samples
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
    pub struct ShaderFlags: u32 {
        /// Albedo map
        const ALBEDO = 1 << 0;
        /// Roughness map
        const ROUGHNESS = 1 << 1;
        /// Metallic map
        const METALLIC = 1 << 2;
        /// Normal map
        const NORMAL = 1 << 3;
        /// Height map
        const HEIGHT = 1 << 4;
        /// Ambient occlusion map
        const OCCLUSION = 1 << 5;
        /// Emission map
        const EMISSION = 1 << 6;
        /// Alpha mask
        const MASK = 1 << 7;
        /// Environment cube map
        const CUBE_MAP = 1 << 8;
    }
}

const DEFINES: [(ShaderFlags, &str); 9] = [
    (ShaderFlags::ALBEDO, "ALBEDO_MAP"),
    (ShaderFlags::ROUGHNESS, "ROUGHNESS_MAP"),
    (ShaderFlags::METALLIC, "METALLIC_MAP"),
    (ShaderFlags::NORMAL, "NORMAL_MAP"),
    (ShaderFlags::HEIGHT, "HEIGHT_MAP"),
    (ShaderFlags::OCCLUSION, "OCCLUSION_MAP"),
    (ShaderFlags::EMISSION, "EMISSION_MAP"),
    (ShaderFlags::MASK, "MASK_MAP"),
    (ShaderFlags::CUBE_MAP, "CUBE_MAP"),
];

impl ShaderFlags {
    /// Preprocessor defines for this bitmask, every channel set to "1" or "0"
    pub fn defines(self) -> Vec<(String, String)> {
        DEFINES
            .iter()
            .map(|(flag, name)| {
                let value = if self.contains(*flag) { "1" } else { "0" };
                ((*name).to_string(), value.to_string())
            })
            .collect()
    }
}

/// Compilation state of a variation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderState {
    /// Not compiled yet
    #[default]
    Uninitialized,
    /// Compilation in progress
    Compiling,
    /// Ready to draw with
    Built,
    /// Compilation failed; never retried
    Failed,
}

/// Per-object constant buffer layout
///
/// Field order and padding match the G-buffer shader's constant buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PerObjectBuffer {
    /// Material albedo color
    pub albedo: [f32; 4],
    /// UV tiling
    pub tiling: [f32; 2],
    /// UV offset
    pub offset: [f32; 2],
    /// Roughness multiplier
    pub roughness_multiplier: f32,
    /// Metallic multiplier
    pub metallic_multiplier: f32,
    /// Normal multiplier
    pub normal_multiplier: f32,
    /// Height multiplier
    pub height_multiplier: f32,
    /// Shading mode as float
    pub shading_mode: f32,
    /// Keeps the matrices 16-byte aligned
    pub padding: [f32; 3],
    /// Model (world) matrix
    pub model: [f32; 16],
    /// Model-view-projection this frame
    pub mvp_current: [f32; 16],
    /// Model-view-projection last frame, for velocity
    pub mvp_previous: [f32; 16],
}

fn matrix_array(matrix: &Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(matrix.as_slice());
    out
}

impl PerObjectBuffer {
    /// Fill the buffer from a material and the object's matrices
    pub fn new(material: &Material, model: &Mat4, mvp_current: &Mat4, mvp_previous: &Mat4) -> Self {
        let shading_mode = match material.shading_mode {
            ShadingMode::Pbr => 0.0,
            ShadingMode::Sky => 1.0,
        };
        Self {
            albedo: material.albedo.into(),
            tiling: material.tiling.into(),
            offset: material.offset.into(),
            roughness_multiplier: material.roughness_multiplier,
            metallic_multiplier: material.metallic_multiplier,
            normal_multiplier: material.normal_multiplier,
            height_multiplier: material.height_multiplier,
            shading_mode,
            padding: [0.0; 3],
            model: matrix_array(model),
            mvp_current: matrix_array(mvp_current),
            mvp_previous: matrix_array(mvp_previous),
        }
    }
}

/// A compiled variation of the G-buffer shader
pub struct ShaderVariation {
    header: ResourceHeader,
    flags: ShaderFlags,
    state: ShaderState,
    program: Option<ShaderId>,
    per_object_buffer: Option<BufferId>,
}

impl ShaderVariation {
    /// Create an uncompiled variation named `ShaderVariation_{id}`
    pub fn new(id: u64, flags: ShaderFlags) -> Self {
        Self {
            header: ResourceHeader::new(id).with_name(format!("ShaderVariation_{id}")),
            flags,
            state: ShaderState::Uninitialized,
            program: None,
            per_object_buffer: None,
        }
    }

    /// Feature bitmask this variation was compiled for
    pub const fn flags(&self) -> ShaderFlags {
        self.flags
    }

    /// Compilation state
    pub const fn state(&self) -> ShaderState {
        self.state
    }

    /// Compiled program, once built
    pub const fn program(&self) -> Option<ShaderId> {
        self.program
    }

    /// Constant buffer holding [`PerObjectBuffer`], once built
    pub const fn per_object_buffer(&self) -> Option<BufferId> {
        self.per_object_buffer
    }

    /// Compile `source` with this variation's defines
    ///
    /// Failure is logged and leaves the variation in [`ShaderState::Failed`].
    pub fn compile(&mut self, device: &dyn GraphicsDevice, source: &Path) -> ShaderState {
        self.state = ShaderState::Compiling;
        self.header.load_state = LoadState::Started;

        let result = device
            .compile_shader(source, &self.flags.defines())
            .and_then(|program| {
                let buffer = device.create_buffer(
                    BufferKind::Constant,
                    bytemuck::bytes_of(&PerObjectBuffer::default()),
                )?;
                Ok((program, buffer))
            });

        match result {
            Ok((program, buffer)) => {
                self.program = Some(program);
                self.per_object_buffer = Some(buffer);
                self.state = ShaderState::Built;
                self.header.load_state = LoadState::Completed;
                log::debug!("Compiled {} ({:?})", self.header.name, self.flags);
            }
            Err(e) => {
                self.state = ShaderState::Failed;
                self.header.load_state = LoadState::Failed;
                log::error!("Failed to compile {}: {e}", self.header.name);
            }
        }
        self.state
    }

    /// Write per-object data into the constant buffer (map, copy, unmap)
    pub fn update_per_object_buffer(&self, device: &dyn GraphicsDevice, data: &PerObjectBuffer) -> DeviceResult<()> {
        match (self.state, self.per_object_buffer) {
            (ShaderState::Built, Some(buffer)) => device.update_buffer(buffer, bytemuck::bytes_of(data)),
            _ => Err(DeviceError::NotReady(self.header.name.clone())),
        }
    }
}

impl Resource for ShaderVariation {
    impl_resource_kind!(Shader);

    fn header(&self) -> &ResourceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        &mut self.header
    }

    fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + std::mem::size_of::<PerObjectBuffer>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::HeadlessDevice;

    #[test]
    fn test_defines_follow_flags() {
        let defines = (ShaderFlags::ALBEDO | ShaderFlags::CUBE_MAP).defines();
        assert_eq!(defines.len(), 9);
        let value = |name: &str| {
            defines.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
        };
        assert_eq!(value("ALBEDO_MAP"), Some("1"));
        assert_eq!(value("CUBE_MAP"), Some("1"));
        assert_eq!(value("NORMAL_MAP"), Some("0"));
    }

    #[test]
    fn test_bit_values_are_stable() {
        assert_eq!(ShaderFlags::ALBEDO.bits(), 1);
        assert_eq!(ShaderFlags::HEIGHT.bits(), 16);
        assert_eq!(ShaderFlags::CUBE_MAP.bits(), 256);
        assert_eq!(ShaderFlags::all().bits(), 511);
    }

    #[test]
    fn test_compile_success_and_buffer_update() {
        let device = HeadlessDevice::new();
        let mut variation = ShaderVariation::new(5, ShaderFlags::NORMAL);
        assert_eq!(variation.name(), "ShaderVariation_5");

        assert_eq!(variation.compile(&device, Path::new("gbuffer.shader")), ShaderState::Built);
        assert_eq!(variation.load_state(), LoadState::Completed);

        let data = PerObjectBuffer {
            roughness_multiplier: 0.5,
            ..PerObjectBuffer::default()
        };
        variation.update_per_object_buffer(&device, &data).unwrap();
        let buffer = variation.per_object_buffer().unwrap();
        assert_eq!(device.buffer_contents(buffer).unwrap(), bytemuck::bytes_of(&data));
    }

    #[test]
    fn test_failed_compile_refuses_updates() {
        let device = HeadlessDevice::new();
        device.set_fail_compilation(true);
        let mut variation = ShaderVariation::new(1, ShaderFlags::empty());

        assert_eq!(variation.compile(&device, Path::new("gbuffer.shader")), ShaderState::Failed);
        assert!(variation.program().is_none());
        assert!(matches!(
            variation.update_per_object_buffer(&device, &PerObjectBuffer::default()),
            Err(DeviceError::NotReady(_))
        ));
    }

    #[test]
    fn test_per_object_layout_size() {
        assert_eq!(std::mem::size_of::<PerObjectBuffer>(), 256);
    }
}
