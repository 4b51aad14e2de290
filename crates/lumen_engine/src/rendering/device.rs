//! Graphics device abstraction
//!
//! The engine core treats the GPU as an opaque capability: create buffers,
//! textures and shaders, write buffer contents, bind state and draw. Backends
//! implement [`GraphicsDevice`]; [`HeadlessDevice`] records every call and is
//! what tests and tools run against.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Device errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Shader compilation failed
    #[error("Shader compilation failed for {path}: {reason}")]
    ShaderCompilation {
        /// Shader source path
        path: String,
        /// Compiler output
        reason: String,
    },
    /// Resource creation failed
    #[error("Resource creation failed: {0}")]
    CreationFailed(String),
    /// Resource exists but cannot be used yet
    #[error("Not ready: {0}")]
    NotReady(String),
    /// Handle does not name a live resource
    #[error("Unknown buffer {0:?}")]
    UnknownBuffer(BufferId),
    /// Write does not fit the buffer
    #[error("Write of {written} bytes exceeds buffer size {size}")]
    BufferOverflow {
        /// Bytes written
        written: usize,
        /// Buffer capacity
        size: usize,
    },
}

/// GPU buffer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// GPU texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Compiled shader program handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u64);

/// What a buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Vertex data
    Vertex,
    /// `u32` indices
    Index,
    /// Per-draw constants, rewritten through [`GraphicsDevice::update_buffer`]
    Constant,
}

/// Render targets the core draws into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// Deferred geometry buffer
    GBuffer,
    /// Final back buffer
    BackBuffer,
}

/// GPU capability consumed by the engine core
///
/// Methods take `&self` so one device can be shared across worker threads.
pub trait GraphicsDevice: Send + Sync {
    /// Create a buffer initialised with `data`
    fn create_buffer(&self, kind: BufferKind, data: &[u8]) -> DeviceResult<BufferId>;

    /// Map a buffer, copy `data` to its start and unmap it
    fn update_buffer(&self, buffer: BufferId, data: &[u8]) -> DeviceResult<()>;

    /// Create an RGBA texture from a mip chain (level 0 first)
    fn create_texture(&self, width: u32, height: u32, channels: u32, mips: &[Vec<u8>]) -> DeviceResult<TextureId>;

    /// Compile a shader source with preprocessor defines
    fn compile_shader(&self, source: &Path, defines: &[(String, String)]) -> DeviceResult<ShaderId>;

    /// Select the render target for subsequent draws
    fn set_render_target(&self, target: RenderTarget);

    /// Bind a shader program
    fn bind_shader(&self, shader: ShaderId);

    /// Bind a buffer; `slot` is ignored for vertex and index buffers
    fn bind_buffer(&self, kind: BufferKind, buffer: BufferId, slot: u32);

    /// Bind a texture to a shader slot
    fn bind_texture(&self, slot: u32, texture: TextureId);

    /// Draw indexed triangles from the bound buffers
    fn draw_indexed(&self, index_count: u32, index_offset: u32, vertex_offset: u32);
}

/// Call recorded by [`HeadlessDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    /// `create_buffer`
    CreateBuffer(BufferKind, BufferId, usize),
    /// `update_buffer`
    UpdateBuffer(BufferId, usize),
    /// `create_texture`
    CreateTexture(TextureId, u32, u32, usize),
    /// `compile_shader`
    CompileShader(ShaderId, PathBuf, Vec<(String, String)>),
    /// `set_render_target`
    SetRenderTarget(RenderTarget),
    /// `bind_shader`
    BindShader(ShaderId),
    /// `bind_buffer`
    BindBuffer(BufferKind, BufferId, u32),
    /// `bind_texture`
    BindTexture(u32, TextureId),
    /// `draw_indexed`
    DrawIndexed {
        /// Number of indices
        index_count: u32,
        /// First index
        index_offset: u32,
        /// Added to every index
        vertex_offset: u32,
    },
}

#[derive(Default)]
struct HeadlessState {
    next_handle: u64,
    buffers: HashMap<BufferId, Vec<u8>>,
    calls: Vec<DeviceCall>,
    fail_compilation: bool,
}

impl HeadlessState {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Device that keeps buffers in memory and records every call
#[derive(Default)]
pub struct HeadlessDevice {
    state: Mutex<HeadlessState>,
}

impl HeadlessDevice {
    /// Create a new headless device
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following shader compilation fail
    pub fn set_fail_compilation(&self, fail: bool) {
        self.state.lock().fail_compilation = fail;
    }

    /// Snapshot of recorded calls
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    /// Forget recorded calls (buffers are kept)
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of recorded draws
    pub fn draw_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::DrawIndexed { .. }))
            .count()
    }

    /// Number of recorded shader compilations
    pub fn compile_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::CompileShader(..)))
            .count()
    }

    /// Current contents of a buffer
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer).cloned()
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(&self, kind: BufferKind, data: &[u8]) -> DeviceResult<BufferId> {
        let mut state = self.state.lock();
        let id = BufferId(state.next());
        state.buffers.insert(id, data.to_vec());
        state.calls.push(DeviceCall::CreateBuffer(kind, id, data.len()));
        Ok(id)
    }

    fn update_buffer(&self, buffer: BufferId, data: &[u8]) -> DeviceResult<()> {
        let mut state = self.state.lock();
        let target = state
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        if data.len() > target.len() {
            return Err(DeviceError::BufferOverflow {
                written: data.len(),
                size: target.len(),
            });
        }
        target[..data.len()].copy_from_slice(data);
        state.calls.push(DeviceCall::UpdateBuffer(buffer, data.len()));
        Ok(())
    }

    fn create_texture(&self, width: u32, height: u32, _channels: u32, mips: &[Vec<u8>]) -> DeviceResult<TextureId> {
        if width == 0 || height == 0 || mips.is_empty() {
            return Err(DeviceError::CreationFailed(format!(
                "texture {width}x{height} with {} mips",
                mips.len()
            )));
        }
        let mut state = self.state.lock();
        let id = TextureId(state.next());
        state.calls.push(DeviceCall::CreateTexture(id, width, height, mips.len()));
        Ok(id)
    }

    fn compile_shader(&self, source: &Path, defines: &[(String, String)]) -> DeviceResult<ShaderId> {
        let mut state = self.state.lock();
        let id = ShaderId(state.next());
        state
            .calls
            .push(DeviceCall::CompileShader(id, source.to_path_buf(), defines.to_vec()));
        if state.fail_compilation {
            return Err(DeviceError::ShaderCompilation {
                path: source.display().to_string(),
                reason: "compilation disabled on headless device".to_string(),
            });
        }
        Ok(id)
    }

    fn set_render_target(&self, target: RenderTarget) {
        self.state.lock().calls.push(DeviceCall::SetRenderTarget(target));
    }

    fn bind_shader(&self, shader: ShaderId) {
        self.state.lock().calls.push(DeviceCall::BindShader(shader));
    }

    fn bind_buffer(&self, kind: BufferKind, buffer: BufferId, slot: u32) {
        self.state.lock().calls.push(DeviceCall::BindBuffer(kind, buffer, slot));
    }

    fn bind_texture(&self, slot: u32, texture: TextureId) {
        self.state.lock().calls.push(DeviceCall::BindTexture(slot, texture));
    }

    fn draw_indexed(&self, index_count: u32, index_offset: u32, vertex_offset: u32) {
        self.state.lock().calls.push(DeviceCall::DrawIndexed {
            index_count,
            index_offset,
            vertex_offset,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_buffer_writes_in_place() {
        let device = HeadlessDevice::new();
        let buffer = device.create_buffer(BufferKind::Constant, &[0u8; 8]).unwrap();
        device.update_buffer(buffer, &[1, 2, 3]).unwrap();
        assert_eq!(device.buffer_contents(buffer).unwrap(), vec![1, 2, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_update_buffer_rejects_overflow() {
        let device = HeadlessDevice::new();
        let buffer = device.create_buffer(BufferKind::Constant, &[0u8; 2]).unwrap();
        assert!(matches!(
            device.update_buffer(buffer, &[0u8; 4]),
            Err(DeviceError::BufferOverflow { written: 4, size: 2 })
        ));
        assert!(matches!(
            device.update_buffer(BufferId(999), &[0u8; 1]),
            Err(DeviceError::UnknownBuffer(_))
        ));
    }

    #[test]
    fn test_forced_compile_failure() {
        let device = HeadlessDevice::new();
        assert!(device.compile_shader(Path::new("a.shader"), &[]).is_ok());
        device.set_fail_compilation(true);
        assert!(device.compile_shader(Path::new("a.shader"), &[]).is_err());
        assert_eq!(device.compile_count(), 2);
    }
}
