//! Models: one shared vertex/index buffer pair plus materials and animations
//!
//! Every mesh of an imported model is appended to the same growable
//! geometry; renderables reference a range of it by offset and count.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{
    impl_resource_kind, name_from_path, Animation, LoadState, Loadable, Material, Resource, ResourceError,
    ResourceHandle, ResourceHeader, ResourceManager,
};
use crate::foundation::math::{BoundingBox, Vec3};
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::rendering::{BufferId, BufferKind, DeviceError, GraphicsDevice, Vertex};
use crate::scene::EntityId;

/// Extension of engine-format models
pub const MODEL_EXTENSION: &str = "model";

/// Shared geometry of a model
pub struct Model {
    header: ResourceHeader,
    root_entity: Option<EntityId>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    vertex_buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,
    bounding_box: BoundingBox,
    normalized_scale: f32,
    materials: Vec<ResourceHandle<Material>>,
    animations: Vec<ResourceHandle<Animation>>,
    material_paths: Vec<PathBuf>,
}

impl Model {
    /// Create an empty model
    pub fn new(header: ResourceHeader) -> Self {
        Self {
            header,
            root_entity: None,
            vertices: Vec::new(),
            indices: Vec::new(),
            vertex_buffer: None,
            index_buffer: None,
            bounding_box: BoundingBox::default(),
            normalized_scale: 1.0,
            materials: Vec::new(),
            animations: Vec::new(),
            material_paths: Vec::new(),
        }
    }

    /// Append a mesh; returns `(index_offset, vertex_offset)` of its range
    pub fn geometry_append(&mut self, indices: &[u32], vertices: &[Vertex]) -> (u32, u32) {
        let index_offset = to_u32(self.indices.len());
        let vertex_offset = to_u32(self.vertices.len());
        self.indices.extend_from_slice(indices);
        self.vertices.extend_from_slice(vertices);
        (index_offset, vertex_offset)
    }

    /// Copy out one range of the shared geometry
    ///
    /// Ranges outside the geometry are clamped.
    pub fn geometry_get(
        &self,
        index_offset: u32,
        index_count: u32,
        vertex_offset: u32,
        vertex_count: u32,
    ) -> (Vec<u32>, Vec<Vertex>) {
        (
            slice_range(&self.indices, index_offset, index_count).to_vec(),
            slice_range(&self.vertices, vertex_offset, vertex_count).to_vec(),
        )
    }

    /// Upload the shared geometry and refresh bounds and normalized scale
    pub fn geometry_update(&mut self, device: &dyn GraphicsDevice) -> Result<(), DeviceError> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            log::warn!("Model '{}' has no geometry to upload", self.header.name);
            return Ok(());
        }

        self.vertex_buffer = Some(device.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&self.vertices))?);
        self.index_buffer = Some(device.create_buffer(BufferKind::Index, bytemuck::cast_slice(&self.indices))?);

        let positions: Vec<Vec3> = self.vertices.iter().map(|v| Vec3::from(v.position)).collect();
        self.bounding_box = BoundingBox::from_points(positions.iter());
        let extent = self.bounding_box.size().max();
        self.normalized_scale = if extent > f32::EPSILON { 1.0 / extent } else { 1.0 };
        Ok(())
    }

    /// Vertex and index buffers, once uploaded
    pub const fn buffers(&self) -> Option<(BufferId, BufferId)> {
        match (self.vertex_buffer, self.index_buffer) {
            (Some(vertices), Some(indices)) => Some((vertices, indices)),
            _ => None,
        }
    }

    /// Number of vertices in the shared buffer
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of indices in the shared buffer
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Bounds of all geometry
    pub const fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    /// Scale that fits the model into a unit cube
    pub const fn normalized_scale(&self) -> f32 {
        self.normalized_scale
    }

    /// Entity at the root of the imported hierarchy
    pub const fn root_entity(&self) -> Option<EntityId> {
        self.root_entity
    }

    /// Set the root entity
    pub fn set_root_entity(&mut self, root: EntityId) {
        self.root_entity = Some(root);
    }

    /// Record a material used by this model
    pub fn add_material(&mut self, material: ResourceHandle<Material>) {
        if let Some(path) = material.read().header().file_path.clone() {
            self.material_paths.push(path);
        }
        self.materials.push(material);
    }

    /// Record an animation of this model
    pub fn add_animation(&mut self, animation: ResourceHandle<Animation>) {
        self.animations.push(animation);
    }

    /// Materials used by this model
    pub fn materials(&self) -> &[ResourceHandle<Material>] {
        &self.materials
    }

    /// Animations of this model
    pub fn animations(&self) -> &[ResourceHandle<Animation>] {
        &self.animations
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        writer.write_u64(self.header.id)?;
        writer.write_str(&self.header.name)?;
        writer.write_f32(self.normalized_scale)?;
        writer.write_len(self.material_paths.len())?;
        for path in &self.material_paths {
            writer.write_str(&path.to_string_lossy())?;
        }
        writer.write_vertices(&self.vertices)?;
        writer.write_u32_slice(&self.indices)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>) -> Result<(), StreamError> {
        self.header.id = reader.read_u64()?;
        self.header.name = reader.read_string()?;
        self.normalized_scale = reader.read_f32()?;
        let material_count = reader.read_len()?;
        self.material_paths = (0..material_count)
            .map(|_| reader.read_string().map(PathBuf::from))
            .collect::<Result<_, _>>()?;
        self.vertices = reader.read_vertices()?;
        self.indices = reader.read_u32_vec()?;
        Ok(())
    }

    /// Load an engine-format model, its materials and its GPU buffers
    pub fn load_from_file(&mut self, path: &Path, manager: &ResourceManager) -> Result<(), ResourceError> {
        self.header.load_state = LoadState::Started;
        let result = File::open(path).map_err(ResourceError::from).and_then(|file| {
            let mut reader = BufReader::new(file);
            self.deserialize(&mut BinaryReader::new(&mut reader))
                .map_err(ResourceError::from)
        });
        if let Err(e) = result {
            log::error!("Failed to load model {}: {e}", path.display());
            self.header.load_state = LoadState::Failed;
            return Err(e);
        }
        self.header.file_path = Some(path.to_path_buf());

        for material_path in std::mem::take(&mut self.material_paths) {
            if let Some(material) = manager.load::<Material>(&material_path) {
                self.add_material(material);
            }
        }

        if let Err(e) = self.geometry_update(manager.device().as_ref()) {
            log::error!("Failed to upload model {}: {e}", path.display());
            self.header.load_state = LoadState::Failed;
            return Err(e.into());
        }
        self.header.load_state = LoadState::Completed;
        Ok(())
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn slice_range<T>(items: &[T], offset: u32, count: u32) -> &[T] {
    let start = (offset as usize).min(items.len());
    let end = start.saturating_add(count as usize).min(items.len());
    &items[start..end]
}

impl Resource for Model {
    impl_resource_kind!(Model);

    fn header(&self) -> &ResourceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        &mut self.header
    }

    fn memory_usage(&self) -> usize {
        self.vertices.len() * std::mem::size_of::<Vertex>() + self.indices.len() * std::mem::size_of::<u32>()
    }

    fn save_to_file(&self, path: &Path) -> Result<(), ResourceError> {
        let mut file = BufWriter::new(File::create(path)?);
        self.serialize(&mut BinaryWriter::new(&mut file))?;
        file.flush()?;
        Ok(())
    }
}

impl Loadable for Model {
    fn load(manager: &ResourceManager, path: &Path) -> Result<Self, ResourceError> {
        let mut model = Self::new(ResourceHeader::new(manager.next_id()).with_name(name_from_path(path)));
        model.load_from_file(path, manager)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::HeadlessDevice;
    use approx::assert_relative_eq;

    fn quad(offset: f32) -> (Vec<u32>, Vec<Vertex>) {
        let vertices = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
            .iter()
            .map(|[x, y]| Vertex::new([x + offset, *y, 0.0], [*x, *y], [0.0, 0.0, 1.0]))
            .collect();
        (vec![0, 1, 2, 0, 2, 3], vertices)
    }

    #[test]
    fn test_append_returns_running_offsets() {
        let mut model = Model::new(ResourceHeader::new(1));
        let (indices, vertices) = quad(0.0);

        assert_eq!(model.geometry_append(&indices, &vertices), (0, 0));
        assert_eq!(model.geometry_append(&indices, &vertices), (6, 4));
        assert_eq!(model.vertex_count(), 8);
        assert_eq!(model.index_count(), 12);
    }

    #[test]
    fn test_get_returns_appended_range() {
        let mut model = Model::new(ResourceHeader::new(1));
        let (indices, first) = quad(0.0);
        let (_, second) = quad(5.0);
        model.geometry_append(&indices, &first);
        let (index_offset, vertex_offset) = model.geometry_append(&indices, &second);

        let (got_indices, got_vertices) = model.geometry_get(index_offset, 6, vertex_offset, 4);
        assert_eq!(got_indices, indices);
        assert_eq!(got_vertices, second);

        // Out-of-range requests are clamped
        let (clamped, _) = model.geometry_get(10, 100, 0, 0);
        assert_eq!(clamped.len(), 2);
    }

    #[test]
    fn test_update_uploads_and_normalizes() {
        let device = HeadlessDevice::new();
        let mut model = Model::new(ResourceHeader::new(1));
        let (indices, vertices) = quad(0.0);
        model.geometry_append(&indices, &vertices);
        let (_, shifted) = quad(3.0);
        model.geometry_append(&indices, &shifted);

        model.geometry_update(&device).unwrap();
        assert!(model.buffers().is_some());
        assert_relative_eq!(model.bounding_box().size(), Vec3::new(4.0, 1.0, 0.0));
        assert_relative_eq!(model.normalized_scale(), 0.25);
    }

    #[test]
    fn test_engine_format_round_trip() {
        let mut model = Model::new(ResourceHeader::new(42).with_name("crate"));
        let (indices, vertices) = quad(0.0);
        model.geometry_append(&indices, &vertices);
        model.material_paths.push(PathBuf::from("Data/Materials/wood.material"));

        let mut bytes = Vec::new();
        model.serialize(&mut BinaryWriter::new(&mut bytes)).unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        let mut loaded = Model::new(ResourceHeader::new(0));
        loaded.deserialize(&mut BinaryReader::new(&mut cursor)).unwrap();

        assert_eq!(loaded.id(), 42);
        assert_eq!(loaded.name(), "crate");
        assert_eq!(loaded.geometry_get(0, 6, 0, 4), (indices, vertices));
        assert_eq!(loaded.material_paths, model.material_paths);
        assert_eq!(loaded.memory_usage(), model.memory_usage());
    }
}
