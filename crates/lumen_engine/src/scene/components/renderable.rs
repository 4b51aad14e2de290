//! Renderable: a range of a model's shared geometry plus a material
//!
//! Geometry is never owned here. The renderable points at offsets into the
//! model's vertex and index buffers.

use std::fmt;

use crate::foundation::math::BoundingBox;
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::rendering::Vertex;
use crate::resource::{Material, Model, Resource, ResourceHandle, NOT_ASSIGNED};
use crate::scene::component::{ComponentContext, Lifecycle};

/// Binds an entity to shared geometry and a material
#[derive(Clone)]
pub struct Renderable {
    geometry_name: String,
    index_offset: u32,
    index_count: u32,
    vertex_offset: u32,
    vertex_count: u32,
    bounding_box: BoundingBox,
    model_name: String,
    model: Option<ResourceHandle<Model>>,
    material_name: String,
    material: Option<ResourceHandle<Material>>,
    /// Whether the geometry casts shadows
    pub cast_shadows: bool,
    /// Whether the geometry receives shadows
    pub receive_shadows: bool,
}

impl Default for Renderable {
    fn default() -> Self {
        Self {
            geometry_name: NOT_ASSIGNED.to_string(),
            index_offset: 0,
            index_count: 0,
            vertex_offset: 0,
            vertex_count: 0,
            bounding_box: BoundingBox::default(),
            model_name: NOT_ASSIGNED.to_string(),
            model: None,
            material_name: NOT_ASSIGNED.to_string(),
            material: None,
            cast_shadows: true,
            receive_shadows: true,
        }
    }
}

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderable")
            .field("geometry", &self.geometry_name)
            .field("indices", &(self.index_offset, self.index_count))
            .field("vertices", &(self.vertex_offset, self.vertex_count))
            .field("model", &self.model_name)
            .field("material", &self.material_name)
            .finish_non_exhaustive()
    }
}

impl Renderable {
    /// Point at a range of `model`'s shared geometry
    #[allow(clippy::too_many_arguments)]
    pub fn geometry_set(
        &mut self,
        name: impl Into<String>,
        index_offset: u32,
        index_count: u32,
        vertex_offset: u32,
        vertex_count: u32,
        bounding_box: BoundingBox,
        model: &ResourceHandle<Model>,
    ) {
        self.geometry_name = name.into();
        self.index_offset = index_offset;
        self.index_count = index_count;
        self.vertex_offset = vertex_offset;
        self.vertex_count = vertex_count;
        self.bounding_box = bounding_box;
        self.model_name = model.read().name().to_string();
        self.model = Some(model.clone());
    }

    /// Copy the referenced range out of the model
    pub fn geometry_get(&self) -> Option<(Vec<u32>, Vec<Vertex>)> {
        let model = self.model.as_ref()?;
        let model = model.read();
        Some(model.geometry_get(self.index_offset, self.index_count, self.vertex_offset, self.vertex_count))
    }

    /// Attach a material
    pub fn material_set(&mut self, material: &ResourceHandle<Material>) {
        self.material_name = material.read().name().to_string();
        self.material = Some(material.clone());
    }

    /// Name of the geometry range
    pub fn geometry_name(&self) -> &str {
        &self.geometry_name
    }

    /// First index of the range
    pub const fn index_offset(&self) -> u32 {
        self.index_offset
    }

    /// Number of indices in the range
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    /// First vertex of the range
    pub const fn vertex_offset(&self) -> u32 {
        self.vertex_offset
    }

    /// Number of vertices in the range
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Bounds of the range in model space
    pub const fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    /// Model owning the geometry
    pub const fn model(&self) -> Option<&ResourceHandle<Model>> {
        self.model.as_ref()
    }

    /// Material, if one is attached
    pub const fn material(&self) -> Option<&ResourceHandle<Material>> {
        self.material.as_ref()
    }

    /// Whether a material is attached
    pub const fn has_material(&self) -> bool {
        self.material.is_some()
    }

    /// Name of the model, kept even when the model is not loaded
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Name of the material, kept even when the material is not loaded
    pub fn material_name(&self) -> &str {
        &self.material_name
    }
}

impl Lifecycle for Renderable {
    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        writer.write_str(&self.geometry_name)?;
        writer.write_u32(self.index_offset)?;
        writer.write_u32(self.index_count)?;
        writer.write_u32(self.vertex_offset)?;
        writer.write_u32(self.vertex_count)?;
        writer.write_vec3(&self.bounding_box.min)?;
        writer.write_vec3(&self.bounding_box.max)?;
        writer.write_str(&self.model_name)?;
        writer.write_str(&self.material_name)?;
        writer.write_bool(self.cast_shadows)?;
        writer.write_bool(self.receive_shadows)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, ctx: &ComponentContext<'_>) -> Result<(), StreamError> {
        self.geometry_name = reader.read_string()?;
        self.index_offset = reader.read_u32()?;
        self.index_count = reader.read_u32()?;
        self.vertex_offset = reader.read_u32()?;
        self.vertex_count = reader.read_u32()?;
        self.bounding_box = BoundingBox {
            min: reader.read_vec3()?,
            max: reader.read_vec3()?,
        };
        self.model_name = reader.read_string()?;
        self.material_name = reader.read_string()?;
        self.cast_shadows = reader.read_bool()?;
        self.receive_shadows = reader.read_bool()?;

        if let Some(cache) = ctx.cache {
            self.model = cache.get_by_name::<Model>(&self.model_name);
            self.material = cache.get_by_name::<Material>(&self.material_name);
            if self.model.is_none() && self.model_name != NOT_ASSIGNED {
                log::warn!("Entity {}: model '{}' is not loaded", ctx.owner, self.model_name);
            }
        }
        Ok(())
    }
}
