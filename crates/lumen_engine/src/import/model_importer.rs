//! Turns an [`ImportedScene`] into entities, shared geometry and materials

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{
    ImportError, ImportedMaterial, ImportedMesh, ImportedNode, ImportedScene, ImportedTextureSlot, Importer,
    ProgressReport,
};
use crate::events::{EventSender, EventType};
use crate::foundation::math::{BoundingBox, Vec3, Vec4};
use crate::resource::{
    handle, name_from_path, Animation, CullMode, Material, Model, Resource, ResourceHandle, ResourceHeader,
    ResourceManager, Texture, TextureKind, MATERIAL_EXTENSION,
};
use crate::scene::components::Renderable;
use crate::scene::{Entity, EntityId, Scene, SceneError};

/// External slot conventions in the order they are applied, with the engine
/// texture kind each one is reinterpreted as
const SLOT_MAPPING: [(ImportedTextureSlot, TextureKind); 8] = [
    (ImportedTextureSlot::Diffuse, TextureKind::Albedo),
    (ImportedTextureSlot::Shininess, TextureKind::Roughness),
    (ImportedTextureSlot::Ambient, TextureKind::Metallic),
    (ImportedTextureSlot::Normals, TextureKind::Normal),
    (ImportedTextureSlot::Lightmap, TextureKind::Occlusion),
    (ImportedTextureSlot::Emissive, TextureKind::Emission),
    (ImportedTextureSlot::Height, TextureKind::Height),
    (ImportedTextureSlot::Opacity, TextureKind::Mask),
];

/// Imports model files into a scene
///
/// One import runs at a time; progress is published through a shared
/// [`ProgressReport`].
pub struct ModelImporter {
    importer: Arc<dyn Importer>,
    manager: ResourceManager,
    events: EventSender,
    progress: Arc<ProgressReport>,
}

impl ModelImporter {
    /// Create a model importer reading files through `importer`
    pub fn new(importer: Arc<dyn Importer>, manager: ResourceManager, events: EventSender) -> Self {
        Self {
            importer,
            manager,
            events,
            progress: Arc::new(ProgressReport::new()),
        }
    }

    /// Progress of the current (or last) import
    pub const fn progress(&self) -> &Arc<ProgressReport> {
        &self.progress
    }

    /// Whether the underlying importer reads `path`
    pub fn supports(&self, path: &Path) -> bool {
        self.importer.supports(path)
    }

    /// Import `path` into `model` and `scene`
    ///
    /// The world is stopped while entities are created and started again
    /// afterwards, even when the import fails half way.
    pub fn load(&self, model: &ResourceHandle<Model>, path: &Path, scene: &mut Scene) -> Result<(), ImportError> {
        let _loading = LoadingGuard::acquire(&self.progress)?;

        let imported = self
            .importer
            .read(path, &self.progress)
            .inspect_err(|e| log::error!("Failed to read model {}: {e}", path.display()))?;

        self.events.fire(EventType::WorldStop);
        let result = self.build(model, path, &imported, scene);
        self.events.fire(EventType::WorldStart);

        match &result {
            Ok(()) => log::info!("Imported model {}", path.display()),
            Err(e) => log::error!("Failed to import model {}: {e}", path.display()),
        }
        result
    }

    fn build(
        &self,
        model: &ResourceHandle<Model>,
        path: &Path,
        imported: &ImportedScene,
        scene: &mut Scene,
    ) -> Result<(), ImportError> {
        let mut job = ImportJob {
            manager: &self.manager,
            progress: &self.progress,
            model,
            model_name: model.read().name().to_string(),
            model_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            file_stem: name_from_path(path),
            imported,
            scene,
        };

        job.read_node_hierarchy(&imported.root, None)?;
        job.read_animations();
        model.write().geometry_update(self.manager.device().as_ref())?;
        Ok(())
    }
}

/// Marks the report as loading for the lifetime of one import
struct LoadingGuard<'a>(&'a ProgressReport);

impl<'a> LoadingGuard<'a> {
    fn acquire(progress: &'a ProgressReport) -> Result<Self, ImportError> {
        if progress.is_loading() {
            log::warn!("Model import requested while another one is running");
            return Err(ImportError::Busy);
        }
        progress.reset();
        progress.set_loading(true);
        Ok(Self(progress))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.set_loading(false);
    }
}

/// State of one import walk
struct ImportJob<'a> {
    manager: &'a ResourceManager,
    progress: &'a ProgressReport,
    model: &'a ResourceHandle<Model>,
    model_name: String,
    model_dir: PathBuf,
    file_stem: String,
    imported: &'a ImportedScene,
    scene: &'a mut Scene,
}

impl ImportJob<'_> {
    fn read_node_hierarchy(&mut self, node: &ImportedNode, parent: Option<EntityId>) -> Result<(), ImportError> {
        let entity = match parent {
            None => {
                // Source roots carry generic names; the file name is more useful
                let root = self.scene.create_entity(self.file_stem.clone());
                self.model.write().set_root_entity(root);
                self.progress.set_job_count(node.count());
                self.progress.set_jobs_done(0);
                root
            }
            Some(parent) => self.scene.create_child(parent, node.name.clone())?,
        };
        let name = self.entity_mut(entity)?.name().to_string();
        self.progress.set_status(format!("Creating entity for {name}"));

        if let Some(transform) = self.entity_mut(entity)?.transform_mut() {
            transform.set_local_matrix(&node.transform);
        }

        for (i, &mesh_index) in node.meshes.iter().enumerate() {
            let Some(mesh) = self.imported.meshes.get(mesh_index) else {
                log::warn!("Node '{}' references missing mesh {mesh_index}", node.name);
                continue;
            };
            let target = if node.meshes.len() > 1 {
                self.scene.create_child(entity, format!("{name}_{}", i + 1))?
            } else {
                entity
            };
            self.load_mesh(mesh, target)?;
        }

        for child in &node.children {
            self.read_node_hierarchy(child, Some(entity))?;
        }

        self.progress.increment_jobs_done();
        Ok(())
    }

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity, SceneError> {
        self.scene.entity_mut(id).ok_or(SceneError::EntityNotFound(id))
    }

    fn load_mesh(&mut self, mesh: &ImportedMesh, entity: EntityId) -> Result<(), ImportError> {
        let indices = mesh.indices();
        let (index_offset, vertex_offset) = self.model.write().geometry_append(&indices, &mesh.vertices);
        let positions: Vec<Vec3> = mesh.vertices.iter().map(|v| Vec3::from(v.position)).collect();
        let bounding_box = BoundingBox::from_points(positions.iter());

        let material = mesh
            .material
            .and_then(|index| self.imported.materials.get(index).map(|m| (index, m)))
            .map(|(index, imported)| self.convert_material(imported, index));

        let model = self.model;
        let entity = self.entity_mut(entity)?;
        let geometry_name = entity.name().to_string();
        entity.add_component::<Renderable>();
        if let Some(renderable) = entity.get_component_mut::<Renderable>() {
            renderable.geometry_set(
                geometry_name,
                index_offset,
                count(indices.len()),
                vertex_offset,
                count(mesh.vertices.len()),
                bounding_box,
                model,
            );
            if let Some(material) = &material {
                renderable.material_set(material);
            }
        }
        Ok(())
    }

    fn convert_material(&self, imported: &ImportedMaterial, index: usize) -> ResourceHandle<Material> {
        let name = if imported.name.is_empty() {
            format!("{}_material_{index}", self.model_name)
        } else {
            imported.name.clone()
        };

        if let Some(cached) = self.manager.cache().get_by_name::<Material>(&name) {
            self.attach_to_model(&cached);
            return cached;
        }

        let path = self
            .manager
            .directories()
            .materials
            .join(format!("{name}.{MATERIAL_EXTENSION}"));
        let mut material = Material::new(ResourceHeader::new(self.manager.next_id()).with_name(name).with_path(path));
        material.model_id.clone_from(&self.model_name);
        if imported.two_sided {
            material.cull_mode = CullMode::None;
        }
        let diffuse = imported.diffuse_color;
        material.albedo = Vec4::new(diffuse.x, diffuse.y, diffuse.z, imported.opacity);

        for (slot, kind) in SLOT_MAPPING {
            let Some(original) = imported.texture(slot) else {
                continue;
            };
            if let Some(texture) = self.load_texture(original, kind) {
                material.set_texture(Some(&texture), self.manager.shaders());
            }
            if slot == ImportedTextureSlot::Diffuse {
                // Textured surfaces must not be tinted by the diffuse color
                material.albedo = Vec4::new(1.0, 1.0, 1.0, 1.0);
            }
        }
        material.acquire_shader(self.manager.shaders());

        let material = self.manager.cache_resource(handle(material));
        self.attach_to_model(&material);
        material
    }

    fn attach_to_model(&self, material: &ResourceHandle<Material>) {
        let mut model = self.model.write();
        if !model.materials().iter().any(|known| Arc::ptr_eq(known, material)) {
            model.add_material(material.clone());
        }
    }

    fn load_texture(&self, original: &str, kind: TextureKind) -> Option<ResourceHandle<Texture>> {
        let Some(path) = self.repair_texture_path(original) else {
            log::warn!("Texture '{original}' of model '{}' not found, left unassigned", self.model_name);
            return None;
        };
        if !self.manager.image_importer().is_supported(&path) {
            log::warn!("Texture {} is not a supported image", path.display());
            return None;
        }

        let texture = self.manager.load::<Texture>(&path)?;
        texture.write().set_kind(kind);
        Some(texture)
    }

    /// Locate a texture referenced by the source file
    ///
    /// Tries the path relative to the model, then with other image
    /// extensions, then the bare file name next to the model, then that with
    /// other extensions.
    fn repair_texture_path(&self, original: &str) -> Option<PathBuf> {
        let original = original.replace('\\', "/");

        let full = self.model_dir.join(&original);
        if full.is_file() {
            return Some(full);
        }
        if let Some(found) = self.try_other_extensions(&full) {
            return Some(found);
        }

        let beside = self.model_dir.join(Path::new(&original).file_name()?);
        if beside.is_file() {
            return Some(beside);
        }
        self.try_other_extensions(&beside)
    }

    fn try_other_extensions(&self, path: &Path) -> Option<PathBuf> {
        self.manager
            .image_importer()
            .supported_formats()
            .iter()
            .map(|format| format.trim_start_matches('.'))
            .flat_map(|ext| [path.with_extension(ext), path.with_extension(ext.to_ascii_uppercase())])
            .find(|candidate| candidate.is_file())
    }

    fn read_animations(&self) {
        for (i, imported) in self.imported.animations.iter().enumerate() {
            let name = if imported.name.is_empty() {
                format!("{}_animation_{i}", self.model_name)
            } else {
                imported.name.clone()
            };
            let mut animation = Animation::new(ResourceHeader::new(self.manager.next_id()).with_name(name));
            animation.duration = imported.duration;
            animation.set_ticks_per_second(imported.ticks_per_second);
            animation.channels.clone_from(&imported.channels);

            let animation = self.manager.cache_resource(handle(animation));
            self.model.write().add_animation(animation);
        }
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
