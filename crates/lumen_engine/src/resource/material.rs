//! Materials: texture slots, scalar multipliers and the shader they select
//!
//! The shader feature bitmask of a material is a pure function of which
//! texture slots are occupied. It is recomputed and the matching shader
//! variation re-acquired whenever a texture is added or removed and after
//! loading from disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Weak;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{
    impl_resource_kind, name_from_path, LoadState, Loadable, Resource, ResourceError, ResourceHandle,
    ResourceHeader, ResourceManager, Texture, TextureKind,
};
use crate::foundation::math::{Vec2, Vec4};
use crate::rendering::{ShaderFlags, ShaderVariation, ShaderVariationCache};

/// Extension of material files
pub const MATERIAL_EXTENSION: &str = "material";

/// Which faces are culled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CullMode {
    /// Draw both sides
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    #[default]
    Back,
}

/// Lighting model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadingMode {
    /// Physically based
    #[default]
    Pbr,
    /// Unlit sky
    Sky,
}

/// A texture bound to a material slot
///
/// The texture itself is owned by the resource cache; the slot keeps name
/// and path so the binding survives saving.
#[derive(Debug, Clone)]
pub struct TextureSlot {
    /// Bound texture
    pub texture: Weak<RwLock<Texture>>,
    /// Texture name at bind time
    pub name: String,
    /// Texture path at bind time
    pub path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize)]
struct MaterialTextureEntry {
    kind: TextureKind,
    name: String,
    path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize)]
struct MaterialFile {
    name: String,
    model_id: String,
    opacity: f32,
    alpha_blending: bool,
    cull_mode: CullMode,
    shading_mode: ShadingMode,
    albedo: Vec4,
    roughness_multiplier: f32,
    metallic_multiplier: f32,
    normal_multiplier: f32,
    height_multiplier: f32,
    tiling: Vec2,
    offset: Vec2,
    editable: bool,
    textures: Vec<MaterialTextureEntry>,
}

/// Surface appearance description
pub struct Material {
    header: ResourceHeader,
    /// Name of the model this material came from
    pub model_id: String,
    /// Overall opacity
    pub opacity: f32,
    /// Whether the material is alpha blended
    pub alpha_blending: bool,
    /// Face culling
    pub cull_mode: CullMode,
    /// Lighting model
    pub shading_mode: ShadingMode,
    /// Base color
    pub albedo: Vec4,
    /// Roughness scale
    pub roughness_multiplier: f32,
    /// Metallic scale
    pub metallic_multiplier: f32,
    /// Normal map strength
    pub normal_multiplier: f32,
    /// Height map strength
    pub height_multiplier: f32,
    /// UV tiling
    pub tiling: Vec2,
    /// UV offset
    pub offset: Vec2,
    /// Whether editors may change it
    pub editable: bool,
    textures: BTreeMap<TextureKind, TextureSlot>,
    shader: Option<ResourceHandle<ShaderVariation>>,
}

impl Material {
    /// Create a material with default appearance
    pub fn new(header: ResourceHeader) -> Self {
        Self {
            header,
            model_id: String::new(),
            opacity: 1.0,
            alpha_blending: false,
            cull_mode: CullMode::Back,
            shading_mode: ShadingMode::Pbr,
            albedo: Vec4::new(1.0, 1.0, 1.0, 1.0),
            roughness_multiplier: 1.0,
            metallic_multiplier: 0.0,
            normal_multiplier: 0.0,
            height_multiplier: 0.0,
            tiling: Vec2::new(1.0, 1.0),
            offset: Vec2::zeros(),
            editable: true,
            textures: BTreeMap::new(),
            shader: None,
        }
    }

    /// Bind a texture to the slot of its kind, replacing any previous one
    pub fn set_texture(&mut self, texture: Option<&ResourceHandle<Texture>>, shaders: &ShaderVariationCache) {
        let Some(texture) = texture else {
            log::warn!("Can't set an empty texture on material '{}'", self.header.name);
            return;
        };

        let (kind, slot) = {
            let texture_ref = texture.read();
            (
                texture_ref.kind(),
                TextureSlot {
                    texture: std::sync::Arc::downgrade(texture),
                    name: texture_ref.name().to_string(),
                    path: texture_ref.header().file_path.clone(),
                },
            )
        };
        self.textures.insert(kind, slot);

        self.texture_based_multiplier_adjustment();
        self.acquire_shader(shaders);
    }

    /// Unbind the texture of `kind`
    pub fn remove_texture(&mut self, kind: TextureKind, shaders: &ShaderVariationCache) {
        if self.textures.remove(&kind).is_some() {
            self.acquire_shader(shaders);
        }
    }

    // A map on a scalar channel carries the real values; don't scale them.
    fn texture_based_multiplier_adjustment(&mut self) {
        if self.has_texture_of_kind(TextureKind::Roughness) {
            self.roughness_multiplier = 1.0;
        }
        if self.has_texture_of_kind(TextureKind::Metallic) {
            self.metallic_multiplier = 1.0;
        }
        if self.has_texture_of_kind(TextureKind::Normal) {
            self.normal_multiplier = 1.0;
        }
        if self.has_texture_of_kind(TextureKind::Height) {
            self.height_multiplier = 1.0;
        }
    }

    /// Feature bitmask of the occupied slots
    pub fn shader_flags(&self) -> ShaderFlags {
        self.textures
            .keys()
            .fold(ShaderFlags::empty(), |flags, kind| flags | kind.shader_flag())
    }

    /// Select (compiling if needed) the variation for the occupied slots
    pub fn acquire_shader(&mut self, shaders: &ShaderVariationCache) -> ResourceHandle<ShaderVariation> {
        let variation = shaders.get_or_create(self.shader_flags());
        self.shader = Some(variation.clone());
        variation
    }

    /// Shader variation currently selected
    pub const fn shader(&self) -> Option<&ResourceHandle<ShaderVariation>> {
        self.shader.as_ref()
    }

    /// Whether the slot of `kind` is occupied
    pub fn has_texture_of_kind(&self, kind: TextureKind) -> bool {
        self.textures.contains_key(&kind)
    }

    /// Whether any slot holds the texture at `path`
    pub fn has_texture(&self, path: &Path) -> bool {
        self.textures.values().any(|slot| slot.path.as_deref() == Some(path))
    }

    /// Path of the texture in slot `kind`; `None` means unassigned
    pub fn texture_path_by_kind(&self, kind: TextureKind) -> Option<&Path> {
        self.textures.get(&kind).and_then(|slot| slot.path.as_deref())
    }

    /// Paths of every bound texture
    pub fn texture_paths(&self) -> Vec<PathBuf> {
        self.textures.values().filter_map(|slot| slot.path.clone()).collect()
    }

    /// Texture in slot `kind`, if it is still alive
    pub fn texture(&self, kind: TextureKind) -> Option<ResourceHandle<Texture>> {
        self.textures.get(&kind).and_then(|slot| slot.texture.upgrade())
    }

    /// Occupied slots in kind order
    pub fn textures(&self) -> impl Iterator<Item = (TextureKind, &TextureSlot)> {
        self.textures.iter().map(|(kind, slot)| (*kind, slot))
    }

    /// Set the scalar multiplier of a scalar-modulated channel
    ///
    /// Returns false for kinds without a multiplier.
    pub fn set_multiplier(&mut self, kind: TextureKind, value: f32) -> bool {
        match kind {
            TextureKind::Roughness => self.roughness_multiplier = value,
            TextureKind::Metallic => self.metallic_multiplier = value,
            TextureKind::Normal => self.normal_multiplier = value,
            TextureKind::Height => self.height_multiplier = value,
            _ => return false,
        }
        true
    }

    /// Scalar multiplier of a scalar-modulated channel
    pub const fn multiplier(&self, kind: TextureKind) -> Option<f32> {
        match kind {
            TextureKind::Roughness => Some(self.roughness_multiplier),
            TextureKind::Metallic => Some(self.metallic_multiplier),
            TextureKind::Normal => Some(self.normal_multiplier),
            TextureKind::Height => Some(self.height_multiplier),
            _ => None,
        }
    }

    fn to_file(&self) -> MaterialFile {
        MaterialFile {
            name: self.header.name.clone(),
            model_id: self.model_id.clone(),
            opacity: self.opacity,
            alpha_blending: self.alpha_blending,
            cull_mode: self.cull_mode,
            shading_mode: self.shading_mode,
            albedo: self.albedo,
            roughness_multiplier: self.roughness_multiplier,
            metallic_multiplier: self.metallic_multiplier,
            normal_multiplier: self.normal_multiplier,
            height_multiplier: self.height_multiplier,
            tiling: self.tiling,
            offset: self.offset,
            editable: self.editable,
            textures: self
                .textures
                .iter()
                .map(|(kind, slot)| MaterialTextureEntry {
                    kind: *kind,
                    name: slot.name.clone(),
                    path: slot.path.clone(),
                })
                .collect(),
        }
    }

    /// Load a material file, resolving its textures through `manager`
    pub fn load_from_file(&mut self, path: &Path, manager: &ResourceManager) -> Result<(), ResourceError> {
        self.header.load_state = LoadState::Started;
        let file = match read_material_file(path) {
            Ok(file) => file,
            Err(e) => {
                log::error!("Failed to load material {}: {e}", path.display());
                self.header.load_state = LoadState::Failed;
                return Err(e);
            }
        };

        self.header.name = file.name;
        self.header.file_path = Some(path.to_path_buf());
        self.model_id = file.model_id;
        self.opacity = file.opacity;
        self.alpha_blending = file.alpha_blending;
        self.cull_mode = file.cull_mode;
        self.shading_mode = file.shading_mode;
        self.albedo = file.albedo;
        self.roughness_multiplier = file.roughness_multiplier;
        self.metallic_multiplier = file.metallic_multiplier;
        self.normal_multiplier = file.normal_multiplier;
        self.height_multiplier = file.height_multiplier;
        self.tiling = file.tiling;
        self.offset = file.offset;
        self.editable = file.editable;

        self.textures.clear();
        for entry in file.textures {
            let texture = manager.cache().get_by_name::<Texture>(&entry.name).or_else(|| {
                entry
                    .path
                    .as_deref()
                    .and_then(|texture_path| manager.load::<Texture>(texture_path))
            });
            match texture {
                Some(texture) => {
                    texture.write().set_kind(entry.kind);
                    self.textures.insert(
                        entry.kind,
                        TextureSlot {
                            texture: std::sync::Arc::downgrade(&texture),
                            name: entry.name,
                            path: entry.path,
                        },
                    );
                }
                None => log::warn!(
                    "Material '{}' lost its {:?} texture '{}'",
                    self.header.name,
                    entry.kind,
                    entry.name
                ),
            }
        }

        self.acquire_shader(manager.shaders());
        self.header.load_state = LoadState::Completed;
        Ok(())
    }
}

fn read_material_file(path: &Path) -> Result<MaterialFile, ResourceError> {
    let text = std::fs::read_to_string(path)?;
    ron::from_str(&text).map_err(|e| ResourceError::Parse(e.to_string()))
}

impl Resource for Material {
    impl_resource_kind!(Material);

    fn header(&self) -> &ResourceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        &mut self.header
    }

    fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self
                .textures
                .values()
                .map(|slot| std::mem::size_of::<TextureSlot>() + slot.name.len())
                .sum::<usize>()
    }

    fn save_to_file(&self, path: &Path) -> Result<(), ResourceError> {
        let text = ron::ser::to_string_pretty(&self.to_file(), ron::ser::PrettyConfig::default())
            .map_err(|e| ResourceError::Parse(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

impl Loadable for Material {
    fn load(manager: &ResourceManager, path: &Path) -> Result<Self, ResourceError> {
        let mut material = Self::new(ResourceHeader::new(manager.next_id()).with_name(name_from_path(path)));
        material.load_from_file(path, manager)?;
        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::foundation::ids::IdGenerator;
    use crate::rendering::HeadlessDevice;
    use crate::resource::{handle, ResourceCache};
    use approx::assert_relative_eq;

    fn shaders() -> ShaderVariationCache {
        ShaderVariationCache::new(
            Arc::new(ResourceCache::new()),
            Arc::new(HeadlessDevice::new()),
            Arc::new(IdGenerator::new()),
            "gbuffer.shader",
        )
    }

    fn texture(id: u64, kind: TextureKind) -> ResourceHandle<Texture> {
        let mut texture = Texture::new(
            ResourceHeader::new(id)
                .with_name(format!("tex_{id}"))
                .with_path(format!("textures/tex_{id}.texture")),
        );
        // Colored so normal maps stay normal maps
        texture.set_image(1, 1, 4, false, false, vec![vec![255, 0, 0, 255]]);
        texture.set_kind(kind);
        handle(texture)
    }

    #[test]
    fn test_defaults() {
        let material = Material::new(ResourceHeader::new(1));
        assert_relative_eq!(material.opacity, 1.0);
        assert_relative_eq!(material.roughness_multiplier, 1.0);
        assert_relative_eq!(material.metallic_multiplier, 0.0);
        assert_eq!(material.cull_mode, CullMode::Back);
        assert_eq!(material.shading_mode, ShadingMode::Pbr);
        assert_eq!(material.shader_flags(), ShaderFlags::empty());
        assert!(material.texture_path_by_kind(TextureKind::Albedo).is_none());
    }

    #[test]
    fn test_scalar_texture_forces_multiplier_to_one() {
        let shaders = shaders();
        for (id, kind) in [
            (1, TextureKind::Roughness),
            (2, TextureKind::Metallic),
            (3, TextureKind::Normal),
            (4, TextureKind::Height),
        ] {
            let mut material = Material::new(ResourceHeader::new(100 + id));
            material.set_multiplier(kind, 0.25);
            let mut texture = Texture::new(ResourceHeader::new(id).with_name("t"));
            // Grayscale keeps height maps as height maps
            texture.set_image(1, 1, 4, kind == TextureKind::Height, false, vec![vec![0; 4]]);
            texture.set_kind(kind);
            material.set_texture(Some(&handle(texture)), &shaders);
            assert_eq!(material.multiplier(kind), Some(1.0), "{kind:?}");
        }
    }

    #[test]
    fn test_flags_follow_slot_occupancy_not_history() {
        let shaders = shaders();
        let mut material = Material::new(ResourceHeader::new(1));
        let albedo = texture(1, TextureKind::Albedo);
        let normal = texture(2, TextureKind::Normal);

        material.set_texture(Some(&albedo), &shaders);
        material.set_texture(Some(&normal), &shaders);
        let before = material.shader_flags();
        assert_eq!(before, ShaderFlags::ALBEDO | ShaderFlags::NORMAL);

        material.remove_texture(TextureKind::Albedo, &shaders);
        material.remove_texture(TextureKind::Normal, &shaders);
        assert_eq!(material.shader_flags(), ShaderFlags::empty());

        material.set_texture(Some(&normal), &shaders);
        material.set_texture(Some(&albedo), &shaders);
        assert_eq!(material.shader_flags(), before);
    }

    #[test]
    fn test_same_slot_kinds_share_shader() {
        let shaders = shaders();
        let mut first = Material::new(ResourceHeader::new(1));
        let mut second = Material::new(ResourceHeader::new(2));
        let (a, b) = (texture(10, TextureKind::Albedo), texture(11, TextureKind::Albedo));

        first.set_texture(Some(&a), &shaders);
        second.set_texture(Some(&b), &shaders);

        assert!(Arc::ptr_eq(first.shader().unwrap(), second.shader().unwrap()));
    }

    #[test]
    fn test_one_texture_per_slot() {
        let shaders = shaders();
        let mut material = Material::new(ResourceHeader::new(1));
        material.set_texture(Some(&texture(1, TextureKind::Albedo)), &shaders);
        material.set_texture(Some(&texture(2, TextureKind::Albedo)), &shaders);

        assert_eq!(material.textures().count(), 1);
        assert!(material.has_texture(Path::new("textures/tex_2.texture")));
        assert!(!material.has_texture(Path::new("textures/tex_1.texture")));
    }

    #[test]
    fn test_empty_texture_is_ignored() {
        let shaders = shaders();
        let mut material = Material::new(ResourceHeader::new(1));
        material.set_texture(None, &shaders);
        assert!(material.shader().is_none());
        assert_eq!(material.texture_paths().len(), 0);
    }

    #[test]
    fn test_multiplier_only_for_scalar_channels() {
        let mut material = Material::new(ResourceHeader::new(1));
        assert!(!material.set_multiplier(TextureKind::Albedo, 0.5));
        assert!(material.set_multiplier(TextureKind::Metallic, 0.5));
        assert_eq!(material.multiplier(TextureKind::Metallic), Some(0.5));
    }
}
