//! Textures and their engine binary format
//!
//! Field order of the `.texture` format: mip count, each mip's bytes, kind,
//! bits per pixel, width, height, channels, grayscale, transparency,
//! mip-map flag, id, name, path. Any reordering breaks existing files.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{impl_resource_kind, name_from_path, ImageImporter, LoadState, Resource, ResourceError, ResourceHeader};
use crate::io::{BinaryReader, BinaryWriter, StreamError};
use crate::rendering::{GraphicsDevice, ShaderFlags, TextureId};

/// Extension of engine-format textures
pub const TEXTURE_EXTENSION: &str = "texture";

/// Material slot a texture is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum TextureKind {
    /// Not assigned to a slot
    #[default]
    Unknown,
    /// Base color
    Albedo,
    /// Surface roughness
    Roughness,
    /// Metalness
    Metallic,
    /// Tangent-space normals
    Normal,
    /// Height / displacement
    Height,
    /// Ambient occlusion
    Occlusion,
    /// Emitted light
    Emission,
    /// Alpha mask
    Mask,
    /// Environment cube map
    CubeMap,
}

impl TextureKind {
    /// Every slot kind, in persisted order
    pub const ALL: [Self; 10] = [
        Self::Unknown,
        Self::Albedo,
        Self::Roughness,
        Self::Metallic,
        Self::Normal,
        Self::Height,
        Self::Occlusion,
        Self::Emission,
        Self::Mask,
        Self::CubeMap,
    ];

    /// Persisted discriminant
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Parse a persisted discriminant
    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Shader feature bit for this slot
    pub const fn shader_flag(self) -> ShaderFlags {
        match self {
            Self::Unknown => ShaderFlags::empty(),
            Self::Albedo => ShaderFlags::ALBEDO,
            Self::Roughness => ShaderFlags::ROUGHNESS,
            Self::Metallic => ShaderFlags::METALLIC,
            Self::Normal => ShaderFlags::NORMAL,
            Self::Height => ShaderFlags::HEIGHT,
            Self::Occlusion => ShaderFlags::OCCLUSION,
            Self::Emission => ShaderFlags::EMISSION,
            Self::Mask => ShaderFlags::MASK,
            Self::CubeMap => ShaderFlags::CUBE_MAP,
        }
    }
}

/// Image data plus the GPU texture created from it
pub struct Texture {
    header: ResourceHeader,
    kind: TextureKind,
    bpp: u32,
    width: u32,
    height: u32,
    channels: u32,
    grayscale: bool,
    transparent: bool,
    mipmaps: bool,
    mips: Vec<Vec<u8>>,
    gpu_texture: Option<TextureId>,
}

impl Texture {
    /// Create an empty texture
    pub const fn new(header: ResourceHeader) -> Self {
        Self {
            header,
            kind: TextureKind::Unknown,
            bpp: 0,
            width: 0,
            height: 0,
            channels: 0,
            grayscale: false,
            transparent: false,
            mipmaps: true,
            mips: Vec::new(),
            gpu_texture: None,
        }
    }

    /// Load from an engine-format file or any supported image
    ///
    /// On failure the error is logged, the load state is [`LoadState::Failed`]
    /// and whatever was read so far stays in place.
    pub fn load_from_file(
        &mut self,
        path: &Path,
        importer: &ImageImporter,
        device: Option<&dyn GraphicsDevice>,
    ) -> Result<(), ResourceError> {
        self.header.load_state = LoadState::Started;

        let result = self.read_file(path, importer).and_then(|()| match device {
            Some(device) => self.create_gpu_texture(device),
            None => Ok(()),
        });

        match result {
            Ok(()) => {
                self.header.load_state = LoadState::Completed;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load texture {}: {e}", path.display());
                self.header.load_state = LoadState::Failed;
                Err(e)
            }
        }
    }

    fn read_file(&mut self, path: &Path, importer: &ImageImporter) -> Result<(), ResourceError> {
        let is_engine_format = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(TEXTURE_EXTENSION));

        if is_engine_format {
            let mut reader = BufReader::new(File::open(path)?);
            self.deserialize(&mut BinaryReader::new(&mut reader))?;
        } else {
            importer.load(path, self)?;
            // Saving writes the engine format next to the source image
            self.header.name = name_from_path(path);
            self.header.file_path = Some(path.with_extension(TEXTURE_EXTENSION));
        }
        Ok(())
    }

    /// Upload the mip chain to the device
    pub fn create_gpu_texture(&mut self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        let id = device.create_texture(self.width, self.height, self.channels, &self.mips)?;
        self.gpu_texture = Some(id);
        Ok(())
    }

    /// Replace the image data
    pub fn set_image(
        &mut self,
        width: u32,
        height: u32,
        channels: u32,
        grayscale: bool,
        transparent: bool,
        mips: Vec<Vec<u8>>,
    ) {
        self.width = width;
        self.height = height;
        self.channels = channels;
        self.bpp = channels * 8;
        self.grayscale = grayscale;
        self.transparent = transparent;
        self.mips = mips;
    }

    /// Assign the slot kind
    ///
    /// Source assets often mix up normal and height maps: a grayscale
    /// "normal" map becomes a height map and a colored "height" map becomes
    /// a normal map.
    pub fn set_kind(&mut self, kind: TextureKind) {
        self.kind = match kind {
            TextureKind::Normal if self.grayscale => TextureKind::Height,
            TextureKind::Height if !self.grayscale => TextureKind::Normal,
            other => other,
        };
    }

    /// Slot kind
    pub const fn kind(&self) -> TextureKind {
        self.kind
    }

    /// Width of mip 0
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height of mip 0
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Color channels per pixel
    pub const fn channels(&self) -> u32 {
        self.channels
    }

    /// Bits per pixel
    pub const fn bpp(&self) -> u32 {
        self.bpp
    }

    /// Every pixel has r == g == b
    pub const fn is_grayscale(&self) -> bool {
        self.grayscale
    }

    /// Some pixel is not fully opaque
    pub const fn is_transparent(&self) -> bool {
        self.transparent
    }

    /// Whether a mip chain is wanted
    pub const fn mipmaps_enabled(&self) -> bool {
        self.mipmaps
    }

    /// Enable or disable the mip chain for future imports
    pub fn set_mipmaps_enabled(&mut self, enabled: bool) {
        self.mipmaps = enabled;
    }

    /// Mip levels, largest first
    pub fn mips(&self) -> &[Vec<u8>] {
        &self.mips
    }

    /// GPU texture, once uploaded
    pub const fn gpu_texture(&self) -> Option<TextureId> {
        self.gpu_texture
    }

    /// Write the engine format
    pub fn serialize(&self, writer: &mut BinaryWriter<'_>) -> Result<(), StreamError> {
        writer.write_len(self.mips.len())?;
        for mip in &self.mips {
            writer.write_bytes(mip)?;
        }
        writer.write_u32(self.kind.as_u32())?;
        writer.write_u32(self.bpp)?;
        writer.write_u32(self.width)?;
        writer.write_u32(self.height)?;
        writer.write_u32(self.channels)?;
        writer.write_bool(self.grayscale)?;
        writer.write_bool(self.transparent)?;
        writer.write_bool(self.mipmaps)?;
        writer.write_u64(self.header.id)?;
        writer.write_str(&self.header.name)?;
        let path = self
            .header
            .file_path
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        writer.write_str(&path)
    }

    /// Read the engine format
    pub fn deserialize(&mut self, reader: &mut BinaryReader<'_>) -> Result<(), StreamError> {
        let mip_count = reader.read_len()?;
        self.mips = (0..mip_count)
            .map(|_| reader.read_bytes())
            .collect::<Result<_, _>>()?;
        let kind = reader.read_u32()?;
        self.kind = TextureKind::from_u32(kind)
            .ok_or_else(|| StreamError::InvalidData(format!("unknown texture kind {kind}")))?;
        self.bpp = reader.read_u32()?;
        self.width = reader.read_u32()?;
        self.height = reader.read_u32()?;
        self.channels = reader.read_u32()?;
        self.grayscale = reader.read_bool()?;
        self.transparent = reader.read_bool()?;
        self.mipmaps = reader.read_bool()?;
        self.header.id = reader.read_u64()?;
        self.header.name = reader.read_string()?;
        let path = reader.read_string()?;
        self.header.file_path = (!path.is_empty()).then(|| PathBuf::from(path));
        Ok(())
    }
}

impl Resource for Texture {
    impl_resource_kind!(Texture);

    fn header(&self) -> &ResourceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        &mut self.header
    }

    fn memory_usage(&self) -> usize {
        self.mips.iter().map(Vec::len).sum()
    }

    fn save_to_file(&self, path: &Path) -> Result<(), ResourceError> {
        let mut file = BufWriter::new(File::create(path)?);
        self.serialize(&mut BinaryWriter::new(&mut file))?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::rendering::HeadlessDevice;
    use crate::threading::Threading;

    fn importer() -> ImageImporter {
        ImageImporter::new(Arc::new(Threading::new(2)), vec![".png".to_string()], true)
    }

    fn checker(width: u32, height: u32) -> Texture {
        let mut texture = Texture::new(ResourceHeader::new(9).with_name("checker").with_path("checker.texture"));
        texture.set_image(width, height, 4, false, true, vec![vec![7u8; (width * height * 4) as usize]]);
        texture.set_kind(TextureKind::Albedo);
        texture
    }

    #[test]
    fn test_engine_format_round_trip() {
        let original = checker(4, 2);
        let mut bytes = Vec::new();
        original.serialize(&mut BinaryWriter::new(&mut bytes)).unwrap();

        let mut cursor = std::io::Cursor::new(bytes);
        let mut loaded = Texture::new(ResourceHeader::new(0));
        loaded.deserialize(&mut BinaryReader::new(&mut cursor)).unwrap();

        assert_eq!(loaded.id(), 9);
        assert_eq!(loaded.name(), "checker");
        assert_eq!(loaded.kind(), TextureKind::Albedo);
        assert_eq!((loaded.width(), loaded.height(), loaded.bpp()), (4, 2, 32));
        assert!(loaded.is_transparent());
        assert_eq!(loaded.mips(), original.mips());
        assert_eq!(loaded.header().file_path.as_deref(), Some(Path::new("checker.texture")));
    }

    #[test]
    fn test_field_order_starts_with_mips() {
        let texture = checker(1, 1);
        let mut bytes = Vec::new();
        texture.serialize(&mut BinaryWriter::new(&mut bytes)).unwrap();

        // mip count, first mip length, first mip bytes, then the kind
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &4u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &TextureKind::Albedo.as_u32().to_le_bytes());
    }

    #[test]
    fn test_normal_height_fix_up() {
        let mut gray = Texture::new(ResourceHeader::new(1));
        gray.set_image(1, 1, 4, true, false, vec![vec![0; 4]]);
        gray.set_kind(TextureKind::Normal);
        assert_eq!(gray.kind(), TextureKind::Height);

        let mut color = Texture::new(ResourceHeader::new(2));
        color.set_image(1, 1, 4, false, false, vec![vec![0; 4]]);
        color.set_kind(TextureKind::Height);
        assert_eq!(color.kind(), TextureKind::Normal);
    }

    #[test]
    fn test_save_then_load_engine_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.texture");
        checker(2, 2).save_to_file(&path).unwrap();

        let device = HeadlessDevice::new();
        let mut loaded = Texture::new(ResourceHeader::new(0));
        loaded.load_from_file(&path, &importer(), Some(&device)).unwrap();
        assert_eq!(loaded.load_state(), LoadState::Completed);
        assert!(loaded.gpu_texture().is_some());
        assert_eq!(loaded.memory_usage(), 16);
    }

    #[test]
    fn test_missing_file_marks_failed() {
        let mut texture = Texture::new(ResourceHeader::new(0));
        let result = texture.load_from_file(Path::new("missing/nothing.texture"), &importer(), None);
        assert!(result.is_err());
        assert_eq!(texture.load_state(), LoadState::Failed);
    }

    #[test]
    fn test_kind_discriminants() {
        assert_eq!(TextureKind::from_u32(4), Some(TextureKind::Normal));
        assert_eq!(TextureKind::from_u32(99), None);
        assert_eq!(TextureKind::Unknown.shader_flag(), ShaderFlags::empty());
    }
}
