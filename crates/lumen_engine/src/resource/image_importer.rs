//! Image loading for textures
//!
//! Decodes any image the `image` crate supports into RGBA8, detects
//! grayscale and transparency, and builds the mip chain on the worker pool
//! with one job per level.

use std::path::Path;
use std::sync::Arc;

use image::imageops::FilterType;
use image::RgbaImage;

use super::{ResourceError, Texture};
use crate::threading::Threading;

/// Decodes foreign image formats into textures
pub struct ImageImporter {
    threading: Arc<Threading>,
    supported_formats: Vec<String>,
    generate_mipmaps: bool,
}

impl ImageImporter {
    /// Create an importer accepting `supported_formats` (".png" style)
    pub fn new(threading: Arc<Threading>, supported_formats: Vec<String>, generate_mipmaps: bool) -> Self {
        Self {
            threading,
            supported_formats,
            generate_mipmaps,
        }
    }

    /// Whether `path` has a supported image extension (case-insensitive)
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = format!(".{}", ext.to_ascii_lowercase());
                self.supported_formats.iter().any(|f| *f == ext)
            })
    }

    /// Supported extensions, lower case with leading dot
    pub fn supported_formats(&self) -> &[String] {
        &self.supported_formats
    }

    /// Decode `path` into `texture`
    pub fn load(&self, path: &Path, texture: &mut Texture) -> Result<(), ResourceError> {
        if !self.is_supported(path) {
            return Err(ResourceError::Unsupported(path.display().to_string()));
        }

        let image = image::open(path)
            .map_err(|e| ResourceError::Image(e.to_string()))?
            .to_rgba8();
        let (width, height) = image.dimensions();

        let grayscale = image.pixels().all(|p| p[0] == p[1] && p[1] == p[2]);
        let transparent = image.pixels().any(|p| p[3] < u8::MAX);

        let mips = if self.generate_mipmaps && texture.mipmaps_enabled() {
            self.generate_mip_chain(image)?
        } else {
            vec![image.into_raw()]
        };

        log::debug!(
            "Loaded image {}x{} with {} mips from {}",
            width,
            height,
            mips.len(),
            path.display()
        );
        texture.set_image(width, height, 4, grayscale, transparent, mips);
        Ok(())
    }

    fn generate_mip_chain(&self, base: RgbaImage) -> Result<Vec<Vec<u8>>, ResourceError> {
        let sizes = mip_sizes(base.width(), base.height());
        let base = Arc::new(base);

        let jobs: Vec<_> = sizes
            .iter()
            .map(|&(width, height)| {
                let base = Arc::clone(&base);
                move || image::imageops::resize(base.as_ref(), width, height, FilterType::Triangle).into_raw()
            })
            .collect();
        let levels = self.threading.run_parallel(jobs);

        if levels.len() != sizes.len() {
            return Err(ResourceError::Image(format!(
                "only {} of {} mip levels were generated",
                levels.len(),
                sizes.len()
            )));
        }

        let mut mips = Vec::with_capacity(levels.len() + 1);
        mips.push(Arc::try_unwrap(base).map_or_else(|shared| shared.as_raw().clone(), RgbaImage::into_raw));
        mips.extend(levels);
        Ok(mips)
    }
}

/// Sizes of every mip level below the base, halving down to 1x1
pub fn mip_sizes(mut width: u32, mut height: u32) -> Vec<(u32, u32)> {
    let mut sizes = Vec::new();
    while width > 1 || height > 1 {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
        sizes.push((width, height));
    }
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceHeader, TextureKind};

    fn importer(mipmaps: bool) -> ImageImporter {
        ImageImporter::new(
            Arc::new(Threading::new(2)),
            vec![".png".to_string(), ".jpg".to_string()],
            mipmaps,
        )
    }

    #[test]
    fn test_mip_sizes_halve_to_one() {
        assert_eq!(mip_sizes(8, 2), vec![(4, 1), (2, 1), (1, 1)]);
        assert!(mip_sizes(1, 1).is_empty());
    }

    #[test]
    fn test_extension_check_ignores_case() {
        let importer = importer(false);
        assert!(importer.is_supported(Path::new("a/b/wall.PNG")));
        assert!(!importer.is_supported(Path::new("wall.xyz")));
        assert!(!importer.is_supported(Path::new("no_extension")));
    }

    #[test]
    fn test_png_with_mips_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        RgbaImage::from_pixel(8, 4, image::Rgba([90, 90, 90, 255])).save(&path).unwrap();

        let mut texture = Texture::new(ResourceHeader::new(1));
        importer(true).load(&path, &mut texture).unwrap();

        assert_eq!((texture.width(), texture.height()), (8, 4));
        assert!(texture.is_grayscale());
        assert!(!texture.is_transparent());
        // 8x4, 4x2, 2x1, 1x1
        assert_eq!(texture.mips().len(), 4);
        assert_eq!(texture.mips()[3].len(), 4);

        texture.set_kind(TextureKind::Normal);
        assert_eq!(texture.kind(), TextureKind::Height);
    }

    #[test]
    fn test_transparency_detected_without_mips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glass.png");
        RgbaImage::from_pixel(2, 2, image::Rgba([10, 200, 30, 128])).save(&path).unwrap();

        let mut texture = Texture::new(ResourceHeader::new(1));
        importer(false).load(&path, &mut texture).unwrap();
        assert!(texture.is_transparent());
        assert!(!texture.is_grayscale());
        assert_eq!(texture.mips().len(), 1);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let mut texture = Texture::new(ResourceHeader::new(1));
        let result = importer(true).load(Path::new("model.obj"), &mut texture);
        assert!(matches!(result, Err(ResourceError::Unsupported(_))));
    }
}
