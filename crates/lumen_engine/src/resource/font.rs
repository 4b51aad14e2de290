//! Bitmap fonts
//!
//! A font is described by a RON file listing glyph metrics inside an atlas
//! texture. [`Font::set_text`] lays a string out as one quad per glyph and
//! uploads the result through the device.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    impl_resource_kind, name_from_path, LoadState, Loadable, Resource, ResourceError, ResourceHandle,
    ResourceHeader, ResourceManager, Texture,
};
use crate::foundation::math::{Vec2, Vec4};
use crate::rendering::{BufferId, BufferKind, DeviceError, GraphicsDevice, Vertex};

/// Smallest supported font size
pub const MIN_FONT_SIZE: u32 = 8;
/// Largest supported font size
pub const MAX_FONT_SIZE: u32 = 50;
/// Spaces a tab advances
const TAB_WIDTH: f32 = 8.0;

/// Metrics of one glyph in the atlas, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    /// Character this glyph draws
    pub character: char,
    /// Left edge in the atlas
    pub x: u32,
    /// Top edge in the atlas
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
    /// Horizontal bearing
    pub x_offset: f32,
    /// Vertical bearing
    pub y_offset: f32,
    /// Pen advance after this glyph
    pub advance: f32,
}

/// Font description file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontDescription {
    /// Atlas image path
    pub atlas: PathBuf,
    /// Atlas width in pixels
    pub atlas_width: u32,
    /// Atlas height in pixels
    pub atlas_height: u32,
    /// Size the glyphs were rasterized at
    pub size: u32,
    /// Line height in pixels
    pub line_height: f32,
    /// Glyph metrics
    pub glyphs: Vec<Glyph>,
}

/// Glyph atlas plus the geometry of the current text
pub struct Font {
    header: ResourceHeader,
    size: u32,
    color: Vec4,
    line_height: f32,
    atlas_size: (u32, u32),
    glyphs: HashMap<char, Glyph>,
    atlas: Option<ResourceHandle<Texture>>,
    text: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    buffers: Option<(BufferId, BufferId)>,
}

impl Font {
    /// Create an empty font
    pub fn new(header: ResourceHeader) -> Self {
        Self {
            header,
            size: 14,
            color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            line_height: 0.0,
            atlas_size: (1, 1),
            glyphs: HashMap::new(),
            atlas: None,
            text: String::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
            buffers: None,
        }
    }

    /// Take metrics from a description
    pub fn apply_description(&mut self, description: FontDescription) {
        self.set_size(description.size);
        self.line_height = description.line_height;
        self.atlas_size = (description.atlas_width.max(1), description.atlas_height.max(1));
        self.glyphs = description.glyphs.into_iter().map(|g| (g.character, g)).collect();
    }

    /// Set the size, clamped to the supported range
    pub fn set_size(&mut self, size: u32) {
        self.size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
    }

    /// Font size
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Set the text color
    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
    }

    /// Text color
    pub const fn color(&self) -> Vec4 {
        self.color
    }

    /// Atlas texture
    pub const fn atlas(&self) -> Option<&ResourceHandle<Texture>> {
        self.atlas.as_ref()
    }

    /// Lay out `text` starting at `position` and upload it
    ///
    /// Characters without a glyph are skipped. Re-setting the same text is a
    /// no-op.
    pub fn set_text(&mut self, text: &str, position: Vec2, device: &dyn GraphicsDevice) -> Result<(), DeviceError> {
        if text == self.text && self.buffers.is_some() {
            return Ok(());
        }
        self.layout(text, position);

        if self.indices.is_empty() {
            self.buffers = None;
        } else {
            let vertices = device.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&self.vertices))?;
            let indices = device.create_buffer(BufferKind::Index, bytemuck::cast_slice(&self.indices))?;
            self.buffers = Some((vertices, indices));
        }
        self.text = text.to_string();
        Ok(())
    }

    fn layout(&mut self, text: &str, position: Vec2) {
        self.vertices.clear();
        self.indices.clear();

        let space_advance = self.glyphs.get(&' ').map_or(self.size as f32 * 0.5, |g| g.advance);
        let (atlas_w, atlas_h) = (self.atlas_size.0 as f32, self.atlas_size.1 as f32);
        let mut pen = position;

        for character in text.chars() {
            match character {
                '\n' => {
                    pen.x = position.x;
                    pen.y -= self.line_height;
                    continue;
                }
                '\t' => {
                    pen.x += space_advance * TAB_WIDTH;
                    continue;
                }
                _ => {}
            }
            let Some(glyph) = self.glyphs.get(&character).copied() else {
                continue;
            };

            let left = pen.x + glyph.x_offset;
            let top = pen.y - glyph.y_offset;
            let right = left + glyph.width as f32;
            let bottom = top - glyph.height as f32;

            let u0 = glyph.x as f32 / atlas_w;
            let v0 = glyph.y as f32 / atlas_h;
            let u1 = (glyph.x + glyph.width) as f32 / atlas_w;
            let v1 = (glyph.y + glyph.height) as f32 / atlas_h;

            let base = u32::try_from(self.vertices.len()).unwrap_or(u32::MAX);
            let normal = [0.0, 0.0, -1.0];
            self.vertices.extend_from_slice(&[
                Vertex::new([left, top, 0.0], [u0, v0], normal),
                Vertex::new([right, top, 0.0], [u1, v0], normal),
                Vertex::new([right, bottom, 0.0], [u1, v1], normal),
                Vertex::new([left, bottom, 0.0], [u0, v1], normal),
            ]);
            self.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);

            pen.x += glyph.advance;
        }
    }

    /// Number of indices of the current text
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Uploaded vertex and index buffers of the current text
    pub const fn buffers(&self) -> Option<(BufferId, BufferId)> {
        self.buffers
    }

    /// Load a description file and its atlas
    pub fn load_from_file(&mut self, path: &Path, manager: &ResourceManager) -> Result<(), ResourceError> {
        self.header.load_state = LoadState::Started;
        let description = std::fs::read_to_string(path)
            .map_err(ResourceError::from)
            .and_then(|text| {
                ron::from_str::<FontDescription>(&text).map_err(|e| ResourceError::Parse(e.to_string()))
            });
        let description = match description {
            Ok(description) => description,
            Err(e) => {
                log::error!("Failed to load font {}: {e}", path.display());
                self.header.load_state = LoadState::Failed;
                return Err(e);
            }
        };

        let atlas_path = path
            .parent()
            .map_or_else(|| description.atlas.clone(), |dir| dir.join(&description.atlas));
        self.atlas = manager.load::<Texture>(&atlas_path);
        if self.atlas.is_none() {
            log::warn!("Font {} has no atlas at {}", path.display(), atlas_path.display());
        }

        self.apply_description(description);
        self.header.name = name_from_path(path);
        self.header.file_path = Some(path.to_path_buf());
        self.header.load_state = LoadState::Completed;
        Ok(())
    }
}

impl Resource for Font {
    impl_resource_kind!(Font);

    fn header(&self) -> &ResourceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        &mut self.header
    }

    fn memory_usage(&self) -> usize {
        self.glyphs.len() * std::mem::size_of::<Glyph>()
            + self.vertices.len() * std::mem::size_of::<Vertex>()
            + self.indices.len() * std::mem::size_of::<u32>()
    }
}

impl Loadable for Font {
    fn load(manager: &ResourceManager, path: &Path) -> Result<Self, ResourceError> {
        let mut font = Self::new(ResourceHeader::new(manager.next_id()));
        font.load_from_file(path, manager)?;
        Ok(font)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::HeadlessDevice;

    fn glyph(character: char, advance: f32) -> Glyph {
        Glyph {
            character,
            x: 0,
            y: 0,
            width: 8,
            height: 10,
            x_offset: 0.0,
            y_offset: 0.0,
            advance,
        }
    }

    fn font() -> Font {
        let mut font = Font::new(ResourceHeader::new(1));
        font.apply_description(FontDescription {
            atlas: PathBuf::from("atlas.png"),
            atlas_width: 64,
            atlas_height: 64,
            size: 16,
            line_height: 12.0,
            glyphs: vec![glyph('a', 9.0), glyph('b', 9.0), glyph(' ', 4.0)],
        });
        font
    }

    #[test]
    fn test_size_is_clamped() {
        let mut font = font();
        font.set_size(2);
        assert_eq!(font.size(), MIN_FONT_SIZE);
        font.set_size(400);
        assert_eq!(font.size(), MAX_FONT_SIZE);
    }

    #[test]
    fn test_one_quad_per_known_glyph() {
        let device = HeadlessDevice::new();
        let mut font = font();
        font.set_text("ab?a", Vec2::zeros(), &device).unwrap();
        // '?' has no glyph
        assert_eq!(font.index_count(), 18);
        assert!(font.buffers().is_some());
    }

    #[test]
    fn test_newline_and_tab_move_the_pen() {
        let mut font = font();
        font.layout("a\n\tb", Vec2::zeros());

        let first = font.vertices[0].position;
        let second = font.vertices[4].position;
        assert_eq!(first[0], 0.0);
        // Tab = 8 spaces of 4 pixels, one line down
        assert_eq!(second[0], 32.0);
        assert_eq!(second[1], -12.0);
    }

    #[test]
    fn test_same_text_is_not_uploaded_twice() {
        let device = HeadlessDevice::new();
        let mut font = font();
        font.set_text("ab", Vec2::zeros(), &device).unwrap();
        let created = device.calls().len();
        font.set_text("ab", Vec2::zeros(), &device).unwrap();
        assert_eq!(device.calls().len(), created);
    }
}
