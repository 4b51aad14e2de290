//! Model import: external scene descriptions turned into entities and geometry
//!
//! An [`Importer`] reads a file into an [`ImportedScene`]; the
//! [`ModelImporter`] walks that description, appending every mesh into one
//! shared [`Model`](crate::resource::Model) and creating one entity per node.

mod model_importer;
mod obj;
mod progress;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use model_importer::ModelImporter;
pub use obj::ObjImporter;
pub use progress::ProgressReport;

use crate::foundation::math::{Mat4, Vec4};
use crate::rendering::{DeviceError, Vertex};
use crate::resource::{AnimationChannel, ResourceError};
use crate::scene::SceneError;

/// Import errors
#[derive(Error, Debug)]
pub enum ImportError {
    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file content could not be understood
    #[error("{path}:{line}: {message}")]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },

    /// No importer handles this file type
    #[error("Unsupported model format: {0}")]
    Unsupported(PathBuf),

    /// Another import is still running on this importer
    #[error("An import is already in progress")]
    Busy,

    /// The file holds no geometry
    #[error("No geometry in {0}")]
    Empty(PathBuf),

    /// A resource could not be created
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// The scene rejected an operation
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Uploading geometry failed
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

/// Texture slot conventions of external material descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportedTextureSlot {
    /// Diffuse color map
    Diffuse,
    /// Specular exponent map
    Shininess,
    /// Ambient color map
    Ambient,
    /// Normal or bump map
    Normals,
    /// Baked lighting / occlusion
    Lightmap,
    /// Emissive map
    Emissive,
    /// Displacement map
    Height,
    /// Opacity map
    Opacity,
}

/// Material as described by the source file
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMaterial {
    /// Material name
    pub name: String,
    /// Rendered without back-face culling
    pub two_sided: bool,
    /// Diffuse RGBA color
    pub diffuse_color: Vec4,
    /// Opacity in 0..=1
    pub opacity: f32,
    /// Texture paths as written in the source, per slot
    pub textures: Vec<(ImportedTextureSlot, String)>,
}

impl Default for ImportedMaterial {
    fn default() -> Self {
        Self {
            name: String::new(),
            two_sided: false,
            diffuse_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            opacity: 1.0,
            textures: Vec::new(),
        }
    }
}

impl ImportedMaterial {
    /// Path bound to `slot`, if any
    pub fn texture(&self, slot: ImportedTextureSlot) -> Option<&str> {
        self.textures
            .iter()
            .find(|(candidate, _)| *candidate == slot)
            .map(|(_, path)| path.as_str())
    }
}

/// Mesh geometry with a material reference
#[derive(Debug, Clone, Default)]
pub struct ImportedMesh {
    /// Mesh name
    pub name: String,
    /// Vertices with position, uv, normal, tangent and bitangent
    pub vertices: Vec<Vertex>,
    /// Polygons as vertex index lists
    pub faces: Vec<Vec<u32>>,
    /// Index into [`ImportedScene::materials`]
    pub material: Option<usize>,
}

impl ImportedMesh {
    /// Triangle list indices
    ///
    /// Polygons are fanned around their first corner; points and lines are
    /// dropped.
    pub fn indices(&self) -> Vec<u32> {
        self.faces
            .iter()
            .filter(|face| face.len() >= 3)
            .flat_map(|face| face.windows(2).skip(1).flat_map(move |edge| [face[0], edge[0], edge[1]]))
            .collect()
    }
}

/// Node of the source hierarchy
#[derive(Debug, Clone)]
pub struct ImportedNode {
    /// Node name
    pub name: String,
    /// Transform relative to the parent node
    pub transform: Mat4,
    /// Indices into [`ImportedScene::meshes`]
    pub meshes: Vec<usize>,
    /// Child nodes
    pub children: Vec<ImportedNode>,
}

impl ImportedNode {
    /// Node with an identity transform and nothing attached
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::identity(),
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, this one included
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }
}

/// Keyframe animation as described by the source
#[derive(Debug, Clone, Default)]
pub struct ImportedAnimation {
    /// Animation name
    pub name: String,
    /// Length in ticks
    pub duration: f32,
    /// Playback rate; zero when the source does not say
    pub ticks_per_second: f32,
    /// Per-node keys
    pub channels: Vec<AnimationChannel>,
}

/// Everything an importer extracted from one file
#[derive(Debug, Clone)]
pub struct ImportedScene {
    /// Root of the node hierarchy
    pub root: ImportedNode,
    /// All meshes, referenced by nodes
    pub meshes: Vec<ImportedMesh>,
    /// All materials, referenced by meshes
    pub materials: Vec<ImportedMaterial>,
    /// Animations
    pub animations: Vec<ImportedAnimation>,
}

/// Reads model files into an [`ImportedScene`]
pub trait Importer: Send + Sync {
    /// Whether `path` looks like a file this importer reads
    fn supports(&self, path: &Path) -> bool;

    /// Read `path`, reporting file read and post-process steps to `progress`
    fn read(&self, path: &Path, progress: &ProgressReport) -> Result<ImportedScene, ImportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygons_become_triangle_fans() {
        let mesh = ImportedMesh {
            faces: vec![vec![0, 1, 2], vec![3, 4, 5, 6], vec![7, 8, 9, 10, 11], vec![12, 13], vec![14]],
            ..ImportedMesh::default()
        };
        assert_eq!(
            mesh.indices(),
            vec![0, 1, 2, 3, 4, 5, 3, 5, 6, 7, 8, 9, 7, 9, 10, 7, 10, 11]
        );
        assert_eq!(mesh.indices().len() % 3, 0);
    }
}
