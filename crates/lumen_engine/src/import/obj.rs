//! Wavefront OBJ importer with MTL material libraries
//!
//! `o`/`g` statements become child nodes of a root named after the file,
//! `usemtl` starts a new mesh, and polygons are fan-triangulated. Missing
//! normals are generated from face orientation; tangents are always derived
//! from texture coordinates.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{
    ImportError, ImportedMaterial, ImportedMesh, ImportedNode, ImportedScene, ImportedTextureSlot, Importer,
    ProgressReport,
};
use crate::foundation::math::Vec3;
use crate::rendering::Vertex;
use crate::resource::name_from_path;

const DEFAULT_NORMAL: [f32; 3] = [0.0, 1.0, 0.0];

/// Reads `.obj` files and the `.mtl` libraries they reference
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjImporter;

impl ObjImporter {
    /// Create the importer
    pub const fn new() -> Self {
        Self
    }
}

impl Importer for ObjImporter {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("obj"))
    }

    fn read(&self, path: &Path, progress: &ProgressReport) -> Result<ImportedScene, ImportError> {
        if !self.supports(path) {
            return Err(ImportError::Unsupported(path.to_path_buf()));
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        progress.update_file_read(&file_name, 0, 1);
        let reader = BufReader::new(File::open(path)?);
        let mut parser = ObjParser::new(path);
        for (number, line) in reader.lines().enumerate() {
            parser.parse_line(&line?, number + 1)?;
        }
        progress.update_file_read(&file_name, 1, 1);

        progress.update_post_process(&file_name, 0, 1);
        let scene = parser.finish()?;
        progress.update_post_process(&file_name, 1, 1);

        log::debug!(
            "Read {} meshes and {} materials from {}",
            scene.meshes.len(),
            scene.materials.len(),
            path.display()
        );
        Ok(scene)
    }
}

/// Mesh under construction; corners are deduplicated per mesh
#[derive(Default)]
struct MeshBuilder {
    vertices: Vec<Vertex>,
    has_normal: Vec<bool>,
    faces: Vec<Vec<u32>>,
    corners: HashMap<(usize, Option<usize>, Option<usize>), u32>,
}

impl MeshBuilder {
    fn corner(&mut self, key: (usize, Option<usize>, Option<usize>), vertex: Vertex, has_normal: bool) -> u32 {
        if let Some(&index) = self.corners.get(&key) {
            return index;
        }
        let index = u32::try_from(self.vertices.len()).unwrap_or(u32::MAX);
        self.vertices.push(vertex);
        self.has_normal.push(has_normal);
        self.corners.insert(key, index);
        index
    }

    fn build(mut self, name: String, material: Option<usize>) -> ImportedMesh {
        generate_missing_normals(&mut self.vertices, &self.has_normal, &self.faces);
        compute_tangents(&mut self.vertices, &self.faces);
        ImportedMesh {
            name,
            vertices: self.vertices,
            faces: self.faces,
            material,
        }
    }
}

struct ObjParser<'a> {
    path: &'a Path,
    positions: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
    materials: Vec<ImportedMaterial>,
    meshes: Vec<ImportedMesh>,
    root_meshes: Vec<usize>,
    groups: Vec<ImportedNode>,
    current: MeshBuilder,
    material: Option<usize>,
}

impl<'a> ObjParser<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            positions: Vec::new(),
            uvs: Vec::new(),
            normals: Vec::new(),
            materials: Vec::new(),
            meshes: Vec::new(),
            root_meshes: Vec::new(),
            groups: Vec::new(),
            current: MeshBuilder::default(),
            material: None,
        }
    }

    fn error(&self, line: usize, message: impl Into<String>) -> ImportError {
        ImportError::Parse {
            path: self.path.to_path_buf(),
            line,
            message: message.into(),
        }
    }

    fn parse_line(&mut self, line: &str, number: usize) -> Result<(), ImportError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&keyword, args)) = parts.split_first() else {
            return Ok(());
        };

        match keyword {
            "v" => {
                let position = parse_floats::<3>(args).ok_or_else(|| self.error(number, "invalid vertex position"))?;
                self.positions.push(position);
            }
            "vn" => {
                let normal = parse_floats::<3>(args).ok_or_else(|| self.error(number, "invalid vertex normal"))?;
                self.normals.push(normal);
            }
            "vt" => {
                let uv = parse_floats::<2>(args).ok_or_else(|| self.error(number, "invalid texture coordinate"))?;
                self.uvs.push(uv);
            }
            "f" => self.parse_face(args, number)?,
            "o" | "g" => {
                let name = if args.is_empty() { "default".to_string() } else { args.join(" ") };
                self.flush_mesh();
                if !self.groups.last().is_some_and(|group| group.name == name) {
                    self.groups.push(ImportedNode::new(name));
                }
            }
            "usemtl" => {
                let name = args.join(" ");
                self.flush_mesh();
                self.material = Some(self.material_index(&name));
            }
            "mtllib" => {
                let library = self.path.parent().unwrap_or_else(|| Path::new("")).join(args.join(" "));
                match parse_mtl(&library) {
                    Ok(materials) => self.merge_materials(materials),
                    Err(ImportError::Io(e)) => {
                        log::warn!("Material library {} not readable: {e}", library.display());
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn parse_face(&mut self, args: &[&str], number: usize) -> Result<(), ImportError> {
        let mut corners = Vec::with_capacity(args.len());
        for corner in args {
            let mut fields = corner.split('/');
            let position = fields
                .next()
                .ok_or_else(|| self.error(number, "empty face corner"))
                .and_then(|token| self.resolve(token, self.positions.len(), number))?;
            let uv = match fields.next() {
                Some(token) if !token.is_empty() => Some(self.resolve(token, self.uvs.len(), number)?),
                _ => None,
            };
            let normal = match fields.next() {
                Some(token) if !token.is_empty() => Some(self.resolve(token, self.normals.len(), number)?),
                _ => None,
            };

            let vertex = Vertex::new(
                self.positions[position],
                uv.map_or([0.0, 0.0], |index| self.uvs[index]),
                normal.map_or(DEFAULT_NORMAL, |index| self.normals[index]),
            );
            corners.push(self.current.corner((position, uv, normal), vertex, normal.is_some()));
        }

        // Points and lines are kept as-is; consumers drop them
        if corners.len() < 3 {
            self.current.faces.push(corners);
            return Ok(());
        }
        for i in 1..corners.len() - 1 {
            self.current.faces.push(vec![corners[0], corners[i], corners[i + 1]]);
        }
        Ok(())
    }

    /// 1-based, or negative relative to the end of the list
    fn resolve(&self, token: &str, count: usize, number: usize) -> Result<usize, ImportError> {
        let value: i64 = token
            .parse()
            .map_err(|_| self.error(number, format!("invalid index '{token}'")))?;
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        let index = match value {
            v if v > 0 => v - 1,
            v if v < 0 => count + v,
            _ => return Err(self.error(number, "index 0 is not valid")),
        };
        if (0..count).contains(&index) {
            usize::try_from(index).map_err(|_| self.error(number, "index out of range"))
        } else {
            Err(self.error(number, format!("index {value} out of range")))
        }
    }

    fn material_index(&mut self, name: &str) -> usize {
        if let Some(index) = self.materials.iter().position(|m| m.name == name) {
            return index;
        }
        log::warn!("Material '{name}' is not defined in any material library");
        self.materials.push(ImportedMaterial {
            name: name.to_string(),
            ..ImportedMaterial::default()
        });
        self.materials.len() - 1
    }

    fn merge_materials(&mut self, materials: Vec<ImportedMaterial>) {
        for material in materials {
            match self.materials.iter_mut().find(|m| m.name == material.name) {
                Some(existing) => *existing = material,
                None => self.materials.push(material),
            }
        }
    }

    fn flush_mesh(&mut self) {
        let builder = std::mem::take(&mut self.current);
        if builder.faces.is_empty() {
            return;
        }

        let base = match self.groups.last() {
            Some(group) => group.name.clone(),
            _ => name_from_path(self.path),
        };
        let name = match self.material.and_then(|index| self.materials.get(index)) {
            Some(material) => format!("{base}_{}", material.name),
            None => base,
        };

        let index = self.meshes.len();
        self.meshes.push(builder.build(name, self.material));
        match self.groups.last_mut() {
            Some(group) => group.meshes.push(index),
            _ => self.root_meshes.push(index),
        }
    }

    fn finish(mut self) -> Result<ImportedScene, ImportError> {
        self.flush_mesh();
        if self.meshes.is_empty() {
            return Err(ImportError::Empty(self.path.to_path_buf()));
        }

        let mut root = ImportedNode::new(name_from_path(self.path));
        root.meshes = self.root_meshes;
        root.children = self.groups.into_iter().filter(|group| !group.meshes.is_empty()).collect();

        Ok(ImportedScene {
            root,
            meshes: self.meshes,
            materials: self.materials,
            animations: Vec::new(),
        })
    }
}

fn parse_floats<const N: usize>(args: &[&str]) -> Option<[f32; N]> {
    let mut values = [0.0; N];
    for (value, token) in values.iter_mut().zip(args) {
        *value = token.parse().ok()?;
    }
    (args.len() >= N).then_some(values)
}

/// Parse an MTL material library
fn parse_mtl(path: &Path) -> Result<Vec<ImportedMaterial>, ImportError> {
    let reader = BufReader::new(File::open(path)?);
    let mut materials: Vec<ImportedMaterial> = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&keyword, args)) = parts.split_first() else {
            continue;
        };
        let error = |message: &str| ImportError::Parse {
            path: path.to_path_buf(),
            line: number + 1,
            message: message.to_string(),
        };

        if keyword == "newmtl" {
            materials.push(ImportedMaterial {
                name: args.join(" "),
                ..ImportedMaterial::default()
            });
            continue;
        }
        let Some(material) = materials.last_mut() else {
            continue;
        };

        match keyword {
            "Kd" => {
                let [r, g, b] = parse_floats::<3>(args).ok_or_else(|| error("invalid diffuse color"))?;
                material.diffuse_color.x = r;
                material.diffuse_color.y = g;
                material.diffuse_color.z = b;
            }
            "d" => {
                let [d] = parse_floats::<1>(args).ok_or_else(|| error("invalid dissolve"))?;
                material.opacity = d.clamp(0.0, 1.0);
            }
            "Tr" => {
                let [tr] = parse_floats::<1>(args).ok_or_else(|| error("invalid transparency"))?;
                material.opacity = (1.0 - tr).clamp(0.0, 1.0);
            }
            _ => {
                if let Some(slot) = texture_slot(keyword) {
                    let texture = texture_path(args).ok_or_else(|| error("missing texture path"))?;
                    material.textures.retain(|(existing, _)| *existing != slot);
                    material.textures.push((slot, texture));
                }
            }
        }
    }

    Ok(materials)
}

fn texture_slot(keyword: &str) -> Option<ImportedTextureSlot> {
    match keyword {
        "map_Kd" => Some(ImportedTextureSlot::Diffuse),
        "map_Ns" => Some(ImportedTextureSlot::Shininess),
        "map_Ka" => Some(ImportedTextureSlot::Ambient),
        "map_Bump" | "map_bump" | "bump" | "norm" => Some(ImportedTextureSlot::Normals),
        "map_Ke" => Some(ImportedTextureSlot::Emissive),
        "disp" => Some(ImportedTextureSlot::Height),
        "map_d" => Some(ImportedTextureSlot::Opacity),
        _ => None,
    }
}

/// With options (`-bm 0.5 file.png`) the path is the last token; otherwise
/// the whole remainder, which may contain spaces.
fn texture_path(args: &[&str]) -> Option<String> {
    if args.is_empty() {
        None
    } else if args.iter().any(|arg| arg.starts_with('-')) {
        args.last().map(|path| (*path).to_string())
    } else {
        Some(args.join(" "))
    }
}

fn triangles(faces: &[Vec<u32>]) -> impl Iterator<Item = [usize; 3]> + '_ {
    faces
        .iter()
        .filter(|face| face.len() == 3)
        .map(|face| [face[0] as usize, face[1] as usize, face[2] as usize])
}

fn generate_missing_normals(vertices: &mut [Vertex], has_normal: &[bool], faces: &[Vec<u32>]) {
    if has_normal.iter().all(|&has| has) {
        return;
    }

    let mut accumulated = vec![Vec3::zeros(); vertices.len()];
    for [a, b, c] in triangles(faces) {
        let p0 = Vec3::from(vertices[a].position);
        let face_normal = (Vec3::from(vertices[b].position) - p0).cross(&(Vec3::from(vertices[c].position) - p0));
        for index in [a, b, c] {
            accumulated[index] += face_normal;
        }
    }

    for ((vertex, normal), _) in vertices
        .iter_mut()
        .zip(accumulated)
        .zip(has_normal)
        .filter(|(_, has)| !**has)
    {
        vertex.normal = if normal.norm() > f32::EPSILON {
            normal.normalize().into()
        } else {
            DEFAULT_NORMAL
        };
    }
}

fn compute_tangents(vertices: &mut [Vertex], faces: &[Vec<u32>]) {
    let mut tangents = vec![Vec3::zeros(); vertices.len()];
    let mut bitangents = vec![Vec3::zeros(); vertices.len()];

    for [a, b, c] in triangles(faces) {
        let p0 = Vec3::from(vertices[a].position);
        let edge1 = Vec3::from(vertices[b].position) - p0;
        let edge2 = Vec3::from(vertices[c].position) - p0;
        let [u0, v0] = vertices[a].uv;
        let (du1, dv1) = (vertices[b].uv[0] - u0, vertices[b].uv[1] - v0);
        let (du2, dv2) = (vertices[c].uv[0] - u0, vertices[c].uv[1] - v0);

        let det = du1 * dv2 - du2 * dv1;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (edge1 * dv2 - edge2 * dv1) * r;
        let bitangent = (edge2 * du1 - edge1 * du2) * r;
        for index in [a, b, c] {
            tangents[index] += tangent;
            bitangents[index] += bitangent;
        }
    }

    for ((vertex, tangent), bitangent) in vertices.iter_mut().zip(tangents).zip(bitangents) {
        let normal = Vec3::from(vertex.normal);
        let tangent = tangent - normal * normal.dot(&tangent);
        if tangent.norm() <= f32::EPSILON {
            continue;
        }
        let tangent = tangent.normalize();
        let handedness = if normal.cross(&tangent).dot(&bitangent) < 0.0 { -1.0 } else { 1.0 };
        vertex.tangent = tangent.into();
        vertex.bitangent = (normal.cross(&tangent) * handedness).into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn read(path: &Path) -> Result<ImportedScene, ImportError> {
        ObjImporter::new().read(path, &ProgressReport::new())
    }

    const QUAD: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn test_quad_is_fan_triangulated() {
        let dir = TempDir::new().unwrap();
        let scene = read(&write(&dir, "quad.obj", QUAD)).unwrap();

        assert_eq!(scene.root.name, "quad");
        assert_eq!(scene.root.meshes, vec![0]);
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.faces, vec![vec![0, 1, 2], vec![0, 2, 3]]);
        assert_eq!(mesh.indices().len(), 6);

        let vertex = &mesh.vertices[0];
        assert_relative_eq!(Vec3::from(vertex.tangent), Vec3::x(), epsilon = 1e-5);
        assert_relative_eq!(Vec3::from(vertex.bitangent), Vec3::y(), epsilon = 1e-5);
    }

    #[test]
    fn test_negative_indices_and_generated_normals() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "tri.obj", "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n");
        let scene = read(&path).unwrap();

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.faces, vec![vec![0, 1, 2]]);
        for vertex in &mesh.vertices {
            assert_relative_eq!(Vec3::from(vertex.normal), Vec3::z(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_groups_and_materials_split_meshes() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "ship.mtl",
            "\
newmtl hull
Kd 0.5 0.25 1.0
d 0.5
map_Kd textures\\hull diffuse.png
map_Bump -bm 0.3 hull_n.png

newmtl glass
Tr 0.75
",
        );
        let path = write(
            &dir,
            "ship.obj",
            "\
mtllib ship.mtl
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
o body
usemtl hull
f 1 2 3
usemtl glass
f 1 3 4
o wing
usemtl hull
f 2 3 4
",
        );
        let scene = read(&path).unwrap();

        assert!(scene.root.meshes.is_empty());
        let names: Vec<&str> = scene.root.children.iter().map(|node| node.name.as_str()).collect();
        assert_eq!(names, ["body", "wing"]);
        assert_eq!(scene.root.children[0].meshes, vec![0, 1]);
        assert_eq!(scene.root.count(), 3);
        assert_eq!(scene.meshes[1].name, "body_glass");

        let hull = &scene.materials[scene.meshes[0].material.unwrap()];
        assert_eq!(hull.name, "hull");
        assert_relative_eq!(hull.diffuse_color.x, 0.5);
        assert_relative_eq!(hull.opacity, 0.5);
        assert_eq!(hull.texture(ImportedTextureSlot::Diffuse), Some("textures\\hull diffuse.png"));
        assert_eq!(hull.texture(ImportedTextureSlot::Normals), Some("hull_n.png"));

        let glass = &scene.materials[scene.meshes[1].material.unwrap()];
        assert_relative_eq!(glass.opacity, 0.25);
    }

    #[test]
    fn test_missing_library_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.obj", "mtllib gone.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl steel\nf 1 2 3\n");
        let scene = read(&path).unwrap();
        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.materials[0].name, "steel");
    }

    #[test]
    fn test_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read(&write(&dir, "empty.obj", "# nothing\nv 0 0 0\n")),
            Err(ImportError::Empty(_))
        ));
        assert!(matches!(
            read(&write(&dir, "bad.obj", "v 0 0 0\nf 1 2 9\n")),
            Err(ImportError::Parse { line: 2, .. })
        ));
        assert!(matches!(
            read(&write(&dir, "model.fbx", "")),
            Err(ImportError::Unsupported(_))
        ));
    }

    #[test]
    fn test_progress_reports_post_processing() {
        let dir = TempDir::new().unwrap();
        let progress = ProgressReport::new();
        ObjImporter::new()
            .read(&write(&dir, "quad.obj", QUAD), &progress)
            .unwrap();
        assert_eq!(progress.status(), "Post-Processing \"quad.obj\"");
        assert_relative_eq!(progress.percentage(), 1.0);
    }
}
