//! Deferred renderer front end
//!
//! Collects the scene's renderables, groups them by shader variation and
//! issues one indexed draw per renderable into the G-buffer. Materials whose
//! variation failed to build are not drawn at all. Debug overlays selected by
//! [`RenderFlags`] are collected as a world-space line list for the backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bitflags::bitflags;

use super::device::{BufferKind, GraphicsDevice, RenderTarget};
use super::shader_variation::{PerObjectBuffer, ShaderState, ShaderVariation};
use crate::foundation::math::{BoundingBox, Mat4, Vec3, Vec4};
use crate::resource::{Material, Model, ResourceHandle};
use crate::scene::components::{Collider, Light, Line, LineRenderer};
use crate::scene::{EntityId, Scene};

/// Grid lines run from `-GRID_HALF_EXTENT` to `GRID_HALF_EXTENT` on both axes
const GRID_HALF_EXTENT: i16 = 10;

/// Half length of the cross drawn at each light
const LIGHT_GIZMO_SIZE: f32 = 0.25;

bitflags! {
    /// Optional overlays and debug passes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderFlags: u32 {
        /// Reference grid on the ground plane
        const SCENE_GRID = 1 << 0;
        /// Light gizmos
        const LIGHTS = 1 << 1;
        /// Physics shapes
        const PHYSICS = 1 << 2;
        /// Bounding boxes of renderables
        const AABB = 1 << 3;
        /// Per-frame stats in the log
        const PERFORMANCE_METRICS = 1 << 4;
    }
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self::SCENE_GRID | Self::LIGHTS
    }
}

/// What the last frame did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Distinct shader variations bound
    pub batches: usize,
    /// Indexed draws issued
    pub draw_calls: usize,
    /// Renderables left out (no material, no geometry, variation not built)
    pub skipped: usize,
    /// Triangles submitted
    pub triangles: usize,
    /// Debug overlay lines queued
    pub overlay_lines: usize,
}

struct DrawItem {
    entity: EntityId,
    world: Mat4,
    material: ResourceHandle<Material>,
    model: ResourceHandle<Model>,
    index_offset: u32,
    index_count: u32,
    vertex_offset: u32,
}

struct Batch {
    shader: ResourceHandle<ShaderVariation>,
    items: Vec<DrawItem>,
}

/// Draws the scene into the G-buffer
pub struct Renderer {
    device: Arc<dyn GraphicsDevice>,
    flags: RenderFlags,
    previous_mvp: HashMap<EntityId, Mat4>,
    overlay: LineRenderer,
    stats: RenderStats,
}

impl Renderer {
    /// Create a renderer drawing through `device`
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        log::info!("Renderer initialized");
        Self {
            device,
            flags: RenderFlags::default(),
            previous_mvp: HashMap::new(),
            overlay: LineRenderer::default(),
            stats: RenderStats::default(),
        }
    }

    /// Active overlay flags
    pub const fn flags(&self) -> RenderFlags {
        self.flags
    }

    /// Turn overlays on or off
    pub fn set_flag(&mut self, flag: RenderFlags, enabled: bool) {
        self.flags.set(flag, enabled);
    }

    /// Stats of the last frame
    pub const fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Debug lines of the last frame, in world space
    pub fn overlay(&self) -> &[Line] {
        self.overlay.lines()
    }

    /// Draw every renderable of `scene` from its main camera
    pub fn render(&mut self, scene: &Scene) -> RenderStats {
        let mut stats = RenderStats::default();
        self.overlay.clear();
        self.device.set_render_target(RenderTarget::GBuffer);

        let Some((camera_entity, camera)) = scene.main_camera() else {
            log::debug!("No camera in the scene, nothing to render");
            self.stats = stats;
            return stats;
        };
        let view = camera_entity.world_matrix().try_inverse().unwrap_or_else(Mat4::identity);
        let view_projection = camera.projection_matrix() * view;

        let batches = Self::collect_batches(scene, &mut stats);
        let mut drawn = HashMap::with_capacity(self.previous_mvp.len());

        for batch in batches.into_values() {
            let shader = batch.shader.read();
            let Some(program) = shader.program() else {
                stats.skipped += batch.items.len();
                continue;
            };
            self.device.bind_shader(program);
            stats.batches += 1;

            for item in batch.items {
                let mvp = view_projection * item.world;
                let previous = self.previous_mvp.get(&item.entity).copied().unwrap_or(mvp);
                drawn.insert(item.entity, mvp);

                if self.draw(&shader, &item, &mvp, &previous) {
                    stats.draw_calls += 1;
                    stats.triangles += item.index_count as usize / 3;
                } else {
                    stats.skipped += 1;
                }
            }
        }

        self.previous_mvp = drawn;
        self.collect_overlay(scene);
        stats.overlay_lines = self.overlay.lines().len();
        if self.flags.contains(RenderFlags::PERFORMANCE_METRICS) {
            log::info!(
                "Frame: {} batches, {} draws, {} triangles, {} skipped",
                stats.batches,
                stats.draw_calls,
                stats.triangles,
                stats.skipped
            );
        }
        self.stats = stats;
        stats
    }

    fn collect_overlay(&mut self, scene: &Scene) {
        if self.flags.contains(RenderFlags::SCENE_GRID) {
            let color = Vec4::new(0.5, 0.5, 0.5, 1.0);
            let half = f32::from(GRID_HALF_EXTENT);
            for step in -GRID_HALF_EXTENT..=GRID_HALF_EXTENT {
                let offset = f32::from(step);
                self.overlay
                    .add_line(Vec3::new(offset, 0.0, -half), Vec3::new(offset, 0.0, half), color);
                self.overlay
                    .add_line(Vec3::new(-half, 0.0, offset), Vec3::new(half, 0.0, offset), color);
            }
        }

        for entity in scene.entities().filter(|entity| entity.is_active()) {
            let world = entity.world_matrix();
            if self.flags.contains(RenderFlags::LIGHTS) {
                if let Some(light) = entity.get_component::<Light>() {
                    let origin = transform_point(world, &Vec3::zeros());
                    for axis in [Vec3::x(), Vec3::y(), Vec3::z()] {
                        let reach = axis * LIGHT_GIZMO_SIZE;
                        self.overlay.add_line(origin - reach, origin + reach, light.color);
                    }
                }
            }
            if self.flags.contains(RenderFlags::PHYSICS) {
                if let Some(collider) = entity.get_component::<Collider>() {
                    let local = BoundingBox {
                        min: collider.center - collider.extents,
                        max: collider.center + collider.extents,
                    };
                    let bounds = world_bounds(&local, world);
                    self.overlay.add_box(bounds.min, bounds.max, Vec4::new(0.0, 1.0, 0.0, 1.0));
                }
            }
        }

        if self.flags.contains(RenderFlags::AABB) {
            for entity in scene.renderables().iter().filter_map(|id| scene.entity(*id)) {
                let Some(renderable) = entity.renderable() else {
                    continue;
                };
                if renderable.bounding_box().is_valid() {
                    let bounds = world_bounds(renderable.bounding_box(), entity.world_matrix());
                    self.overlay.add_box(bounds.min, bounds.max, Vec4::new(1.0, 1.0, 0.0, 1.0));
                }
            }
        }
    }

    fn collect_batches(scene: &Scene, stats: &mut RenderStats) -> BTreeMap<u32, Batch> {
        let mut batches: BTreeMap<u32, Batch> = BTreeMap::new();
        for id in scene.renderables() {
            let Some(entity) = scene.entity(*id) else {
                continue;
            };
            let Some(renderable) = entity.renderable() else {
                continue;
            };
            let (Some(material), Some(model)) = (renderable.material(), renderable.model()) else {
                stats.skipped += 1;
                continue;
            };
            let Some(shader) = material.read().shader().cloned() else {
                stats.skipped += 1;
                continue;
            };
            let (state, flags) = {
                let variation = shader.read();
                (variation.state(), variation.flags())
            };
            if state != ShaderState::Built {
                log::trace!("Entity {id}: shader variation {flags:?} is {state:?}, not drawn");
                stats.skipped += 1;
                continue;
            }

            batches
                .entry(flags.bits())
                .or_insert_with(|| Batch {
                    shader: shader.clone(),
                    items: Vec::new(),
                })
                .items
                .push(DrawItem {
                    entity: *id,
                    world: *entity.world_matrix(),
                    material: material.clone(),
                    model: model.clone(),
                    index_offset: renderable.index_offset(),
                    index_count: renderable.index_count(),
                    vertex_offset: renderable.vertex_offset(),
                });
        }
        batches
    }

    fn draw(&self, shader: &ShaderVariation, item: &DrawItem, mvp: &Mat4, previous: &Mat4) -> bool {
        let Some((vertex_buffer, index_buffer)) = item.model.read().buffers() else {
            return false;
        };
        let material = item.material.read();

        let constants = PerObjectBuffer::new(&material, &item.world, mvp, previous);
        if let Err(e) = shader.update_per_object_buffer(self.device.as_ref(), &constants) {
            log::error!("Entity {}: per-object buffer update failed: {e}", item.entity);
            return false;
        }
        if let Some(buffer) = shader.per_object_buffer() {
            self.device.bind_buffer(BufferKind::Constant, buffer, 0);
        }

        for (kind, _) in material.textures() {
            let gpu_texture = material.texture(kind).and_then(|texture| texture.read().gpu_texture());
            if let Some(gpu_texture) = gpu_texture {
                self.device.bind_texture(kind.as_u32(), gpu_texture);
            }
        }

        self.device.bind_buffer(BufferKind::Vertex, vertex_buffer, 0);
        self.device.bind_buffer(BufferKind::Index, index_buffer, 0);
        self.device
            .draw_indexed(item.index_count, item.index_offset, item.vertex_offset);
        true
    }
}

fn transform_point(matrix: &Mat4, point: &Vec3) -> Vec3 {
    (matrix * Vec4::new(point.x, point.y, point.z, 1.0)).xyz()
}

/// Axis-aligned box around `local` once moved by `world`
fn world_bounds(local: &BoundingBox, world: &Mat4) -> BoundingBox {
    let corners: Vec<Vec3> = (0..8u8)
        .map(|corner| {
            let pick = |bit: u8, min: f32, max: f32| if corner & bit == 0 { min } else { max };
            let point = Vec3::new(
                pick(1, local.min.x, local.max.x),
                pick(2, local.min.y, local.max.y),
                pick(4, local.min.z, local.max.z),
            );
            transform_point(world, &point)
        })
        .collect();
    BoundingBox::from_points(&corners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSender;
    use crate::foundation::ids::IdGenerator;
    use crate::foundation::math::{BoundingBox, Vec3};
    use crate::rendering::{DeviceCall, HeadlessDevice, ShaderVariationCache, Vertex};
    use crate::resource::{handle, ResourceCache, ResourceHeader};
    use crate::scene::components::{Camera, Collider, Light, Renderable};

    struct Fixture {
        device: Arc<HeadlessDevice>,
        shaders: ShaderVariationCache,
        scene: Scene,
        model: ResourceHandle<Model>,
    }

    fn fixture() -> Fixture {
        let device = Arc::new(HeadlessDevice::new());
        let ids = Arc::new(IdGenerator::new());
        let shaders = ShaderVariationCache::new(
            Arc::new(ResourceCache::new()),
            device.clone(),
            ids.clone(),
            "Data/Shaders/GBuffer.shader",
        );

        let mut model = Model::new(ResourceHeader::new(ids.next_id()).with_name("quad"));
        let vertices = [
            Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0], [0.0, 0.0, 1.0]),
            Vertex::new([1.0, 0.0, 0.0], [1.0, 0.0], [0.0, 0.0, 1.0]),
            Vertex::new([1.0, 1.0, 0.0], [1.0, 1.0], [0.0, 0.0, 1.0]),
        ];
        model.geometry_append(&[0, 1, 2], &vertices);
        model.geometry_update(device.as_ref()).unwrap();

        let mut scene = Scene::new(EventSender::detached(), ids);
        let camera = scene.create_entity("camera");
        scene.entity_mut(camera).unwrap().add_component::<Camera>();
        scene.entity_mut(camera).unwrap().transform_mut().unwrap().position = Vec3::new(0.0, 0.0, 5.0);

        Fixture {
            device,
            shaders,
            scene,
            model: handle(model),
        }
    }

    fn add_renderable(fixture: &mut Fixture, material: &ResourceHandle<Material>) -> EntityId {
        let id = fixture.scene.create_entity("mesh");
        let entity = fixture.scene.entity_mut(id).unwrap();
        entity.add_component::<Renderable>();
        let renderable = entity.get_component_mut::<Renderable>().unwrap();
        renderable.geometry_set("quad", 0, 3, 0, 3, BoundingBox::default(), &fixture.model);
        renderable.material_set(material);
        id
    }

    fn material(fixture: &Fixture) -> ResourceHandle<Material> {
        let mut material = Material::new(ResourceHeader::new(100).with_name("plain"));
        material.acquire_shader(&fixture.shaders);
        handle(material)
    }

    #[test]
    fn test_same_variation_shares_one_batch() {
        let mut fixture = fixture();
        let material = material(&fixture);
        add_renderable(&mut fixture, &material);
        add_renderable(&mut fixture, &material);
        fixture.scene.resolve();

        let stats = Renderer::new(fixture.device.clone()).render(&fixture.scene);
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.triangles, 2);
        assert_eq!(fixture.device.draw_count(), 2);
        assert!(fixture
            .device
            .calls()
            .contains(&DeviceCall::SetRenderTarget(RenderTarget::GBuffer)));
    }

    #[test]
    fn test_failed_variation_draws_nothing() {
        let mut fixture = fixture();
        fixture.device.set_fail_compilation(true);
        let material = material(&fixture);
        add_renderable(&mut fixture, &material);
        fixture.scene.resolve();

        let stats = Renderer::new(fixture.device.clone()).render(&fixture.scene);
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(fixture.device.draw_count(), 0);
    }

    #[test]
    fn test_no_camera_no_draws() {
        let mut fixture = fixture();
        let material = material(&fixture);
        add_renderable(&mut fixture, &material);
        let camera = fixture.scene.entity_by_name("camera").unwrap().id();
        fixture.scene.remove_entity(camera);
        fixture.scene.resolve();

        let stats = Renderer::new(fixture.device.clone()).render(&fixture.scene);
        assert_eq!(stats, RenderStats::default());
    }

    #[test]
    fn test_previous_mvp_comes_from_last_frame() {
        let mut fixture = fixture();
        let material = material(&fixture);
        add_renderable(&mut fixture, &material);
        fixture.scene.resolve();

        let mut renderer = Renderer::new(fixture.device.clone());
        let buffer = material.read().shader().unwrap().read().per_object_buffer().unwrap();
        let read_constants = |device: &HeadlessDevice| -> PerObjectBuffer {
            bytemuck::pod_read_unaligned(&device.buffer_contents(buffer).unwrap())
        };

        renderer.render(&fixture.scene);
        let first = read_constants(&fixture.device);
        assert_eq!(first.mvp_previous, first.mvp_current);

        let camera = fixture.scene.entity_by_name("camera").unwrap().id();
        fixture.scene.entity_mut(camera).unwrap().transform_mut().unwrap().position = Vec3::new(0.0, 1.0, 5.0);
        fixture.scene.resolve();
        renderer.render(&fixture.scene);
        let second = read_constants(&fixture.device);
        assert_eq!(second.mvp_previous, first.mvp_current);
        assert_ne!(second.mvp_current, first.mvp_current);
    }

    #[test]
    fn test_overlay_follows_flags() {
        let mut fixture = fixture();
        let material = material(&fixture);
        let mesh = add_renderable(&mut fixture, &material);
        let bounds = BoundingBox {
            min: Vec3::zeros(),
            max: Vec3::new(1.0, 1.0, 0.0),
        };
        let entity = fixture.scene.entity_mut(mesh).unwrap();
        entity.transform_mut().unwrap().position = Vec3::new(2.0, 0.0, 0.0);
        entity
            .get_component_mut::<Renderable>()
            .unwrap()
            .geometry_set("quad", 0, 3, 0, 3, bounds, &fixture.model);
        entity.add_component::<Collider>();
        let lamp = fixture.scene.create_entity("lamp");
        fixture.scene.entity_mut(lamp).unwrap().add_component::<Light>();
        fixture.scene.resolve();

        let grid_lines = 2 * (2 * usize::try_from(GRID_HALF_EXTENT).unwrap() + 1);
        let mut renderer = Renderer::new(fixture.device.clone());
        assert_eq!(renderer.render(&fixture.scene).overlay_lines, grid_lines + 3);

        renderer.set_flag(RenderFlags::SCENE_GRID | RenderFlags::LIGHTS, false);
        renderer.set_flag(RenderFlags::AABB, true);
        assert_eq!(renderer.render(&fixture.scene).overlay_lines, 12);
        let xs: Vec<f32> = renderer.overlay().iter().flat_map(|line| [line.from.x, line.to.x]).collect();
        assert!(xs.iter().all(|x| (2.0..=3.0).contains(x)));

        renderer.set_flag(RenderFlags::AABB, false);
        renderer.set_flag(RenderFlags::PHYSICS, true);
        assert_eq!(renderer.render(&fixture.scene).overlay_lines, 12);

        renderer.set_flag(RenderFlags::all(), false);
        let stats = renderer.render(&fixture.scene);
        assert_eq!(stats.overlay_lines, 0);
        assert_eq!(stats.draw_calls, 1);
        assert!(renderer.overlay().is_empty());
    }
}
