//! End-to-end checks of the engine core against the headless device

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lumen_engine::events::EventSystem;
use lumen_engine::foundation::ids::IdGenerator;
use lumen_engine::import::{Importer, ModelImporter, ObjImporter, ProgressReport};
use lumen_engine::prelude::*;
use lumen_engine::resource::{handle, ResourceHeader};
use lumen_engine::scene::components::{Collider, Light, RigidBody, Script};
use lumen_engine::threading::Threading;

use approx::assert_relative_eq;

fn manager(data: &Path) -> ResourceManager {
    ResourceManager::new(
        &AssetConfig::default().with_data_dir(data),
        &ShaderConfig::default(),
        Arc::new(HeadlessDevice::new()),
        Arc::new(Threading::new(2)),
    )
}

fn texture(manager: &ResourceManager, name: &str, kind: TextureKind, grayscale: bool) -> ResourceHandle<Texture> {
    let mut texture = Texture::new(ResourceHeader::new(manager.next_id()).with_name(name));
    texture.set_image(1, 1, 4, grayscale, false, vec![vec![255; 4]]);
    texture.set_kind(kind);
    handle(texture)
}

fn material(manager: &ResourceManager, name: &str, kinds: &[TextureKind]) -> ResourceHandle<Material> {
    let mut material = Material::new(ResourceHeader::new(manager.next_id()).with_name(name));
    for kind in kinds {
        let map = texture(manager, &format!("{name}_{kind:?}"), *kind, *kind == TextureKind::Height);
        material.set_texture(Some(&map), manager.shaders());
    }
    material.acquire_shader(manager.shaders());
    handle(material)
}

#[test]
fn unique_components_are_added_once() {
    let events = EventSystem::new();
    let mut scene = Scene::new(events.sender(), Arc::new(IdGenerator::new()));
    let id = scene.create_entity("lamp");
    let entity = scene.entity_mut(id).unwrap();

    let first = entity.add_component::<Light>();
    let second = entity.add_component::<Light>();
    assert_eq!(first, second);
    assert_eq!(entity.get_components::<Light>().len(), 1);

    let a = entity.add_component::<Script>();
    let b = entity.add_component::<Script>();
    assert_ne!(a, b);
    assert_eq!(entity.get_components::<Script>().len(), 2);
}

#[test]
fn materials_with_same_texture_kinds_share_a_variation() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let kinds = [TextureKind::Albedo, TextureKind::Normal];
    let brick = material(&manager, "brick", &kinds);
    let stone = material(&manager, "stone", &kinds);
    let plain = material(&manager, "plain", &[TextureKind::Albedo]);

    let brick_shader = brick.read().shader().cloned().unwrap();
    let stone_shader = stone.read().shader().cloned().unwrap();
    let plain_shader = plain.read().shader().cloned().unwrap();
    assert!(Arc::ptr_eq(&brick_shader, &stone_shader));
    assert!(!Arc::ptr_eq(&brick_shader, &plain_shader));
    assert_eq!(manager.shaders().len(), 2);
}

#[test]
fn shader_flags_depend_only_on_occupied_slots() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());
    let material = material(&manager, "metal", &[TextureKind::Albedo, TextureKind::Metallic]);
    let before = material.read().shader_flags();

    let mut material = material.write();
    material.remove_texture(TextureKind::Metallic, manager.shaders());
    material.remove_texture(TextureKind::Albedo, manager.shaders());
    assert_eq!(material.shader_flags(), ShaderFlags::empty());

    for kind in [TextureKind::Metallic, TextureKind::Albedo] {
        let map = texture(&manager, &format!("again_{kind:?}"), kind, false);
        material.set_texture(Some(&map), manager.shaders());
    }
    assert_eq!(material.shader_flags(), before);
}

#[test]
fn scalar_maps_force_multipliers_to_one() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());
    let material = material(
        &manager,
        "pbr",
        &[
            TextureKind::Roughness,
            TextureKind::Metallic,
            TextureKind::Normal,
            TextureKind::Height,
        ],
    );

    let material = material.read();
    assert!(material.has_texture_of_kind(TextureKind::Height));
    assert_relative_eq!(material.roughness_multiplier, 1.0);
    assert_relative_eq!(material.metallic_multiplier, 1.0);
    assert_relative_eq!(material.normal_multiplier, 1.0);
    assert_relative_eq!(material.height_multiplier, 1.0);
}

#[test]
fn cached_resources_are_found_by_name() {
    let cache = ResourceCache::new();
    let model = handle(Model::new(ResourceHeader::new(77).with_name("tower")));
    cache.add(&model);

    assert!(cache.is_cached::<Model>("tower"));
    let found = cache.get_by_name::<Model>("tower").unwrap();
    assert_eq!(found.read().id(), 77);
    assert!(Arc::ptr_eq(&found, &model));
    assert!(!cache.is_cached::<Material>("tower"));
}

#[test]
fn prefab_round_trip_preserves_the_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let events = EventSystem::new();
    let mut scene = Scene::new(events.sender(), Arc::new(IdGenerator::new()));

    let root = scene.create_entity("crate");
    {
        let entity = scene.entity_mut(root).unwrap();
        entity.add_component::<RigidBody>();
        entity.add_component::<Collider>();
        entity.add_component::<Script>();
        entity.add_component::<Script>();
        entity.set_visible_in_hierarchy(false);
    }
    let lid = scene.create_child(root, "lid").unwrap();
    scene.entity_mut(lid).unwrap().add_component::<Light>();
    scene.create_child(lid, "hinge").unwrap();

    let path = scene.save_as_prefab(root, &dir.path().join("crate")).unwrap();

    let mut loaded_scene = Scene::new(events.sender(), Arc::new(IdGenerator::new()));
    let loaded = loaded_scene.load_prefab(&path, None).unwrap();
    assert_eq!(loaded, root);

    let original_ids = scene.descendants(root);
    assert_eq!(original_ids.len(), 3);
    assert_eq!(loaded_scene.descendants(loaded), original_ids);

    for id in original_ids {
        let before = scene.entity(id).unwrap();
        let after = loaded_scene.entity(id).unwrap();
        assert_eq!(before.name(), after.name());
        assert_eq!(before.is_active(), after.is_active());
        assert_eq!(before.is_visible_in_hierarchy(), after.is_visible_in_hierarchy());
        assert_eq!(before.descriptors(), after.descriptors());
        assert_eq!(before.children(), after.children());
    }
    assert!(loaded_scene.entity(loaded).unwrap().is_prefab());

    // Collider found its rigid body sibling while deserializing
    let entity = loaded_scene.entity(loaded).unwrap();
    let body = entity.descriptors().into_iter().find(|(kind, _)| *kind == ComponentKind::RigidBody);
    let collider = entity.get_component::<Collider>().unwrap();
    assert_eq!(collider.rigid_body(), body.map(|(_, id)| id));
}

/// OBJ with one object of `first` vertices and one of `second` vertices
fn write_two_object_obj(dir: &Path, first: usize, second: usize) -> PathBuf {
    let mut obj = String::new();
    for (offset, (name, count)) in [("first", first), ("second", second)].into_iter().enumerate() {
        let base = offset * first;
        writeln!(obj, "o {name}").unwrap();
        for i in 0..count {
            writeln!(obj, "v {i} {} {offset}", i % 2).unwrap();
        }
        for i in 0..count - 2 {
            writeln!(obj, "f {} {} {}", base + i + 1, base + i + 2, base + i + 3).unwrap();
        }
    }
    let path = dir.join("pair.obj");
    fs::write(&path, obj).unwrap();
    path
}

#[test]
fn meshes_are_appended_to_one_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_two_object_obj(dir.path(), 100, 50);
    let manager = manager(dir.path());
    let events = EventSystem::new();
    let mut scene = Scene::new(events.sender(), Arc::new(IdGenerator::new()));

    let model = handle(Model::new(ResourceHeader::new(manager.next_id()).with_name("pair")));
    let importer = ModelImporter::new(Arc::new(ObjImporter::new()), manager, events.sender());
    importer.load(&model, &path, &mut scene).unwrap();

    let first = scene.entity_by_name("first").unwrap().renderable().unwrap();
    assert_eq!((first.vertex_offset(), first.vertex_count()), (0, 100));
    let second = scene.entity_by_name("second").unwrap().renderable().unwrap();
    assert_eq!(second.vertex_offset(), 100);
    assert_eq!(second.vertex_count(), 50);
    assert_eq!(model.read().vertex_count(), 150);
}

#[test]
fn progress_counts_each_node_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_two_object_obj(dir.path(), 4, 4);

    // The file root plus one node per object
    let nodes = ObjImporter::new()
        .read(&path, &ProgressReport::new())
        .unwrap()
        .root
        .count();
    assert_eq!(nodes, 3);

    let manager = manager(dir.path());
    let events = EventSystem::new();
    let mut scene = Scene::new(events.sender(), Arc::new(IdGenerator::new()));
    let model = handle(Model::new(ResourceHeader::new(manager.next_id()).with_name("pair")));
    let importer = ModelImporter::new(Arc::new(ObjImporter::new()), manager, events.sender());
    importer.load(&model, &path, &mut scene).unwrap();

    assert_eq!(importer.progress().job_count(), nodes);
    assert_eq!(importer.progress().jobs_done(), nodes);
}

#[test]
fn engine_imports_and_draws_a_model() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("box.mtl"), "newmtl wood\nKd 0.6 0.4 0.2\n").unwrap();
    let path = dir.path().join("box.obj");
    fs::write(
        &path,
        "mtllib box.mtl\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nusemtl wood\nf 1 2 3\nf 1 3 4\n",
    )
    .unwrap();

    let mut config = ApplicationConfig::default();
    config.assets = config.assets.with_data_dir(dir.path());
    config.threading.worker_count = Some(1);
    let mut engine = Engine::new(config, Arc::new(HeadlessDevice::new())).unwrap();

    let root = engine.load_model(&path).unwrap();
    let camera = engine.scene_mut().create_entity("camera");
    engine
        .scene_mut()
        .entity_mut(camera)
        .unwrap()
        .add_component_of_kind(ComponentKind::Camera);

    let stats = engine.tick(0.016);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.triangles, 2);

    let saved = engine.scene().save_as_prefab(root, &dir.path().join("box")).unwrap();
    assert!(saved.exists());
}
