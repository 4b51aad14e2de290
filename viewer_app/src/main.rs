//! Headless model viewer
//!
//! Imports a model into an engine running on the headless graphics device,
//! renders a few frames, prints the resulting entity hierarchy and writes
//! the model root back out as a prefab.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use lumen_engine::core::Config;
use lumen_engine::prelude::*;
use lumen_engine::scene::components::Camera;
use thiserror::Error;

#[derive(Error, Debug)]
enum ViewerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scene error: {0}")]
    Scene(#[from] lumen_engine::scene::SceneError),
}

/// Import a model headlessly and write it back out as a prefab
#[derive(Parser, Debug)]
#[command(name = "model_viewer", version)]
struct Args {
    /// Model file to import
    model: PathBuf,

    /// Data directory receiving materials, models and the prefab
    #[arg(default_value = "Data")]
    output: PathBuf,

    /// Application config (.toml or .ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames to render before printing stats
    #[arg(short, long, default_value_t = 3)]
    frames: u32,
}

fn main() {
    if let Err(e) = run() {
        log::error!("{e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ViewerError> {
    let args = Args::parse();
    std::fs::create_dir_all(&args.output)?;

    let mut config = args
        .config
        .as_deref()
        .map_or_else(ApplicationConfig::default, ApplicationConfig::load_or_default);
    config.assets = config.assets.with_data_dir(&args.output);

    let mut engine = Engine::new(config, Arc::new(HeadlessDevice::new()))?;
    let root = engine.load_model(&args.model)?;
    log::info!("{}", engine.importer().progress().status());

    let camera = engine.scene_mut().create_entity("Camera");
    if let Some(entity) = engine.scene_mut().entity_mut(camera) {
        entity.add_component::<Camera>();
        if let Some(transform) = entity.transform_mut() {
            transform.position = Vec3::new(0.0, 1.0, -5.0);
        }
    }

    let mut stats = None;
    for _ in 0..args.frames {
        stats = Some(engine.tick(1.0 / 60.0));
    }

    println!("Scene:");
    print_hierarchy(engine.scene(), root, 1);
    if let Some(stats) = stats {
        println!(
            "Last frame: {} batches, {} draw calls, {} triangles, {} skipped",
            stats.batches, stats.draw_calls, stats.triangles, stats.skipped
        );
    }
    let cache = engine.resources().cache();
    println!(
        "Resources: {} cached, {} KiB",
        cache.len(),
        cache.memory_usage() / 1024
    );

    let prefab = prefab_path(&args.output, &args.model);
    let written = engine.scene().save_as_prefab(root, &prefab)?;
    println!("Prefab written to {}", written.display());

    engine.shutdown();
    Ok(())
}

fn prefab_path(output: &Path, model: &Path) -> PathBuf {
    let name = model.file_stem().map_or_else(|| "model".into(), |stem| stem.to_os_string());
    output.join(name)
}

fn print_hierarchy(scene: &Scene, id: EntityId, depth: usize) {
    let Some(entity) = scene.entity(id) else {
        return;
    };

    let indent = "  ".repeat(depth);
    let kinds: Vec<String> = entity.descriptors().iter().map(|(kind, _)| kind.to_string()).collect();
    println!("{indent}{} {} [{}]", entity.id(), entity.name(), kinds.join(", "));
    if let Some(renderable) = entity.renderable() {
        println!(
            "{indent}  geometry {} vertices at {}, material {}",
            renderable.vertex_count(),
            renderable.vertex_offset(),
            renderable.material_name()
        );
    }

    for child in entity.children() {
        print_hierarchy(scene, *child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_output_and_frames_have_defaults() {
        let args = Args::try_parse_from(["model_viewer", "ship.obj"]).unwrap();
        assert_eq!(args.model, PathBuf::from("ship.obj"));
        assert_eq!(args.output, PathBuf::from("Data"));
        assert_eq!(args.frames, 3);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_all_arguments() {
        let args = Args::try_parse_from([
            "model_viewer",
            "ship.obj",
            "out",
            "--config",
            "viewer.toml",
            "--frames",
            "10",
        ])
        .unwrap();
        assert_eq!(args.output, PathBuf::from("out"));
        assert_eq!(args.config, Some(PathBuf::from("viewer.toml")));
        assert_eq!(args.frames, 10);
    }

    #[test]
    fn test_model_is_required() {
        assert!(Args::try_parse_from(["model_viewer"]).is_err());
    }

    #[test]
    fn test_prefab_named_after_model() {
        assert_eq!(
            prefab_path(Path::new("out"), Path::new("models/ship.obj")),
            PathBuf::from("out/ship")
        );
    }
}
