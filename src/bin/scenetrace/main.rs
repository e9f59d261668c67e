//! scenetrace CLI - inspect, normalize and render text scene files.

use anyhow::{bail, Context, Result};
use scenetrace::scene::{load_scene_with, write_scene, ParseOptions, Scene};
use scenetrace::settings::RenderSettings;
use scenetrace::tracer::{
    flatten_world, BufferSlot, ComputeBackend, DispatchController, DryRunBackend,
};
use scenetrace::world::World;
use std::env;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "trace")]
type TraceGuard = Option<tracing_chrome::FlushGuard>;
#[cfg(not(feature = "trace"))]
type TraceGuard = ();

/// Options shared by all commands
struct Options {
    level: Option<LevelFilter>,
    settings: Option<PathBuf>,
    strict: bool,
    json: bool,
    dry_run: bool,
    frames: u32,
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("scenetrace");

    let (opts, positional) = match parse_args(args.get(1..).unwrap_or_default()) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {e:#}");
            print_usage(prog);
            std::process::exit(1);
        }
    };

    let _guard = init_logging(opts.level);

    if positional.is_empty() {
        print_usage(prog);
        return;
    }

    let command = positional[0].as_str();
    let file = positional.get(1).map(PathBuf::from);
    let need_file = |cmd: &str| -> PathBuf {
        match &file {
            Some(f) => f.clone(),
            None => {
                eprintln!("Usage: {prog} {cmd} <file.scene>");
                std::process::exit(1);
            }
        }
    };

    let result = match command {
        "info" | "i" => cmd_info(&need_file("info"), &opts),
        "check" | "c" => cmd_check(&need_file("check"), &opts),
        "format" | "fmt" => cmd_format(&need_file("format"), &opts),
        "flatten" | "f" => cmd_flatten(&need_file("flatten"), &opts),
        "render" | "r" => cmd_render(&need_file("render"), &opts),
        "help" | "h" => {
            print_usage(prog);
            Ok(())
        }
        _ => {
            // Assume it's a file path
            if Path::new(command).exists() {
                cmd_info(Path::new(command), &opts)
            } else {
                eprintln!("Unknown command: {command}");
                print_usage(prog);
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<(Options, Vec<String>)> {
    let mut opts = Options {
        level: None,
        settings: None,
        strict: false,
        json: false,
        dry_run: false,
        frames: 1,
    };
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => opts.level = Some(LevelFilter::DEBUG),
            "-vv" | "--trace" => opts.level = Some(LevelFilter::TRACE),
            "-q" | "--quiet" => opts.level = Some(LevelFilter::OFF),
            "--strict" => opts.strict = true,
            "--json" => opts.json = true,
            "--dry-run" => opts.dry_run = true,
            "--settings" => {
                let path = iter.next().context("--settings needs a file")?;
                opts.settings = Some(PathBuf::from(path));
            }
            "--frames" => {
                let n = iter.next().context("--frames needs a count")?;
                opts.frames = n.parse().with_context(|| format!("invalid frame count '{n}'"))?;
                if opts.frames == 0 {
                    bail!("frame count must be at least 1");
                }
            }
            "-h" | "--help" => positional.insert(0, "help".to_string()),
            "-V" | "--version" => {
                println!(
                    "scenetrace {} (built {} {})",
                    env!("CARGO_PKG_VERSION"),
                    env!("SCENETRACE_BUILD_DATE"),
                    env!("SCENETRACE_BUILD_TIME")
                );
                std::process::exit(0);
            }
            _ => positional.push(arg.clone()),
        }
    }
    Ok((opts, positional))
}

fn print_usage(prog: &str) {
    println!("scenetrace - GPU ray tracer for text scene files");
    println!();
    println!("Usage: {prog} [options] <command> <file.scene>");
    println!();
    println!("Commands:");
    println!("  i, info      Show image settings, table sizes and entity counts");
    println!("  c, check     Parse only; exit code 1 on a malformed scene");
    println!("  fmt, format  Print the scene in canonical form");
    println!("  f, flatten   Show flattened GPU record counts and mesh runs");
    println!("  r, render    Render frames on the GPU");
    println!("  h, help      Show this help");
    println!();
    println!("Options:");
    println!("  -v, --verbose      Debug output");
    println!("  -vv, --trace       Trace output (very verbose)");
    println!("  -q, --quiet        No log output");
    println!("  --strict           Reject unknown transformation tags");
    println!("  --settings <file>  Render settings JSON (default: user config dir)");
    println!("  --json             JSON output for flatten");
    println!("  --frames <N>       Frames to render (default 1; >1 uses continuous mode)");
    println!("  --dry-run          Render against the CPU dry-run backend");
    println!("  -V, --version      Show version");
    println!();
    println!("Environment:");
    println!("  RUST_LOG           Log filter when no verbosity flag is given");
    #[cfg(feature = "trace")]
    println!("  SCENETRACE_TRACE=1 Write a Chrome trace to trace.json");
}

fn log_filter(level: Option<LevelFilter>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::default().add_directive(level.into()),
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    }
}

#[cfg(feature = "trace")]
fn init_logging(level: Option<LevelFilter>) -> TraceGuard {
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(log_filter(level)).with(fmt);

    if env::var("SCENETRACE_TRACE").ok().as_deref() != Some("1") {
        registry.init();
        return None;
    }
    let (chrome, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .file("trace.json")
        .build();
    registry.with(chrome).init();
    Some(guard)
}

#[cfg(not(feature = "trace"))]
fn init_logging(level: Option<LevelFilter>) -> TraceGuard {
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry().with(log_filter(level)).with(fmt).init();
}

fn parse_options(opts: &Options) -> ParseOptions {
    if opts.strict {
        ParseOptions::strict()
    } else {
        ParseOptions::default()
    }
}

fn load(path: &Path, opts: &Options) -> Result<Scene> {
    load_scene_with(path, parse_options(opts))
        .with_context(|| format!("loading {}", path.display()))
}

fn cmd_info(path: &Path, opts: &Options) -> Result<()> {
    let scene = load(path, opts)?;
    let image = scene.image_or_default();
    let stats = scene.stats();

    println!("=== {} ===", path.display());
    println!();
    match scene.image {
        Some(_) => println!("Image:           {}x{}", image.width, image.height),
        None => println!("Image:           {}x{} (default)", image.width, image.height),
    }
    let bg = image.background;
    println!("Background:      ({:.3}, {:.3}, {:.3})", bg.x, bg.y, bg.z);
    println!("Transformations: {}", scene.transformations.len());
    println!("Materials:       {}", scene.materials.len());
    println!();
    println!("Entities:        {}", scene.entities.len());
    println!("  Cameras:       {}", stats.cameras);
    println!("  Lights:        {}", stats.lights);
    println!("  Meshes:        {} ({} triangles)", stats.meshes, stats.triangles);
    println!("  Spheres:       {}", stats.spheres);
    println!("  Boxes:         {}", stats.boxes);

    if let Some(camera) = scene.camera() {
        println!();
        println!("Camera:          fov {} deg, distance {}", camera.fov, camera.distance);
    }
    Ok(())
}

fn cmd_check(path: &Path, opts: &Options) -> Result<()> {
    let scene = load(path, opts)?;
    println!("{}: OK ({} entities)", path.display(), scene.entities.len());
    Ok(())
}

fn cmd_format(path: &Path, opts: &Options) -> Result<()> {
    let scene = load(path, opts)?;
    print!("{}", write_scene(&scene));
    Ok(())
}

fn cmd_flatten(path: &Path, opts: &Options) -> Result<()> {
    let scene = load(path, opts)?;
    let world = World::from_scene(&scene);
    let flat = flatten_world(&world);

    if opts.json {
        let meshes: Vec<_> = flat
            .meshes
            .iter()
            .map(|m| {
                serde_json::json!({
                    "start": m.triangle_start,
                    "count": m.triangle_count,
                    "color": m.material.color,
                    "bounds_min": m.bounds_min,
                    "bounds_max": m.bounds_max,
                })
            })
            .collect();
        let doc = serde_json::json!({
            "file": path.display().to_string(),
            "triangles": flat.triangles.len(),
            "meshes": meshes,
            "spheres": flat.spheres.len(),
            "lights": flat.lights.len(),
            "bytes": flat.byte_size(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("=== {} ===", path.display());
    for slot in BufferSlot::ALL {
        println!(
            "{:<18} {:>8} x {:>3} bytes",
            slot.label(),
            flat.count(slot),
            slot.stride()
        );
    }
    println!("Total:             {} bytes", flat.byte_size());
    if !flat.meshes.is_empty() {
        println!();
        println!("Mesh runs:");
        for (i, m) in flat.meshes.iter().enumerate() {
            let c = m.material.color;
            println!(
                "  [{i}] triangles {}..{}  color ({:.2}, {:.2}, {:.2})",
                m.triangle_start,
                m.end(),
                c[0],
                c[1],
                c[2]
            );
        }
    }
    Ok(())
}

fn cmd_render(path: &Path, opts: &Options) -> Result<()> {
    let scene = load(path, opts)?;
    let world = World::from_scene(&scene);
    let settings = match &opts.settings {
        Some(p) => RenderSettings::load_from(p)
            .with_context(|| format!("settings {}", p.display()))?,
        None => RenderSettings::load(),
    };

    if opts.dry_run {
        let controller = run_frames(DryRunBackend::default(), settings, &world, opts.frames)?;
        let backend = controller.backend();
        println!(
            "dry run: {} dispatch(es), {} buffer upload(s), {} live",
            backend.dispatch_count(),
            backend.create_count(),
            backend.live_buffers()
        );
        return Ok(());
    }

    render_gpu(settings, &world, opts.frames)
}

#[cfg(feature = "gpu")]
fn render_gpu(settings: RenderSettings, world: &World, frames: u32) -> Result<()> {
    let backend = scenetrace::tracer::WgpuBackend::new_headless()?;
    let controller = run_frames(backend, settings, world, frames)?;
    let (w, h) = (world.image.width, world.image.height);
    println!("rendered {frames} frame(s) at {w}x{h}");
    drop(controller);
    Ok(())
}

#[cfg(not(feature = "gpu"))]
fn render_gpu(_settings: RenderSettings, _world: &World, _frames: u32) -> Result<()> {
    bail!("built without the `gpu` feature; use --dry-run")
}

/// One frame uses one-shot mode; more run continuously and then stop.
fn run_frames<B: ComputeBackend>(
    backend: B,
    settings: RenderSettings,
    world: &World,
    frames: u32,
) -> Result<DispatchController<B>> {
    let mut controller = DispatchController::new(backend, settings);
    if frames == 1 {
        controller.render_once(world)?;
        return Ok(controller);
    }

    controller.enable(world)?;
    // enable() uploads geometry; each tick dispatches one frame
    for _ in 0..frames {
        controller.tick(world)?;
    }
    controller.disable();
    Ok(controller)
}
