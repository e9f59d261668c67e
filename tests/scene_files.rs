//! Integration tests for loading, checking and re-writing scene files.

use scenetrace::scene::{
    load_scene, load_scene_with, parse_scene, write_scene, ParseOptions, SceneSlot,
};
use scenetrace::util::Vec3;
use scenetrace::Error;

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

fn data(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("data").join(name)
}

#[test]
fn test_load_room_scene() {
    let scene = load_scene(data("room.scene")).expect("Failed to load room.scene");

    let image = scene.image.expect("room.scene has an Image block");
    assert_eq!((image.width, image.height), (320, 240));
    assert_eq!(image.background, Vec3::new(0.1, 0.1, 0.2));
    assert_eq!(scene.transformations.len(), 4);
    assert_eq!(scene.materials.len(), 3);

    let stats = scene.stats();
    assert_eq!(stats.cameras, 1);
    assert_eq!(stats.lights, 1);
    assert_eq!(stats.boxes, 1);
    assert_eq!(stats.spheres, 1);
    assert_eq!(stats.meshes, 1);
    assert_eq!(stats.triangles, 3);

    let camera = scene.camera().expect("camera");
    assert_eq!(camera.fov, 60.0);
    assert_eq!(camera.distance, 10.0);
}

#[test]
fn test_missing_file_reports_path() {
    let path = data("does_not_exist.scene");
    let err = load_scene(&path).unwrap_err();
    match &err {
        Error::Io { path: p, .. } => assert_eq!(p, &path),
        other => panic!("expected Io error, got {other:?}"),
    }
    assert!(err.to_string().contains("does_not_exist.scene"));
}

#[test]
fn test_malformed_file_reports_line() {
    let err = load_scene(data("broken.scene")).unwrap_err();
    assert_eq!(err.line(), Some(14), "{err}");
    assert!(err.to_string().contains("material index 3 out of range"), "{err}");
}

#[test]
fn test_format_roundtrip() {
    let scene = load_scene(data("room.scene")).expect("load");
    let text = write_scene(&scene);
    let reparsed = parse_scene(&text).expect("formatted text parses");
    assert_eq!(scene, reparsed);

    // Formatting is a fixed point
    assert_eq!(write_scene(&reparsed), text);
}

#[test]
fn test_strict_option_from_file() {
    let mut temp = NamedTempFile::new().expect("Failed to create temp file");
    write!(temp, "Transformation\n{{\nT 1 2 3\nShear 1 0 0\n}}\n").expect("write");

    let scene = load_scene(temp.path()).expect("permissive load");
    assert_eq!(scene.transformations[0].translation, Vec3::new(1.0, 2.0, 3.0));

    let err = load_scene_with(temp.path(), ParseOptions::strict()).unwrap_err();
    assert_eq!(err.line(), Some(3));
}

#[test]
fn test_slot_keeps_previous_scene_on_failure() {
    let mut slot = SceneSlot::default();
    assert!(slot.scene().is_none());

    slot.load(data("room.scene")).expect("load room");
    assert_eq!(slot.generation(), 1);
    assert_eq!(slot.source(), Some(data("room.scene").as_path()));
    let entities = slot.scene().map(|s| s.entities.len());

    assert!(slot.load(data("broken.scene")).is_err());
    assert!(slot.load(data("does_not_exist.scene")).is_err());
    assert_eq!(slot.generation(), 1);
    assert_eq!(slot.scene().map(|s| s.entities.len()), entities);
    assert_eq!(slot.source(), Some(data("room.scene").as_path()));
}

#[test]
fn test_slot_replaces_scene_entirely() {
    let dir = tempfile::tempdir().expect("tempdir");
    let small = dir.path().join("small.scene");
    std::fs::write(&small, "Transformation\n{\n}\n\nLight\n{\n0\n1 1 1\n}\n").expect("write");

    let mut slot = SceneSlot::new(ParseOptions::default());
    slot.load(data("room.scene")).expect("load room");
    let scene = slot.load(&small).expect("load small");
    assert_eq!(scene.entities.len(), 1);
    assert!(scene.image.is_none());
    assert_eq!(scene.materials.len(), 0);
    assert_eq!(slot.generation(), 2);
}
