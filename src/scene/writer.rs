//! Canonical scene text writer.
//!
//! Emits the braced block layout the parser reads: image settings, every
//! transformation, every material, then the entities in order. Parsing the
//! output reproduces the same entity sequence.

use std::fmt::Write;

use super::{Entity, Material, Scene, Transformation};
use crate::util::Vec3;

/// Serialize a scene to text.
pub fn write_scene(scene: &Scene) -> String {
    // Triangle materials are stored by value; any that are not in the table
    // get appended so they can be referenced by index.
    let mut materials = scene.materials.clone();
    for entity in &scene.entities {
        if let Entity::Mesh(mesh) = entity {
            for tri in &mesh.triangles {
                if !materials.contains(&tri.material) {
                    materials.push(tri.material);
                }
            }
        }
    }

    let mut out = String::new();
    if let Some(image) = &scene.image {
        block(&mut out, "Image", |out| {
            line(out, format_args!("{} {}", image.width, image.height));
            line(out, format_args!("{}", vec3(image.background)));
        });
    }
    for t in &scene.transformations {
        write_transformation(&mut out, t);
    }
    for m in &materials {
        write_material(&mut out, m);
    }
    for entity in &scene.entities {
        write_entity(&mut out, entity, &materials);
    }
    out
}

fn block(out: &mut String, header: &str, body: impl FnOnce(&mut String)) {
    line(out, format_args!("{header}"));
    line(out, format_args!("{{"));
    body(out);
    line(out, format_args!("}}"));
    out.push('\n');
}

fn line(out: &mut String, args: std::fmt::Arguments<'_>) {
    // Writing to a String cannot fail
    let _ = out.write_fmt(args);
    out.push('\n');
}

struct Vec3Text(Vec3);

impl std::fmt::Display for Vec3Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.0.x, self.0.y, self.0.z)
    }
}

fn vec3(v: Vec3) -> Vec3Text {
    Vec3Text(v)
}

fn write_transformation(out: &mut String, t: &Transformation) {
    block(out, "Transformation", |out| {
        line(out, format_args!("T {}", vec3(t.translation)));
        line(out, format_args!("Rx {}", t.rotation.x));
        line(out, format_args!("Ry {}", t.rotation.y));
        line(out, format_args!("Rz {}", t.rotation.z));
        line(out, format_args!("S {}", vec3(t.scale)));
    });
}

fn write_material(out: &mut String, m: &Material) {
    block(out, "Material", |out| {
        line(out, format_args!("{}", vec3(m.color)));
        line(
            out,
            format_args!("{} {} {} {} {}", m.ambient, m.diffuse, m.specular, m.reflection, m.ior),
        );
    });
}

fn write_entity(out: &mut String, entity: &Entity, materials: &[Material]) {
    match entity {
        Entity::Camera(c) => block(out, "Camera", |out| {
            line(out, format_args!("{}", c.transform));
            line(out, format_args!("{}", c.fov));
            line(out, format_args!("{}", c.distance));
        }),
        Entity::Light(l) => block(out, "Light", |out| {
            line(out, format_args!("{}", l.transform));
            line(out, format_args!("{}", vec3(l.color)));
        }),
        Entity::Mesh(m) => block(out, "Triangles", |out| {
            line(out, format_args!("{}", m.transform));
            for tri in &m.triangles {
                let index = materials.iter().position(|x| *x == tri.material).unwrap_or_default();
                line(out, format_args!("{index}"));
                for p in tri.points {
                    line(out, format_args!("{}", vec3(p)));
                }
            }
        }),
        Entity::Primitive(p) => block(out, p.shape.keyword(), |out| {
            line(out, format_args!("{}", p.transform));
            line(out, format_args!("{}", p.material));
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{
        parse_scene, CameraEntity, ImageSettings, LightEntity, MeshEntity, PrimitiveEntity,
        PrimitiveShape, Triangle,
    };

    fn sample_scene() -> Scene {
        let red = Material {
            color: Vec3::new(1.0, 0.0, 0.0),
            reflection: 0.25,
            ..Default::default()
        };
        let glass = Material { color: Vec3::new(0.9, 0.9, 1.0), ior: 1.52, ..Default::default() };
        Scene {
            image: Some(ImageSettings {
                width: 320,
                height: 200,
                background: Vec3::new(0.1, 0.2, 0.3),
            }),
            transformations: vec![
                Transformation::default(),
                Transformation {
                    translation: Vec3::new(0.5, -1.25, 3.0),
                    rotation: Vec3::new(15.0, 30.5, -45.0),
                    scale: Vec3::new(1.0, 2.0, 0.75),
                },
            ],
            materials: vec![red, glass],
            entities: vec![
                Entity::Camera(CameraEntity { transform: 1, fov: 60.0, distance: 12.5 }),
                Entity::Light(LightEntity { transform: 0, color: Vec3::new(1.0, 0.9, 0.8) }),
                Entity::Mesh(MeshEntity {
                    transform: 0,
                    triangles: vec![
                        Triangle { points: [Vec3::ZERO, Vec3::X, Vec3::Y], material: glass },
                        Triangle { points: [Vec3::Z, Vec3::ONE, Vec3::NEG_ONE], material: red },
                    ],
                }),
                Entity::Primitive(PrimitiveEntity {
                    shape: PrimitiveShape::Sphere,
                    transform: 1,
                    material: 0,
                }),
                Entity::Primitive(PrimitiveEntity {
                    shape: PrimitiveShape::Box,
                    transform: 0,
                    material: 1,
                }),
            ],
        }
    }

    #[test]
    fn test_roundtrip_identical_entities() {
        let scene = sample_scene();
        let text = write_scene(&scene);
        let parsed = parse_scene(&text).expect("reparse");
        assert_eq!(parsed, scene);
    }

    #[test]
    fn test_unlisted_triangle_material_is_appended() {
        let odd = Material { specular: 0.9, ..Default::default() };
        let scene = Scene {
            transformations: vec![Transformation::default()],
            entities: vec![Entity::Mesh(MeshEntity {
                transform: 0,
                triangles: vec![Triangle { points: [Vec3::ZERO, Vec3::X, Vec3::Y], material: odd }],
            })],
            ..Default::default()
        };
        let parsed = parse_scene(&write_scene(&scene)).expect("reparse");
        assert_eq!(parsed.materials, vec![odd]);
        assert_eq!(parsed.entities, scene.entities);
    }
}
