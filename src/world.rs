//! Instantiated world: meshes, spheres, lights and the camera rig after
//! placement, in the form the geometry flattener consumes.
//!
//! [`World::from_scene`] is a reference placement: every non-camera object
//! is parented under the scene transform (every camera's, chained), and the
//! camera itself sits on +Z looking toward the origin. Hosts with their own
//! scene graph can fill a [`World`] directly.

use std::collections::HashMap;

use tracing::debug;

use crate::scene::{Entity, ImageSettings, Material, PrimitiveShape, Scene, Triangle};
use crate::util::{Mat4, Quat, Vec3};

/// Intensity assigned to every scene light.
pub const DEFAULT_LIGHT_INTENSITY: f32 = 0.45;

/// Material-homogeneous run of triangles within a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Submesh {
    pub material: Material,
    /// Vertex index triples into [`MeshInstance::vertices`].
    pub triangles: Vec<[u32; 3]>,
}

/// Placed mesh with local-space vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    pub name: String,
    /// Local-to-world matrix.
    pub world: Mat4,
    pub vertices: Vec<Vec3>,
    pub submeshes: Vec<Submesh>,
}

impl MeshInstance {
    /// Build a mesh from scene triangles, grouping them by material.
    ///
    /// Submeshes appear in the order their material is first seen; every
    /// triangle contributes three fresh vertices.
    pub fn from_triangles(name: impl Into<String>, world: Mat4, triangles: &[Triangle]) -> Self {
        let mut vertices = Vec::with_capacity(triangles.len() * 3);
        let mut submeshes: Vec<Submesh> = Vec::new();
        let mut slot_of: HashMap<Material, usize> = HashMap::new();

        for tri in triangles {
            let base = vertices.len() as u32;
            vertices.extend_from_slice(&tri.points);

            let slot = *slot_of.entry(tri.material).or_insert_with(|| {
                submeshes.push(Submesh { material: tri.material, triangles: Vec::new() });
                submeshes.len() - 1
            });
            submeshes[slot].triangles.push([base, base + 1, base + 2]);
        }

        Self { name: name.into(), world, vertices, submeshes }
    }

    /// Unit cube centered on the origin, one submesh.
    pub fn cube(name: impl Into<String>, world: Mat4, material: Material) -> Self {
        const H: f32 = 0.5;
        let vertices = vec![
            Vec3::new(-H, -H, -H),
            Vec3::new(H, -H, -H),
            Vec3::new(H, H, -H),
            Vec3::new(-H, H, -H),
            Vec3::new(-H, -H, H),
            Vec3::new(H, -H, H),
            Vec3::new(H, H, H),
            Vec3::new(-H, H, H),
        ];
        // Counter-clockwise seen from outside
        let triangles = vec![
            [0, 3, 2], [0, 2, 1], // -Z
            [4, 5, 6], [4, 6, 7], // +Z
            [0, 1, 5], [0, 5, 4], // -Y
            [3, 7, 6], [3, 6, 2], // +Y
            [0, 4, 7], [0, 7, 3], // -X
            [1, 2, 6], [1, 6, 5], // +X
        ];
        Self {
            name: name.into(),
            world,
            vertices,
            submeshes: vec![Submesh { material, triangles }],
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.triangles.len()).sum()
    }
}

/// Placed sphere. The center is stored in parent space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereInstance {
    pub parent_world: Mat4,
    pub local_center: Vec3,
    pub radius: f32,
    pub material: Material,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightInstance {
    /// World-space position.
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

/// Camera placement and lens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_degrees: 90.0,
        }
    }
}

impl CameraRig {
    pub const NEAR: f32 = 0.1;
    pub const FAR: f32 = 1000.0;

    /// Camera at `(0, 0, distance)` looking down -Z.
    pub fn on_axis(distance: f32, fov_degrees: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, distance),
            rotation: Quat::IDENTITY,
            fov_degrees,
        }
    }

    pub fn camera_to_world(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        let fov = self.fov_degrees.clamp(1.0, 179.0).to_radians();
        Mat4::perspective_rh(fov, aspect, Self::NEAR, Self::FAR)
    }
}

/// Everything the flattener needs, in creation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct World {
    pub image: ImageSettings,
    pub camera: Option<CameraRig>,
    pub meshes: Vec<MeshInstance>,
    pub spheres: Vec<SphereInstance>,
    pub lights: Vec<LightInstance>,
}

impl World {
    /// Place every scene entity.
    #[tracing::instrument(skip_all, fields(entities = scene.entities.len()))]
    pub fn from_scene(scene: &Scene) -> Self {
        let root = scene.scene_transform();
        let local = |index: usize| {
            scene
                .transformations
                .get(index)
                .copied()
                .unwrap_or_default()
        };

        let mut world = World {
            image: scene.image_or_default(),
            camera: scene.camera().map(|c| CameraRig::on_axis(c.distance, c.fov)),
            ..Default::default()
        };

        for (i, entity) in scene.entities.iter().enumerate() {
            match entity {
                Entity::Camera(_) => {}
                Entity::Light(l) => world.lights.push(LightInstance {
                    position: (root * local(l.transform).to_matrix()).transform_point3(Vec3::ZERO),
                    color: l.color,
                    intensity: DEFAULT_LIGHT_INTENSITY,
                }),
                Entity::Mesh(m) => world.meshes.push(MeshInstance::from_triangles(
                    format!("Triangles_{i}"),
                    root * local(m.transform).to_matrix(),
                    &m.triangles,
                )),
                Entity::Primitive(p) => {
                    let material = scene.materials.get(p.material).copied().unwrap_or_default();
                    let t = local(p.transform);
                    match p.shape {
                        PrimitiveShape::Sphere => world.spheres.push(SphereInstance {
                            parent_world: root,
                            local_center: t.translation,
                            radius: t.scale.x,
                            material,
                        }),
                        PrimitiveShape::Box => world.meshes.push(MeshInstance::cube(
                            format!("Box_{i}"),
                            root * t.to_matrix(),
                            material,
                        )),
                    }
                }
            }
        }

        debug!(
            meshes = world.meshes.len(),
            spheres = world.spheres.len(),
            lights = world.lights.len(),
            "world placed"
        );
        world
    }

    pub fn camera_or_default(&self) -> CameraRig {
        self.camera.unwrap_or_default()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(MeshInstance::triangle_count).sum()
    }
}
