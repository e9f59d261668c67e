//! Scene graph model.
//!
//! A [`Scene`] is what the text parser produces: two auxiliary tables
//! (transformations, materials) plus an ordered list of [`Entity`] records
//! that reference them by index. Scenes are replaced wholesale on every
//! load and never patched in place.
//!
//! ```text
//! Scene
//!  ├── image:           Option<ImageSettings>
//!  ├── transformations: [Transformation]   <- referenced by index
//!  ├── materials:       [Material]         <- referenced by index
//!  └── entities:        [Entity]
//!        ├── Camera    { transform, fov, distance }
//!        ├── Light     { transform, color }
//!        ├── Mesh      { transform, triangles: [Triangle { points, material }] }
//!        └── Primitive { shape: Sphere | Box, transform, material }
//! ```

pub mod loader;
pub mod parser;
pub mod writer;

use std::hash::{Hash, Hasher};

use crate::util::{Mat4, Quat, Vec3};

pub use loader::{load_scene, load_scene_with, SceneSlot};
pub use parser::{parse_scene, parse_scene_with, ParseOptions};
pub use writer::write_scene;

/// Output image dimensions and background color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSettings {
    pub width: u32,
    pub height: u32,
    pub background: Vec3,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            background: Vec3::ONE,
        }
    }
}

impl ImageSettings {
    /// Width over height; 1.0 for degenerate sizes.
    pub fn aspect(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Translation, per-axis rotation in degrees, and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation {
    pub translation: Vec3,
    /// Euler angles in degrees, applied X first, then Y, then Z.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transformation {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transformation {
    pub fn rotation_quat(&self) -> Quat {
        let r = self.rotation;
        Quat::from_rotation_z(r.z.to_radians())
            * Quat::from_rotation_y(r.y.to_radians())
            * Quat::from_rotation_x(r.x.to_radians())
    }

    /// Local-to-parent matrix, `T * R * S`.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation_quat(), self.translation)
    }
}

/// Surface description shared by triangles and primitives.
///
/// Equality and hashing are structural over the bit patterns of every
/// field, so two materials parsed from identical text are the same key.
#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub color: Vec3,
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
    pub reflection: f32,
    pub ior: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            ambient: 0.1,
            diffuse: 0.8,
            specular: 0.2,
            reflection: 0.0,
            ior: 1.0,
        }
    }
}

impl Material {
    fn bits(&self) -> [u32; 8] {
        [
            self.color.x.to_bits(),
            self.color.y.to_bits(),
            self.color.z.to_bits(),
            self.ambient.to_bits(),
            self.diffuse.to_bits(),
            self.specular.to_bits(),
            self.reflection.to_bits(),
            self.ior.to_bits(),
        ]
    }
}

impl PartialEq for Material {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Material {}

impl Hash for Material {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// One mesh face. The material is held by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub points: [Vec3; 3],
    pub material: Material,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveShape {
    Sphere,
    Box,
}

impl PrimitiveShape {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Sphere => "Sphere",
            Self::Box => "Box",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraEntity {
    pub transform: usize,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Distance from the origin along +Z.
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightEntity {
    pub transform: usize,
    pub color: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshEntity {
    pub transform: usize,
    pub triangles: Vec<Triangle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveEntity {
    pub shape: PrimitiveShape,
    pub transform: usize,
    pub material: usize,
}

/// Scene entity record.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Camera(CameraEntity),
    Light(LightEntity),
    Mesh(MeshEntity),
    Primitive(PrimitiveEntity),
}

impl Entity {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Camera(_) => "Camera",
            Self::Light(_) => "Light",
            Self::Mesh(_) => "Triangles",
            Self::Primitive(p) => p.shape.keyword(),
        }
    }
}

/// Per-kind entity counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub cameras: usize,
    pub lights: usize,
    pub meshes: usize,
    pub triangles: usize,
    pub spheres: usize,
    pub boxes: usize,
}

/// Parsed scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    /// Present only if the text contained an `Image` block.
    pub image: Option<ImageSettings>,
    pub transformations: Vec<Transformation>,
    pub materials: Vec<Material>,
    pub entities: Vec<Entity>,
}

impl Scene {
    /// Cameras in scene order.
    pub fn cameras(&self) -> impl Iterator<Item = &CameraEntity> + '_ {
        self.entities.iter().filter_map(|e| match e {
            Entity::Camera(c) => Some(c),
            _ => None,
        })
    }

    /// Last camera in the scene; its field of view and distance win.
    pub fn camera(&self) -> Option<&CameraEntity> {
        self.cameras().last()
    }

    /// Aggregate transform applied to every non-camera object.
    ///
    /// Each camera's transformation, applied in scene order: the scene is
    /// moved around a camera fixed on the +Z axis.
    pub fn scene_transform(&self) -> Mat4 {
        self.cameras()
            .filter_map(|c| self.transformations.get(c.transform))
            .fold(Mat4::IDENTITY, |acc, t| t.to_matrix() * acc)
    }

    /// Image settings, or defaults when the scene had no `Image` block.
    pub fn image_or_default(&self) -> ImageSettings {
        self.image.unwrap_or_default()
    }

    pub fn stats(&self) -> SceneStats {
        let mut stats = SceneStats::default();
        for entity in &self.entities {
            match entity {
                Entity::Camera(_) => stats.cameras += 1,
                Entity::Light(_) => stats.lights += 1,
                Entity::Mesh(m) => {
                    stats.meshes += 1;
                    stats.triangles += m.triangles.len();
                }
                Entity::Primitive(p) => match p.shape {
                    PrimitiveShape::Sphere => stats.spheres += 1,
                    PrimitiveShape::Box => stats.boxes += 1,
                },
            }
        }
        stats
    }
}
