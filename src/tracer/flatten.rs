//! Flatten an instantiated world into the four GPU arrays.
//!
//! One running triangle counter spans every mesh and submesh, so the
//! [`MeshRecord`] runs partition the triangle array in encounter order.
//! Mesh bounds cover the whole mesh, not the individual submesh.

use tracing::debug;

use super::gpu_data::{
    FlatScene, GpuMaterial, LightRecord, MeshRecord, SphereRecord, TriangleRecord,
};
use crate::util::{Aabb, Vec3};
use crate::world::{LightInstance, MeshInstance, SphereInstance, World};

/// Normalized `(b - a) x (c - a)`; zero for degenerate triangles.
#[inline]
pub fn face_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// Build the flat arrays for a world.
#[tracing::instrument(
    skip_all,
    fields(
        meshes = world.meshes.len(),
        spheres = world.spheres.len(),
        lights = world.lights.len()
    )
)]
pub fn flatten_world(world: &World) -> FlatScene {
    let mut flat = FlatScene {
        triangles: Vec::with_capacity(world.triangle_count()),
        meshes: Vec::new(),
        spheres: world.spheres.iter().map(flatten_sphere).collect(),
        lights: world.lights.iter().map(flatten_light).collect(),
    };

    for mesh in &world.meshes {
        flatten_mesh(mesh, &mut flat);
    }

    debug!(
        triangles = flat.triangles.len(),
        mesh_records = flat.meshes.len(),
        bytes = flat.byte_size(),
        "flattened"
    );
    flat
}

fn flatten_mesh(mesh: &MeshInstance, flat: &mut FlatScene) {
    let world_vertices: Vec<Vec3> = mesh
        .vertices
        .iter()
        .map(|&v| mesh.world.transform_point3(v))
        .collect();
    let (bounds_min, bounds_max) = Aabb::from_points(world_vertices.iter().copied()).to_arrays();

    for submesh in &mesh.submeshes {
        let triangle_start = flat.triangles.len() as u32;
        for &[ia, ib, ic] in &submesh.triangles {
            let a = world_vertices[ia as usize];
            let b = world_vertices[ib as usize];
            let c = world_vertices[ic as usize];
            let n = face_normal(a, b, c).to_array();
            flat.triangles
                .push(TriangleRecord::flat(a.to_array(), b.to_array(), c.to_array(), n));
        }
        let triangle_count = flat.triangles.len() as u32 - triangle_start;

        flat.meshes.push(MeshRecord {
            triangle_start,
            triangle_count,
            _pad0: [0; 2],
            material: GpuMaterial::from(&submesh.material),
            bounds_min,
            _pad1: 0,
            bounds_max,
            _pad2: 0,
        });
    }
}

fn flatten_sphere(sphere: &SphereInstance) -> SphereRecord {
    SphereRecord {
        center: sphere.parent_world.transform_point3(sphere.local_center).to_array(),
        radius: sphere.radius,
        material: GpuMaterial::from(&sphere.material),
    }
}

fn flatten_light(light: &LightInstance) -> LightRecord {
    LightRecord {
        position: light.position.to_array(),
        _pad0: 0,
        color: light.color.to_array(),
        _pad1: 0,
    }
}
