//! GPU-layout records for the tracing kernel.
//!
//! Every struct mirrors a WGSL storage struct byte for byte. WGSL aligns
//! `vec3<f32>` to 16 bytes, so each vec3 is followed by either a scalar
//! that shares its last 4 bytes or an explicit pad field.

use bytemuck::{Pod, Zeroable};

use super::backend::BufferSlot;
use crate::scene::Material;

/// Surface parameters (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub color: [f32; 3],
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
    pub reflection: f32,
    pub ior: f32,
}

impl From<&Material> for GpuMaterial {
    fn from(m: &Material) -> Self {
        Self {
            color: m.color.to_array(),
            ambient: m.ambient,
            diffuse: m.diffuse,
            specular: m.specular,
            reflection: m.reflection,
            ior: m.ior,
        }
    }
}

/// World-space triangle with per-vertex normals (96 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TriangleRecord {
    pub vertex_a: [f32; 3],
    pub _pad0: u32,
    pub vertex_b: [f32; 3],
    pub _pad1: u32,
    pub vertex_c: [f32; 3],
    pub _pad2: u32,
    pub normal_a: [f32; 3],
    pub _pad3: u32,
    pub normal_b: [f32; 3],
    pub _pad4: u32,
    pub normal_c: [f32; 3],
    pub _pad5: u32,
}

impl TriangleRecord {
    /// Flat-shaded triangle: all three normals equal `normal`.
    pub fn flat(a: [f32; 3], b: [f32; 3], c: [f32; 3], normal: [f32; 3]) -> Self {
        Self {
            vertex_a: a,
            vertex_b: b,
            vertex_c: c,
            normal_a: normal,
            normal_b: normal,
            normal_c: normal,
            ..Self::zeroed()
        }
    }
}

/// Material-homogeneous triangle run (80 bytes).
///
/// Covers `triangles[triangle_start .. triangle_start + triangle_count]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshRecord {
    pub triangle_start: u32,
    pub triangle_count: u32,
    pub _pad0: [u32; 2],
    pub material: GpuMaterial,
    pub bounds_min: [f32; 3],
    pub _pad1: u32,
    pub bounds_max: [f32; 3],
    pub _pad2: u32,
}

impl MeshRecord {
    pub fn end(&self) -> u32 {
        self.triangle_start + self.triangle_count
    }
}

/// Sphere (48 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SphereRecord {
    pub center: [f32; 3],
    pub radius: f32,
    pub material: GpuMaterial,
}

/// Point light (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightRecord {
    pub position: [f32; 3],
    pub _pad0: u32,
    pub color: [f32; 3],
    pub _pad1: u32,
}

const _: () = assert!(std::mem::size_of::<GpuMaterial>() == 32);
const _: () = assert!(std::mem::size_of::<TriangleRecord>() == 96);
const _: () = assert!(std::mem::size_of::<MeshRecord>() == 80);
const _: () = assert!(std::mem::size_of::<SphereRecord>() == 48);
const _: () = assert!(std::mem::size_of::<LightRecord>() == 32);

/// Flattened scene ready for upload.
///
/// Rebuilt from scratch on every flatten; never edited in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatScene {
    pub triangles: Vec<TriangleRecord>,
    pub meshes: Vec<MeshRecord>,
    pub spheres: Vec<SphereRecord>,
    pub lights: Vec<LightRecord>,
}

impl FlatScene {
    /// Raw bytes of one slot's array.
    pub fn bytes(&self, slot: BufferSlot) -> &[u8] {
        match slot {
            BufferSlot::Triangles => bytemuck::cast_slice(&self.triangles),
            BufferSlot::Meshes => bytemuck::cast_slice(&self.meshes),
            BufferSlot::Spheres => bytemuck::cast_slice(&self.spheres),
            BufferSlot::Lights => bytemuck::cast_slice(&self.lights),
        }
    }

    /// Element count of one slot's array.
    pub fn count(&self, slot: BufferSlot) -> u32 {
        let n = match slot {
            BufferSlot::Triangles => self.triangles.len(),
            BufferSlot::Meshes => self.meshes.len(),
            BufferSlot::Spheres => self.spheres.len(),
            BufferSlot::Lights => self.lights.len(),
        };
        n as u32
    }

    pub fn is_empty(&self) -> bool {
        BufferSlot::ALL.iter().all(|&s| self.count(s) == 0)
    }

    /// Total upload size in bytes.
    pub fn byte_size(&self) -> usize {
        BufferSlot::ALL.iter().map(|&s| self.bytes(s).len()).sum()
    }
}
