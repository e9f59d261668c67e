//! Seam between the CPU pipeline and a GPU API.
//!
//! [`ComputeBackend`] is what the resource manager and dispatch controller
//! drive. The wgpu implementation lives in `compute`; `dry_run` records
//! calls without touching a device.

use super::uniforms::TraceUniforms;
use crate::util::Result;

/// One of the four structured scene buffers, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    Triangles,
    Meshes,
    Spheres,
    Lights,
}

impl BufferSlot {
    pub const ALL: [BufferSlot; 4] = [Self::Triangles, Self::Meshes, Self::Spheres, Self::Lights];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Debug label used for GPU objects.
    pub fn label(self) -> &'static str {
        match self {
            Self::Triangles => "scene_triangles",
            Self::Meshes => "scene_meshes",
            Self::Spheres => "scene_spheres",
            Self::Lights => "scene_lights",
        }
    }

    /// Bytes per element.
    pub fn stride(self) -> usize {
        use super::gpu_data::{LightRecord, MeshRecord, SphereRecord, TriangleRecord};
        match self {
            Self::Triangles => std::mem::size_of::<TriangleRecord>(),
            Self::Meshes => std::mem::size_of::<MeshRecord>(),
            Self::Spheres => std::mem::size_of::<SphereRecord>(),
            Self::Lights => std::mem::size_of::<LightRecord>(),
        }
    }
}

/// Element counts per slot, as seen by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementCounts {
    pub triangles: u32,
    pub meshes: u32,
    pub spheres: u32,
    pub lights: u32,
}

impl ElementCounts {
    pub fn get(&self, slot: BufferSlot) -> u32 {
        match slot {
            BufferSlot::Triangles => self.triangles,
            BufferSlot::Meshes => self.meshes,
            BufferSlot::Spheres => self.spheres,
            BufferSlot::Lights => self.lights,
        }
    }

    pub fn set(&mut self, slot: BufferSlot, count: u32) {
        match slot {
            BufferSlot::Triangles => self.triangles = count,
            BufferSlot::Meshes => self.meshes = count,
            BufferSlot::Spheres => self.spheres = count,
            BufferSlot::Lights => self.lights = count,
        }
    }

    pub fn to_array(&self) -> [u32; 4] {
        [self.triangles, self.meshes, self.spheres, self.lights]
    }
}

/// Borrowed buffer handles for one dispatch. `None` slots are bound to a
/// placeholder by the backend; their count is zero.
#[derive(Debug)]
pub struct SceneBindings<'a, B> {
    pub buffers: [Option<&'a B>; 4],
    pub counts: ElementCounts,
}

impl<'a, B> SceneBindings<'a, B> {
    pub fn get(&self, slot: BufferSlot) -> Option<&'a B> {
        self.buffers[slot.index()]
    }
}

// Manual impls: derive would require B: Clone
impl<B> Clone for SceneBindings<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for SceneBindings<'_, B> {}

/// GPU operations needed to trace a flattened scene.
pub trait ComputeBackend {
    /// Owned buffer handle.
    type Buffer;

    /// Kernel thread-group size `(tx, ty, tz)`.
    fn workgroup_size(&self) -> [u32; 3];

    /// Allocate a storage buffer holding `contents` (never empty).
    fn create_storage_buffer(&mut self, slot: BufferSlot, contents: &[u8]) -> Result<Self::Buffer>;

    /// Free a buffer previously returned by `create_storage_buffer`.
    fn release_buffer(&mut self, buffer: Self::Buffer);

    /// Make sure an output target of the given size exists.
    fn ensure_output(&mut self, width: u32, height: u32) -> Result<()>;

    /// Drop the output target.
    fn clear_output(&mut self);

    /// Upload uniforms, bind everything and submit one dispatch.
    fn dispatch(
        &mut self,
        bindings: SceneBindings<'_, Self::Buffer>,
        uniforms: &TraceUniforms,
        groups: [u32; 3],
    ) -> Result<()>;
}
