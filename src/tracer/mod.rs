//! GPU ray tracing: scene flattening, buffer lifetime and dispatch.
//!
//! ## Architecture
//! ```text
//! World → flatten_world (CPU) → FlatScene → GpuSceneBuffers → compute kernel → output texture
//!                                                 ↑
//!                           DispatchController (Idle / OneShot / Continuous)
//! ```
//!
//! The kernel runs behind [`ComputeBackend`]: `WgpuBackend` drives a real
//! device, [`DryRunBackend`] records calls and validates bindings on the CPU.

pub mod backend;
pub mod buffers;
pub mod dispatch;
pub mod dry_run;
pub mod flatten;
pub mod gpu_data;
pub mod uniforms;

#[cfg(feature = "gpu")]
pub mod compute;

/// Thread-group size declared by `raytrace.wgsl`.
pub const KERNEL_WORKGROUP_SIZE: [u32; 3] = [8, 8, 1];

pub use backend::{BufferSlot, ComputeBackend, ElementCounts, SceneBindings};
pub use buffers::GpuSceneBuffers;
pub use dispatch::{workgroup_counts, DispatchController, RenderMode};
pub use dry_run::{BackendCall, DryRunBackend};
pub use flatten::{face_normal, flatten_world};
pub use gpu_data::{FlatScene, GpuMaterial, LightRecord, MeshRecord, SphereRecord, TriangleRecord};
pub use uniforms::TraceUniforms;

#[cfg(feature = "gpu")]
pub use compute::WgpuBackend;
