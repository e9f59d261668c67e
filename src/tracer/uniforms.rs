//! Per-frame kernel uniforms.

use bytemuck::{Pod, Zeroable};

use super::backend::ElementCounts;
use crate::scene::ImageSettings;
use crate::settings::RenderSettings;
use crate::world::CameraRig;

/// Uniform block matching the WGSL `TraceUniforms` struct (240 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TraceUniforms {
    pub camera_to_world: [[f32; 4]; 4],
    pub camera_inverse_projection: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    /// Vertical field of view in degrees.
    pub camera_fov: f32,
    pub background_color: [f32; 4],
    pub image_size: [u32; 2],
    pub max_recursion_depth: u32,
    pub rays_per_pixel: u32,
    /// Ambient, diffuse, specular, refraction at the primary hit.
    pub local_components: [u32; 4],
    /// Same terms for secondary rays.
    pub global_components: [u32; 4],
    pub anti_aliasing: u32,
    pub use_camera_perspective: u32,
    pub frame_index: u32,
    pub _pad0: u32,
    /// Triangles, meshes, spheres, lights.
    pub element_counts: [u32; 4],
}

const _: () = assert!(std::mem::size_of::<TraceUniforms>() == 240);

impl TraceUniforms {
    pub fn new(
        camera: &CameraRig,
        image: &ImageSettings,
        settings: &RenderSettings,
        counts: ElementCounts,
        frame_index: u32,
    ) -> Self {
        let projection = camera.projection(image.aspect());
        Self {
            camera_to_world: camera.camera_to_world().to_cols_array_2d(),
            camera_inverse_projection: projection.inverse().to_cols_array_2d(),
            camera_position: camera.position.to_array(),
            camera_fov: camera.fov_degrees,
            background_color: image.background.extend(1.0).to_array(),
            image_size: [image.width, image.height],
            max_recursion_depth: settings.max_recursion_depth,
            rays_per_pixel: settings.rays_per_pixel.max(1),
            local_components: settings.local.to_flags(),
            global_components: settings.global.to_flags(),
            anti_aliasing: settings.anti_aliasing as u32,
            use_camera_perspective: settings.use_camera_perspective as u32,
            frame_index,
            _pad0: 0,
            element_counts: counts.to_array(),
        }
    }
}
