//! wgpu backend for the ray tracing kernel.
//!
//! Owns the compute pipeline, the uniform buffer, the rgba32float output
//! texture and a zero-filled placeholder bound to empty scene slots.
//!
//! ## Usage
//! ```ignore
//! let backend = WgpuBackend::new_headless()?;
//! let mut controller = DispatchController::new(backend, RenderSettings::load());
//! controller.render_once(&world)?;
//! let view = controller.backend().output_view(); // sample or blit
//! ```

use tracing::{debug, info};
use wgpu::util::DeviceExt;

use super::backend::{BufferSlot, ComputeBackend, SceneBindings};
use super::uniforms::TraceUniforms;
use super::KERNEL_WORKGROUP_SIZE;
use crate::util::{Error, Result};

/// WGSL source embedded at compile time.
const RAYTRACE_WGSL: &str = include_str!("raytrace.wgsl");

/// Placeholder size: a whole number of elements for every record stride.
const PLACEHOLDER_SIZE: u64 = 480;

struct OutputTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Compute pipeline state on a wgpu device.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    placeholder: wgpu::Buffer,
    output: Option<OutputTarget>,
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl WgpuBackend {
    /// Create the pipeline on an existing device.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("raytrace_shader"),
            source: wgpu::ShaderSource::Wgsl(RAYTRACE_WGSL.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("rt_bind_group_layout"),
            entries: &[
                // @binding(0) Output storage texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba32Float,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                // @binding(1..=4) Triangles, meshes, spheres, lights
                storage_entry(1),
                storage_entry(2),
                storage_entry(3),
                storage_entry(4),
                // @binding(5) Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("rt_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("rt_compute_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("rt_uniforms"),
            size: std::mem::size_of::<TraceUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // wgpu rejects zero-sized bindings
        let placeholder = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("rt_placeholder"),
            contents: &[0u8; PLACEHOLDER_SIZE as usize],
            usage: wgpu::BufferUsages::STORAGE,
        });

        Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            placeholder,
            output: None,
        }
    }

    /// Create a device without a surface and build the pipeline on it.
    pub fn new_headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| Error::gpu(format!("no suitable adapter: {e}")))?;

        let info = adapter.get_info();
        info!(adapter = %info.name, backend = ?info.backend, "GPU adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("scenetrace device"),
            ..Default::default()
        }))
        .map_err(|e| Error::gpu(format!("device request failed: {e}")))?;

        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Output texture view, once a target exists.
    pub fn output_view(&self) -> Option<&wgpu::TextureView> {
        self.output.as_ref().map(|o| &o.view)
    }

    /// Current output dimensions.
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.output.as_ref().map(|o| (o.width, o.height))
    }

    /// Run `f` inside an out-of-memory + validation error scope.
    fn scoped<T>(&self, what: &str, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let value = f(&self.device);
        let oom = pollster::block_on(self.device.pop_error_scope());
        let validation = pollster::block_on(self.device.pop_error_scope());
        match oom.or(validation) {
            Some(e) => Err(Error::gpu(format!("{what}: {e}"))),
            None => Ok(value),
        }
    }
}

impl ComputeBackend for WgpuBackend {
    type Buffer = wgpu::Buffer;

    fn workgroup_size(&self) -> [u32; 3] {
        KERNEL_WORKGROUP_SIZE
    }

    fn create_storage_buffer(&mut self, slot: BufferSlot, contents: &[u8]) -> Result<wgpu::Buffer> {
        let limit = self.device.limits().max_storage_buffer_binding_size as usize;
        if contents.len() > limit {
            return Err(Error::gpu(format!(
                "{}: {} bytes exceeds the device limit of {limit}",
                slot.label(),
                contents.len()
            )));
        }
        self.scoped(slot.label(), |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(slot.label()),
                contents,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            })
        })
    }

    fn release_buffer(&mut self, buffer: wgpu::Buffer) {
        buffer.destroy();
    }

    fn ensure_output(&mut self, width: u32, height: u32) -> Result<()> {
        if self.output_size() == Some((width, height)) {
            return Ok(());
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(Error::gpu(format!(
                "output {width}x{height} exceeds the device limit of {max}"
            )));
        }
        self.clear_output();

        let texture = self.scoped("rt_output", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("rt_output"),
                size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba32Float,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        debug!(width, height, "output target created");
        self.output = Some(OutputTarget { texture, view, width, height });
        Ok(())
    }

    fn clear_output(&mut self) {
        if let Some(output) = self.output.take() {
            output.texture.destroy();
        }
    }

    #[tracing::instrument(skip_all, fields(groups = ?groups))]
    fn dispatch(
        &mut self,
        bindings: SceneBindings<'_, wgpu::Buffer>,
        uniforms: &TraceUniforms,
        groups: [u32; 3],
    ) -> Result<()> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| Error::gpu("dispatch without an output target"))?;

        self.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let slot_buffer = |slot: BufferSlot| bindings.get(slot).unwrap_or(&self.placeholder);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("rt_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&output.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: slot_buffer(BufferSlot::Triangles).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: slot_buffer(BufferSlot::Meshes).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: slot_buffer(BufferSlot::Spheres).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: slot_buffer(BufferSlot::Lights).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let [gx, gy, gz] = groups;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("rt_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("rt_compute_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(gx, gy, gz);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(Error::gpu(format!("dispatch: {e}")));
        }
        Ok(())
    }
}
