//! Dispatch controller: work-group sizing and the render-mode state machine.
//!
//! ```text
//!            enable()                    tick() (dispatch; rebuild if dirty)
//!   Idle ─────────────────> Continuous <─────┐
//!    ^  \                      │   └─────────┘
//!    │   \ render_once()       │ disable() / any error
//!    │    v                    v
//!    │   OneShot ─────────> Idle
//!    └── build, dispatch, release
//! ```

use tracing::{debug, info, warn};

use super::backend::ComputeBackend;
use super::buffers::GpuSceneBuffers;
use super::flatten::flatten_world;
use super::uniforms::TraceUniforms;
use crate::settings::RenderSettings;
use crate::util::{Error, Result};
use crate::world::World;

/// Work groups needed to cover a `width x height` image.
///
/// `(ceil(W/tx), ceil(H/ty), ceil(1/tz))`. A zero dimension, a z size
/// above 1, or an empty image is rejected.
pub fn workgroup_counts(width: u32, height: u32, workgroup_size: [u32; 3]) -> Result<[u32; 3]> {
    let [tx, ty, tz] = workgroup_size;
    if tx == 0 || ty == 0 || tz == 0 {
        return Err(Error::config(format!(
            "thread-group size {tx}x{ty}x{tz} has a zero dimension"
        )));
    }
    if tz > 1 {
        return Err(Error::config(format!(
            "thread-group z size {tz} is unsupported for a single image layer"
        )));
    }
    if width == 0 || height == 0 {
        return Err(Error::config(format!("image size {width}x{height} is empty")));
    }
    Ok([width.div_ceil(tx), height.div_ceil(ty), 1u32.div_ceil(tz)])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Idle,
    OneShot,
    Continuous,
}

/// Drives uploads and dispatches for one backend.
pub struct DispatchController<B: ComputeBackend> {
    backend: B,
    buffers: GpuSceneBuffers<B::Buffer>,
    settings: RenderSettings,
    mode: RenderMode,
    scene_dirty: bool,
    frame_index: u32,
}

impl<B: ComputeBackend> DispatchController<B> {
    pub fn new(backend: B, settings: RenderSettings) -> Self {
        Self {
            backend,
            buffers: GpuSceneBuffers::new(),
            settings: settings.sanitized(),
            mode: RenderMode::Idle,
            scene_dirty: false,
            frame_index: 0,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn buffers(&self) -> &GpuSceneBuffers<B::Buffer> {
        &self.buffers
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Change toggles, depth or sampling. Takes effect on the next dispatch.
    pub fn set_settings(&mut self, settings: RenderSettings) {
        self.settings = settings.sanitized();
    }

    /// Frames dispatched since the last geometry upload.
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Request a geometry rebuild on the next continuous tick.
    pub fn mark_scene_dirty(&mut self) {
        self.scene_dirty = true;
    }

    pub fn is_scene_dirty(&self) -> bool {
        self.scene_dirty
    }

    /// Build geometry once and start continuous dispatching.
    pub fn enable(&mut self, world: &World) -> Result<()> {
        let result = self.prepare(world);
        if let Err(e) = result {
            return Err(self.fail(e));
        }
        self.mode = RenderMode::Continuous;
        info!(mode = ?self.mode, "ray tracing enabled");
        Ok(())
    }

    /// Stop dispatching, free the scene buffers and the output target.
    pub fn disable(&mut self) {
        let was_running = self.mode != RenderMode::Idle;
        self.buffers.release(&mut self.backend);
        self.backend.clear_output();
        self.mode = RenderMode::Idle;
        if was_running {
            info!("ray tracing disabled");
        }
    }

    /// Build, dispatch a single frame, release, and return to idle.
    pub fn render_once(&mut self, world: &World) -> Result<()> {
        self.mode = RenderMode::OneShot;
        let result = self.prepare(world).and_then(|_| self.dispatch_frame(world));
        match result {
            Ok(()) => {
                self.buffers.release(&mut self.backend);
                self.mode = RenderMode::Idle;
                info!("one-shot frame dispatched");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// One continuous-mode step. Returns `false` without doing anything
    /// when not in continuous mode.
    pub fn tick(&mut self, world: &World) -> Result<bool> {
        if self.mode != RenderMode::Continuous {
            return Ok(false);
        }
        let result = if self.scene_dirty {
            debug!("scene dirty, rebuilding geometry");
            self.prepare(world)
        } else {
            Ok(())
        };
        match result.and_then(|_| self.dispatch_frame(world)) {
            Ok(()) => Ok(true),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Validate, flatten, upload, and size the output target.
    #[tracing::instrument(skip_all, fields(width = world.image.width, height = world.image.height))]
    fn prepare(&mut self, world: &World) -> Result<()> {
        workgroup_counts(world.image.width, world.image.height, self.backend.workgroup_size())?;

        let flat = flatten_world(world);
        self.buffers.rebuild(&mut self.backend, &flat)?;
        self.backend.ensure_output(world.image.width, world.image.height)?;
        self.scene_dirty = false;
        self.frame_index = 0;
        Ok(())
    }

    fn dispatch_frame(&mut self, world: &World) -> Result<()> {
        let image = &world.image;
        let groups = workgroup_counts(image.width, image.height, self.backend.workgroup_size())?;
        // Follows resolution changes between ticks
        self.backend.ensure_output(image.width, image.height)?;
        let uniforms = TraceUniforms::new(
            &world.camera_or_default(),
            image,
            &self.settings,
            self.buffers.counts(),
            self.frame_index,
        );
        self.backend.dispatch(self.buffers.bindings(), &uniforms, groups)?;
        self.frame_index = self.frame_index.wrapping_add(1);
        Ok(())
    }

    /// Release everything, go idle, and hand the error back.
    fn fail(&mut self, error: Error) -> Error {
        warn!(%error, mode = ?self.mode, "ray tracing stopped");
        self.buffers.release(&mut self.backend);
        self.backend.clear_output();
        self.mode = RenderMode::Idle;
        error
    }
}

impl<B: ComputeBackend> Drop for DispatchController<B> {
    fn drop(&mut self) {
        self.buffers.release(&mut self.backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ImageSettings, Material, Triangle};
    use crate::tracer::dry_run::{BackendCall, DryRunBackend};
    use crate::util::{Mat4, Vec3};
    use crate::world::{LightInstance, MeshInstance};

    fn world() -> World {
        let tri = Triangle {
            points: [Vec3::ZERO, Vec3::X, Vec3::Y],
            material: Material::default(),
        };
        World {
            image: ImageSettings { width: 64, height: 48, background: Vec3::ZERO },
            meshes: vec![MeshInstance::from_triangles("m", Mat4::IDENTITY, &[tri, tri])],
            lights: vec![LightInstance { position: Vec3::Y, color: Vec3::ONE, intensity: 0.45 }],
            ..Default::default()
        }
    }

    fn controller() -> DispatchController<DryRunBackend> {
        DispatchController::new(DryRunBackend::default(), RenderSettings::default())
    }

    #[test]
    fn test_workgroup_counts() {
        assert_eq!(workgroup_counts(1920, 1080, [8, 8, 1]).expect("ok"), [240, 135, 1]);
        assert_eq!(workgroup_counts(1921, 1080, [8, 8, 1]).expect("ok"), [241, 135, 1]);
        assert_eq!(workgroup_counts(1, 1, [16, 16, 1]).expect("ok"), [1, 1, 1]);
    }

    #[test]
    fn test_workgroup_counts_rejects_bad_sizes() {
        for size in [[0, 8, 1], [8, 0, 1], [8, 8, 0], [8, 8, 2]] {
            let err = workgroup_counts(1920, 1080, size).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{size:?}: {err}");
        }
        assert!(matches!(workgroup_counts(0, 1080, [8, 8, 1]), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_disable_while_idle_is_noop() {
        let mut c = controller();
        c.disable();
        assert_eq!(c.mode(), RenderMode::Idle);
        assert!(c.backend().calls.is_empty());
        assert!(!c.buffers().any_allocated());
    }

    #[test]
    fn test_enable_tick_disable() {
        let mut c = controller();
        let w = world();
        c.enable(&w).expect("enable");
        assert_eq!(c.mode(), RenderMode::Continuous);
        assert_eq!(c.backend().output(), Some((64, 48)));
        let creates = c.backend().create_count();
        assert_eq!(creates, 3);

        assert!(c.tick(&w).expect("tick"));
        assert!(c.tick(&w).expect("tick"));
        assert_eq!(c.backend().dispatch_count(), 2);
        // No geometry rebuild without the dirty flag
        assert_eq!(c.backend().create_count(), creates);
        assert_eq!(c.backend().last_uniforms.map(|u| u.frame_index), Some(1));

        c.disable();
        assert_eq!(c.mode(), RenderMode::Idle);
        assert_eq!(c.backend().live_buffers(), 0);
        assert_eq!(c.backend().output(), None);
        assert!(!c.tick(&w).expect("idle tick"));
    }

    #[test]
    fn test_dirty_scene_rebuilds_once() {
        let mut c = controller();
        let w = world();
        c.enable(&w).expect("enable");
        c.mark_scene_dirty();
        c.tick(&w).expect("tick");
        assert!(!c.is_scene_dirty());
        assert_eq!(c.backend().create_count(), 6);
        c.tick(&w).expect("tick");
        assert_eq!(c.backend().create_count(), 6);
        assert_eq!(c.backend().live_buffers(), 3);
    }

    #[test]
    fn test_uniforms_follow_settings_changes() {
        let mut c = controller();
        let w = world();
        c.enable(&w).expect("enable");
        let mut s = c.settings().clone();
        s.local.diffuse = false;
        c.set_settings(s);
        c.tick(&w).expect("tick");
        let u = c.backend().last_uniforms.expect("uniforms");
        assert_eq!(u.local_components, [1, 0, 1, 1]);
        assert_eq!(u.element_counts, [2, 1, 0, 1]);
        assert_eq!(u.image_size, [64, 48]);
    }

    #[test]
    fn test_render_once_returns_to_idle() {
        let mut c = controller();
        c.render_once(&world()).expect("render");
        assert_eq!(c.mode(), RenderMode::Idle);
        assert_eq!(c.backend().dispatch_count(), 1);
        assert_eq!(c.backend().live_buffers(), 0);
        assert!(matches!(
            c.backend().calls.iter().find(|x| matches!(x, BackendCall::Dispatch { .. })),
            Some(BackendCall::Dispatch { groups: [8, 6, 1], .. })
        ));
    }

    #[test]
    fn test_disable_after_render_once_clears_output() {
        let mut c = controller();
        c.render_once(&world()).expect("render");
        assert_eq!(c.backend().output(), Some((64, 48)));

        c.disable();
        assert_eq!(c.backend().output(), None);
        assert_eq!(c.backend().calls.last(), Some(&BackendCall::ClearOutput));
    }

    #[test]
    fn test_tick_follows_resolution_change() {
        let mut c = controller();
        let mut w = world();
        c.enable(&w).expect("enable");

        w.image.width = 128;
        w.image.height = 96;
        c.tick(&w).expect("tick");
        assert_eq!(c.backend().output(), Some((128, 96)));
        assert!(matches!(
            c.backend().calls.last(),
            Some(BackendCall::Dispatch { groups: [16, 12, 1], .. })
        ));
        assert_eq!(c.backend().last_uniforms.map(|u| u.image_size), Some([128, 96]));
        // Geometry is untouched by a resize
        assert_eq!(c.backend().create_count(), 3);
    }

    #[test]
    fn test_render_once_stops_continuous() {
        let mut c = controller();
        let w = world();
        c.enable(&w).expect("enable");
        c.render_once(&w).expect("render");
        assert_eq!(c.mode(), RenderMode::Idle);
        assert_eq!(c.backend().live_buffers(), 0);
    }

    #[test]
    fn test_gpu_error_goes_idle_and_releases() {
        let mut c = controller();
        let w = world();
        c.enable(&w).expect("enable");
        c.backend_mut().fail_dispatch = true;
        let err = c.tick(&w).unwrap_err();
        assert!(matches!(err, Error::GpuResource(_)));
        assert_eq!(c.mode(), RenderMode::Idle);
        assert_eq!(c.backend().live_buffers(), 0);
    }

    #[test]
    fn test_allocation_error_on_enable() {
        let mut backend = DryRunBackend::default();
        backend.fail_slot = Some(crate::tracer::BufferSlot::Meshes);
        let mut c = DispatchController::new(backend, RenderSettings::default());
        assert!(matches!(c.enable(&world()), Err(Error::GpuResource(_))));
        assert_eq!(c.mode(), RenderMode::Idle);
        assert_eq!(c.backend().live_buffers(), 0);
    }

    #[test]
    fn test_configuration_error_before_allocation() {
        let backend = DryRunBackend::with_workgroup_size([8, 8, 4]);
        let mut c = DispatchController::new(backend, RenderSettings::default());
        let err = c.render_once(&world()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(c.backend().create_count(), 0);
        assert_eq!(c.backend().dispatch_count(), 0);
        assert_eq!(c.mode(), RenderMode::Idle);
    }
}
