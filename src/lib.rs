//! # scenetrace
//!
//! Text scene descriptions rendered by a GPU compute ray tracer.
//!
//! ## Modules
//!
//! - [`util`] - Errors and math types
//! - [`scene`] - Scene text parser, writer and the parsed scene model
//! - [`world`] - Placed instances built from a scene (meshes, spheres, lights, camera)
//! - [`tracer`] - Geometry flattening, GPU buffers and the dispatch state machine
//! - [`settings`] - Persistent render settings
//!
//! ## Example
//!
//! ```ignore
//! use scenetrace::prelude::*;
//!
//! let scene = load_scene("room.scene")?;
//! let world = World::from_scene(&scene);
//! let backend = WgpuBackend::new_headless()?;
//! let mut controller = DispatchController::new(backend, RenderSettings::load());
//! controller.render_once(&world)?;
//! ```

pub mod util;
pub mod scene;
pub mod world;
pub mod settings;
pub mod tracer;

// Re-export commonly used types
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result};
    pub use crate::scene::{load_scene, parse_scene, write_scene, Scene, SceneSlot};
    pub use crate::settings::RenderSettings;
    pub use crate::tracer::{
        flatten_world, ComputeBackend, DispatchController, DryRunBackend, RenderMode,
    };
    pub use crate::world::World;

    #[cfg(feature = "gpu")]
    pub use crate::tracer::WgpuBackend;
}
