//! Scene file loading.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::parser::{parse_scene_with, ParseOptions};
use super::Scene;
use crate::util::{Error, Result};

/// Read and parse a scene file with default options.
pub fn load_scene(path: impl AsRef<Path>) -> Result<Scene> {
    load_scene_with(path, ParseOptions::default())
}

/// Read and parse a scene file.
pub fn load_scene_with(path: impl AsRef<Path>, options: ParseOptions) -> Result<Scene> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_scene_with(&text, options)
}

/// Holder for the currently loaded scene.
///
/// A failed load leaves the previous scene in place; a successful one
/// replaces it entirely.
#[derive(Debug, Default)]
pub struct SceneSlot {
    scene: Option<Scene>,
    source: Option<PathBuf>,
    options: ParseOptions,
    generation: u64,
}

impl SceneSlot {
    pub fn new(options: ParseOptions) -> Self {
        Self { options, ..Default::default() }
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    /// Path of the file the current scene came from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Incremented on every successful load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Load a file into the slot.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<&Scene> {
        let path = path.as_ref();
        match load_scene_with(path, self.options) {
            Ok(scene) => {
                info!(path = %path.display(), entities = scene.entities.len(), "scene loaded");
                self.source = Some(path.to_path_buf());
                self.generation += 1;
                Ok(self.scene.insert(scene))
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    kept_previous = self.scene.is_some(),
                    "scene load failed"
                );
                Err(e)
            }
        }
    }
}
