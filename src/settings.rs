//! Persistent render settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::util::{Error, Result};

/// Upper bound accepted for the kernel's bounce loop.
pub const MAX_RECURSION_LIMIT: u32 = 16;

/// Lighting terms the kernel can switch individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightingComponent {
    Ambient,
    Diffuse,
    Specular,
    Refraction,
}

/// Direct lighting at the primary hit, or contributions of secondary rays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightingScope {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingToggles {
    pub ambient: bool,
    pub diffuse: bool,
    pub specular: bool,
    pub refraction: bool,
}

impl Default for LightingToggles {
    fn default() -> Self {
        Self {
            ambient: true,
            diffuse: true,
            specular: true,
            refraction: true,
        }
    }
}

impl LightingToggles {
    pub fn get(&self, component: LightingComponent) -> bool {
        match component {
            LightingComponent::Ambient => self.ambient,
            LightingComponent::Diffuse => self.diffuse,
            LightingComponent::Specular => self.specular,
            LightingComponent::Refraction => self.refraction,
        }
    }

    pub fn set(&mut self, component: LightingComponent, enabled: bool) {
        match component {
            LightingComponent::Ambient => self.ambient = enabled,
            LightingComponent::Diffuse => self.diffuse = enabled,
            LightingComponent::Specular => self.specular = enabled,
            LightingComponent::Refraction => self.refraction = enabled,
        }
    }

    /// `(ambient, diffuse, specular, refraction)` as 0/1 for the kernel.
    pub fn to_flags(&self) -> [u32; 4] {
        [
            self.ambient as u32,
            self.diffuse as u32,
            self.specular as u32,
            self.refraction as u32,
        ]
    }
}

/// Render settings that persist between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub local: LightingToggles,
    pub global: LightingToggles,

    pub max_recursion_depth: u32,
    pub rays_per_pixel: u32,
    pub anti_aliasing: bool,

    /// Use the camera's projection matrix instead of the FOV-derived rays.
    pub use_camera_perspective: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            local: LightingToggles::default(),
            global: LightingToggles::default(),
            max_recursion_depth: 4,
            rays_per_pixel: 5,
            anti_aliasing: true,
            use_camera_perspective: false,
        }
    }
}

impl RenderSettings {
    /// Default settings file path
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("scenetrace");
            p.push("settings.json");
            p
        })
    }

    /// Load from the default path, falling back to defaults
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| Self::load_from(&p).ok())
            .unwrap_or_default()
    }

    /// Load from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let settings: Self = serde_json::from_str(&text)?;
        Ok(settings.sanitized())
    }

    /// Save to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| Error::other("no config directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| Error::io(path, e))
    }

    /// Clamp values the kernel cannot use.
    pub fn sanitized(mut self) -> Self {
        self.rays_per_pixel = self.rays_per_pixel.max(1);
        self.max_recursion_depth = self.max_recursion_depth.min(MAX_RECURSION_LIMIT);
        self
    }

    pub fn toggles(&self, scope: LightingScope) -> &LightingToggles {
        match scope {
            LightingScope::Local => &self.local,
            LightingScope::Global => &self.global,
        }
    }

    pub fn set_component(
        &mut self,
        component: LightingComponent,
        scope: LightingScope,
        enabled: bool,
    ) {
        match scope {
            LightingScope::Local => self.local.set(component, enabled),
            LightingScope::Global => self.global.set(component, enabled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = RenderSettings::default();
        assert_eq!(s.max_recursion_depth, 4);
        assert_eq!(s.rays_per_pixel, 5);
        assert!(s.anti_aliasing);
        assert!(!s.use_camera_perspective);
        assert_eq!(s.local.to_flags(), [1, 1, 1, 1]);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "rays_per_pixel": 0, "global": { "specular": false } }"#;
        let s: RenderSettings = serde_json::from_str(json).expect("json");
        let s = s.sanitized();
        assert_eq!(s.rays_per_pixel, 1);
        assert_eq!(s.max_recursion_depth, 4);
        assert!(!s.global.specular);
        assert!(s.global.diffuse);
    }

    #[test]
    fn test_set_component() {
        let mut s = RenderSettings::default();
        s.set_component(LightingComponent::Refraction, LightingScope::Local, false);
        s.set_component(LightingComponent::Ambient, LightingScope::Global, false);
        assert_eq!(s.local.to_flags(), [1, 1, 1, 0]);
        assert_eq!(s.toggles(LightingScope::Global).to_flags(), [0, 1, 1, 1]);
        assert!(!s.global.get(LightingComponent::Ambient));
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("settings.json");
        let s = RenderSettings {
            max_recursion_depth: 40,
            anti_aliasing: false,
            ..Default::default()
        };
        s.save_to(&path).expect("save");

        let loaded = RenderSettings::load_from(&path).expect("load");
        assert_eq!(loaded.max_recursion_depth, MAX_RECURSION_LIMIT);
        assert!(!loaded.anti_aliasing);
    }
}
