//! Per-scene configuration with TOML preset and JSON support.
//!
//! A [`SceneConfig`] carries everything `attach` needs: particle field
//! parameters, camera distance, optional model source, and the nested
//! [`CameraOptions`] / [`LightingOptions`]. Keys are camelCase so the same
//! document can come from a TOML preset in `assets/presets/` or from a JSON
//! object handed over by a web page. Every field has a default; unknown keys
//! are ignored.

mod camera;
mod lighting;

use std::path::Path;

pub use camera::CameraOptions;
pub use lighting::LightingOptions;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SceneryError;

/// Largest particle field a scene accepts.
pub const MAX_PARTICLES: usize = 200_000;

/// Configuration for one attached scene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneConfig {
    /// Number of particles in the field.
    #[schemars(title = "Particles", range(min = 0, max = 200_000))]
    pub particle_count: usize,
    /// Linear RGB color of every particle.
    #[schemars(skip)]
    pub particle_color: [f32; 3],
    /// Point size in physical pixels.
    #[schemars(title = "Particle Size", range(min = 0.5, max = 16.0), extend("step" = 0.5))]
    pub particle_size: f32,
    /// Edge length of the cube the particles are scattered in.
    #[schemars(title = "Field Extent", range(min = 0.1, max = 100.0))]
    pub particle_extent: f32,
    /// Y-axis rotation applied to the whole field every frame (radians).
    pub particle_rotation_step: f32,
    /// Fixed RNG seed for a reproducible field. `None` seeds from the OS.
    #[schemars(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particle_seed: Option<u64>,
    /// Initial distance from the camera to the origin.
    #[schemars(title = "Camera Distance", range(min = 0.5, max = 100.0))]
    pub camera_distance: f32,
    /// Whether to request the model at attach.
    pub enable_model: bool,
    /// Location of the binary glTF model.
    #[serde(alias = "modelURL", skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    /// Uniform scale applied to the model.
    pub model_scale: f32,
    /// Slowly orbit the camera without user input.
    pub auto_rotate: bool,
    /// Allow the wheel to change the orbit distance.
    pub zoom_enabled: bool,
    /// Clear color (linear RGBA).
    #[schemars(skip)]
    pub background: [f32; 4],
    /// Camera projection and orbit control parameters.
    pub camera: CameraOptions,
    /// Light parameters.
    pub lighting: LightingOptions,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            particle_count: 5000,
            particle_color: [0.2, 1.0, 0.4],
            particle_size: 2.0,
            particle_extent: 10.0,
            particle_rotation_step: 0.0005,
            particle_seed: None,
            camera_distance: 5.0,
            enable_model: false,
            model_url: None,
            model_scale: 1.0,
            auto_rotate: false,
            zoom_enabled: false,
            background: [0.0, 0.0, 0.0, 1.0],
            camera: CameraOptions::default(),
            lighting: LightingOptions::default(),
        }
    }
}

impl SceneConfig {
    /// Generate JSON Schema describing the tweakable fields.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(SceneConfig)
    }

    /// The model URL to request, if the model is enabled and a URL is set.
    #[must_use]
    pub fn requested_model(&self) -> Option<&str> {
        if self.enable_model {
            self.model_url.as_deref().filter(|url| !url.is_empty())
        } else {
            None
        }
    }

    /// Reject values no scene can be built from. `attach` runs this before
    /// acquiring anything.
    ///
    /// # Errors
    ///
    /// [`SceneryError::OptionsParse`] naming the first offending field.
    pub fn validate(&self) -> Result<(), SceneryError> {
        if self.particle_count > MAX_PARTICLES {
            return Err(SceneryError::OptionsParse(format!(
                "particleCount {} exceeds the maximum of {MAX_PARTICLES}",
                self.particle_count
            )));
        }
        let finite = [
            ("particleSize", self.particle_size),
            ("particleExtent", self.particle_extent),
            ("particleRotationStep", self.particle_rotation_step),
            ("cameraDistance", self.camera_distance),
            ("modelScale", self.model_scale),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SceneryError::OptionsParse(format!(
                "{name} must be finite, got {value}"
            )));
        }
        Ok(())
    }

    /// Parse a config from a JSON document. Missing fields use defaults.
    pub fn from_json(json: &str) -> Result<Self, SceneryError> {
        serde_json::from_str(json)
            .map_err(|e| SceneryError::OptionsParse(e.to_string()))
    }

    /// Load a config from a TOML file. Missing fields use defaults.
    pub fn load(path: &Path) -> Result<Self, SceneryError> {
        let content = std::fs::read_to_string(path).map_err(SceneryError::Io)?;
        toml::from_str(&content)
            .map_err(|e| SceneryError::OptionsParse(e.to_string()))
    }

    /// Save the config to a TOML file (pretty-printed).
    pub fn save(&self, path: &Path) -> Result<(), SceneryError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SceneryError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(SceneryError::Io)?;
        }
        std::fs::write(path, content).map_err(SceneryError::Io)
    }

    /// List available preset names (TOML file stems) in a directory.
    #[must_use]
    pub fn list_presets(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) =
                        path.file_stem().and_then(|s| s.to_str())
                    {
                        names.push(stem.to_owned());
                    }
                }
            }
        }
        names.sort();
        names
    }
}
