use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Camera", inline)]
#[serde(default, rename_all = "camelCase")]
/// Camera projection and orbit control parameters.
pub struct CameraOptions {
    /// Vertical field of view in degrees.
    #[schemars(title = "Field of View", range(min = 20.0, max = 120.0), extend("step" = 1.0))]
    pub fovy: f32,
    /// Near clipping plane distance.
    #[schemars(skip)]
    pub znear: f32,
    /// Far clipping plane distance.
    #[schemars(skip)]
    pub zfar: f32,
    /// Radians of angular velocity added per pixel of drag.
    #[schemars(title = "Rotate Speed", range(min = 0.0005, max = 0.05), extend("step" = 0.0005))]
    pub rotate_speed: f32,
    /// Fractional distance change per wheel line.
    #[schemars(title = "Zoom Speed", range(min = 0.01, max = 0.5), extend("step" = 0.01))]
    pub zoom_speed: f32,
    /// Per-frame velocity multiplier, clamped to `[0, 1]` when applied.
    #[schemars(title = "Damping", range(min = 0.0, max = 1.0), extend("step" = 0.01))]
    pub damping_factor: f32,
    /// Closest orbit distance reachable by zooming.
    pub min_distance: f32,
    /// Farthest orbit distance reachable by zooming.
    pub max_distance: f32,
    /// Azimuth step (radians per frame) applied while auto-rotate is on.
    #[schemars(title = "Auto-rotate Speed", range(min = 0.0, max = 0.05), extend("step" = 0.001))]
    pub auto_rotate_speed: f32,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            fovy: 75.0,
            znear: 0.1,
            zfar: 1000.0,
            rotate_speed: 0.005,
            zoom_speed: 0.1,
            damping_factor: 0.95,
            min_distance: 1.0,
            max_distance: 50.0,
            auto_rotate_speed: 0.002,
        }
    }
}
