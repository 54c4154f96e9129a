use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Lighting", inline)]
#[serde(default, rename_all = "camelCase")]
/// Ambient and point light parameters.
pub struct LightingOptions {
    #[schemars(skip)]
    pub ambient_color: [f32; 3],
    #[schemars(title = "Ambient", range(min = 0.0, max = 2.0), extend("step" = 0.05))]
    pub ambient_intensity: f32,
    #[schemars(skip)]
    pub point_position: [f32; 3],
    #[schemars(skip)]
    pub point_color: [f32; 3],
    #[schemars(title = "Point Light", range(min = 0.0, max = 5.0), extend("step" = 0.05))]
    pub point_intensity: f32,
}

impl Default for LightingOptions {
    fn default() -> Self {
        Self {
            ambient_color: [1.0, 1.0, 1.0],
            ambient_intensity: 0.5,
            point_position: [5.0, 5.0, 5.0],
            point_color: [1.0, 1.0, 1.0],
            point_intensity: 1.0,
        }
    }
}
