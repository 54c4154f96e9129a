//! Scene graph of one attached backdrop: camera, two lights, the particle
//! field and an optional animated model.
//!
//! The graph holds GPU buffer ids only; the buffers themselves belong to the
//! session's [`GeometryResourcePool`](crate::gpu::resource_pool::GeometryResourcePool).

pub mod model;
pub mod particles;

use glam::Vec3;
pub use model::{MeshData, ModelAsset, ModelNode};
pub use particles::{
    ParticleBuffer, ParticleFieldGenerator, ParticleNode, PointMaterial,
};

use crate::camera::Camera;
use crate::gpu::device::{FrameDraw, FrameUniform};
use crate::options::SceneConfig;

/// Uniform ambient light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    /// Linear RGB color.
    pub color: [f32; 3],
    /// Intensity multiplier.
    pub intensity: f32,
}

/// Omnidirectional point light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// World-space position.
    pub position: Vec3,
    /// Linear RGB color.
    pub color: [f32; 3],
    /// Intensity multiplier.
    pub intensity: f32,
}

fn premultiplied(color: [f32; 3], intensity: f32) -> [f32; 4] {
    let [r, g, b] = color;
    [r * intensity, g * intensity, b * intensity, 1.0]
}

/// Everything drawn for one session.
#[derive(Debug, Clone)]
pub struct SceneGraphState {
    /// Perspective camera.
    pub camera: Camera,
    /// Ambient light.
    pub ambient: AmbientLight,
    /// Point light.
    pub point_light: PointLight,
    /// Particle field.
    pub particles: ParticleNode,
    /// Animated model, once loaded.
    pub model: Option<ModelNode>,
    /// Clear color.
    pub background: [f32; 4],
}

impl SceneGraphState {
    /// Assemble a scene around an uploaded particle field.
    #[must_use]
    pub fn new(config: &SceneConfig, viewport: (u32, u32), particles: ParticleNode) -> Self {
        let (width, height) = viewport;
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let lighting = &config.lighting;
        Self {
            camera: Camera::looking_at_origin(&config.camera, config.camera_distance, aspect),
            ambient: AmbientLight {
                color: lighting.ambient_color,
                intensity: lighting.ambient_intensity,
            },
            point_light: PointLight {
                position: Vec3::from(lighting.point_position),
                color: lighting.point_color,
                intensity: lighting.point_intensity,
            },
            particles,
            model: None,
            background: config.background,
        }
    }

    /// Advance the model's clip by `dt` seconds.
    pub fn advance_animation(&mut self, dt: f32) {
        if let Some(model) = self.model.as_mut() {
            model.advance(dt);
        }
    }

    /// Apply one frame's particle rotation.
    pub fn advance_particles(&mut self) {
        self.particles.advance();
    }

    /// Build the draw for the current state at `viewport` pixels.
    #[must_use]
    pub fn frame_draw(&self, viewport: (u32, u32)) -> FrameDraw {
        let camera = &self.camera;
        let model_matrix = self
            .model
            .as_ref()
            .map_or(glam::Mat4::IDENTITY, ModelNode::model_matrix);
        FrameDraw {
            uniform: FrameUniform {
                view_proj: camera.build_matrix().to_cols_array_2d(),
                particle_model: self
                    .particles
                    .model_matrix()
                    .to_cols_array_2d(),
                mesh_model: model_matrix.to_cols_array_2d(),
                camera_position: camera.eye.extend(1.0).to_array(),
                ambient: premultiplied(self.ambient.color, self.ambient.intensity),
                light_position: self
                    .point_light
                    .position
                    .extend(1.0)
                    .to_array(),
                light_color: premultiplied(self.point_light.color, self.point_light.intensity),
                viewport: [viewport.0 as f32, viewport.1 as f32, 0.0, 0.0],
            },
            clear_color: self.background,
            points: self.particles.draw(),
            mesh: self.model.as_ref().and_then(ModelNode::draw),
        }
    }
}
