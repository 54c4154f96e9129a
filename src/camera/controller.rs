use std::f32::consts::FRAC_PI_2;

use glam::{Vec2, Vec3};

use crate::camera::core::Camera;
use crate::events::ListenerBinding;
use crate::input::{InputEvent, MouseButton};
use crate::options::{CameraOptions, SceneConfig};

/// Elevation stays this far short of the poles so `look_at` never degenerates.
const POLE_MARGIN: f32 = 0.01;

/// Orbit controller with angular velocity and per-frame damping.
///
/// Input only feeds velocity (and distance for zoom); the camera moves in
/// [`update`](Self::update), which runs once per frame.
pub struct OrbitCameraController {
    azimuth: f32,
    elevation: f32,
    distance: f32,
    target: Vec3,
    /// Angular velocity: x = azimuth, y = elevation (radians per frame).
    velocity: Vec2,
    damping: f32,

    rotate_speed: f32,
    zoom_speed: f32,
    zoom_enabled: bool,
    min_distance: f32,
    max_distance: f32,
    auto_rotate: bool,
    auto_rotate_speed: f32,

    dragging: bool,
    last_pointer: Option<Vec2>,
    binding: Option<ListenerBinding<InputEvent>>,
}

impl OrbitCameraController {
    /// Build a controller from scene config, starting on the +Z axis.
    #[must_use]
    pub fn from_config(config: &SceneConfig) -> Self {
        let CameraOptions {
            rotate_speed,
            zoom_speed,
            damping_factor,
            min_distance,
            max_distance,
            auto_rotate_speed,
            ..
        } = config.camera;
        let min_distance = min_distance.max(f32::EPSILON);
        let max_distance = max_distance.max(min_distance);

        Self {
            azimuth: 0.0,
            elevation: 0.0,
            distance: config.camera_distance,
            target: Vec3::ZERO,
            velocity: Vec2::ZERO,
            damping: damping_factor.clamp(0.0, 1.0),
            rotate_speed,
            zoom_speed,
            zoom_enabled: config.zoom_enabled,
            min_distance,
            max_distance,
            auto_rotate: config.auto_rotate,
            auto_rotate_speed,
            dragging: false,
            last_pointer: None,
            binding: None,
        }
    }

    /// Feed one pointer event.
    pub fn handle_input(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::PointerButton {
                button: MouseButton::Left,
                pressed,
            } => {
                self.dragging = pressed;
                if !pressed {
                    self.last_pointer = None;
                }
            }
            InputEvent::PointerButton { .. } => {}
            InputEvent::PointerMoved { x, y } => {
                let pos = Vec2::new(x, y);
                if self.dragging {
                    if let Some(last) = self.last_pointer {
                        let delta = (pos - last) * self.rotate_speed;
                        // Dragging right swings the camera left around the
                        // target; dragging down raises it.
                        self.velocity.x -= delta.x;
                        self.velocity.y += delta.y;
                    }
                }
                self.last_pointer = Some(pos);
            }
            InputEvent::Wheel { delta } => {
                if self.zoom_enabled {
                    self.distance = (self.distance
                        * (1.0 - delta * self.zoom_speed))
                        .clamp(self.min_distance, self.max_distance);
                }
            }
            InputEvent::PointerLeft => {
                self.dragging = false;
                self.last_pointer = None;
            }
        }
    }

    /// Advance one frame: decay the velocity by damping, then integrate it.
    pub fn update(&mut self) {
        if self.auto_rotate {
            self.azimuth += self.auto_rotate_speed;
        }
        self.velocity *= self.damping;
        self.azimuth += self.velocity.x;
        self.elevation += self.velocity.y;

        let limit = FRAC_PI_2 - POLE_MARGIN;
        if self.elevation.abs() > limit {
            self.elevation = self.elevation.clamp(-limit, limit);
            self.velocity.y = 0.0;
        }
    }

    /// Position `camera` on the orbit.
    pub fn apply_to(&self, camera: &mut Camera) {
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        let (sin_el, cos_el) = self.elevation.sin_cos();
        let dir = Vec3::new(cos_el * sin_az, sin_el, cos_el * cos_az);
        camera.eye = self.target + dir * self.distance;
        camera.target = self.target;
        camera.up = Vec3::Y;
    }

    /// Keep the input listener registration alive until [`dispose`].
    ///
    /// [`dispose`]: Self::dispose
    pub fn bind_input(&mut self, binding: ListenerBinding<InputEvent>) {
        if let Some(mut previous) = self.binding.replace(binding) {
            let _ = previous.unsubscribe();
        }
    }

    /// Detach the input listener. Returns `true` if one was removed; later
    /// calls are no-ops.
    pub fn dispose(&mut self) -> bool {
        self.dragging = false;
        self.last_pointer = None;
        self.binding
            .take()
            .is_some_and(|mut binding| binding.unsubscribe())
    }

    /// Whether an input listener is currently bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.as_ref().is_some_and(ListenerBinding::is_active)
    }

    /// Current angular velocity (azimuth, elevation) in radians per frame.
    #[must_use]
    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    /// Current orbit distance.
    #[must_use]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Current elevation angle in radians.
    #[must_use]
    pub fn elevation(&self) -> f32 {
        self.elevation
    }

    /// Current azimuth angle in radians.
    #[must_use]
    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }
}
