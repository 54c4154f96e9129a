//! Camera system for the backdrop scene.
//!
//! A perspective [`Camera`](core::Camera) orbited around the origin by an
//! [`OrbitCameraController`](controller::OrbitCameraController) with
//! velocity damping.

/// Damped orbit controller driven by pointer input.
pub mod controller;
/// Core camera struct.
pub mod core;

pub use controller::OrbitCameraController;
pub use self::core::Camera;
