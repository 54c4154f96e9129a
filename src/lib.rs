// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Function signature hygiene
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cargo lints (warn, not deny since cargo lints can be noisy)
#![warn(clippy::cargo)]
// Unused / redundant code
#![warn(unused_results)]
#![warn(unused_qualifications)]
// Cast hygiene
#![warn(trivial_casts)]
#![warn(trivial_numeric_casts)]
// Tests and benches may unwrap and import globs.
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::wildcard_imports
    )
)]

//! Lifecycle-managed real-time 3D backdrops for embedded drawing surfaces.
//!
//! A backdrop is a slowly rotating field of point particles plus an optional
//! animated glTF model, lit by one ambient and one point light and viewed
//! through a damped orbit camera. Scenes are mounted into *host elements*
//! (a DOM container, a native window, an in-memory stand-in) and must leave
//! nothing behind when they are unmounted, however often that happens.
//!
//! # Key entry points
//!
//! - [`engine::SceneLifecycleManager`] - attach/detach and per-frame driving
//! - [`options::SceneConfig`] - scene configuration (JSON or TOML presets)
//! - [`host::HostElement`] - what a scene can be mounted into
//! - [`loader::ModelLoader`] - asynchronous model fetching and decoding
//!
//! # Architecture
//!
//! Every attach acquires, in order: a drawing surface and its
//! [`gpu::device::GpuDevice`], the particle buffers, the pointer listener of
//! the orbit controller, an optional model request, the viewport resize
//! listener and the render loop. Detach releases the same things in reverse
//! order. Listener closures hold weak references to the session and check a
//! disposed flag, so notifications that arrive after detach do nothing.
//! Model loads finish on a worker (or a browser future) and are inserted at
//! the start of the next frame.

pub mod animation;
pub mod camera;
pub mod engine;
pub mod error;
pub mod events;
pub mod gpu;
pub mod host;
pub mod input;
pub mod loader;
pub mod options;
pub mod renderer;
pub mod scene;
pub mod util;
#[cfg(feature = "viewer")]
pub mod viewer;
#[cfg(all(feature = "web", target_arch = "wasm32"))]
pub mod web;

pub use engine::{FrameOutcome, SceneHandle, SceneLifecycleManager};
pub use error::SceneryError;
pub use options::SceneConfig;
