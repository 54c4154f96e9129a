//! Pointer input: platform-agnostic event types shared by every host.

/// Platform-agnostic input events.
pub mod event;

pub use event::{InputEvent, MouseButton};
