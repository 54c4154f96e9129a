//! Keyframe animation for the model node.
//!
//! Clips are decoded from the model asset and play back on a looping
//! [`ClipCursor`] that the frame step advances by the measured delta.

pub mod clip;

pub use clip::{AnimationClip, ClipCursor, Interpolation, Track, Transform};
