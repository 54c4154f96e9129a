//! Crate-level error types.

use std::fmt;

use crate::gpu::render_context::RenderContextError;
use crate::loader::AssetLoadError;

/// Errors produced by the scenery crate.
#[derive(Debug)]
pub enum SceneryError {
    /// GPU context initialization failure.
    Gpu(RenderContextError),
    /// Failed to fetch or decode a model asset.
    AssetLoad(AssetLoadError),
    /// Generic I/O failure.
    Io(std::io::Error),
    /// Failed to spawn a background thread.
    ThreadSpawn(std::io::Error),
    /// TOML/JSON config parsing or serialization failure.
    OptionsParse(String),
    /// WGSL composition failure.
    Shader(String),
    /// The host element refused or failed to mount a drawing surface.
    Host(String),
    /// Viewer event-loop failure.
    Viewer(String),
}

impl fmt::Display for SceneryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::AssetLoad(e) => write!(f, "asset load error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::ThreadSpawn(e) => {
                write!(f, "failed to spawn thread: {e}")
            }
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
            Self::Shader(msg) => write!(f, "shader error: {msg}"),
            Self::Host(msg) => write!(f, "host error: {msg}"),
            Self::Viewer(msg) => write!(f, "viewer error: {msg}"),
        }
    }
}

impl std::error::Error for SceneryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::AssetLoad(e) => Some(e),
            Self::Io(e) | Self::ThreadSpawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RenderContextError> for SceneryError {
    fn from(e: RenderContextError) -> Self {
        Self::Gpu(e)
    }
}

impl From<AssetLoadError> for SceneryError {
    fn from(e: AssetLoadError) -> Self {
        Self::AssetLoad(e)
    }
}

impl From<std::io::Error> for SceneryError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
