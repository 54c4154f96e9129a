//! GPU plumbing: the backend-neutral device interface, per-session buffer
//! tracking, and the wgpu context, pipeline and shader helpers behind the
//! real renderer.

/// Backend-neutral device interface and per-frame draw description.
pub mod device;
/// Shared wgpu boilerplate for the scene pipelines.
pub mod pipeline_helpers;
/// wgpu instance, device and surface initialization.
pub mod render_context;
/// Per-session tracking of created buffers.
pub mod resource_pool;
/// WGSL shader composition with `#import` support via naga-oil.
pub mod shader_composer;
/// Depth attachment.
pub mod texture;
