//! Backend-neutral GPU device interface.
//!
//! A mounted surface hands the lifecycle manager a `Box<dyn GpuDevice>`.
//! The manager only ever creates and destroys buffers through it, resizes its
//! surface, and submits one [`FrameDraw`] per frame, so the same lifecycle
//! code runs against wgpu and against the recording headless device.

use std::fmt;

use crate::error::SceneryError;

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex or per-instance attributes.
    Vertex,
    /// `u32` triangle indices.
    Index,
    /// Uniform block (materials).
    Uniform,
}

/// Opaque handle of a buffer created by a [`GpuDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u64);

/// Buffer creation request.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    /// Debug label.
    pub label: &'a str,
    /// Binding kind.
    pub kind: BufferKind,
    /// Initial contents.
    pub contents: &'a [u8],
}

/// Per-frame uniform block shared by every draw in the frame.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniform {
    /// Combined view-projection matrix.
    pub view_proj: [[f32; 4]; 4],
    /// Model matrix of the particle field (its Y rotation).
    pub particle_model: [[f32; 4]; 4],
    /// Model matrix of the animated model.
    pub mesh_model: [[f32; 4]; 4],
    /// Camera world-space position (w unused).
    pub camera_position: [f32; 4],
    /// Ambient light color premultiplied by intensity (w unused).
    pub ambient: [f32; 4],
    /// Point light world-space position (w unused).
    pub light_position: [f32; 4],
    /// Point light color premultiplied by intensity (w unused).
    pub light_color: [f32; 4],
    /// Viewport width, height in pixels (zw unused).
    pub viewport: [f32; 4],
}

impl Default for FrameUniform {
    fn default() -> Self {
        let identity = glam::Mat4::IDENTITY.to_cols_array_2d();
        Self {
            view_proj: identity,
            particle_model: identity,
            mesh_model: identity,
            camera_position: [0.0; 4],
            ambient: [0.0; 4],
            light_position: [0.0; 4],
            light_color: [0.0; 4],
            viewport: [1.0, 1.0, 0.0, 0.0],
        }
    }
}

/// Per-material uniform block.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    /// Linear RGBA color.
    pub color: [f32; 4],
    /// x = point size in pixels, y = 1 if lit (yzw otherwise unused).
    pub params: [f32; 4],
}

/// Interleaved mesh vertex.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    /// Model-space position.
    pub position: [f32; 3],
    /// Model-space unit normal.
    pub normal: [f32; 3],
}

/// Instanced point-sprite draw of the particle field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointsDraw {
    /// `[f32; 3]` positions, one per instance.
    pub positions: BufferId,
    /// [`MaterialUniform`] buffer.
    pub material: BufferId,
    /// Number of points.
    pub count: u32,
}

/// Indexed triangle draw of the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshDraw {
    /// [`MeshVertex`] buffer.
    pub vertices: BufferId,
    /// `u32` index buffer.
    pub indices: BufferId,
    /// [`MaterialUniform`] buffer.
    pub material: BufferId,
    /// Number of indices.
    pub index_count: u32,
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDraw {
    /// Per-frame uniforms.
    pub uniform: FrameUniform,
    /// Clear color (linear RGBA).
    pub clear_color: [f32; 4],
    /// Particle field, if any points exist.
    pub points: Option<PointsDraw>,
    /// Model, once loaded.
    pub mesh: Option<MeshDraw>,
}

/// Why a frame could not be drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawError {
    /// The surface was lost and must be reconfigured.
    Lost,
    /// The surface no longer matches its target and must be reconfigured.
    Outdated,
    /// Acquiring the next surface texture timed out.
    Timeout,
    /// The device ran out of memory.
    OutOfMemory,
    /// The device was already released.
    Released,
    /// A draw referenced a buffer the device does not own.
    MissingResource(BufferId),
    /// Any other backend failure.
    Other(String),
}

impl DrawError {
    /// Whether reconfiguring the surface at its current size recovers.
    #[must_use]
    pub fn needs_reconfigure(&self) -> bool {
        matches!(self, Self::Lost | Self::Outdated)
    }
}

impl fmt::Display for DrawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lost => write!(f, "surface lost"),
            Self::Outdated => write!(f, "surface outdated"),
            Self::Timeout => write!(f, "surface texture acquisition timed out"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::Released => write!(f, "device already released"),
            Self::MissingResource(id) => {
                write!(f, "draw references unknown buffer {id:?}")
            }
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DrawError {}

/// GPU device bound to one mounted drawing surface.
pub trait GpuDevice {
    /// Create a buffer initialized with `desc.contents`.
    ///
    /// # Errors
    ///
    /// Fails once the device has been released.
    fn create_buffer(
        &mut self,
        desc: &BufferDesc<'_>,
    ) -> Result<BufferId, SceneryError>;

    /// Destroy a buffer. Returns `false` if the id is unknown.
    fn destroy_buffer(&mut self, id: BufferId) -> bool;

    /// Number of buffers created and not yet destroyed.
    fn live_buffer_count(&self) -> usize;

    /// Reconfigure the surface. Zero-sized dimensions are ignored.
    fn resize(&mut self, width: u32, height: u32);

    /// Current surface size in pixels.
    fn size(&self) -> (u32, u32);

    /// Draw and present one frame.
    ///
    /// # Errors
    ///
    /// Returns the surface or device condition that prevented the frame.
    fn draw(&mut self, frame: &FrameDraw) -> Result<(), DrawError>;

    /// Drop every device-side object (pipelines, surface, remaining
    /// buffers). Idempotent.
    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layouts_are_gpu_aligned() {
        assert_eq!(std::mem::size_of::<FrameUniform>(), 272);
        assert_eq!(std::mem::size_of::<FrameUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 32);
        assert_eq!(std::mem::size_of::<MeshVertex>(), 24);
    }

    #[test]
    fn only_surface_errors_need_reconfigure() {
        assert!(DrawError::Lost.needs_reconfigure());
        assert!(DrawError::Outdated.needs_reconfigure());
        assert!(!DrawError::Timeout.needs_reconfigure());
        assert!(!DrawError::Released.needs_reconfigure());
    }
}
