//! Per-session registry of GPU buffers.
//!
//! Every buffer a session creates goes through its pool, so teardown is a
//! single [`release_all`](GeometryResourcePool::release_all) regardless of
//! which geometry and materials were ever uploaded.

use rustc_hash::FxHashMap;

use crate::error::SceneryError;
use crate::gpu::device::{BufferDesc, BufferId, BufferKind, GpuDevice};

/// What a pooled buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Particle positions.
    ParticlePositions,
    /// Particle point material.
    PointMaterial,
    /// Model vertices.
    MeshVertices,
    /// Model indices.
    MeshIndices,
    /// Model surface material.
    MeshMaterial,
}

impl ResourceKind {
    /// Buffer binding kind for this resource.
    #[must_use]
    pub fn buffer_kind(self) -> BufferKind {
        match self {
            Self::ParticlePositions | Self::MeshVertices => BufferKind::Vertex,
            Self::MeshIndices => BufferKind::Index,
            Self::PointMaterial | Self::MeshMaterial => BufferKind::Uniform,
        }
    }
}

/// Tracks buffers allocated for one session.
#[derive(Debug, Default)]
pub struct GeometryResourcePool {
    live: FxHashMap<BufferId, ResourceKind>,
}

impl GeometryResourcePool {
    /// Empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer on `device` and track it.
    ///
    /// # Errors
    ///
    /// Propagates device buffer creation failures.
    pub fn allocate(
        &mut self,
        device: &mut dyn GpuDevice,
        kind: ResourceKind,
        label: &str,
        contents: &[u8],
    ) -> Result<BufferId, SceneryError> {
        let id = device.create_buffer(&BufferDesc {
            label,
            kind: kind.buffer_kind(),
            contents,
        })?;
        let _ = self.live.insert(id, kind);
        Ok(id)
    }

    /// Destroy one tracked buffer. Returns `false` if the pool does not own
    /// `id`.
    pub fn free(&mut self, device: &mut dyn GpuDevice, id: BufferId) -> bool {
        if self.live.remove(&id).is_none() {
            return false;
        }
        if !device.destroy_buffer(id) {
            log::warn!("buffer {id:?} was already gone from its device");
        }
        true
    }

    /// Destroy every tracked buffer and return how many were freed. The pool
    /// is left empty, so a second call frees nothing.
    pub fn release_all(&mut self, device: &mut dyn GpuDevice) -> usize {
        let mut ids: Vec<BufferId> = self.live.drain().map(|(id, _)| id).collect();
        ids.sort_unstable();
        for id in &ids {
            if !device.destroy_buffer(*id) {
                log::warn!("buffer {id:?} was already gone from its device");
            }
        }
        ids.len()
    }

    /// Number of tracked buffers.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Number of tracked buffers of `kind`.
    #[must_use]
    pub fn count_of(&self, kind: ResourceKind) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }
}
