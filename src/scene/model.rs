use glam::{Mat4, Vec3};

use crate::animation::{AnimationClip, ClipCursor, Transform};
use crate::error::SceneryError;
use crate::gpu::device::{GpuDevice, MaterialUniform, MeshDraw, MeshVertex};
use crate::gpu::resource_pool::{GeometryResourcePool, ResourceKind};

/// Triangle mesh in model space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    /// Interleaved position/normal vertices.
    pub vertices: Vec<MeshVertex>,
    /// Triangle list indices into `vertices`.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned bounds, or `None` for an empty mesh.
    #[must_use]
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut iter = self.vertices.iter().map(|v| Vec3::from(v.position));
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }
}

/// Decoded model: one baked mesh, a base color and root animation clips.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAsset {
    /// Geometry, baked in the rest pose.
    pub mesh: MeshData,
    /// Linear RGBA base color of the first material.
    pub base_color: [f32; 4],
    /// Rest transform of the animated root node.
    pub rest: Transform,
    /// Clips animating the root node.
    pub clips: Vec<AnimationClip>,
}

/// Model uploaded to the GPU with its playback state.
#[derive(Debug, Clone)]
pub struct ModelNode {
    draw: MeshDraw,
    base: Mat4,
    rest: Transform,
    rest_inverse: Mat4,
    cursor: Option<ClipCursor>,
}

impl ModelNode {
    /// Upload the asset through `pool`, scaled uniformly by `scale`. The
    /// first clip, if any, starts looping.
    ///
    /// # Errors
    ///
    /// Propagates buffer creation failures. Buffers created before the
    /// failure stay tracked by `pool`.
    pub fn upload(
        pool: &mut GeometryResourcePool,
        device: &mut dyn GpuDevice,
        asset: ModelAsset,
        scale: f32,
    ) -> Result<Self, SceneryError> {
        let vertices = pool.allocate(
            device,
            ResourceKind::MeshVertices,
            "Model Vertices",
            bytemuck::cast_slice(&asset.mesh.vertices),
        )?;
        let indices = pool.allocate(
            device,
            ResourceKind::MeshIndices,
            "Model Indices",
            bytemuck::cast_slice(&asset.mesh.indices),
        )?;
        let material = pool.allocate(
            device,
            ResourceKind::MeshMaterial,
            "Model Material",
            bytemuck::bytes_of(&MaterialUniform {
                color: asset.base_color,
                params: [0.0, 1.0, 0.0, 0.0],
            }),
        )?;

        let cursor = asset
            .clips
            .into_iter()
            .find(|clip| !clip.is_empty())
            .map(ClipCursor::new);

        Ok(Self {
            draw: MeshDraw {
                vertices,
                indices,
                material,
                index_count: asset.mesh.indices.len() as u32,
            },
            base: Mat4::from_scale(Vec3::splat(scale)),
            rest: asset.rest,
            rest_inverse: asset.rest.to_matrix().inverse(),
            cursor,
        })
    }

    /// Advance the looping clip by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.advance(dt);
        }
    }

    /// Model matrix: base scale times the animated root relative to its
    /// rest pose.
    #[must_use]
    pub fn model_matrix(&self) -> Mat4 {
        self.cursor.as_ref().map_or(self.base, |cursor| {
            self.base * cursor.sample(&self.rest).to_matrix() * self.rest_inverse
        })
    }

    /// Draw command, or `None` for a mesh without triangles.
    #[must_use]
    pub fn draw(&self) -> Option<MeshDraw> {
        (self.draw.index_count > 0).then_some(self.draw)
    }

    /// Playback time of the active clip.
    #[must_use]
    pub fn clip_time(&self) -> Option<f32> {
        self.cursor.as_ref().map(ClipCursor::time)
    }
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;
    use crate::animation::{Interpolation, Track};
    use crate::host::headless::{GpuLedger, HeadlessDevice};

    fn triangle() -> MeshData {
        let normal = [0.0, 0.0, 1.0];
        MeshData {
            vertices: vec![
                MeshVertex {
                    position: [0.0, 0.0, 0.0],
                    normal,
                },
                MeshVertex {
                    position: [1.0, 0.0, 0.0],
                    normal,
                },
                MeshVertex {
                    position: [0.0, 1.0, 0.0],
                    normal,
                },
            ],
            indices: vec![0, 1, 2],
        }
    }

    fn asset(clips: Vec<AnimationClip>) -> ModelAsset {
        ModelAsset {
            mesh: triangle(),
            base_color: [1.0; 4],
            rest: Transform {
                translation: Vec3::new(0.0, 2.0, 0.0),
                ..Transform::default()
            },
            clips,
        }
    }

    #[test]
    fn static_model_uses_base_scale() {
        let mut device = HeadlessDevice::new(GpuLedger::shared(), (8, 8));
        let mut pool = GeometryResourcePool::new();
        let mut node =
            ModelNode::upload(&mut pool, &mut device, asset(Vec::new()), 2.0)
                .unwrap();
        node.advance(1.0);
        assert_eq!(node.model_matrix(), Mat4::from_scale(Vec3::splat(2.0)));
        assert_eq!(node.clip_time(), None);
        assert_eq!(pool.live_count(), 3);
        assert_eq!(node.draw().map(|d| d.index_count), Some(3));
    }

    #[test]
    fn animated_model_is_relative_to_rest_pose() {
        let clip = AnimationClip {
            name: None,
            translation: Track::new(
                vec![0.0, 1.0],
                vec![Vec3::new(0.0, 2.0, 0.0), Vec3::new(4.0, 2.0, 0.0)],
                Interpolation::Linear,
            ),
            rotation: Track::new(vec![0.0], vec![Quat::IDENTITY], Interpolation::Step),
            scale: None,
        };
        let mut device = HeadlessDevice::new(GpuLedger::shared(), (8, 8));
        let mut pool = GeometryResourcePool::new();
        let mut node =
            ModelNode::upload(&mut pool, &mut device, asset(vec![clip]), 1.0)
                .unwrap();

        // At t = 0 the clip reproduces the rest pose.
        assert!(node.model_matrix().abs_diff_eq(Mat4::IDENTITY, 1e-5));

        node.advance(0.5);
        let moved = node.model_matrix().transform_point3(Vec3::ZERO);
        assert!(moved.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn bounds_cover_vertices() {
        let (min, max) = triangle().bounds().unwrap();
        assert_eq!(min, Vec3::ZERO);
        assert_eq!(max, Vec3::new(1.0, 1.0, 0.0));
        assert!(MeshData::default().bounds().is_none());
        assert_eq!(triangle().triangle_count(), 1);
    }
}
