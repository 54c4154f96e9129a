use glam::{Mat4, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SceneryError;
use crate::gpu::device::{GpuDevice, MaterialUniform, PointsDraw};
use crate::gpu::resource_pool::{GeometryResourcePool, ResourceKind};

/// Flat `x, y, z` particle coordinates, `3 * count` floats.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParticleBuffer {
    positions: Vec<f32>,
}

impl ParticleBuffer {
    /// Wrap raw coordinates. Trailing components that do not form a full
    /// point are dropped.
    #[must_use]
    pub fn from_raw(mut positions: Vec<f32>) -> Self {
        positions.truncate(positions.len() - positions.len() % 3);
        Self { positions }
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len() / 3
    }

    /// Whether the buffer holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Raw coordinates.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.positions
    }

    /// Iterate points as vectors.
    pub fn points(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.positions.chunks_exact(3).map(Vec3::from_slice)
    }
}

/// Appearance shared by every particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointMaterial {
    /// Linear RGB color.
    pub color: [f32; 3],
    /// Point size in pixels.
    pub size: f32,
}

impl PointMaterial {
    /// GPU uniform block for this material.
    #[must_use]
    pub fn uniform(&self) -> MaterialUniform {
        let [r, g, b] = self.color;
        MaterialUniform {
            color: [r, g, b, 1.0],
            params: [self.size, 0.0, 0.0, 0.0],
        }
    }
}

/// Random point cloud generator.
pub struct ParticleFieldGenerator {
    rng: StdRng,
}

impl Default for ParticleFieldGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleFieldGenerator {
    /// Generator seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded when `seed` is set, OS-seeded otherwise.
    #[must_use]
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::seeded)
    }

    /// `count` points with every coordinate uniform in
    /// `[-extent / 2, extent / 2]`. The sign of `extent` is ignored.
    pub fn generate(&mut self, count: usize, extent: f32) -> ParticleBuffer {
        let extent = extent.abs();
        let positions = (0..count * 3)
            .map(|_| (self.rng.random::<f32>() - 0.5) * extent)
            .collect();
        ParticleBuffer { positions }
    }

    /// Material for the generated field.
    #[must_use]
    pub fn material(color: [f32; 3], size: f32) -> PointMaterial {
        PointMaterial {
            color,
            size: size.max(0.0),
        }
    }
}

/// Particle field uploaded to the GPU, rotating about Y.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleNode {
    draw: PointsDraw,
    /// Current Y rotation in radians.
    pub rotation: f32,
    /// Rotation added every frame.
    pub rotation_step: f32,
}

impl ParticleNode {
    /// Upload positions and material through `pool`.
    ///
    /// # Errors
    ///
    /// Propagates buffer creation failures. Buffers created before the
    /// failure stay tracked by `pool`.
    pub fn upload(
        pool: &mut GeometryResourcePool,
        device: &mut dyn GpuDevice,
        particles: &ParticleBuffer,
        material: &PointMaterial,
        rotation_step: f32,
    ) -> Result<Self, SceneryError> {
        let positions = pool.allocate(
            device,
            ResourceKind::ParticlePositions,
            "Particle Positions",
            bytemuck::cast_slice(particles.as_slice()),
        )?;
        let material = pool.allocate(
            device,
            ResourceKind::PointMaterial,
            "Particle Material",
            bytemuck::bytes_of(&material.uniform()),
        )?;
        Ok(Self {
            draw: PointsDraw {
                positions,
                material,
                count: particles.len() as u32,
            },
            rotation: 0.0,
            rotation_step,
        })
    }

    /// Apply one frame's rotation increment.
    pub fn advance(&mut self) {
        self.rotation = (self.rotation + self.rotation_step)
            .rem_euclid(std::f32::consts::TAU);
    }

    /// Model matrix for the current rotation.
    #[must_use]
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_rotation_y(self.rotation)
    }

    /// Draw command, or `None` for an empty field.
    #[must_use]
    pub fn draw(&self) -> Option<PointsDraw> {
        (self.draw.count > 0).then_some(self.draw)
    }

    /// Number of particles.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.draw.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::headless::{GpuLedger, HeadlessDevice};

    #[test]
    fn generates_three_components_within_extent() {
        let mut generator = ParticleFieldGenerator::seeded(42);
        let extent = 10.0;
        let buffer = generator.generate(1000, extent);
        assert_eq!(buffer.as_slice().len(), 3000);
        assert_eq!(buffer.len(), 1000);
        assert!(buffer
            .as_slice()
            .iter()
            .all(|c| (-extent / 2.0..=extent / 2.0).contains(c)));
    }

    #[test]
    fn negative_extent_uses_magnitude() {
        let mut generator = ParticleFieldGenerator::seeded(3);
        let buffer = generator.generate(200, -4.0);
        assert!(buffer.as_slice().iter().all(|c| c.abs() <= 2.0));
        assert!(buffer.as_slice().iter().any(|c| *c != 0.0));
    }

    #[test]
    fn same_seed_same_field() {
        let a = ParticleFieldGenerator::seeded(9).generate(50, 3.0);
        let b = ParticleFieldGenerator::seeded(9).generate(50, 3.0);
        let c = ParticleFieldGenerator::seeded(10).generate(50, 3.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_field_has_no_draw() {
        let mut device = HeadlessDevice::new(GpuLedger::shared(), (8, 8));
        let mut pool = GeometryResourcePool::new();
        let buffer = ParticleFieldGenerator::seeded(1).generate(0, 10.0);
        assert!(buffer.is_empty());
        let node = ParticleNode::upload(
            &mut pool,
            &mut device,
            &buffer,
            &ParticleFieldGenerator::material([1.0; 3], 2.0),
            0.1,
        )
        .unwrap();
        assert!(node.draw().is_none());
        assert_eq!(pool.live_count(), 2);
    }

    #[test]
    fn rotation_advances_by_constant_step() {
        let mut device = HeadlessDevice::new(GpuLedger::shared(), (8, 8));
        let mut pool = GeometryResourcePool::new();
        let buffer = ParticleFieldGenerator::seeded(1).generate(10, 1.0);
        let mut node = ParticleNode::upload(
            &mut pool,
            &mut device,
            &buffer,
            &ParticleFieldGenerator::material([1.0; 3], 2.0),
            0.25,
        )
        .unwrap();
        node.advance();
        node.advance();
        assert!((node.rotation - 0.5).abs() < 1e-6);
        assert_eq!(node.draw().map(|d| d.count), Some(10));
    }

    #[test]
    fn raw_buffer_drops_partial_point() {
        let buffer = ParticleBuffer::from_raw(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.points().next(), Some(Vec3::new(1.0, 2.0, 3.0)));
    }
}
