//! wgpu implementation of [`GpuDevice`].
//!
//! One [`WgpuRenderer`] per mounted surface. Buffers are created with their
//! contents and never rewritten; the only per-frame upload is the frame
//! uniform. Material buffers get their bind group at creation time.

pub mod pipelines;

use std::borrow::Cow;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

pub use pipelines::{ScenePipelines, SPRITE_VERTICES};

use crate::error::SceneryError;
use crate::gpu::device::{
    BufferDesc, BufferId, BufferKind, DrawError, FrameDraw, FrameUniform,
    GpuDevice,
};
use crate::gpu::pipeline_helpers;
use crate::gpu::render_context::RenderContext;
use crate::gpu::texture::DepthTarget;

/// Smallest buffer ever created; wgpu rejects zero-sized bindings.
const MIN_BUFFER_SIZE: usize = 16;

struct GpuBuffer {
    buffer: wgpu::Buffer,
    kind: BufferKind,
    bind_group: Option<wgpu::BindGroup>,
}

/// Draws [`FrameDraw`]s to one wgpu surface.
pub struct WgpuRenderer {
    context: RenderContext,
    pipelines: ScenePipelines,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    depth: DepthTarget,
    buffers: FxHashMap<BufferId, GpuBuffer>,
    next_id: u64,
    released: bool,
}

impl WgpuRenderer {
    /// Renderer for a configured surface.
    ///
    /// # Errors
    ///
    /// Fails if a pipeline shader does not compose.
    pub fn new(context: RenderContext) -> Result<Self, SceneryError> {
        let device = &context.device;
        let pipelines = ScenePipelines::new(device, context.format())?;
        let frame_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Frame Uniform"),
                contents: bytemuck::bytes_of(&FrameUniform::default()),
                usage: wgpu::BufferUsages::UNIFORM
                    | wgpu::BufferUsages::COPY_DST,
            });
        let frame_bind_group = pipeline_helpers::uniform_bind_group(
            device,
            &pipelines.frame_layout,
            &frame_buffer,
            "Frame Bind Group",
        );
        let (width, height) = context.size();
        let depth = DepthTarget::new(device, width, height);
        Ok(Self {
            context,
            pipelines,
            frame_buffer,
            frame_bind_group,
            depth,
            buffers: FxHashMap::default(),
            next_id: 0,
            released: false,
        })
    }

    fn lookup(&self, id: BufferId) -> Result<&GpuBuffer, DrawError> {
        self.buffers.get(&id).ok_or(DrawError::MissingResource(id))
    }

    fn material(&self, id: BufferId) -> Result<&wgpu::BindGroup, DrawError> {
        self.lookup(id)?
            .bind_group
            .as_ref()
            .ok_or(DrawError::MissingResource(id))
    }
}

fn buffer_usage(kind: BufferKind) -> wgpu::BufferUsages {
    match kind {
        BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
        BufferKind::Index => wgpu::BufferUsages::INDEX,
        BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
    }
}

fn surface_error(error: wgpu::SurfaceError) -> DrawError {
    match error {
        wgpu::SurfaceError::Lost => DrawError::Lost,
        wgpu::SurfaceError::Outdated => DrawError::Outdated,
        wgpu::SurfaceError::Timeout => DrawError::Timeout,
        wgpu::SurfaceError::OutOfMemory => DrawError::OutOfMemory,
        other => DrawError::Other(other.to_string()),
    }
}

fn clear_color([r, g, b, a]: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(r),
        g: f64::from(g),
        b: f64::from(b),
        a: f64::from(a),
    }
}

impl GpuDevice for WgpuRenderer {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferId, SceneryError> {
        if self.released {
            return Err(SceneryError::Host(format!(
                "buffer '{}' requested from a released device",
                desc.label
            )));
        }
        let contents: Cow<'_, [u8]> = if desc.contents.len() < MIN_BUFFER_SIZE {
            let mut bytes = desc.contents.to_vec();
            bytes.resize(MIN_BUFFER_SIZE, 0);
            Cow::Owned(bytes)
        } else {
            Cow::Borrowed(desc.contents)
        };
        let device = &self.context.device;
        let buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(desc.label),
                contents: &contents,
                usage: buffer_usage(desc.kind),
            });
        let bind_group = (desc.kind == BufferKind::Uniform).then(|| {
            pipeline_helpers::uniform_bind_group(
                device,
                &self.pipelines.material_layout,
                &buffer,
                desc.label,
            )
        });

        self.next_id += 1;
        let id = BufferId(self.next_id);
        let _ = self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                kind: desc.kind,
                bind_group,
            },
        );
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) -> bool {
        self.buffers.remove(&id).is_some_and(|entry| {
            entry.buffer.destroy();
            true
        })
    }

    fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.released || width == 0 || height == 0 {
            return;
        }
        self.context.resize(width, height);
        self.depth.ensure_size(&self.context.device, width, height);
    }

    fn size(&self) -> (u32, u32) {
        self.context.size()
    }

    fn draw(&mut self, frame: &FrameDraw) -> Result<(), DrawError> {
        if self.released {
            return Err(DrawError::Released);
        }
        let output = self.context.get_next_frame().map_err(surface_error)?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.depth.ensure_size(
            &self.context.device,
            output.texture.width(),
            output.texture.height(),
        );

        let points = match frame.points {
            Some(draw) => Some((
                draw,
                &self.lookup(draw.positions)?.buffer,
                self.material(draw.material)?,
            )),
            None => None,
        };
        let mesh = match frame.mesh {
            Some(draw) => {
                let indices = self.lookup(draw.indices)?;
                if indices.kind != BufferKind::Index {
                    return Err(DrawError::MissingResource(draw.indices));
                }
                Some((
                    draw,
                    &self.lookup(draw.vertices)?.buffer,
                    &indices.buffer,
                    self.material(draw.material)?,
                ))
            }
            None => None,
        };

        self.context.queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&frame.uniform));

        let mut encoder = self.context.create_encoder();
        {
            let mut pass =
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Scene Pass"),
                    color_attachments: &[Some(
                        wgpu::RenderPassColorAttachment {
                            view: &view,
                            depth_slice: None,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(clear_color(
                                    frame.clear_color,
                                )),
                                store: wgpu::StoreOp::Store,
                            },
                        },
                    )],
                    depth_stencil_attachment: Some(
                        wgpu::RenderPassDepthStencilAttachment {
                            view: &self.depth.view,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(1.0),
                                store: wgpu::StoreOp::Discard,
                            }),
                            stencil_ops: None,
                        },
                    ),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            pass.set_bind_group(0, &self.frame_bind_group, &[]);

            // Opaque mesh first so sprites depth-test against it.
            if let Some((draw, vertices, indices, material)) = mesh {
                pass.set_pipeline(&self.pipelines.mesh);
                pass.set_bind_group(1, material, &[]);
                pass.set_vertex_buffer(0, vertices.slice(..));
                pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
            if let Some((draw, positions, material)) = points {
                pass.set_pipeline(&self.pipelines.points);
                pass.set_bind_group(1, material, &[]);
                pass.set_vertex_buffer(0, positions.slice(..));
                pass.draw(0..SPRITE_VERTICES, 0..draw.count);
            }
        }
        self.context.submit(encoder);
        output.present();
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for (_, entry) in self.buffers.drain() {
            entry.buffer.destroy();
        }
        let _ = self.context.release_surface();
        log::debug!("wgpu renderer released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_errors_map_to_draw_errors() {
        assert_eq!(surface_error(wgpu::SurfaceError::Lost), DrawError::Lost);
        assert_eq!(
            surface_error(wgpu::SurfaceError::Outdated),
            DrawError::Outdated
        );
        assert!(surface_error(wgpu::SurfaceError::Lost).needs_reconfigure());
        assert!(!surface_error(wgpu::SurfaceError::Timeout).needs_reconfigure());
    }

    #[test]
    fn buffer_kinds_map_to_usages() {
        assert_eq!(buffer_usage(BufferKind::Vertex), wgpu::BufferUsages::VERTEX);
        assert_eq!(buffer_usage(BufferKind::Index), wgpu::BufferUsages::INDEX);
        assert_eq!(
            buffer_usage(BufferKind::Uniform),
            wgpu::BufferUsages::UNIFORM
        );
    }

    #[test]
    fn clear_color_widens_channels() {
        let color = clear_color([0.0, 0.5, 1.0, 0.25]);
        assert_eq!(color.g, 0.5);
        assert_eq!(color.a, 0.25);
    }
}
