//! The two scene pipelines: point sprites and lit meshes.

use crate::error::SceneryError;
use crate::gpu::device::MeshVertex;
use crate::gpu::pipeline_helpers;
use crate::gpu::shader_composer::{ShaderComposer, MESH_WGSL, PARTICLES_WGSL};

/// Vertices emitted per particle sprite.
pub const SPRITE_VERTICES: u32 = 6;

/// Shader identity: label + source + path, always passed together.
struct ShaderDef<'a> {
    label: &'a str,
    source: &'a str,
    path: &'a str,
}

/// Layouts and pipelines shared by every draw on one surface.
///
/// - group(0): frame uniform
/// - group(1): material uniform
pub struct ScenePipelines {
    /// Layout of the per-frame bind group.
    pub frame_layout: wgpu::BindGroupLayout,
    /// Layout of per-material bind groups.
    pub material_layout: wgpu::BindGroupLayout,
    /// Instanced point sprites; depth tested, no depth writes.
    pub points: wgpu::RenderPipeline,
    /// Indexed lit triangles.
    pub mesh: wgpu::RenderPipeline,
}

impl ScenePipelines {
    /// Build both pipelines for a surface of `format`.
    ///
    /// # Errors
    ///
    /// Fails if a shader does not compose.
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self, SceneryError> {
        let mut composer = ShaderComposer::new()?;
        let frame_layout = pipeline_helpers::uniform_layout(device, "Frame Uniform Layout");
        let material_layout = pipeline_helpers::uniform_layout(device, "Material Layout");
        let layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Scene Pipeline Layout"),
                bind_group_layouts: &[&frame_layout, &material_layout],
                push_constant_ranges: &[],
            });

        let point_attributes = wgpu::vertex_attr_array![0 => Float32x3];
        let points = create_pipeline(
            device,
            &mut composer,
            &ShaderDef {
                label: "Particles",
                source: PARTICLES_WGSL,
                path: "particles.wgsl",
            },
            &layout,
            format,
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 3]>()
                    as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &point_attributes,
            },
            false,
        )?;

        let mesh_attributes = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
        let mesh = create_pipeline(
            device,
            &mut composer,
            &ShaderDef {
                label: "Mesh",
                source: MESH_WGSL,
                path: "mesh.wgsl",
            },
            &layout,
            format,
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<MeshVertex>()
                    as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &mesh_attributes,
            },
            true,
        )?;

        Ok(Self {
            frame_layout,
            material_layout,
            points,
            mesh,
        })
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    composer: &mut ShaderComposer,
    shader_def: &ShaderDef<'_>,
    layout: &wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
    vertex_buffer: wgpu::VertexBufferLayout<'_>,
    depth_write: bool,
) -> Result<wgpu::RenderPipeline, SceneryError> {
    let label = shader_def.label;
    let shader = composer.compose(
        device,
        &format!("{label} Shader"),
        shader_def.source,
        shader_def.path,
    )?;

    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{label} Pipeline")),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[vertex_buffer],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &pipeline_helpers::color_target(format),
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(pipeline_helpers::depth_stencil_state(depth_write)),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    }))
}
