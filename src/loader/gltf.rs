//! Binary glTF decoding into a single baked mesh plus root animation.
//!
//! Triangle primitives of the default scene are transformed into model
//! space and concatenated. Animation channels that target the first root
//! node become [`AnimationClip`]s; channels on other nodes are ignored
//! (there is no skinning or node hierarchy at draw time).

use glam::{Mat3, Mat4, Quat, Vec3};
use gltf::animation::util::ReadOutputs;

use crate::animation::{AnimationClip, Interpolation, Track, Transform};
use crate::gpu::device::MeshVertex;
use crate::loader::AssetLoadError;
use crate::scene::{MeshData, ModelAsset};

const DEFAULT_BASE_COLOR: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

/// Decode a `.glb` (or a `.gltf` with embedded buffers).
///
/// # Errors
///
/// [`AssetLoadError::Decode`] for unreadable documents or out-of-range
/// indices, [`AssetLoadError::NoGeometry`] when the scene has no triangles.
pub fn decode_gltf(bytes: &[u8]) -> Result<ModelAsset, AssetLoadError> {
    let (document, buffers, _images) = gltf::import_slice(bytes)
        .map_err(|e| AssetLoadError::Decode(e.to_string()))?;
    let buffer_data =
        |buffer: gltf::Buffer<'_>| buffers.get(buffer.index()).map(|d| d.0.as_slice());

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(AssetLoadError::NoGeometry)?;

    let mut mesh = MeshData::default();
    let mut base_color = None;
    for node in scene.nodes() {
        bake_node(&node, Mat4::IDENTITY, &buffer_data, &mut mesh, &mut base_color)?;
    }
    if mesh.indices.is_empty() {
        return Err(AssetLoadError::NoGeometry);
    }

    let root = scene.nodes().next();
    let rest = root.as_ref().map_or_else(Transform::default, |node| {
        let (t, r, s) = node.transform().decomposed();
        Transform {
            translation: Vec3::from(t),
            rotation: Quat::from_array(r),
            scale: Vec3::from(s),
        }
    });

    let clips = root.map_or_else(Vec::new, |root| {
        document
            .animations()
            .filter_map(|animation| {
                let clip = root_clip(&animation, root.index(), &buffer_data);
                (!clip.is_empty()).then_some(clip)
            })
            .collect()
    });

    log::debug!(
        "decoded model: {} vertices, {} triangles, {} clips",
        mesh.vertices.len(),
        mesh.triangle_count(),
        clips.len()
    );

    Ok(ModelAsset {
        mesh,
        base_color: base_color.unwrap_or(DEFAULT_BASE_COLOR),
        rest,
        clips,
    })
}

fn bake_node<'s, F>(
    node: &gltf::Node<'_>,
    parent: Mat4,
    buffer_data: &F,
    mesh: &mut MeshData,
    base_color: &mut Option<[f32; 4]>,
) -> Result<(), AssetLoadError>
where
    F: Clone + Fn(gltf::Buffer<'_>) -> Option<&'s [u8]>,
{
    let world =
        parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(node_mesh) = node.mesh() {
        for primitive in node_mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                continue;
            }
            if bake_primitive(&primitive, world, buffer_data.clone(), mesh)?
                && base_color.is_none()
            {
                *base_color = Some(
                    primitive
                        .material()
                        .pbr_metallic_roughness()
                        .base_color_factor(),
                );
            }
        }
    }

    for child in node.children() {
        bake_node(&child, world, buffer_data, mesh, base_color)?;
    }
    Ok(())
}

/// Append one primitive. Returns `false` if it had no positions.
fn bake_primitive<'s, F>(
    primitive: &gltf::Primitive<'_>,
    world: Mat4,
    buffer_data: F,
    mesh: &mut MeshData,
) -> Result<bool, AssetLoadError>
where
    F: Clone + Fn(gltf::Buffer<'_>) -> Option<&'s [u8]>,
{
    let reader = primitive.reader(buffer_data);
    let Some(positions) = reader.read_positions() else {
        return Ok(false);
    };
    let positions: Vec<Vec3> = positions
        .map(|p| world.transform_point3(Vec3::from(p)))
        .collect();
    let count = positions.len() as u32;

    let indices: Vec<u32> = reader
        .read_indices()
        .map_or_else(|| (0..count).collect(), |i| i.into_u32().collect());
    if let Some(bad) = indices.iter().find(|i| **i >= count) {
        return Err(AssetLoadError::Decode(format!(
            "index {bad} out of range for {count} vertices"
        )));
    }
    let indices = &indices[..indices.len() - indices.len() % 3];

    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
    if let Some(normals) = reader.read_normals() {
        let base = mesh.vertices.len() as u32;
        mesh.vertices.extend(positions.iter().zip(normals).map(
            |(position, normal)| MeshVertex {
                position: position.to_array(),
                normal: (normal_matrix * Vec3::from(normal))
                    .normalize_or_zero()
                    .to_array(),
            },
        ));
        mesh.indices.extend(indices.iter().map(|i| base + i));
    } else {
        // Flat shading: one vertex per corner with the face normal.
        for tri in indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| positions[i as usize]);
            let normal = (b - a).cross(c - a).normalize_or_zero().to_array();
            let base = mesh.vertices.len() as u32;
            mesh.vertices.extend([a, b, c].map(|p| MeshVertex {
                position: p.to_array(),
                normal,
            }));
            mesh.indices.extend([base, base + 1, base + 2]);
        }
    }
    Ok(true)
}

fn root_clip<'s, F>(
    animation: &gltf::Animation<'_>,
    root: usize,
    buffer_data: &F,
) -> AnimationClip
where
    F: Clone + Fn(gltf::Buffer<'_>) -> Option<&'s [u8]>,
{
    let mut clip = AnimationClip {
        name: animation.name().map(str::to_owned),
        translation: None,
        rotation: None,
        scale: None,
    };

    for channel in animation.channels() {
        if channel.target().node().index() != root {
            continue;
        }
        let reader = channel.reader(buffer_data.clone());
        let (Some(inputs), Some(outputs)) =
            (reader.read_inputs(), reader.read_outputs())
        else {
            continue;
        };
        let times: Vec<f32> = inputs.collect();
        let (interpolation, cubic) = match channel.sampler().interpolation() {
            gltf::animation::Interpolation::Linear => {
                (Interpolation::Linear, false)
            }
            gltf::animation::Interpolation::Step => (Interpolation::Step, false),
            gltf::animation::Interpolation::CubicSpline => {
                (Interpolation::Linear, true)
            }
        };

        match outputs {
            ReadOutputs::Translations(values) => {
                clip.translation = Track::new(
                    times,
                    keyframe_values(values.map(Vec3::from), cubic),
                    interpolation,
                );
            }
            ReadOutputs::Rotations(values) => {
                clip.rotation = Track::new(
                    times,
                    keyframe_values(values.into_f32().map(Quat::from_array), cubic),
                    interpolation,
                );
            }
            ReadOutputs::Scales(values) => {
                clip.scale = Track::new(
                    times,
                    keyframe_values(values.map(Vec3::from), cubic),
                    interpolation,
                );
            }
            ReadOutputs::MorphTargetWeights(_) => {}
        }
    }
    clip
}

/// Cubic-spline samplers store `in-tangent, value, out-tangent` per key;
/// only the values are kept.
fn keyframe_values<T>(values: impl Iterator<Item = T>, cubic: bool) -> Vec<T> {
    if cubic {
        values.skip(1).step_by(3).collect()
    } else {
        values.collect()
    }
}

/// Small binary glTF documents built in code.
#[cfg(test)]
pub(crate) mod test_assets {
    /// One triangle on a root node translated by +1 Y. With `animated`, the
    /// document has a 2 s "spin" clip rotating the root 90 degrees about Y.
    pub(crate) fn triangle_glb(animated: bool) -> Vec<u8> {
        let mut bin: Vec<u8> = Vec::with_capacity(84);
        let floats = |bin: &mut Vec<u8>, values: &[f32]| {
            for v in values {
                bin.extend_from_slice(&v.to_le_bytes());
            }
        };
        // positions @0
        floats(&mut bin, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        // u16 indices @36, padded to 44
        for i in [0u16, 1, 2] {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        bin.extend_from_slice(&[0, 0]);
        // key times @44
        floats(&mut bin, &[0.0, 2.0]);
        // rotations @52
        let h = std::f32::consts::FRAC_1_SQRT_2;
        floats(&mut bin, &[0.0, 0.0, 0.0, 1.0, 0.0, h, 0.0, h]);

        let animations = if animated {
            r#","animations":[{"name":"spin","channels":[{"sampler":0,"target":{"node":0,"path":"rotation"}}],"samplers":[{"input":2,"output":3,"interpolation":"LINEAR"}]}]"#
        } else {
            ""
        };
        let json = format!(
            r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[0]}}],"nodes":[{{"mesh":0,"translation":[0.0,1.0,0.0]}}],"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1}}]}}],"buffers":[{{"byteLength":84}}],"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}},{{"buffer":0,"byteOffset":36,"byteLength":6}},{{"buffer":0,"byteOffset":44,"byteLength":8}},{{"buffer":0,"byteOffset":52,"byteLength":32}}],"accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0.0,0.0,0.0],"max":[1.0,1.0,0.0]}},{{"bufferView":1,"componentType":5123,"count":3,"type":"SCALAR"}},{{"bufferView":2,"componentType":5126,"count":2,"type":"SCALAR","min":[0.0],"max":[2.0]}},{{"bufferView":3,"componentType":5126,"count":2,"type":"VEC4"}}]{animations}}}"#
        );
        glb(json.as_bytes(), &bin)
    }

    /// A document whose only node has no mesh.
    pub(crate) fn empty_scene_glb() -> Vec<u8> {
        let json = r#"{"asset":{"version":"2.0"},"scene":0,"scenes":[{"nodes":[0]}],"nodes":[{"name":"empty"}]}"#;
        glb(json.as_bytes(), &[])
    }

    fn glb(json: &[u8], bin: &[u8]) -> Vec<u8> {
        let pad = |len: usize| (4 - len % 4) % 4;
        let json_len = json.len() + pad(json.len());
        let bin_len = bin.len() + pad(bin.len());
        let bin_chunk = if bin.is_empty() { 0 } else { 8 + bin_len };
        let total = 12 + 8 + json_len + bin_chunk;

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());

        out.extend_from_slice(&(json_len as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(json);
        out.resize(out.len() + pad(json.len()), b' ');

        if !bin.is_empty() {
            out.extend_from_slice(&(bin_len as u32).to_le_bytes());
            out.extend_from_slice(b"BIN\0");
            out.extend_from_slice(bin);
            out.resize(out.len() + pad(bin.len()), 0);
        }
        out
    }
}
