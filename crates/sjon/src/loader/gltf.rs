//! # glTF — Loading 3D Models
//!
//! [glTF 2.0](https://www.khronos.org/gltf/) encodes meshes, materials,
//! textures, the node hierarchy, and keyframe animation. Both variants are
//! handled by the same decoder:
//!
//! - **`.gltf`**: JSON, with buffers and images as data URIs or as files
//!   next to it (fetched through the request's byte source).
//! - **`.glb`**: one binary container; buffer 0 is the embedded blob.
//!
//! ## What We Extract
//!
//! - The default scene's node tree, keeping each node's file index so
//!   animation channels can find it again.
//! - Triangle primitives: `POSITION`, `NORMAL` (computed when absent),
//!   `TEXCOORD_0`, indices.
//! - Metallic-roughness materials with their five texture slots. Materials
//!   and images are decoded once and shared by every primitive using them.
//! - Translation, rotation and scale animation channels.
//!
//! ## What We Skip
//!
//! - Skins and morph targets (the bind pose is rendered).
//! - Points and lines.
//! - `KHR_draco_mesh_compression`: there is no decoder for it, so such
//!   files fail with a decode error regardless of the `draco` option.

use std::sync::Arc;

use gltf::animation::util::ReadOutputs;
use gltf::mesh::Mode;
use log::{debug, warn};

use super::{FormatLoader, LoadRequest, LoadedModel, decode_texture, smooth_normals};
use crate::animation::{AnimationClip, Channel, ChannelValues, Interpolation};
use crate::error::LoadError;
use crate::math::{Color, Quat, Transform, Vec2, Vec3};
use crate::scene::{Geometry, Material, Mesh, Node, Texture};

const DRACO_EXTENSION: &[u8] = b"KHR_draco_mesh_compression";

pub struct GltfLoader;

impl FormatLoader for GltfLoader {
    fn extensions(&self) -> &[&'static str] {
        &[".glb", ".gltf"]
    }

    fn load(
        &self,
        request: &LoadRequest,
        progress: &mut dyn FnMut(f32),
    ) -> Result<LoadedModel, LoadError> {
        let bytes = request.fetch_main(progress)?;
        if bytes
            .windows(DRACO_EXTENSION.len())
            .any(|w| w == DRACO_EXTENSION)
        {
            let reason = if request.draco {
                "Draco-compressed meshes are not supported"
            } else {
                "Draco-compressed meshes require the draco option"
            };
            return Err(LoadError::decode(&request.url, reason));
        }

        let gltf = gltf::Gltf::from_slice(&bytes)
            .map_err(|e| LoadError::decode(&request.url, e.to_string()))?;
        let buffers = load_buffers(&gltf, request)?;
        let images = load_images(&gltf, &buffers, request);
        let materials: Vec<Arc<Material>> = gltf
            .materials()
            .map(|m| Arc::new(convert_material(&m, &images)))
            .collect();
        let fallback = Arc::new(Material::default());

        let meshes: Vec<Vec<Mesh>> = gltf
            .meshes()
            .map(|mesh| convert_mesh(&mesh, &buffers, &materials, &fallback))
            .collect();

        let mut root = Node::new("gltf");
        if let Some(scene) = gltf.default_scene().or_else(|| gltf.scenes().next()) {
            if let Some(name) = scene.name() {
                root.name = name.to_string();
            }
            root.children = scene.nodes().map(|n| convert_node(&n, &meshes)).collect();
        }

        let animations: Vec<AnimationClip> = gltf
            .animations()
            .map(|a| convert_animation(&a, &buffers))
            .collect();
        debug!(
            "gltf: {} meshes, {} materials, {} animations from {}",
            meshes.len(),
            materials.len(),
            animations.len(),
            request.url
        );
        Ok(LoadedModel { root, animations })
    }
}

// ---------------------------------------------------------------------------
// Buffers and images
// ---------------------------------------------------------------------------

fn load_buffers(gltf: &gltf::Gltf, request: &LoadRequest) -> Result<Vec<Vec<u8>>, LoadError> {
    gltf.buffers()
        .map(|buffer| {
            let data = match buffer.source() {
                gltf::buffer::Source::Bin => gltf.blob.clone().ok_or_else(|| {
                    LoadError::decode(&request.url, "binary chunk referenced but missing")
                })?,
                gltf::buffer::Source::Uri(uri) => request.fetch_related(uri)?,
            };
            if data.len() < buffer.length() {
                return Err(LoadError::decode(
                    &request.url,
                    format!(
                        "buffer {} holds {} bytes, expected {}",
                        buffer.index(),
                        data.len(),
                        buffer.length()
                    ),
                ));
            }
            Ok(data)
        })
        .collect()
}

/// Decode every image. Failures leave a hole and the material renders
/// without that texture.
fn load_images(
    gltf: &gltf::Gltf,
    buffers: &[Vec<u8>],
    request: &LoadRequest,
) -> Vec<Option<Arc<Texture>>> {
    gltf.images()
        .map(|image| {
            let label = format!("{}#image{}", request.url, image.index());
            let decoded = match image.source() {
                gltf::image::Source::View { view, .. } => buffers
                    .get(view.buffer().index())
                    .and_then(|data| data.get(view.offset()..view.offset() + view.length()))
                    .ok_or_else(|| LoadError::decode(&label, "buffer view out of range"))
                    .and_then(|bytes| decode_texture(&label, bytes)),
                gltf::image::Source::Uri { uri, .. } => request
                    .fetch_related(uri)
                    .and_then(|bytes| decode_texture(&label, &bytes)),
            };
            decoded
                .inspect_err(|e| warn!("gltf: skipping image: {e}"))
                .ok()
                .map(Arc::new)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Materials
// ---------------------------------------------------------------------------

fn convert_material(source: &gltf::Material<'_>, images: &[Option<Arc<Texture>>]) -> Material {
    let image = |texture: gltf::Texture<'_>| images.get(texture.source().index()).cloned().flatten();

    let pbr = source.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let [er, eg, eb] = source.emissive_factor();

    let mut material = Material::new(Color::rgb(r, g, b));
    material.name = source.name().map(str::to_string);
    material.opacity = a;
    material.metallic = pbr.metallic_factor();
    material.roughness = pbr.roughness_factor();
    material.emissive = Color::rgb(er, eg, eb);
    material.double_sided = source.double_sided();

    material.textures.base_color = pbr.base_color_texture().and_then(|t| image(t.texture()));
    material.textures.metallic_roughness = pbr
        .metallic_roughness_texture()
        .and_then(|t| image(t.texture()));
    material.textures.normal = source.normal_texture().and_then(|t| image(t.texture()));
    material.textures.occlusion = source.occlusion_texture().and_then(|t| image(t.texture()));
    material.textures.emissive = source.emissive_texture().and_then(|t| image(t.texture()));
    material
}

// ---------------------------------------------------------------------------
// Meshes and nodes
// ---------------------------------------------------------------------------

fn convert_mesh(
    mesh: &gltf::Mesh<'_>,
    buffers: &[Vec<u8>],
    materials: &[Arc<Material>],
    fallback: &Arc<Material>,
) -> Vec<Mesh> {
    let mut out = Vec::new();
    for primitive in mesh.primitives() {
        if primitive.mode() != Mode::Triangles {
            debug!("gltf: skipping {:?} primitive in mesh {}", primitive.mode(), mesh.index());
            continue;
        }
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));

        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let positions: Vec<Vec3> = positions.map(Vec3::from_array).collect();
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        let normals = match reader.read_normals() {
            Some(normals) => normals.map(Vec3::from_array).collect(),
            None => smooth_normals(&positions, &indices),
        };
        let uvs: Vec<Vec2> = reader
            .read_tex_coords(0)
            .map(|uvs| uvs.into_f32().map(Vec2::from_array).collect())
            .unwrap_or_default();

        let geometry = Geometry::new(positions, Some(indices))
            .with_normals(normals)
            .with_uvs(uvs);
        let material = primitive
            .material()
            .index()
            .and_then(|i| materials.get(i))
            .unwrap_or(fallback)
            .clone();
        out.push(Mesh::new(Arc::new(geometry), material));
    }
    out
}

fn convert_node(node: &gltf::Node<'_>, meshes: &[Vec<Mesh>]) -> Node {
    let (translation, rotation, scale) = node.transform().decomposed();
    let mut out = Node::new(
        node.name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node{}", node.index())),
    )
    .with_transform(Transform {
        translation: Vec3::from_array(translation),
        rotation: Quat::from_array(rotation),
        scale: Vec3::from_array(scale),
    });
    out.source_index = Some(node.index());
    if let Some(mesh) = node.mesh() {
        out.meshes = meshes.get(mesh.index()).cloned().unwrap_or_default();
    }
    out.children = node.children().map(|c| convert_node(&c, meshes)).collect();
    out
}

// ---------------------------------------------------------------------------
// Animation
// ---------------------------------------------------------------------------

fn convert_animation(animation: &gltf::Animation<'_>, buffers: &[Vec<u8>]) -> AnimationClip {
    let mut channels = Vec::new();
    for channel in animation.channels() {
        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
        let (Some(inputs), Some(outputs)) = (reader.read_inputs(), reader.read_outputs()) else {
            continue;
        };
        let times: Vec<f32> = inputs.collect();

        let sampler_mode = channel.sampler().interpolation();
        // Cubic spline keys are (in-tangent, value, out-tangent); keep the value.
        let cubic = sampler_mode == gltf::animation::Interpolation::CubicSpline;
        let keep = |i: usize| !cubic || i % 3 == 1;
        let values = match outputs {
            ReadOutputs::Translations(v) => ChannelValues::Translation(
                v.enumerate().filter(|(i, _)| keep(*i)).map(|(_, t)| Vec3::from_array(t)).collect(),
            ),
            ReadOutputs::Rotations(v) => ChannelValues::Rotation(
                v.into_f32()
                    .enumerate()
                    .filter(|(i, _)| keep(*i))
                    .map(|(_, q)| Quat::from_array(q).normalize())
                    .collect(),
            ),
            ReadOutputs::Scales(v) => ChannelValues::Scale(
                v.enumerate().filter(|(i, _)| keep(*i)).map(|(_, s)| Vec3::from_array(s)).collect(),
            ),
            ReadOutputs::MorphTargetWeights(_) => continue,
        };
        let interpolation = match sampler_mode {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            _ => Interpolation::Linear,
        };
        channels.push(Channel {
            node: channel.target().node().index(),
            times,
            values,
            interpolation,
        });
    }
    let name = animation
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("animation{}", animation.index()));
    AnimationClip::new(name, channels)
}
