//! Wavefront OBJ decoding, with an optional MTL material library.
//!
//! Parsing and triangulation are done by `tobj`. Each OBJ object becomes a
//! child node of the returned root. Materials are only read when the load
//! request names an MTL URL; the OBJ's own `mtllib` line is not followed on
//! its own. A broken MTL file or texture is logged and the model loads with
//! default materials.
//!
//! Materials from the library are converted to the viewer's PBR model with
//! roughness 0.7 and no metalness.

use std::collections::HashMap;
use std::io::BufReader;
use std::sync::Arc;

use log::{debug, warn};

use super::{FormatLoader, LoadRequest, LoadedModel, decode_texture, smooth_normals};
use crate::error::LoadError;
use crate::math::{Color, Vec2, Vec3};
use crate::scene::{Geometry, Material, Mesh, Node, Texture};

const ROUGHNESS: f32 = 0.7;

pub struct ObjLoader;

impl FormatLoader for ObjLoader {
    fn extensions(&self) -> &[&'static str] {
        &[".obj"]
    }

    fn load(
        &self,
        request: &LoadRequest,
        progress: &mut dyn FnMut(f32),
    ) -> Result<LoadedModel, LoadError> {
        let mtl = request.mtl_url.as_deref().and_then(|url| {
            request
                .source
                .fetch(url, &mut |_| {})
                .inspect_err(|e| warn!("obj: ignoring material library: {e}"))
                .ok()
                .map(|bytes| (url, bytes))
        });

        let bytes = request.fetch_main(progress)?;
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let (models, materials) =
            tobj::load_obj_buf(&mut BufReader::new(bytes.as_slice()), &options, |_| match &mtl {
                Some((_, mtl_bytes)) => tobj::load_mtl_buf(&mut BufReader::new(mtl_bytes.as_slice())),
                None => Ok(Default::default()),
            })
            .map_err(|e| LoadError::decode(&request.url, e.to_string()))?;

        let materials = match materials {
            Ok(materials) => materials,
            Err(e) => {
                warn!("obj: material library unusable: {e}");
                Vec::new()
            }
        };
        let mtl_url = mtl.map(|(url, _)| url).unwrap_or(request.url.as_str());
        let mut textures = TextureCache::default();
        let converted: Vec<Arc<Material>> = materials
            .iter()
            .map(|m| Arc::new(convert_material(m, mtl_url, request, &mut textures)))
            .collect();
        let fallback = Arc::new(Material::new(Color::WHITE));

        let mut root = Node::new("obj");
        for model in models {
            let mesh = &model.mesh;
            if mesh.positions.is_empty() {
                continue;
            }
            let material = mesh
                .material_id
                .and_then(|i| converted.get(i))
                .unwrap_or(&fallback)
                .clone();
            root.children.push(
                Node::new(model.name.clone())
                    .with_mesh(Mesh::new(Arc::new(build_geometry(mesh)), material)),
            );
        }
        debug!("obj: {} objects from {}", root.children.len(), request.url);
        Ok(LoadedModel::new(root))
    }
}

fn build_geometry(mesh: &tobj::Mesh) -> Geometry {
    let positions: Vec<Vec3> = mesh
        .positions
        .chunks_exact(3)
        .map(|p| Vec3::new(p[0], p[1], p[2]))
        .collect();
    let indices = if mesh.indices.is_empty() {
        (0..positions.len() as u32).collect()
    } else {
        mesh.indices.clone()
    };
    let normals = if mesh.normals.len() == mesh.positions.len() {
        mesh.normals
            .chunks_exact(3)
            .map(|n| Vec3::new(n[0], n[1], n[2]))
            .collect()
    } else {
        smooth_normals(&positions, &indices)
    };
    let uvs = mesh
        .texcoords
        .chunks_exact(2)
        .map(|t| Vec2::new(t[0], t[1]))
        .collect();
    Geometry::new(positions, Some(indices))
        .with_normals(normals)
        .with_uvs(uvs)
}

#[derive(Default)]
struct TextureCache {
    by_url: HashMap<String, Option<Arc<Texture>>>,
}

impl TextureCache {
    fn get(&mut self, url: String, request: &LoadRequest) -> Option<Arc<Texture>> {
        self.by_url
            .entry(url)
            .or_insert_with_key(|url| {
                request
                    .source
                    .fetch(url, &mut |_| {})
                    .and_then(|bytes| decode_texture(url, &bytes))
                    .inspect_err(|e| warn!("obj: skipping texture: {e}"))
                    .ok()
                    .map(Arc::new)
            })
            .clone()
    }
}

fn convert_material(
    source: &tobj::Material,
    mtl_url: &str,
    request: &LoadRequest,
    textures: &mut TextureCache,
) -> Material {
    let [r, g, b] = source.diffuse.unwrap_or([1.0; 3]);
    let mut material = Material::new(Color::rgb(r, g, b)).named(source.name.clone());
    material.roughness = ROUGHNESS;
    material.metallic = 0.0;
    material.opacity = source.dissolve.unwrap_or(1.0).clamp(0.0, 1.0);
    if let Some(path) = source.diffuse_texture.as_deref() {
        let url = crate::source::resolve_relative(mtl_url, path);
        material.textures.base_color = textures.get(url, request);
    }
    if let Some(path) = source.normal_texture.as_deref() {
        let url = crate::source::resolve_relative(mtl_url, path);
        material.textures.normal = textures.get(url, request);
    }
    material
}
