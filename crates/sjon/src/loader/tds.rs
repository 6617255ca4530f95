//! 3D Studio (`.3ds`) decoding.
//!
//! A 3DS file is a tree of chunks, each a little-endian `u16` id and a `u32`
//! length that counts the six header bytes:
//!
//! ```text
//! 4D4D main
//! └─ 3D3D editor
//!    ├─ AFFF material ── A000 name, A020 diffuse (0010/0011 color),
//!    │                   A050 transparency (0030/0031 percent), A200 texture ── A300 file
//!    └─ 4000 named object (cstring name)
//!       └─ 4100 triangle mesh ── 4110 vertices, 4140 uvs,
//!                                4120 faces ── 4130 material group
//! ```
//!
//! Unknown chunks are skipped. Each named object becomes a child node with
//! one mesh per material group; faces outside any group use a default
//! material. Vertex positions are already in world space, so the local
//! mesh matrix is not applied.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use super::{FormatLoader, LoadRequest, LoadedModel, decode_texture, smooth_normals};
use crate::error::LoadError;
use crate::math::{Color, Vec2, Vec3};
use crate::scene::{Geometry, Material, Mesh, Node, Texture};

const MAIN: u16 = 0x4D4D;
const EDITOR: u16 = 0x3D3D;
const NAMED_OBJECT: u16 = 0x4000;
const TRIANGLE_MESH: u16 = 0x4100;
const VERTICES: u16 = 0x4110;
const FACES: u16 = 0x4120;
const FACE_MATERIAL: u16 = 0x4130;
const UVS: u16 = 0x4140;
const MATERIAL: u16 = 0xAFFF;
const MATERIAL_NAME: u16 = 0xA000;
const DIFFUSE: u16 = 0xA020;
const TRANSPARENCY: u16 = 0xA050;
const TEXTURE_MAP: u16 = 0xA200;
const MAP_FILE: u16 = 0xA300;
const COLOR_F32: u16 = 0x0010;
const COLOR_U8: u16 = 0x0011;
const LINEAR_COLOR_U8: u16 = 0x0012;
const PERCENT_U16: u16 = 0x0030;
const PERCENT_F32: u16 = 0x0031;

pub struct TdsLoader;

impl FormatLoader for TdsLoader {
    fn extensions(&self) -> &[&'static str] {
        &[".3ds"]
    }

    fn load(
        &self,
        request: &LoadRequest,
        progress: &mut dyn FnMut(f32),
    ) -> Result<LoadedModel, LoadError> {
        let bytes = request.fetch_main(progress)?;
        let file = parse(&bytes).map_err(|message| LoadError::decode(&request.url, message))?;
        debug!(
            "3ds: {} objects, {} materials from {}",
            file.objects.len(),
            file.materials.len(),
            request.url
        );
        Ok(LoadedModel::new(build(file, request)))
    }
}

// ---------------------------------------------------------------------------
// Chunk reading
// ---------------------------------------------------------------------------

struct Chunk<'a> {
    id: u16,
    data: &'a [u8],
}

/// Iterates sibling chunks in a byte range.
struct Chunks<'a> {
    rest: &'a [u8],
}

impl<'a> Chunks<'a> {
    fn new(rest: &'a [u8]) -> Self {
        Self { rest }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>, String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < 6 {
            return None;
        }
        let id = u16::from_le_bytes([self.rest[0], self.rest[1]]);
        let len = u32::from_le_bytes([self.rest[2], self.rest[3], self.rest[4], self.rest[5]]) as usize;
        if len < 6 || len > self.rest.len() {
            self.rest = &[];
            return Some(Err(format!("chunk {id:04X} has bad length {len}")));
        }
        let data = &self.rest[6..len];
        self.rest = &self.rest[len..];
        Some(Ok(Chunk { id, data }))
    }
}

/// A cursor over a chunk's own payload.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self.pos + n;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| format!("unexpected end of chunk at byte {}", self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, String> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn f32(&mut self) -> Result<f32, String> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn cstring(&mut self) -> Result<String, String> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or("unterminated string")?;
        self.pos += len + 1;
        Ok(String::from_utf8_lossy(&rest[..len]).into_owned())
    }

    fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }
}

// ---------------------------------------------------------------------------
// File model
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TdsMaterial {
    name: String,
    diffuse: Option<Color>,
    transparency: f32,
    texture: Option<String>,
}

#[derive(Debug, Default)]
struct TdsObject {
    name: String,
    positions: Vec<Vec3>,
    uvs: Vec<Vec2>,
    faces: Vec<[u32; 3]>,
    /// Material name and the faces it covers.
    groups: Vec<(String, Vec<usize>)>,
}

#[derive(Debug, Default)]
struct TdsFile {
    materials: Vec<TdsMaterial>,
    objects: Vec<TdsObject>,
}

fn parse(bytes: &[u8]) -> Result<TdsFile, String> {
    let main = Chunks::new(bytes)
        .next()
        .ok_or("file too short")??;
    if main.id != MAIN {
        return Err(format!("not a 3DS file (leading chunk {:04X})", main.id));
    }

    let mut file = TdsFile::default();
    for chunk in Chunks::new(main.data) {
        let chunk = chunk?;
        if chunk.id != EDITOR {
            continue;
        }
        for chunk in Chunks::new(chunk.data) {
            let chunk = chunk?;
            match chunk.id {
                MATERIAL => file.materials.push(parse_material(chunk.data)?),
                NAMED_OBJECT => {
                    if let Some(object) = parse_object(chunk.data)? {
                        file.objects.push(object);
                    }
                }
                _ => {}
            }
        }
    }
    Ok(file)
}

fn parse_material(data: &[u8]) -> Result<TdsMaterial, String> {
    let mut material = TdsMaterial::default();
    for chunk in Chunks::new(data) {
        let chunk = chunk?;
        match chunk.id {
            MATERIAL_NAME => material.name = Reader::new(chunk.data).cstring()?,
            DIFFUSE => material.diffuse = parse_color(chunk.data)?,
            TRANSPARENCY => material.transparency = parse_percent(chunk.data)?.unwrap_or(0.0),
            TEXTURE_MAP => {
                for sub in Chunks::new(chunk.data) {
                    let sub = sub?;
                    if sub.id == MAP_FILE {
                        material.texture = Some(Reader::new(sub.data).cstring()?);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(material)
}

fn parse_color(data: &[u8]) -> Result<Option<Color>, String> {
    for chunk in Chunks::new(data) {
        let chunk = chunk?;
        let mut r = Reader::new(chunk.data);
        match chunk.id {
            COLOR_F32 => return Ok(Some(Color::rgb(r.f32()?, r.f32()?, r.f32()?))),
            COLOR_U8 | LINEAR_COLOR_U8 => {
                let b = r.take(3)?;
                return Ok(Some(Color::from_rgb8(b[0], b[1], b[2])));
            }
            _ => {}
        }
    }
    Ok(None)
}

/// A percentage as a fraction in \[0, 1\].
fn parse_percent(data: &[u8]) -> Result<Option<f32>, String> {
    for chunk in Chunks::new(data) {
        let chunk = chunk?;
        let mut r = Reader::new(chunk.data);
        match chunk.id {
            PERCENT_U16 => return Ok(Some(r.u16()? as f32 / 100.0)),
            PERCENT_F32 => return Ok(Some(r.f32()? / 100.0)),
            _ => {}
        }
    }
    Ok(None)
}

/// Named objects that are not triangle meshes (lights, cameras) yield `None`.
fn parse_object(data: &[u8]) -> Result<Option<TdsObject>, String> {
    let mut reader = Reader::new(data);
    let name = reader.cstring()?;
    let mut object = None;
    for chunk in Chunks::new(reader.remaining()) {
        let chunk = chunk?;
        if chunk.id == TRIANGLE_MESH {
            let mut mesh = parse_mesh(chunk.data)?;
            mesh.name = name.clone();
            object = Some(mesh);
        }
    }
    Ok(object)
}

fn parse_mesh(data: &[u8]) -> Result<TdsObject, String> {
    let mut object = TdsObject::default();
    for chunk in Chunks::new(data) {
        let chunk = chunk?;
        let mut r = Reader::new(chunk.data);
        match chunk.id {
            VERTICES => {
                let count = r.u16()?;
                for _ in 0..count {
                    object.positions.push(Vec3::new(r.f32()?, r.f32()?, r.f32()?));
                }
            }
            UVS => {
                let count = r.u16()?;
                for _ in 0..count {
                    object.uvs.push(Vec2::new(r.f32()?, r.f32()?));
                }
            }
            FACES => {
                let count = r.u16()?;
                for _ in 0..count {
                    let face = [r.u16()? as u32, r.u16()? as u32, r.u16()? as u32];
                    r.u16()?; // edge flags
                    object.faces.push(face);
                }
                for sub in Chunks::new(r.remaining()) {
                    let sub = sub?;
                    if sub.id != FACE_MATERIAL {
                        continue;
                    }
                    let mut g = Reader::new(sub.data);
                    let material = g.cstring()?;
                    let n = g.u16()?;
                    let faces = (0..n)
                        .map(|_| g.u16().map(usize::from))
                        .collect::<Result<Vec<_>, _>>()?;
                    object.groups.push((material, faces));
                }
            }
            _ => {}
        }
    }
    Ok(object)
}

// ---------------------------------------------------------------------------
// Scene building
// ---------------------------------------------------------------------------

fn build(file: TdsFile, request: &LoadRequest) -> Node {
    let mut textures: HashMap<String, Option<Arc<Texture>>> = HashMap::new();
    let materials: HashMap<String, Arc<Material>> = file
        .materials
        .iter()
        .map(|m| {
            let texture = m.texture.as_ref().and_then(|path| {
                textures
                    .entry(path.clone())
                    .or_insert_with(|| {
                        request
                            .fetch_related(path)
                            .and_then(|bytes| decode_texture(path, &bytes))
                            .inspect_err(|e| warn!("3ds: skipping texture: {e}"))
                            .ok()
                            .map(Arc::new)
                    })
                    .clone()
            });
            (m.name.clone(), Arc::new(convert_material(m, texture)))
        })
        .collect();
    let fallback = Arc::new(Material::new(Color::WHITE));

    let mut root = Node::new("3ds");
    for object in file.objects {
        let mut node = Node::new(object.name.clone());
        let all: Vec<u32> = object.faces.iter().flatten().copied().collect();
        let normals = smooth_normals(&object.positions, &all);

        let mut grouped = vec![false; object.faces.len()];
        let mut parts: Vec<(Vec<u32>, Arc<Material>)> = Vec::new();
        for (name, faces) in &object.groups {
            let indices: Vec<u32> = faces
                .iter()
                .filter_map(|&f| {
                    let face = object.faces.get(f)?;
                    grouped[f] = true;
                    Some(*face)
                })
                .flatten()
                .collect();
            let material = materials.get(name).unwrap_or(&fallback).clone();
            parts.push((indices, material));
        }
        let ungrouped: Vec<u32> = object
            .faces
            .iter()
            .zip(&grouped)
            .filter(|(_, g)| !**g)
            .flat_map(|(face, _)| *face)
            .collect();
        if !ungrouped.is_empty() {
            parts.push((ungrouped, fallback.clone()));
        }

        for (indices, material) in parts {
            if indices.is_empty() {
                continue;
            }
            let geometry = Geometry::new(object.positions.clone(), Some(indices))
                .with_normals(normals.clone())
                .with_uvs(object.uvs.clone());
            node.meshes.push(Mesh::new(Arc::new(geometry), material));
        }
        root.children.push(node);
    }
    root
}

fn convert_material(source: &TdsMaterial, texture: Option<Arc<Texture>>) -> Material {
    let mut material = Material::new(source.diffuse.unwrap_or(Color::WHITE)).named(source.name.clone());
    material.opacity = (1.0 - source.transparency).clamp(0.0, 1.0);
    material.textures.base_color = texture;
    material
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileSource;

    fn chunk(id: u16, body: &[u8]) -> Vec<u8> {
        let mut out = id.to_le_bytes().to_vec();
        out.extend_from_slice(&((body.len() + 6) as u32).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn cstr(s: &str) -> Vec<u8> {
        let mut out = s.as_bytes().to_vec();
        out.push(0);
        out
    }

    fn u16s(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn f32s(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// One material and one two-triangle quad, first face in the group.
    fn sample() -> Vec<u8> {
        let material = chunk(
            MATERIAL,
            &[
                chunk(MATERIAL_NAME, &cstr("Blue")),
                chunk(DIFFUSE, &chunk(COLOR_U8, &[0, 0, 255])),
                chunk(TRANSPARENCY, &chunk(PERCENT_U16, &u16s(&[25]))),
            ]
            .concat(),
        );

        let vertices = [u16s(&[4]), f32s(&[0., 0., 0., 1., 0., 0., 1., 1., 0., 0., 1., 0.])].concat();
        let group = chunk(FACE_MATERIAL, &[cstr("Blue"), u16s(&[1, 0])].concat());
        let faces = [u16s(&[2, 0, 1, 2, 0, 0, 2, 3, 0]), group].concat();
        let mesh = chunk(TRIANGLE_MESH, &[chunk(VERTICES, &vertices), chunk(FACES, &faces)].concat());
        let object = chunk(NAMED_OBJECT, &[cstr("Box01"), mesh].concat());
        let light = chunk(NAMED_OBJECT, &[cstr("Omni01"), chunk(0x4600, &f32s(&[0., 5., 0.]))].concat());

        let editor = chunk(EDITOR, &[material, object, light].concat());
        chunk(MAIN, &[chunk(0x0002, &[3, 0, 0, 0]), editor].concat())
    }

    #[test]
    fn parses_materials_and_objects() {
        let file = parse(&sample()).unwrap();
        assert_eq!(file.materials.len(), 1);
        assert_eq!(file.materials[0].name, "Blue");
        assert_eq!(file.materials[0].diffuse, Some(Color::from_rgb8(0, 0, 255)));
        assert_eq!(file.objects.len(), 1);
        assert_eq!(file.objects[0].faces, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn material_groups_split_meshes() {
        let request = LoadRequest::new("box.3ds", Arc::new(FileSource::new()));
        let root = build(parse(&sample()).unwrap(), &request);
        let node = &root.children[0];
        assert_eq!(node.name, "Box01");
        assert_eq!(node.meshes.len(), 2);
        assert_eq!(node.meshes[0].material.name.as_deref(), Some("Blue"));
        assert!((node.meshes[0].material.opacity - 0.75).abs() < 1e-6);
        assert_eq!(node.meshes[0].geometry.triangle_count(), 1);
        assert_eq!(node.meshes[1].material.base_color, Color::WHITE);
    }

    #[test]
    fn rejects_other_files() {
        assert!(parse(&chunk(0x1234, &[])).is_err());
        assert!(parse(&[0x4D]).is_err());
        let mut truncated = sample();
        truncated.truncate(40);
        assert!(parse(&truncated).is_err());
    }
}
