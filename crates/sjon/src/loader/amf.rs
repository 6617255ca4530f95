//! AMF (Additive Manufacturing File) decoding.
//!
//! AMF is XML, optionally inside a ZIP archive:
//!
//! ```text
//! <amf unit="millimeter">
//!   <material id="2"><color><r>1</r><g>0</g><b>0</b></color></material>
//!   <object id="0">
//!     <metadata type="name">bracket</metadata>
//!     <mesh>
//!       <vertices><vertex><coordinates><x>0</x><y>0</y><z>0</z></coordinates></vertex>…</vertices>
//!       <volume materialid="2"><triangle><v1>0</v1><v2>1</v2><v3>2</v3></triangle>…</volume>
//!     </mesh>
//!   </object>
//! </amf>
//! ```
//!
//! Each object becomes a child node with one mesh per volume. A volume's
//! color wins over its material's, which wins over the object's. The root is
//! scaled by the document unit so that one scene unit is one millimeter.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use log::debug;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use zip::ZipArchive;

use super::{FormatLoader, LoadRequest, LoadedModel, smooth_normals};
use crate::error::LoadError;
use crate::math::{Color, Transform, Vec3};
use crate::scene::{Geometry, Material, Mesh, Node};

const ZIP_MAGIC: &[u8] = b"PK";

pub struct AmfLoader;

impl FormatLoader for AmfLoader {
    fn extensions(&self) -> &[&'static str] {
        &[".amf"]
    }

    fn load(
        &self,
        request: &LoadRequest,
        progress: &mut dyn FnMut(f32),
    ) -> Result<LoadedModel, LoadError> {
        let bytes = request.fetch_main(progress)?;
        let decode = |message: String| LoadError::decode(&request.url, message);
        let xml = if bytes.starts_with(ZIP_MAGIC) {
            unzip(&bytes).map_err(decode)?
        } else {
            String::from_utf8(bytes).map_err(|e| decode(format!("not UTF-8: {e}")))?
        };
        let document = parse(&xml).map_err(decode)?;
        debug!("amf: {} objects from {}", document.objects.len(), request.url);
        Ok(LoadedModel::new(build(document)))
    }
}

/// Read the first `.amf` entry of the archive, or its first entry if none is
/// named that way.
fn unzip(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("invalid ZIP archive: {e}"))?;
    let index = (0..archive.len())
        .find(|&i| {
            archive
                .by_index(i)
                .is_ok_and(|file| file.name().to_ascii_lowercase().ends_with(".amf"))
        })
        .unwrap_or(0);
    let mut file = archive
        .by_index(index)
        .map_err(|e| format!("failed to read archive entry: {e}"))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| format!("failed to read archive entry: {e}"))?;
    Ok(content)
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rgba {
    color: Color,
    alpha: f32,
}

#[derive(Debug, Default)]
struct Volume {
    material_id: Option<String>,
    color: Option<Rgba>,
    indices: Vec<u32>,
}

#[derive(Debug, Default)]
struct Object {
    name: Option<String>,
    color: Option<Rgba>,
    positions: Vec<Vec3>,
    volumes: Vec<Volume>,
}

#[derive(Debug)]
struct Document {
    scale: f32,
    materials: HashMap<String, Rgba>,
    objects: Vec<Object>,
}

#[derive(Debug, Clone, Copy)]
enum ColorTarget {
    Material,
    Object,
    Volume,
}

/// Millimeters per unit.
fn unit_scale(unit: &str) -> f32 {
    match unit.to_ascii_lowercase().as_str() {
        "inch" => 25.4,
        "feet" => 304.8,
        "meter" => 1000.0,
        "micron" => 0.001,
        _ => 1.0,
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
}

fn parse_number<T: std::str::FromStr>(tag: &str, text: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse()
        .map_err(|e| format!("invalid <{tag}> value {text:?}: {e}"))
}

fn parse(xml: &str) -> Result<Document, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut document = Document {
        scale: 1.0,
        materials: HashMap::new(),
        objects: Vec::new(),
    };
    let mut saw_root = false;
    let mut path: Vec<String> = Vec::new();

    let mut object: Option<Object> = None;
    let mut volume: Option<Volume> = None;
    let mut material_id: Option<String> = None;
    let mut coords = [0.0f32; 3];
    let mut triangle = [0u32; 3];
    let mut color: Option<(ColorTarget, [f32; 4])> = None;
    let mut naming = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("XML parse error at {}: {e}", reader.buffer_position()))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "amf" => {
                        saw_root = true;
                        if let Some(unit) = attribute(e, "unit") {
                            document.scale = unit_scale(&unit);
                        }
                    }
                    "object" => object = Some(Object::default()),
                    "volume" => {
                        volume = Some(Volume {
                            material_id: attribute(e, "materialid"),
                            ..Default::default()
                        })
                    }
                    "material" => material_id = attribute(e, "id"),
                    "coordinates" => coords = [0.0; 3],
                    "color" => {
                        let target = match path.last().map(String::as_str) {
                            Some("material") => Some(ColorTarget::Material),
                            Some("object") => Some(ColorTarget::Object),
                            Some("volume") => Some(ColorTarget::Volume),
                            _ => None,
                        };
                        color = target.map(|t| (t, [0.0, 0.0, 0.0, 1.0]));
                    }
                    "metadata" => {
                        naming = path.last().is_some_and(|p| p == "object")
                            && attribute(e, "type").as_deref() == Some("name");
                    }
                    _ => {}
                }
                if matches!(event, Event::Start(_)) {
                    path.push(name);
                } else {
                    close(&name, &mut document, &mut object, &mut volume, &mut material_id, &mut color, coords, triangle);
                }
            }
            Event::End(_) => {
                if let Some(name) = path.pop() {
                    close(&name, &mut document, &mut object, &mut volume, &mut material_id, &mut color, coords, triangle);
                    if name == "metadata" {
                        naming = false;
                    }
                }
            }
            Event::Text(ref t) => {
                let text = t.unescape().map_err(|e| format!("XML text error: {e}"))?;
                let Some(tag) = path.last().map(String::as_str) else {
                    continue;
                };
                match tag {
                    "x" => coords[0] = parse_number(tag, &text)?,
                    "y" => coords[1] = parse_number(tag, &text)?,
                    "z" => coords[2] = parse_number(tag, &text)?,
                    "v1" => triangle[0] = parse_number(tag, &text)?,
                    "v2" => triangle[1] = parse_number(tag, &text)?,
                    "v3" => triangle[2] = parse_number(tag, &text)?,
                    "r" | "g" | "b" | "a" => {
                        if let Some((_, rgba)) = color.as_mut() {
                            let slot = match tag {
                                "r" => 0,
                                "g" => 1,
                                "b" => 2,
                                _ => 3,
                            };
                            rgba[slot] = parse_number(tag, &text)?;
                        }
                    }
                    "metadata" if naming => {
                        if let Some(object) = object.as_mut() {
                            object.name = Some(text.into_owned());
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err("missing <amf> root element".into());
    }
    Ok(document)
}

/// Fold a finished element into its parent.
#[allow(clippy::too_many_arguments)]
fn close(
    name: &str,
    document: &mut Document,
    object: &mut Option<Object>,
    volume: &mut Option<Volume>,
    material_id: &mut Option<String>,
    color: &mut Option<(ColorTarget, [f32; 4])>,
    coords: [f32; 3],
    triangle: [u32; 3],
) {
    match name {
        "coordinates" => {
            if let Some(object) = object.as_mut() {
                object.positions.push(Vec3::from_array(coords));
            }
        }
        "triangle" => {
            if let Some(volume) = volume.as_mut() {
                volume.indices.extend_from_slice(&triangle);
            }
        }
        "volume" => {
            if let (Some(object), Some(volume)) = (object.as_mut(), volume.take()) {
                object.volumes.push(volume);
            }
        }
        "object" => {
            if let Some(object) = object.take() {
                document.objects.push(object);
            }
        }
        "material" => *material_id = None,
        "color" => {
            let Some((target, [r, g, b, a])) = color.take() else {
                return;
            };
            let rgba = Rgba {
                color: Color::rgb(r, g, b),
                alpha: a,
            };
            match target {
                ColorTarget::Material => {
                    if let Some(id) = material_id.clone() {
                        document.materials.insert(id, rgba);
                    }
                }
                ColorTarget::Object => {
                    if let Some(object) = object.as_mut() {
                        object.color = Some(rgba);
                    }
                }
                ColorTarget::Volume => {
                    if let Some(volume) = volume.as_mut() {
                        volume.color = Some(rgba);
                    }
                }
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Scene building
// ---------------------------------------------------------------------------

fn build(document: Document) -> Node {
    let mut materials: HashMap<String, Arc<Material>> = HashMap::new();
    let mut root = Node::new("amf").with_transform(Transform::IDENTITY.with_scale(document.scale));

    for (index, object) in document.objects.into_iter().enumerate() {
        let name = object.name.clone().unwrap_or_else(|| format!("object{index}"));
        let mut node = Node::new(name);
        let all: Vec<u32> = object.volumes.iter().flat_map(|v| v.indices.iter().copied()).collect();
        let normals = smooth_normals(&object.positions, &all);

        for volume in object.volumes {
            if volume.indices.is_empty() {
                continue;
            }
            let material = match (volume.color, volume.material_id.as_ref()) {
                (Some(rgba), _) => Arc::new(material_from(rgba)),
                (None, Some(id)) => match document.materials.get(id) {
                    Some(rgba) => materials
                        .entry(id.clone())
                        .or_insert_with(|| Arc::new(material_from(*rgba)))
                        .clone(),
                    None => Arc::new(material_from_object(object.color)),
                },
                (None, None) => Arc::new(material_from_object(object.color)),
            };
            let geometry = Geometry::new(object.positions.clone(), Some(volume.indices))
                .with_normals(normals.clone());
            node.meshes.push(Mesh::new(Arc::new(geometry), material));
        }
        root.children.push(node);
    }
    root
}

fn material_from(rgba: Rgba) -> Material {
    let mut material = Material::new(rgba.color);
    material.opacity = rgba.alpha.clamp(0.0, 1.0);
    material
}

fn material_from_object(color: Option<Rgba>) -> Material {
    color.map(material_from).unwrap_or_else(|| Material::new(Color::WHITE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileSource;
    use std::io::Write;

    const CUBE_CORNER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<amf unit="inch" version="1.1">
  <material id="2">
    <color><r>1</r><g>0</g><b>0</b><a>0.5</a></color>
  </material>
  <object id="0">
    <metadata type="name">corner</metadata>
    <color><r>0</r><g>1</g><b>0</b></color>
    <mesh>
      <vertices>
        <vertex><coordinates><x>0</x><y>0</y><z>0</z></coordinates></vertex>
        <vertex><coordinates><x>1</x><y>0</y><z>0</z></coordinates></vertex>
        <vertex><coordinates><x>0</x><y>1</y><z>0</z></coordinates></vertex>
        <vertex><coordinates><x>0</x><y>0</y><z>1</z></coordinates></vertex>
      </vertices>
      <volume materialid="2">
        <triangle><v1>0</v1><v2>1</v2><v3>2</v3></triangle>
      </volume>
      <volume>
        <triangle><v1>0</v1><v2>3</v2><v3>1</v3></triangle>
      </volume>
    </mesh>
  </object>
</amf>
"#;

    fn zipped(xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file("readme.txt", options).unwrap();
        writer.write_all(b"not the model").unwrap();
        writer.start_file("part.amf", options).unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn parses_objects_and_volumes() {
        let document = parse(CUBE_CORNER).unwrap();
        assert_eq!(document.scale, 25.4);
        assert_eq!(document.objects.len(), 1);
        let object = &document.objects[0];
        assert_eq!(object.name.as_deref(), Some("corner"));
        assert_eq!(object.positions.len(), 4);
        assert_eq!(object.volumes.len(), 2);
        assert_eq!(object.volumes[1].indices, vec![0, 3, 1]);
    }

    #[test]
    fn colors_cascade() {
        let root = build(parse(CUBE_CORNER).unwrap());
        assert_eq!(root.transform.scale, Vec3::splat(25.4));
        let meshes = &root.children[0].meshes;
        assert_eq!(meshes[0].material.base_color, Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(meshes[0].material.opacity, 0.5);
        assert_eq!(meshes[1].material.base_color, Color::rgb(0.0, 1.0, 0.0));
    }

    #[test]
    fn zipped_documents() {
        let xml = unzip(&zipped(CUBE_CORNER)).unwrap();
        assert_eq!(xml, CUBE_CORNER);
    }

    #[test]
    fn loads_through_byte_source() {
        use base64::Engine as _;
        let uri = format!(
            "data:model/amf;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(zipped(CUBE_CORNER))
        );
        let request = LoadRequest::new(uri, Arc::new(FileSource::new()));
        let model = AmfLoader.load(&request, &mut |_| {}).unwrap();
        assert_eq!(model.root.children[0].mesh_count(), 2);
    }

    #[test]
    fn rejects_non_amf() {
        assert!(parse("<stl/>").is_err());
        assert!(parse("<amf><object><mesh><vertices><vertex><coordinates><x>nope</x>").is_err());
    }
}
