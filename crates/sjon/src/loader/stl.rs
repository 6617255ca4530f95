//! STL decoding, ASCII and binary.
//!
//! ```text
//! binary:  UINT8[80] header │ UINT32 n │ n × (REAL32[3] normal, REAL32[3] × 3, UINT16 attr)
//! ascii:   solid … facet normal … outer loop / vertex x y z ×3 / endloop endfacet … endsolid
//! ```
//!
//! A payload whose length is exactly `84 + 50n` for its own face count is
//! binary even if the header happens to start with `solid`.
//!
//! Triangles are unshared, so each vertex takes its face's normal. The
//! result is a single gray mesh under one root node.

use std::sync::Arc;

use log::debug;

use super::{FormatLoader, LoadRequest, LoadedModel};
use crate::error::LoadError;
use crate::math::{Color, Vec3};
use crate::scene::{Geometry, Material, Mesh, Node};

const HEADER_SIZE: usize = 80;
const TRIANGLE_SIZE: usize = 50;

pub struct StlLoader;

impl FormatLoader for StlLoader {
    fn extensions(&self) -> &[&'static str] {
        &[".stl"]
    }

    fn load(
        &self,
        request: &LoadRequest,
        progress: &mut dyn FnMut(f32),
    ) -> Result<LoadedModel, LoadError> {
        let bytes = request.fetch_main(progress)?;
        let positions = parse(&bytes).map_err(|message| LoadError::decode(&request.url, message))?;
        debug!("stl: {} triangles from {}", positions.len() / 3, request.url);
        Ok(LoadedModel::new(build_node(positions)))
    }
}

/// Triangle corners, three per face.
pub fn parse(bytes: &[u8]) -> Result<Vec<Vec3>, String> {
    if is_binary(bytes) {
        parse_binary(bytes)
    } else {
        parse_ascii(bytes)
    }
}

fn is_binary(bytes: &[u8]) -> bool {
    if bytes.len() >= HEADER_SIZE + 4 {
        let faces = read_u32(&bytes[HEADER_SIZE..]) as usize;
        if faces
            .checked_mul(TRIANGLE_SIZE)
            .and_then(|n| n.checked_add(HEADER_SIZE + 4))
            == Some(bytes.len())
        {
            return true;
        }
    }
    let head = &bytes[..bytes.len().min(HEADER_SIZE)];
    !String::from_utf8_lossy(head).trim_start().starts_with("solid")
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

fn read_vec3(buf: &[u8]) -> Vec3 {
    let f = |i: usize| f32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
    Vec3::new(f(0), f(4), f(8))
}

fn parse_binary(bytes: &[u8]) -> Result<Vec<Vec3>, String> {
    if bytes.len() < HEADER_SIZE + 4 {
        return Err(format!("binary STL too short: {} bytes", bytes.len()));
    }
    let faces = read_u32(&bytes[HEADER_SIZE..]) as usize;
    let body = &bytes[HEADER_SIZE + 4..];
    if body.len() / TRIANGLE_SIZE < faces {
        return Err(format!(
            "binary STL declares {faces} faces but holds {}",
            body.len() / TRIANGLE_SIZE
        ));
    }

    let mut positions = Vec::with_capacity(faces * 3);
    for tri in body.chunks_exact(TRIANGLE_SIZE).take(faces) {
        // Skip the stored normal; it is often wrong.
        positions.push(read_vec3(&tri[12..24]));
        positions.push(read_vec3(&tri[24..36]));
        positions.push(read_vec3(&tri[36..48]));
    }
    Ok(positions)
}

fn parse_ascii(bytes: &[u8]) -> Result<Vec<Vec3>, String> {
    let text = String::from_utf8_lossy(bytes);
    let mut positions = Vec::new();
    let mut corners: Vec<Vec3> = Vec::with_capacity(3);

    for (line_no, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };
        match keyword.to_ascii_lowercase().as_str() {
            "outer" => corners.clear(),
            "vertex" => {
                let coords: Vec<f32> = parts
                    .take(3)
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .map_err(|e| format!("line {}: {e}", line_no + 1))?;
                let [x, y, z] = coords[..] else {
                    return Err(format!("line {}: vertex needs three coordinates", line_no + 1));
                };
                corners.push(Vec3::new(x, y, z));
            }
            "endfacet" => {
                if corners.len() == 3 {
                    positions.append(&mut corners);
                }
                corners.clear();
            }
            _ => {}
        }
    }

    if positions.is_empty() && !text.contains("facet") {
        return Err("no facets found".into());
    }
    Ok(positions)
}

fn build_node(positions: Vec<Vec3>) -> Node {
    let normals = positions
        .chunks_exact(3)
        .flat_map(|tri| {
            let n = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize_or(Vec3::Y);
            [n; 3]
        })
        .collect();
    let geometry = Geometry::new(positions, None).with_normals(normals);

    let mut material = Material::new(Color::from_rgb8(0x80, 0x80, 0x80));
    material.roughness = 0.5;
    material.metallic = 0.3;

    Node::new("stl").with_mesh(Mesh::new(Arc::new(geometry), Arc::new(material)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TETRA: &str = "solid tetra
  facet normal 0 0 -1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
  facet normal 0 -1 0
    outer loop
      vertex 0 0 0
      vertex 0 0 1
      vertex 1 0 0
    endloop
  endfacet
endsolid tetra
";

    fn binary(triangles: &[[Vec3; 3]], header: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[..header.len()].copy_from_slice(header);
        bytes.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
        for tri in triangles {
            bytes.extend_from_slice(&[0u8; 12]);
            for v in tri {
                for c in v.to_array() {
                    bytes.extend_from_slice(&c.to_le_bytes());
                }
            }
            bytes.extend_from_slice(&[0u8; 2]);
        }
        bytes
    }

    #[test]
    fn ascii_facets() {
        let positions = parse(TETRA.as_bytes()).unwrap();
        assert_eq!(positions.len(), 6);
        assert_eq!(positions[4], Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn binary_facets() {
        let tri = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let positions = parse(&binary(&[tri, tri], b"exported")).unwrap();
        assert_eq!(positions.len(), 6);
        assert_eq!(positions[1], Vec3::X);
    }

    #[test]
    fn binary_header_starting_with_solid() {
        let tri = [Vec3::ZERO, Vec3::Z, Vec3::Y];
        let positions = parse(&binary(&[tri], b"solid but binary")).unwrap();
        assert_eq!(positions, tri.to_vec());
    }

    #[test]
    fn truncated_binary_is_an_error() {
        let mut bytes = binary(&[[Vec3::ZERO, Vec3::X, Vec3::Y]], b"x");
        bytes[HEADER_SIZE] = 9;
        assert!(parse(&bytes).is_err());
        assert!(parse(&[1, 2, 3]).is_err());
    }

    #[test]
    fn face_normals_and_gray_material() {
        let node = build_node(parse(TETRA.as_bytes()).unwrap());
        let mesh = &node.meshes[0];
        assert_eq!(mesh.geometry.normals[0], Vec3::Z);
        assert_eq!(mesh.material.base_color.to_rgb8(), [0x80, 0x80, 0x80]);
        assert_eq!(mesh.geometry.triangle_count(), 2);
    }
}
