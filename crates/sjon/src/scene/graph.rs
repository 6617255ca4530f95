//! # Scene Graph — Nodes, Meshes, and GPU-Resident Resources
//!
//! A decoded model is a tree of [`Node`]s. Each node has a local
//! [`Transform`], zero or more [`Mesh`]es, and children. Meshes point at
//! shared [`Geometry`] and [`Material`] through `Arc`, so one material used by
//! a hundred meshes is still one resource.
//!
//! ## Resource identity
//!
//! Every geometry, material and texture gets a process-unique [`ResourceId`]
//! when it is created. Render backends key their GPU copies by that id and
//! the disposal visitor releases by id, which is what makes "free each shared
//! resource exactly once" checkable.
//!
//! ## World transforms
//!
//! [`Node::visit`] walks the tree breadth-first, handing each node its world
//! matrix (`parent_world * local`). Parents are always visited before their
//! children.
//!
//! ```text
//!  root (scale 0.2)
//!   ├─ body      world = root * body
//!   │   └─ wheel world = root * body * wheel
//!   └─ handle    world = root * handle
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::math::{Aabb, Color, Mat4, Transform, Vec2, Vec3};

// ---------------------------------------------------------------------------
// ResourceId
// ---------------------------------------------------------------------------

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a GPU-resident resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Allocate a fresh id. Safe to call from decoder worker threads.
    pub fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Triangle geometry in bind pose.
///
/// The bounding box is computed once at construction from the raw positions,
/// so it never reflects skinning or animation.
#[derive(Debug)]
pub struct Geometry {
    id: ResourceId,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    /// Triangle list. `None` means every three positions form a triangle.
    pub indices: Option<Vec<u32>>,
    bounds: Aabb,
}

impl Geometry {
    pub fn new(positions: Vec<Vec3>, indices: Option<Vec<u32>>) -> Self {
        let bounds = Aabb::from_points(positions.iter().copied());
        Self {
            id: ResourceId::next(),
            positions,
            normals: Vec::new(),
            uvs: Vec::new(),
            indices,
            bounds,
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = uvs;
        self
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Bind-pose bounds in the geometry's local space.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Iterate triangles as vertex index triples. Out-of-range indices are
    /// skipped.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        let count = self.positions.len() as u32;
        let tris: Box<dyn Iterator<Item = [u32; 3]> + '_> = match &self.indices {
            Some(indices) => Box::new(indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]])),
            None => Box::new((0..count / 3).map(|t| [t * 3, t * 3 + 1, t * 3 + 2])),
        };
        tris.filter(move |t| t.iter().all(|&i| i < count))
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles().count()
    }
}

/// RGBA8 texture.
pub struct Texture {
    id: ResourceId,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Texture {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            id: ResourceId::next(),
            width,
            height,
            rgba,
        }
    }

    pub fn from_image(image: &image::DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        Self::new(rgba.width(), rgba.height(), rgba.into_raw())
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Mean color, used by the headless rasterizer in place of sampling.
    pub fn average_color(&self) -> Color {
        let pixels = self.rgba.len() / 4;
        if pixels == 0 {
            return Color::WHITE;
        }
        let mut sum = [0u64; 3];
        for px in self.rgba.chunks_exact(4) {
            sum[0] += px[0] as u64;
            sum[1] += px[1] as u64;
            sum[2] += px[2] as u64;
        }
        let avg = |s: u64| (s / pixels as u64) as u8;
        Color::from_rgb8(avg(sum[0]), avg(sum[1]), avg(sum[2]))
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Texture slots a material can reference.
#[derive(Debug, Clone, Default)]
pub struct MaterialTextures {
    pub base_color: Option<Arc<Texture>>,
    pub normal: Option<Arc<Texture>>,
    pub metallic_roughness: Option<Arc<Texture>>,
    pub emissive: Option<Arc<Texture>>,
    pub occlusion: Option<Arc<Texture>>,
}

impl MaterialTextures {
    /// Every occupied slot.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Texture>> {
        [
            &self.base_color,
            &self.normal,
            &self.metallic_roughness,
            &self.emissive,
            &self.occlusion,
        ]
        .into_iter()
        .flatten()
    }
}

/// PBR material.
#[derive(Debug)]
pub struct Material {
    id: ResourceId,
    pub name: Option<String>,
    pub base_color: Color,
    pub opacity: f32,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: Color,
    pub double_sided: bool,
    pub textures: MaterialTextures,
}

impl Material {
    pub fn new(base_color: Color) -> Self {
        Self {
            id: ResourceId::next(),
            name: None,
            base_color,
            opacity: 1.0,
            metallic: 0.0,
            roughness: 1.0,
            emissive: Color::BLACK,
            double_sided: false,
            textures: MaterialTextures::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn is_transparent(&self) -> bool {
        self.opacity < 1.0
    }
}

impl Default for Material {
    /// Light gray, fully rough. Used when a format carries no material.
    fn default() -> Self {
        Self::new(Color::rgb(0.8, 0.8, 0.8))
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: Arc<Material>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl Mesh {
    pub fn new(geometry: Arc<Geometry>, material: Arc<Material>) -> Self {
        Self {
            geometry,
            material,
            cast_shadow: false,
            receive_shadow: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: String,
    /// Position in the source file's node list, used to bind animation
    /// channels. `None` for synthesized nodes.
    pub source_index: Option<usize>,
    pub transform: Transform,
    pub meshes: Vec<Mesh>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Breadth-first walk handing each node its world matrix. The root's
    /// world matrix is `parent * root.transform`.
    pub fn visit(&self, parent: Mat4, mut f: impl FnMut(&Node, &Mat4)) {
        let mut queue: VecDeque<(&Node, Mat4)> = VecDeque::new();
        queue.push_back((self, parent));
        while let Some((node, parent_matrix)) = queue.pop_front() {
            let world = parent_matrix * node.transform.matrix();
            f(node, &world);
            for child in &node.children {
                queue.push_back((child, world));
            }
        }
    }

    /// Depth-first mutable walk over every mesh in the subtree.
    pub fn for_each_mesh_mut(&mut self, f: &mut impl FnMut(&mut Mesh)) {
        for mesh in &mut self.meshes {
            f(mesh);
        }
        for child in &mut self.children {
            child.for_each_mesh_mut(f);
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len() + self.children.iter().map(Node::mesh_count).sum::<usize>()
    }

    /// Find the node decoded from `index` in the source file.
    pub fn find_by_source_index_mut(&mut self, index: usize) -> Option<&mut Node> {
        if self.source_index == Some(index) {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_by_source_index_mut(index))
    }

    /// World-space bounds of every mesh geometry in bind pose.
    pub fn bind_pose_bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        self.visit(Mat4::IDENTITY, |node, world| {
            for mesh in &node.meshes {
                let local = mesh.geometry.bounds();
                if !local.is_empty() {
                    bounds.union(&local.transformed(world));
                }
            }
        });
        bounds
    }

    /// Multiply the root scale so the largest dimension of `bounds` becomes
    /// `target_size`. Returns the applied factor; degenerate bounds return 1
    /// and leave the node untouched.
    pub fn scale_to_fit(&mut self, bounds: &Aabb, target_size: f32) -> f32 {
        let max_dim = bounds.max_dimension();
        if max_dim <= 0.0 || !max_dim.is_finite() {
            return 1.0;
        }
        let factor = target_size / max_dim;
        self.transform.scale *= factor;
        factor
    }

    /// Shift the root so the center of `bounds` lands on the origin.
    pub fn center_on_origin(&mut self, bounds: &Aabb) -> Vec3 {
        let center = bounds.center();
        self.transform.translation -= center;
        center
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(half: f32) -> Arc<Geometry> {
        let positions = vec![
            Vec3::new(-half, -half, -half),
            Vec3::new(half, -half, -half),
            Vec3::new(half, half, -half),
            Vec3::new(-half, half, half),
        ];
        Arc::new(Geometry::new(positions, Some(vec![0, 1, 2, 0, 2, 3])))
    }

    #[test]
    fn resource_ids_are_unique() {
        let a = Geometry::new(Vec::new(), None);
        let b = Material::default();
        let c = Texture::new(1, 1, vec![0; 4]);
        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
    }

    #[test]
    fn visit_composes_parent_transforms() {
        let root = Node::new("root")
            .with_transform(Transform::from_xyz(1.0, 0.0, 0.0))
            .with_child(
                Node::new("child")
                    .with_transform(Transform::from_xyz(0.0, 2.0, 0.0))
                    .with_child(Node::new("leaf").with_transform(Transform::from_xyz(0.0, 0.0, 3.0))),
            );
        let mut seen = Vec::new();
        root.visit(Mat4::IDENTITY, |node, world| {
            seen.push((node.name.clone(), world.transform_point3(Vec3::ZERO)));
        });
        assert_eq!(seen[0], ("root".to_string(), Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(seen[1], ("child".to_string(), Vec3::new(1.0, 2.0, 0.0)));
        assert_eq!(seen[2], ("leaf".to_string(), Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn bounds_include_child_transforms() {
        let material = Arc::new(Material::default());
        let root = Node::new("root").with_child(
            Node::new("offset")
                .with_transform(Transform::from_xyz(10.0, 0.0, 0.0))
                .with_mesh(Mesh::new(cube(1.0), material)),
        );
        let b = root.bind_pose_bounds();
        assert_eq!(b.min.x, 9.0);
        assert_eq!(b.max.x, 11.0);
    }

    #[test]
    fn scale_then_center_normalizes_to_target_size() {
        let material = Arc::new(Material::default());
        let geometry = Arc::new(Geometry::new(
            vec![Vec3::new(-5.0, 0.0, 0.0), Vec3::new(5.0, 1.0, 2.0), Vec3::new(3.0, 4.0, 1.0)],
            None,
        ));
        let mut root = Node::new("root")
            .with_transform(Transform::from_xyz(7.0, -3.0, 1.0))
            .with_mesh(Mesh::new(geometry, material));

        let raw = root.bind_pose_bounds();
        root.scale_to_fit(&raw, 2.0);
        let scaled = root.bind_pose_bounds();
        root.center_on_origin(&scaled);

        let normalized = root.bind_pose_bounds();
        assert!((normalized.max_dimension() - 2.0).abs() < 1e-5);
        assert!(normalized.center().length() < 1e-5);
    }

    #[test]
    fn empty_model_is_left_alone() {
        let mut root = Node::new("empty");
        let bounds = root.bind_pose_bounds();
        assert!(bounds.is_empty());
        assert_eq!(root.scale_to_fit(&bounds, 2.0), 1.0);
        assert_eq!(root.transform, Transform::IDENTITY);
    }

    #[test]
    fn texture_slots_iterate_occupied_only() {
        let mut material = Material::default();
        material.textures.base_color = Some(Arc::new(Texture::new(1, 1, vec![255; 4])));
        material.textures.emissive = Some(Arc::new(Texture::new(1, 1, vec![0; 4])));
        assert_eq!(material.textures.iter().count(), 2);
    }

    #[test]
    fn triangles_skip_out_of_range_indices() {
        let g = Geometry::new(vec![Vec3::ZERO; 3], Some(vec![0, 1, 2, 0, 1, 9]));
        assert_eq!(g.triangle_count(), 1);
    }
}
