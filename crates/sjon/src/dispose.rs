//! Deduplicated resource disposal.
//!
//! Meshes share geometry, materials share textures, and the same material
//! often sits on many meshes. A [`Disposer`] walks whatever it is given and
//! releases each [`ResourceId`] through the backend at most once, no matter
//! how many times it is reached.
//!
//! ```text
//!  mesh A ─┬─ geometry #7 ──────────────▶ release(#7)
//!          └─ material #9 ─┬─ tex #12 ──▶ release(#12)
//!  mesh B ─┬─ geometry #7   (seen)       └▶ release(#9)
//!          └─ material #9   (seen)
//! ```

use std::collections::HashSet;

use crate::lighting::{GroundPlane, LightingRig};
use crate::render::RenderBackend;
use crate::scene::{Geometry, Material, Node, ResourceId};

pub struct Disposer<'a> {
    backend: &'a mut dyn RenderBackend,
    released: HashSet<ResourceId>,
}

impl<'a> Disposer<'a> {
    pub fn new(backend: &'a mut dyn RenderBackend) -> Self {
        Self {
            backend,
            released: HashSet::new(),
        }
    }

    /// Release `id` unless this disposer already did.
    pub fn release(&mut self, id: ResourceId) {
        if self.released.insert(id) {
            self.backend.release(id);
        }
    }

    pub fn geometry(&mut self, geometry: &Geometry) {
        self.release(geometry.id());
    }

    /// Release the material's textures, then the material.
    pub fn material(&mut self, material: &Material) {
        if self.released.contains(&material.id()) {
            return;
        }
        for texture in material.textures.iter() {
            self.release(texture.id());
        }
        self.release(material.id());
    }

    /// Release every geometry, material and texture in the subtree.
    pub fn node(&mut self, root: &Node) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            for mesh in &node.meshes {
                self.geometry(&mesh.geometry);
                self.material(&mesh.material);
            }
            stack.extend(node.children.iter());
        }
    }

    pub fn lights(&mut self, rig: &LightingRig) {
        for id in rig.resource_ids() {
            self.release(id);
        }
    }

    pub fn ground(&mut self, plane: &GroundPlane) {
        for id in plane.resource_ids() {
            self.release(id);
        }
    }

    /// Number of distinct resources released so far.
    pub fn released_count(&self) -> usize {
        self.released.len()
    }
}

/// Release everything a detached model root owns. Returns the number of
/// distinct resources released.
pub fn dispose_node(backend: &mut dyn RenderBackend, root: &Node) -> usize {
    let mut disposer = Disposer::new(backend);
    disposer.node(root);
    disposer.released_count()
}
