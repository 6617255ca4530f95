//! # Scene
//!
//! The [`Scene`] is everything the render backend draws: background,
//! optional environment, the lighting rig, at most one model root, and the
//! optional ground shadow plane. The viewer owns it exclusively.
//!
//! Attaching a model while another is present is a logic error; the load
//! pipeline always detaches and disposes the previous root first.

mod graph;

pub use graph::{Geometry, Material, MaterialTextures, Mesh, Node, ResourceId, Texture};

use log::warn;

use crate::config::LightingConfig;
use crate::lighting::{Environment, GroundPlane, LightingRig};
use crate::math::Color;

/// What fills pixels no geometry covers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Background {
    /// Cleared to transparent.
    #[default]
    None,
    Color(Color),
    /// The environment map's image, when one is loaded.
    Environment,
}

impl Background {
    /// `"transparent"` clears the background; anything else must parse as a
    /// color. Unparseable values are logged and treated as transparent.
    pub fn from_css(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("transparent") {
            return Self::None;
        }
        match Color::parse(value) {
            Some(color) => Self::Color(color),
            None => {
                warn!("unrecognized background \"{value}\", using transparent");
                Self::None
            }
        }
    }
}

#[derive(Debug)]
pub struct Scene {
    pub background: Background,
    pub environment: Option<Environment>,
    pub lights: LightingRig,
    model: Option<Node>,
    pub ground: Option<GroundPlane>,
}

impl Scene {
    pub fn new(background: Background, lighting: &LightingConfig) -> Self {
        Self {
            background,
            environment: None,
            lights: LightingRig::new(lighting),
            model: None,
            ground: None,
        }
    }

    pub fn model(&self) -> Option<&Node> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut Node> {
        self.model.as_mut()
    }

    /// Attach a model root. The slot must be empty.
    pub fn attach_model(&mut self, root: Node) {
        debug_assert!(self.model.is_none(), "previous model was not detached");
        self.model = Some(root);
    }

    /// Detach the model root, handing ownership (and the duty to release its
    /// resources) to the caller.
    pub fn detach_model(&mut self) -> Option<Node> {
        self.model.take()
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// The color the backend clears to, if any.
    pub fn clear_color(&self) -> Option<Color> {
        match self.background {
            Background::None => None,
            Background::Color(c) => Some(c),
            Background::Environment => self.environment.as_ref().map(Environment::average_color),
        }
    }
}
