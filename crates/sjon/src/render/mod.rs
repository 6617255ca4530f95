//! # Render Backends
//!
//! The viewer never talks to a GPU directly. It drives a [`RenderBackend`]:
//! size the surface, pick tone mapping and shadows, draw a [`Scene`] through
//! a camera, read the frame back as PNG, and release resources by
//! [`ResourceId`] when their owners are disposed.
//!
//! ```text
//!   Viewer ──render(scene, camera)──▶ RenderBackend
//!          ──release(id)────────────▶   (drops its copy of that resource)
//!          ──capture_png()──────────▶   PNG bytes / CaptureError
//! ```
//!
//! [`HeadlessRenderer`] is the built-in backend: a small CPU rasterizer that
//! needs no window or GPU, which is what tests, tools and server-side
//! thumbnailing use.

mod headless;

pub use headless::{HeadlessRenderer, ReleaseLog};

use std::any::Any;

use crate::camera::PerspectiveCamera;
use crate::config::ToneMapping;
use crate::error::CaptureError;
use crate::scene::{ResourceId, Scene};

pub trait RenderBackend: Any {
    /// Set the logical surface size. The drawing buffer is this times the
    /// pixel ratio.
    fn set_size(&mut self, width: u32, height: u32);

    fn size(&self) -> (u32, u32);

    fn set_pixel_ratio(&mut self, ratio: f32);

    fn pixel_ratio(&self) -> f32;

    /// `mode` is already resolved (never [`ToneMapping::Other`]).
    fn set_tone_mapping(&mut self, mode: ToneMapping, exposure: f32);

    fn set_shadows_enabled(&mut self, enabled: bool);

    fn shadows_enabled(&self) -> bool;

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera);

    /// Encode the last rendered frame as PNG.
    fn capture_png(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Drop the backend's copy of a geometry, material, texture, light or
    /// render target. Called exactly once per resource.
    fn release(&mut self, id: ResourceId);

    /// Tear down the backend itself.
    fn dispose(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
