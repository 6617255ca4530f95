//! CPU rasterizer backend.
//!
//! Flat-shaded, z-buffered triangles into an RGBA8 buffer. Each face is lit
//! by the rig's ambient term plus a Lambert term per directional light, then
//! tone mapped. Textures contribute their average color rather than being
//! sampled. It is deliberately simple: the point is a backend that renders
//! something recognizable and can be captured without a GPU.
//!
//! Every [`release`](RenderBackend::release) is recorded in a shared
//! [`ReleaseLog`] so callers can check that each resource was freed exactly
//! once, even after the viewer owning the backend is gone.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;

use image::{ImageFormat, RgbaImage};
use log::{debug, trace};

use crate::camera::PerspectiveCamera;
use crate::config::ToneMapping;
use crate::error::CaptureError;
use crate::math::{Color, Mat4, Vec3, Vec4};
use crate::render::RenderBackend;
use crate::scene::{Geometry, Material, ResourceId, Scene};

/// Shared record of released resource ids and how often each was released.
#[derive(Debug, Clone, Default)]
pub struct ReleaseLog(Rc<RefCell<HashMap<ResourceId, u32>>>);

impl ReleaseLog {
    fn record(&self, id: ResourceId) {
        *self.0.borrow_mut().entry(id).or_insert(0) += 1;
    }

    /// How many times `id` was released.
    pub fn count(&self, id: ResourceId) -> u32 {
        self.0.borrow().get(&id).copied().unwrap_or(0)
    }

    /// Number of distinct ids released.
    pub fn distinct(&self) -> usize {
        self.0.borrow().len()
    }

    /// Ids released more than once.
    pub fn duplicates(&self) -> Vec<ResourceId> {
        let mut dups: Vec<_> = self
            .0
            .borrow()
            .iter()
            .filter(|(_, n)| **n > 1)
            .map(|(id, _)| *id)
            .collect();
        dups.sort();
        dups
    }
}

pub struct HeadlessRenderer {
    width: u32,
    height: u32,
    pixel_ratio: f32,
    tone_mapping: ToneMapping,
    exposure: f32,
    shadows: bool,
    frame: RgbaImage,
    depth: Vec<f32>,
    frames_rendered: u64,
    releases: ReleaseLog,
    capture_blocked: bool,
    disposed: bool,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self {
            width: 1,
            height: 1,
            pixel_ratio: 1.0,
            tone_mapping: ToneMapping::Aces,
            exposure: 1.0,
            shadows: false,
            frame: RgbaImage::new(1, 1),
            depth: vec![f32::INFINITY],
            frames_rendered: 0,
            releases: ReleaseLog::default(),
            capture_blocked: false,
            disposed: false,
        }
    }

    /// Refuse frame readback, the way a browser does once a cross-origin
    /// texture has tainted the canvas.
    pub fn block_capture(&mut self, blocked: bool) {
        self.capture_blocked = blocked;
    }

    pub fn release_log(&self) -> ReleaseLog {
        self.releases.clone()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn tone_mapping(&self) -> (&ToneMapping, f32) {
        (&self.tone_mapping, self.exposure)
    }

    /// Size of the drawing buffer in device pixels.
    pub fn buffer_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.pixel_ratio).round() as u32).max(1);
        (scale(self.width), scale(self.height))
    }

    /// The last rendered frame.
    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    fn ensure_buffers(&mut self) {
        let (w, h) = self.buffer_size();
        if self.frame.dimensions() != (w, h) {
            self.frame = RgbaImage::new(w, h);
        }
        self.depth.clear();
        self.depth.resize((w * h) as usize, f32::INFINITY);
    }
}

/// Tone-mapping state copied out of the renderer for the duration of a frame.
#[derive(Debug, Clone)]
struct Shading {
    tone_mapping: ToneMapping,
    exposure: f32,
}

impl Shading {
    fn tone_map(&self, c: f32) -> f32 {
        let x = c * self.exposure;
        let mapped = match self.tone_mapping {
            ToneMapping::Off => c,
            ToneMapping::Linear => x,
            ToneMapping::Reinhard => x / (1.0 + x),
            // Narkowicz ACES fit.
            ToneMapping::Aces | ToneMapping::Other(_) => {
                (x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14)
            }
            ToneMapping::Filmic => {
                let y = (x - 0.004).max(0.0);
                ((y * (6.2 * y + 0.5)) / (y * (6.2 * y + 1.7) + 0.06)).powf(2.2)
            }
        };
        mapped.clamp(0.0, 1.0)
    }

    fn shade(&self, scene: &Scene, material: &Material, normal: Vec3) -> [u8; 4] {
        let rgb = |c: Color| Vec3::from_array(c.to_array());
        let lights = &scene.lights;
        let mut light = rgb(lights.ambient.color) * lights.ambient.intensity;
        for dir in lights.directional() {
            let lambert = normal.dot(-dir.direction()).max(0.0);
            light += rgb(dir.color) * dir.intensity * lambert;
        }
        if let Some(env) = &scene.environment {
            light += rgb(env.average_color()) * 0.5;
        }

        let mut base = rgb(material.base_color);
        if let Some(tex) = &material.textures.base_color {
            base *= rgb(tex.average_color());
        }
        let lit = base * light + rgb(material.emissive);
        let q = |c: f32| (self.tone_map(c) * 255.0).round() as u8;
        let alpha = (material.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(lit.x), q(lit.y), q(lit.z), alpha]
    }
}

/// Color and depth buffers being drawn into.
struct Target<'a> {
    frame: &'a mut RgbaImage,
    depth: &'a mut [f32],
}

impl Target<'_> {
    fn draw(
        &mut self,
        geometry: &Geometry,
        model: &Mat4,
        view_proj: &Mat4,
        depth_write: bool,
        color_for: impl Fn(Vec3) -> [u8; 4],
    ) {
        let (w, h) = self.frame.dimensions();
        let (wf, hf) = (w as f32, h as f32);

        for [a, b, c] in geometry.triangles() {
            let world = [a, b, c].map(|i| model.transform_point3(geometry.positions[i as usize]));
            let normal = (world[1] - world[0]).cross(world[2] - world[0]).normalize_or_zero();
            if normal == Vec3::ZERO {
                continue;
            }

            let clip = world.map(|p| *view_proj * Vec4::new(p.x, p.y, p.z, 1.0));
            // No near-plane clipping: triangles reaching behind the eye are skipped.
            if clip.iter().any(|v| v.w <= 1e-6) {
                continue;
            }
            let screen = clip.map(|v| {
                let ndc = v.truncate() / v.w;
                Vec3::new((ndc.x + 1.0) * 0.5 * wf, (1.0 - ndc.y) * 0.5 * hf, ndc.z)
            });

            let area = edge(screen[0], screen[1], screen[2]);
            if area.abs() < f32::EPSILON {
                continue;
            }
            let rgba = color_for(normal);

            let (lo, hi) = screen.iter().fold(
                (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
                |(lo, hi), p| (lo.min(*p), hi.max(*p)),
            );
            if hi.x < 0.0 || hi.y < 0.0 || lo.x >= wf || lo.y >= hf {
                continue;
            }
            let (x0, x1) = (lo.x.floor().max(0.0) as u32, hi.x.ceil().min(wf - 1.0) as u32);
            let (y0, y1) = (lo.y.floor().max(0.0) as u32, hi.y.ceil().min(hf - 1.0) as u32);

            for y in y0..=y1 {
                for x in x0..=x1 {
                    let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
                    let w0 = edge(screen[1], screen[2], p) / area;
                    let w1 = edge(screen[2], screen[0], p) / area;
                    let w2 = edge(screen[0], screen[1], p) / area;
                    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                        continue;
                    }
                    let z = w0 * screen[0].z + w1 * screen[1].z + w2 * screen[2].z;
                    if !(-1.0..=1.0).contains(&z) {
                        continue;
                    }
                    let idx = (y * w + x) as usize;
                    if z >= self.depth[idx] {
                        continue;
                    }
                    if depth_write {
                        self.depth[idx] = z;
                    }
                    blend(self.frame.get_pixel_mut(x, y), rgba);
                }
            }
        }
    }
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn edge(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn blend(dst: &mut image::Rgba<u8>, src: [u8; 4]) {
    let a = src[3] as f32 / 255.0;
    for i in 0..3 {
        dst.0[i] = (src[i] as f32 * a + dst.0[i] as f32 * (1.0 - a)).round() as u8;
    }
    dst.0[3] = dst.0[3].max(src[3]);
}

impl RenderBackend for HeadlessRenderer {
    fn set_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = if ratio > 0.0 { ratio } else { 1.0 };
    }

    fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn set_tone_mapping(&mut self, mode: ToneMapping, exposure: f32) {
        self.tone_mapping = mode;
        self.exposure = exposure;
    }

    fn set_shadows_enabled(&mut self, enabled: bool) {
        self.shadows = enabled;
    }

    fn shadows_enabled(&self) -> bool {
        self.shadows
    }

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) {
        if self.disposed {
            return;
        }
        self.ensure_buffers();
        let clear = match scene.clear_color() {
            Some(c) => {
                let [r, g, b] = c.to_rgb8();
                image::Rgba([r, g, b, 255])
            }
            None => image::Rgba([0, 0, 0, 0]),
        };
        for px in self.frame.pixels_mut() {
            *px = clear;
        }

        let view_proj = camera.view_projection();
        let shading = Shading {
            tone_mapping: self.tone_mapping.clone(),
            exposure: self.exposure,
        };
        let mut target = Target {
            frame: &mut self.frame,
            depth: &mut self.depth,
        };

        if let Some(model) = scene.model() {
            model.visit(Mat4::IDENTITY, |node, world| {
                for mesh in &node.meshes {
                    let material = &mesh.material;
                    target.draw(&mesh.geometry, world, &view_proj, true, |n| {
                        shading.shade(scene, material, n)
                    });
                }
            });
        }

        if self.shadows {
            if let Some(ground) = &scene.ground {
                let alpha = (ground.opacity().clamp(0.0, 1.0) * 255.0).round() as u8;
                target.draw(&ground.geometry, &Mat4::IDENTITY, &view_proj, false, |_| {
                    [0, 0, 0, alpha]
                });
            }
        }

        self.frames_rendered += 1;
        trace!("headless frame {} rendered", self.frames_rendered);
    }

    fn capture_png(&mut self) -> Result<Vec<u8>, CaptureError> {
        if self.capture_blocked {
            return Err(CaptureError::Blocked("canvas is tainted".to_string()));
        }
        let mut bytes = Cursor::new(Vec::new());
        self.frame.write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    fn release(&mut self, id: ResourceId) {
        debug!("releasing resource {}", id.raw());
        self.releases.record(id);
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.frame = RgbaImage::new(1, 1);
        self.depth = vec![f32::INFINITY];
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
