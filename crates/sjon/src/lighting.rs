//! # Lighting — Four-Light Rig, Ground Shadow, Environment Map
//!
//! Every viewer gets the same studio rig at construction:
//!
//! ```text
//!               key (5, 8, 5) ☀ casts shadows
//!                    ╲
//!   rim (0, 4, -8) ☀  ╲        ambient 0.4 everywhere
//!          ╲     ┌───────┐
//!           ╲    │ model │
//!                └───────┘
//!                    ╱
//!   fill (-5, 4, -3) ☀
//! ```
//!
//! [`LightingConfig`] overrides are applied on top of the defaults and can be
//! patched into a live rig. When an environment map arrives the rig is
//! dimmed to half its configured intensities so the image-based light does
//! not wash the model out.
//!
//! The [`GroundPlane`] is a shadow-catching quad placed under the normalized
//! model, three times its largest dimension wide.

use log::warn;

use crate::config::{DirectionalLightConfig, LightingConfig};
use crate::error::LoadError;
use crate::math::{Aabb, Color, Vec3};
use crate::scene::{Geometry, Material, ResourceId, Texture};

// ---------------------------------------------------------------------------
// Lights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AmbientLight {
    id: ResourceId,
    pub color: Color,
    pub intensity: f32,
}

impl AmbientLight {
    pub fn id(&self) -> ResourceId {
        self.id
    }
}

#[derive(Debug, Clone)]
pub struct DirectionalLight {
    id: ResourceId,
    /// Shadow map render target owned by this light.
    shadow_map: ResourceId,
    pub color: Color,
    pub intensity: f32,
    pub position: Vec3,
    pub cast_shadow: bool,
}

impl DirectionalLight {
    fn new(defaults: LightDefaults, config: Option<&DirectionalLightConfig>) -> Self {
        let mut light = Self {
            id: ResourceId::next(),
            shadow_map: ResourceId::next(),
            color: Color::WHITE,
            intensity: defaults.intensity,
            position: defaults.position,
            cast_shadow: defaults.cast_shadow,
        };
        if let Some(config) = config {
            light.apply(config);
        }
        light
    }

    fn apply(&mut self, config: &DirectionalLightConfig) {
        if let Some(intensity) = config.intensity {
            self.intensity = intensity;
        }
        if let Some(color) = &config.color {
            self.color = parse_color(color, self.color);
        }
        if let Some(position) = config.position {
            self.position = Vec3::from_array(position);
        }
        if let Some(cast_shadow) = config.cast_shadow {
            self.cast_shadow = cast_shadow;
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn shadow_map(&self) -> ResourceId {
        self.shadow_map
    }

    /// Unit vector from the light toward the origin.
    pub fn direction(&self) -> Vec3 {
        (-self.position).normalize_or(Vec3::NEG_Y)
    }
}

#[derive(Debug, Clone, Copy)]
struct LightDefaults {
    intensity: f32,
    position: Vec3,
    cast_shadow: bool,
}

const AMBIENT_INTENSITY: f32 = 0.4;
const KEY: LightDefaults = LightDefaults {
    intensity: 1.0,
    position: Vec3::new(5.0, 8.0, 5.0),
    cast_shadow: true,
};
const FILL: LightDefaults = LightDefaults {
    intensity: 0.5,
    position: Vec3::new(-5.0, 4.0, -3.0),
    cast_shadow: false,
};
const RIM: LightDefaults = LightDefaults {
    intensity: 0.7,
    position: Vec3::new(0.0, 4.0, -8.0),
    cast_shadow: false,
};

/// Multiplier applied to the rig once an environment map is lit.
const IBL_DIMMING: f32 = 0.5;

fn parse_color(s: &str, fallback: Color) -> Color {
    Color::parse(s).unwrap_or_else(|| {
        warn!("unrecognized light color \"{s}\", keeping previous");
        fallback
    })
}

/// Ambient plus key, fill and rim directional lights.
#[derive(Debug, Clone)]
pub struct LightingRig {
    pub ambient: AmbientLight,
    pub key: DirectionalLight,
    pub fill: DirectionalLight,
    pub rim: DirectionalLight,
    /// Configured intensities (ambient, key, fill, rim) before IBL dimming.
    base: [f32; 4],
    dimmed: bool,
}

impl LightingRig {
    pub fn new(config: &LightingConfig) -> Self {
        let mut rig = Self {
            ambient: AmbientLight {
                id: ResourceId::next(),
                color: Color::WHITE,
                intensity: AMBIENT_INTENSITY,
            },
            key: DirectionalLight::new(KEY, None),
            fill: DirectionalLight::new(FILL, None),
            rim: DirectionalLight::new(RIM, None),
            base: [0.0; 4],
            dimmed: false,
        };
        rig.apply(config);
        rig
    }

    /// Patch the rig in place. Only fields present in `config` change.
    pub fn apply(&mut self, config: &LightingConfig) {
        if self.dimmed {
            let [ambient, key, fill, rim] = self.base;
            self.ambient.intensity = ambient;
            self.key.intensity = key;
            self.fill.intensity = fill;
            self.rim.intensity = rim;
        }
        if let Some(intensity) = config.ambient_intensity {
            self.ambient.intensity = intensity;
        }
        if let Some(color) = &config.ambient_color {
            self.ambient.color = parse_color(color, self.ambient.color);
        }
        if let Some(key) = &config.key_light {
            self.key.apply(key);
        }
        if let Some(fill) = &config.fill_light {
            self.fill.apply(fill);
        }
        if let Some(rim) = &config.rim_light {
            self.rim.apply(rim);
        }
        self.base = [
            self.ambient.intensity,
            self.key.intensity,
            self.fill.intensity,
            self.rim.intensity,
        ];
        if self.dimmed {
            self.dimmed = false;
            self.reduce_for_ibl();
        }
    }

    /// Halve every light relative to its configured intensity. Idempotent.
    pub fn reduce_for_ibl(&mut self) {
        let [ambient, key, fill, rim] = self.base;
        self.ambient.intensity = ambient * IBL_DIMMING;
        self.key.intensity = key * IBL_DIMMING;
        self.fill.intensity = fill * IBL_DIMMING;
        self.rim.intensity = rim * IBL_DIMMING;
        self.dimmed = true;
    }

    pub fn directional(&self) -> [&DirectionalLight; 3] {
        [&self.key, &self.fill, &self.rim]
    }

    /// Every resource the rig owns: four lights plus three shadow maps.
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let mut ids = vec![self.ambient.id];
        for light in self.directional() {
            ids.push(light.id);
            ids.push(light.shadow_map);
        }
        ids
    }
}

// ---------------------------------------------------------------------------
// Ground plane
// ---------------------------------------------------------------------------

/// Shadow-catching quad under the model.
#[derive(Debug)]
pub struct GroundPlane {
    pub geometry: Geometry,
    pub material: Material,
    /// Edge length of the square.
    pub size: f32,
    pub y: f32,
}

impl GroundPlane {
    /// Size the plane to 3x the largest dimension of `bounds`, at its bottom.
    pub fn new(bounds: &Aabb, opacity: f32) -> Self {
        let size = bounds.max_dimension() * 3.0;
        let y = if bounds.is_empty() { 0.0 } else { bounds.min.y };
        let h = size * 0.5;
        let positions = vec![
            Vec3::new(-h, y, -h),
            Vec3::new(h, y, -h),
            Vec3::new(h, y, h),
            Vec3::new(-h, y, h),
        ];
        let geometry = Geometry::new(positions, Some(vec![0, 2, 1, 0, 3, 2]))
            .with_normals(vec![Vec3::Y; 4]);
        let mut material = Material::new(Color::BLACK).named("ground-shadow");
        material.opacity = opacity;
        Self {
            geometry,
            material,
            size,
            y,
        }
    }

    pub fn opacity(&self) -> f32 {
        self.material.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.material.opacity = opacity;
    }

    pub fn resource_ids(&self) -> [ResourceId; 2] {
        [self.geometry.id(), self.material.id()]
    }
}

// ---------------------------------------------------------------------------
// Environment map
// ---------------------------------------------------------------------------

/// An equirectangular environment image used for image-based lighting.
#[derive(Debug)]
pub struct Environment {
    pub url: String,
    pub texture: Texture,
}

impl Environment {
    /// Decode `.hdr`, `.exr` or any LDR format `image` understands. HDR
    /// values are clamped into RGBA8.
    pub fn decode(url: &str, bytes: &[u8]) -> Result<Self, LoadError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| LoadError::decode(url, e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            texture: Texture::from_image(&image),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.texture.id()
    }

    pub fn average_color(&self) -> Color {
        self.texture.average_color()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rig() {
        let rig = LightingRig::new(&LightingConfig::default());
        assert_eq!(rig.ambient.intensity, 0.4);
        assert_eq!(rig.key.intensity, 1.0);
        assert_eq!(rig.fill.intensity, 0.5);
        assert_eq!(rig.rim.intensity, 0.7);
        assert_eq!(rig.key.position, Vec3::new(5.0, 8.0, 5.0));
        assert!(rig.key.cast_shadow);
        assert!(!rig.fill.cast_shadow);
        assert!(!rig.rim.cast_shadow);
        assert_eq!(rig.resource_ids().len(), 7);
    }

    #[test]
    fn apply_patches_only_present_fields() {
        let mut rig = LightingRig::new(&LightingConfig::default());
        rig.apply(&LightingConfig {
            key_light: Some(DirectionalLightConfig {
                intensity: Some(2.0),
                color: Some("#ff0000".into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(rig.key.intensity, 2.0);
        assert_eq!(rig.key.color, Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(rig.key.position, Vec3::new(5.0, 8.0, 5.0));
        assert_eq!(rig.ambient.intensity, 0.4);
    }

    #[test]
    fn ibl_dimming_is_idempotent_and_survives_patches() {
        let mut rig = LightingRig::new(&LightingConfig::default());
        rig.reduce_for_ibl();
        rig.reduce_for_ibl();
        assert_eq!(rig.key.intensity, 0.5);
        assert_eq!(rig.ambient.intensity, 0.2);

        rig.apply(&LightingConfig {
            ambient_intensity: Some(1.0),
            ..Default::default()
        });
        assert_eq!(rig.ambient.intensity, 0.5);
        assert_eq!(rig.key.intensity, 0.5);
    }

    #[test]
    fn ground_plane_sits_under_bounds() {
        let bounds = Aabb::new(Vec3::new(-1.0, -0.5, -0.25), Vec3::new(1.0, 0.5, 0.25));
        let plane = GroundPlane::new(&bounds, 0.3);
        assert_eq!(plane.size, 6.0);
        assert_eq!(plane.y, -0.5);
        assert_eq!(plane.opacity(), 0.3);
        assert_eq!(plane.geometry.bounds().min.y, -0.5);
    }

    #[test]
    fn environment_rejects_garbage() {
        let err = Environment::decode("sky.hdr", b"not an image").unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }
}
