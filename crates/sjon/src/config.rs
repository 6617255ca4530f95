//! # Configuration — Defaults, Patches, and Validation
//!
//! A viewer always holds one fully populated [`ViewerConfig`]. Callers supply
//! a [`ConfigPatch`] (every field optional) at construction and on every
//! [`Viewer::update`](crate::viewer::Viewer::update); the patch is merged over
//! the current config to produce the next version.
//!
//! ```text
//!  ViewerConfig::default() ──merge(patch₀)──▶ v0 ──merge(patch₁)──▶ v1 ──▶ …
//! ```
//!
//! Every `Some` field in a patch overrides. The nested [`LightingConfig`] is
//! merged key by key (and each directional light inside it too), so patching
//! `key_light.intensity` leaves the rest of the rig alone.
//!
//! [`ViewerConfig::validate`] reports out-of-range values as
//! [`ConfigWarning`]s. Warnings are logged and never block construction.
//!
//! Patches deserialize from camelCase JSON via [`ConfigPatch::from_json`]:
//!
//! ```
//! let patch = sjon::config::ConfigPatch::from_json(
//!     r#"{ "src": "chair.glb", "autoRotate": true, "lighting": { "ambientIntensity": 0.2 } }"#,
//! ).unwrap();
//! assert_eq!(patch.auto_rotate, Some(true));
//! ```

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use serde::Deserialize;

use crate::error::LoadError;
use crate::math::Vec3;
use crate::viewer::Viewer;

// ---------------------------------------------------------------------------
// Enumerated options
// ---------------------------------------------------------------------------

/// Presentation theme. Unknown names are kept so they can be warned about;
/// they render as [`Theme::Light`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Other(String),
}

impl Theme {
    pub fn is_dark(&self) -> bool {
        matches!(self, Self::Dark)
    }
}

impl From<String> for Theme {
    fn from(s: String) -> Self {
        match s.as_str() {
            "light" => Self::Light,
            "dark" => Self::Dark,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for Theme {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => f.write_str("light"),
            Self::Dark => f.write_str("dark"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Tone-mapping operator applied by the render backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum ToneMapping {
    /// `"none"`.
    Off,
    Linear,
    Reinhard,
    #[default]
    Aces,
    Filmic,
    Other(String),
}

impl ToneMapping {
    /// The operator to actually use. Unknown names fall back to ACES.
    pub fn resolved(&self) -> ToneMapping {
        match self {
            Self::Other(_) => Self::Aces,
            known => known.clone(),
        }
    }
}

impl From<String> for ToneMapping {
    fn from(s: String) -> Self {
        match s.as_str() {
            "none" => Self::Off,
            "linear" => Self::Linear,
            "reinhard" => Self::Reinhard,
            "aces" => Self::Aces,
            "filmic" => Self::Filmic,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for ToneMapping {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl fmt::Display for ToneMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("none"),
            Self::Linear => f.write_str("linear"),
            Self::Reinhard => f.write_str("reinhard"),
            Self::Aces => f.write_str("aces"),
            Self::Filmic => f.write_str("filmic"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolbarPosition {
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
}

/// Which animation clip to play: by position or by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AnimationSelector {
    Index(usize),
    Name(String),
}

impl From<usize> for AnimationSelector {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl From<&str> for AnimationSelector {
    fn from(s: &str) -> Self {
        Self::Name(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Lighting
// ---------------------------------------------------------------------------

/// Overrides for one directional light. Absent fields keep the rig default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectionalLightConfig {
    pub intensity: Option<f32>,
    pub color: Option<String>,
    pub position: Option<[f32; 3]>,
    pub cast_shadow: Option<bool>,
}

impl DirectionalLightConfig {
    /// Key-wise merge; `other` wins where it is set.
    pub fn merged(&self, other: &DirectionalLightConfig) -> DirectionalLightConfig {
        DirectionalLightConfig {
            intensity: other.intensity.or(self.intensity),
            color: other.color.clone().or_else(|| self.color.clone()),
            position: other.position.or(self.position),
            cast_shadow: other.cast_shadow.or(self.cast_shadow),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LightingConfig {
    pub ambient_intensity: Option<f32>,
    pub ambient_color: Option<String>,
    pub key_light: Option<DirectionalLightConfig>,
    pub fill_light: Option<DirectionalLightConfig>,
    pub rim_light: Option<DirectionalLightConfig>,
}

impl LightingConfig {
    pub fn merged(&self, other: &LightingConfig) -> LightingConfig {
        fn light(
            base: &Option<DirectionalLightConfig>,
            over: &Option<DirectionalLightConfig>,
        ) -> Option<DirectionalLightConfig> {
            match (base, over) {
                (Some(b), Some(o)) => Some(b.merged(o)),
                (None, Some(o)) => Some(o.clone()),
                (b, None) => b.clone(),
            }
        }

        LightingConfig {
            ambient_intensity: other.ambient_intensity.or(self.ambient_intensity),
            ambient_color: other
                .ambient_color
                .clone()
                .or_else(|| self.ambient_color.clone()),
            key_light: light(&self.key_light, &other.key_light),
            fill_light: light(&self.fill_light, &other.fill_light),
            rim_light: light(&self.rim_light, &other.rim_light),
        }
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

pub type LoadStartCallback = Rc<dyn Fn()>;
pub type ProgressCallback = Rc<dyn Fn(f32)>;
pub type LoadCallback = Rc<dyn Fn(&Viewer)>;
pub type ErrorCallback = Rc<dyn Fn(&LoadError)>;
pub type CameraChangeCallback = Rc<dyn Fn(Vec3, Vec3)>;
pub type FullscreenCallback = Rc<dyn Fn(bool)>;

/// Lifecycle hooks. Each hook is merged independently, so a patch that sets
/// only `on_error` keeps the previously installed `on_load`.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_load_start: Option<LoadStartCallback>,
    /// Load progress in \[0, 1\], non-decreasing per load.
    pub on_progress: Option<ProgressCallback>,
    pub on_load: Option<LoadCallback>,
    pub on_error: Option<ErrorCallback>,
    /// Camera position and orbit target, at most once per 1/60 s.
    pub on_camera_change: Option<CameraChangeCallback>,
    pub on_fullscreen_change: Option<FullscreenCallback>,
}

impl Callbacks {
    pub fn merged(&self, other: &Callbacks) -> Callbacks {
        Callbacks {
            on_load_start: other.on_load_start.clone().or_else(|| self.on_load_start.clone()),
            on_progress: other.on_progress.clone().or_else(|| self.on_progress.clone()),
            on_load: other.on_load.clone().or_else(|| self.on_load.clone()),
            on_error: other.on_error.clone().or_else(|| self.on_error.clone()),
            on_camera_change: other
                .on_camera_change
                .clone()
                .or_else(|| self.on_camera_change.clone()),
            on_fullscreen_change: other
                .on_fullscreen_change
                .clone()
                .or_else(|| self.on_fullscreen_change.clone()),
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_load_start", &self.on_load_start.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_load", &self.on_load.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_camera_change", &self.on_camera_change.is_some())
            .field("on_fullscreen_change", &self.on_fullscreen_change.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ViewerConfig
// ---------------------------------------------------------------------------

/// The fully populated viewer configuration.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Model URL or path. Required; an empty `src` mounts an empty viewer.
    pub src: String,
    /// Material library for OBJ models.
    pub mtl_src: Option<String>,
    /// Accessible description of the model.
    pub alt: Option<String>,

    // Controls
    pub controls: bool,
    pub zoom: bool,
    pub pan: bool,
    pub damping: bool,
    pub damping_factor: f32,
    pub zoom_min: Option<f32>,
    pub zoom_max: Option<f32>,
    /// Degrees.
    pub polar_angle_min: f32,
    /// Degrees.
    pub polar_angle_max: f32,
    /// When false, plain wheel scrolls the page and ctrl/meta + wheel zooms.
    pub scroll_to_zoom: bool,

    // Auto-rotate
    pub auto_rotate: bool,
    /// Revolutions per second.
    pub auto_rotate_speed: f32,
    /// Pause after an interaction before rotation resumes.
    pub auto_rotate_delay_ms: u64,

    // Presentation
    pub theme: Theme,
    /// CSS-style color or `"transparent"`.
    pub background: String,
    pub show_progress: bool,
    pub fullscreen_button: bool,
    pub background_toggle_button: bool,
    pub screenshot_button: bool,
    pub screenshot_filename: String,
    pub screenshot_scale: f32,
    pub reset_camera_button: bool,
    pub auto_rotate_button: bool,
    pub animation_buttons: bool,
    pub toolbar_position: ToolbarPosition,
    /// Where [`Viewer::download_screenshot`] writes files. Defaults to the
    /// working directory.
    pub download_dir: Option<PathBuf>,

    // Shadows & lighting
    pub shadows: bool,
    pub shadow_opacity: f32,
    pub shadow_blur: f32,
    pub lighting: LightingConfig,
    pub environment_map: Option<String>,
    pub environment_background: bool,
    pub tone_mapping: ToneMapping,
    pub tone_mapping_exposure: f32,

    // Decoding
    pub draco: bool,
    pub draco_decoder_path: Option<String>,

    // Animation
    pub animation: Option<AnimationSelector>,
    pub auto_play_animation: bool,
    pub animation_speed: f32,

    // Camera & surface
    pub camera_position: Option<[f32; 3]>,
    pub camera_fov: f32,
    pub camera_target: Option<[f32; 3]>,
    /// Upper bound on the device pixel ratio. `None` caps at 2.
    pub pixel_ratio: Option<f32>,
    pub antialias: bool,

    pub callbacks: Callbacks,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            src: String::new(),
            mtl_src: None,
            alt: None,
            controls: true,
            zoom: true,
            pan: true,
            damping: true,
            damping_factor: 0.1,
            zoom_min: None,
            zoom_max: None,
            polar_angle_min: 0.0,
            polar_angle_max: 180.0,
            scroll_to_zoom: false,
            auto_rotate: false,
            auto_rotate_speed: 0.5,
            auto_rotate_delay_ms: 3000,
            theme: Theme::Light,
            background: "transparent".to_string(),
            show_progress: true,
            fullscreen_button: true,
            background_toggle_button: false,
            screenshot_button: false,
            screenshot_filename: "screenshot".to_string(),
            screenshot_scale: 2.0,
            reset_camera_button: true,
            auto_rotate_button: true,
            animation_buttons: true,
            toolbar_position: ToolbarPosition::BottomCenter,
            download_dir: None,
            shadows: true,
            shadow_opacity: 0.3,
            shadow_blur: 2.0,
            lighting: LightingConfig::default(),
            environment_map: None,
            environment_background: false,
            tone_mapping: ToneMapping::Aces,
            tone_mapping_exposure: 1.0,
            draco: true,
            draco_decoder_path: None,
            animation: None,
            auto_play_animation: false,
            animation_speed: 1.0,
            camera_position: None,
            camera_fov: 45.0,
            camera_target: None,
            pixel_ratio: None,
            antialias: true,
            callbacks: Callbacks::default(),
        }
    }
}

/// Copy every `Some` field of the patch into the merged config. The second
/// list names fields that are optional in the full config as well.
macro_rules! merge_fields {
    ($merged:ident, $patch:ident; [$($field:ident),* $(,)?]; [$($opt:ident),* $(,)?]) => {
        $(
            if let Some(v) = &$patch.$field {
                $merged.$field = v.clone();
            }
        )*
        $(
            if let Some(v) = &$patch.$opt {
                $merged.$opt = Some(v.clone());
            }
        )*
    };
}

impl ViewerConfig {
    /// Produce the next config version: `patch` over `self`.
    pub fn merge(&self, patch: &ConfigPatch) -> ViewerConfig {
        let mut merged = self.clone();
        merge_fields!(merged, patch; [
            src, controls, zoom, pan, damping, damping_factor,
            polar_angle_min, polar_angle_max, scroll_to_zoom,
            auto_rotate, auto_rotate_speed, auto_rotate_delay_ms,
            theme, background, show_progress, fullscreen_button,
            background_toggle_button, screenshot_button, screenshot_filename,
            screenshot_scale, reset_camera_button, auto_rotate_button,
            animation_buttons, toolbar_position,
            shadows, shadow_opacity, shadow_blur, environment_background,
            tone_mapping, tone_mapping_exposure, draco,
            auto_play_animation, animation_speed, camera_fov, antialias,
        ]; [
            mtl_src, alt, zoom_min, zoom_max, download_dir, environment_map,
            draco_decoder_path, animation, camera_position, camera_target,
            pixel_ratio,
        ]);
        if let Some(lighting) = &patch.lighting {
            merged.lighting = self.lighting.merged(lighting);
        }
        merged.callbacks = self.callbacks.merged(&patch.callbacks);
        merged
    }

    /// Non-fatal range checks.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |field: &'static str, message: String| {
            warnings.push(ConfigWarning { field, message });
        };

        if self.src.is_empty() {
            warn("src", "src is required".to_string());
        }
        if let Theme::Other(name) = &self.theme {
            warn(
                "theme",
                format!("invalid theme \"{name}\", must be \"light\" or \"dark\""),
            );
        }
        if let ToneMapping::Other(name) = &self.tone_mapping {
            warn("tone_mapping", format!("invalid tone mapping \"{name}\""));
        }
        for (field, value) in [
            ("polar_angle_min", self.polar_angle_min),
            ("polar_angle_max", self.polar_angle_max),
        ] {
            if !(0.0..=180.0).contains(&value) {
                warn(field, format!("{field} must be between 0 and 180, got {value}"));
            }
        }
        if !(0.0..=1.0).contains(&self.shadow_opacity) {
            warn(
                "shadow_opacity",
                format!("shadow_opacity must be between 0 and 1, got {}", self.shadow_opacity),
            );
        }
        if self.animation_speed < 0.0 {
            warn(
                "animation_speed",
                format!("animation_speed must be non-negative, got {}", self.animation_speed),
            );
        }
        if let Some(ratio) = self.pixel_ratio.filter(|r| *r <= 0.0) {
            warn("pixel_ratio", format!("pixel_ratio must be positive, got {ratio}"));
        }
        if self.camera_fov <= 0.0 || self.camera_fov >= 180.0 {
            warn(
                "camera_fov",
                format!(
                    "camera_fov must be between 0 and 180 (exclusive), got {}",
                    self.camera_fov
                ),
            );
        }

        warnings
    }

    pub fn camera_position_vec(&self) -> Option<Vec3> {
        self.camera_position.map(Vec3::from_array)
    }

    pub fn camera_target_vec(&self) -> Vec3 {
        self.camera_target.map(Vec3::from_array).unwrap_or(Vec3::ZERO)
    }
}

/// A non-fatal configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ---------------------------------------------------------------------------
// ConfigPatch
// ---------------------------------------------------------------------------

/// A partial configuration. `None` means "keep the current value".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub src: Option<String>,
    pub mtl_src: Option<String>,
    pub alt: Option<String>,
    pub controls: Option<bool>,
    pub zoom: Option<bool>,
    pub pan: Option<bool>,
    pub damping: Option<bool>,
    pub damping_factor: Option<f32>,
    pub zoom_min: Option<f32>,
    pub zoom_max: Option<f32>,
    pub polar_angle_min: Option<f32>,
    pub polar_angle_max: Option<f32>,
    pub scroll_to_zoom: Option<bool>,
    pub auto_rotate: Option<bool>,
    pub auto_rotate_speed: Option<f32>,
    #[serde(rename = "autoRotateDelay")]
    pub auto_rotate_delay_ms: Option<u64>,
    pub theme: Option<Theme>,
    pub background: Option<String>,
    pub show_progress: Option<bool>,
    pub fullscreen_button: Option<bool>,
    pub background_toggle_button: Option<bool>,
    pub screenshot_button: Option<bool>,
    pub screenshot_filename: Option<String>,
    pub screenshot_scale: Option<f32>,
    pub reset_camera_button: Option<bool>,
    pub auto_rotate_button: Option<bool>,
    pub animation_buttons: Option<bool>,
    pub toolbar_position: Option<ToolbarPosition>,
    pub download_dir: Option<PathBuf>,
    pub shadows: Option<bool>,
    pub shadow_opacity: Option<f32>,
    pub shadow_blur: Option<f32>,
    pub lighting: Option<LightingConfig>,
    pub environment_map: Option<String>,
    pub environment_background: Option<bool>,
    pub tone_mapping: Option<ToneMapping>,
    pub tone_mapping_exposure: Option<f32>,
    pub draco: Option<bool>,
    pub draco_decoder_path: Option<String>,
    pub animation: Option<AnimationSelector>,
    pub auto_play_animation: Option<bool>,
    pub animation_speed: Option<f32>,
    pub camera_position: Option<[f32; 3]>,
    pub camera_fov: Option<f32>,
    pub camera_target: Option<[f32; 3]>,
    pub pixel_ratio: Option<f32>,
    pub antialias: Option<bool>,
    #[serde(skip)]
    pub callbacks: Callbacks,
}

impl ConfigPatch {
    /// Parse a camelCase JSON object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Shorthand for a patch that only sets `src`.
    pub fn with_src(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_keep_defaults() {
        let defaults = ViewerConfig::default();
        let merged = defaults.merge(&ConfigPatch {
            src: Some("a.glb".into()),
            zoom: Some(false),
            camera_fov: Some(60.0),
            ..Default::default()
        });
        assert_eq!(merged.src, "a.glb");
        assert!(!merged.zoom);
        assert_eq!(merged.camera_fov, 60.0);

        assert_eq!(merged.pan, defaults.pan);
        assert_eq!(merged.damping_factor, defaults.damping_factor);
        assert_eq!(merged.tone_mapping, ToneMapping::Aces);
        assert_eq!(merged.screenshot_filename, "screenshot");
        assert_eq!(merged.camera_position, None);
    }

    #[test]
    fn lighting_merges_key_wise() {
        let base = ViewerConfig::default().merge(&ConfigPatch {
            lighting: Some(LightingConfig {
                ambient_intensity: Some(0.2),
                key_light: Some(DirectionalLightConfig {
                    intensity: Some(2.0),
                    color: Some("#ff0000".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let next = base.merge(&ConfigPatch {
            lighting: Some(LightingConfig {
                key_light: Some(DirectionalLightConfig {
                    intensity: Some(3.0),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(next.lighting.ambient_intensity, Some(0.2));
        let key = next.lighting.key_light.unwrap();
        assert_eq!(key.intensity, Some(3.0));
        assert_eq!(key.color.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn callbacks_merge_per_hook() {
        let base = ViewerConfig::default().merge(&ConfigPatch {
            callbacks: Callbacks {
                on_load_start: Some(Rc::new(|| {})),
                ..Default::default()
            },
            ..Default::default()
        });
        let next = base.merge(&ConfigPatch {
            callbacks: Callbacks {
                on_error: Some(Rc::new(|_| {})),
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(next.callbacks.on_load_start.is_some());
        assert!(next.callbacks.on_error.is_some());
        assert!(next.callbacks.on_load.is_none());
    }

    #[test]
    fn defaults_warn_only_about_missing_src() {
        let warnings = ViewerConfig::default().validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "src");
    }

    #[test]
    fn validation_flags_out_of_range_values() {
        let config = ViewerConfig::default().merge(&ConfigPatch {
            src: Some("a.glb".into()),
            theme: Some("sepia".into()),
            tone_mapping: Some("agx".into()),
            polar_angle_max: Some(270.0),
            shadow_opacity: Some(1.5),
            animation_speed: Some(-1.0),
            pixel_ratio: Some(0.0),
            camera_fov: Some(180.0),
            ..Default::default()
        });
        let fields: Vec<_> = config.validate().iter().map(|w| w.field).collect();
        assert_eq!(
            fields,
            vec![
                "theme",
                "tone_mapping",
                "polar_angle_max",
                "shadow_opacity",
                "animation_speed",
                "pixel_ratio",
                "camera_fov",
            ]
        );
        assert_eq!(config.tone_mapping.resolved(), ToneMapping::Aces);
    }

    #[test]
    fn patch_parses_camel_case_json() {
        let patch = ConfigPatch::from_json(
            r##"{
                "src": "chair.glb",
                "theme": "dark",
                "toneMapping": "none",
                "toolbarPosition": "bottom-left",
                "autoRotateDelay": 1000,
                "animation": "Walk",
                "cameraPosition": [0, 2, 5],
                "lighting": { "keyLight": { "intensity": 2, "castShadow": false } }
            }"##,
        )
        .unwrap();
        assert_eq!(patch.src.as_deref(), Some("chair.glb"));
        assert_eq!(patch.theme, Some(Theme::Dark));
        assert_eq!(patch.tone_mapping, Some(ToneMapping::Off));
        assert_eq!(patch.toolbar_position, Some(ToolbarPosition::BottomLeft));
        assert_eq!(patch.auto_rotate_delay_ms, Some(1000));
        assert_eq!(patch.animation, Some(AnimationSelector::Name("Walk".into())));
        assert_eq!(patch.camera_position, Some([0.0, 2.0, 5.0]));
        let key = patch.lighting.unwrap().key_light.unwrap();
        assert_eq!(key.cast_shadow, Some(false));

        let by_index = ConfigPatch::from_json(r#"{ "animation": 2 }"#).unwrap();
        assert_eq!(by_index.animation, Some(AnimationSelector::Index(2)));
    }
}
