//! Live reconfiguration.
//!
//! [`Viewer::update`] merges a patch into the current config and then walks
//! the fields that actually changed, applying each to the object that owns
//! it. Unchanged fields are never touched, so an update is cheap and never
//! restarts a load unless `src` or `mtl_src` changed.

use std::time::Duration;

use log::{debug, warn};

use super::{DEFAULT_MAX_PIXEL_RATIO, Viewer, configure_controls};
use crate::config::ConfigPatch;
use crate::lighting::GroundPlane;
use crate::scene::Background;
use crate::ui::{DARK_THEME_CLASS, Toolbar};

impl Viewer {
    /// Merge `patch` into the configuration and apply what changed.
    pub fn update(&mut self, patch: ConfigPatch) {
        if self.destroyed {
            warn!("update() on a destroyed viewer");
            return;
        }
        let next = self.config.merge(&patch);
        for warning in next.validate() {
            // An empty src is fine after construction.
            if warning.field != "src" {
                warn!("config: {warning}");
            }
        }
        let prev = std::mem::replace(&mut self.config, next);
        let config = &self.config;

        if prev.theme != config.theme {
            let mut container = self.container.borrow_mut();
            if config.theme.is_dark() {
                container.add_class(DARK_THEME_CLASS);
            } else {
                container.remove_class(DARK_THEME_CLASS);
            }
        }
        if prev.background != config.background {
            let showing_environment = matches!(self.scene.background, Background::Environment);
            if !showing_environment {
                self.scene.background = Background::from_css(&config.background);
            }
        }
        if prev.environment_background != config.environment_background {
            self.scene.background = if config.environment_background && self.scene.environment.is_some() {
                Background::Environment
            } else {
                Background::from_css(&config.background)
            };
        }

        if prev.tone_mapping != config.tone_mapping
            || prev.tone_mapping_exposure != config.tone_mapping_exposure
        {
            self.renderer
                .set_tone_mapping(config.tone_mapping.resolved(), config.tone_mapping_exposure);
        }

        if prev.lighting != config.lighting {
            self.scene.lights.apply(&config.lighting);
        }

        if prev.shadows != config.shadows {
            self.apply_shadows();
        } else if prev.shadow_opacity != self.config.shadow_opacity {
            let opacity = self.config.shadow_opacity;
            if let Some(ground) = &mut self.scene.ground {
                ground.set_opacity(opacity);
            }
        }

        let config = &self.config;
        if prev.auto_rotate_speed != config.auto_rotate_speed {
            if let Some(auto_rotate) = &mut self.auto_rotate {
                auto_rotate.set_speed(config.auto_rotate_speed, &mut self.controls);
            }
        }
        if prev.auto_rotate_delay_ms != config.auto_rotate_delay_ms {
            if let Some(auto_rotate) = &mut self.auto_rotate {
                auto_rotate.set_delay(Duration::from_millis(config.auto_rotate_delay_ms));
            }
        }
        if prev.auto_rotate != config.auto_rotate {
            self.set_auto_rotate(self.config.auto_rotate);
        }

        let config = &self.config;
        if prev.controls != config.controls
            || prev.zoom != config.zoom
            || prev.pan != config.pan
            || prev.damping != config.damping
            || prev.damping_factor != config.damping_factor
            || prev.polar_angle_min != config.polar_angle_min
            || prev.polar_angle_max != config.polar_angle_max
        {
            configure_controls(&mut self.controls, config);
        }
        if prev.zoom_min != config.zoom_min || prev.zoom_max != config.zoom_max {
            let min = config.zoom_min.unwrap_or(self.controls.min_distance);
            let max = config.zoom_max.unwrap_or(self.controls.max_distance);
            self.controls.set_distance_range(min, max);
        }

        if prev.scroll_to_zoom != config.scroll_to_zoom {
            self.wheel_interceptor = !config.scroll_to_zoom;
            if !self.wheel_interceptor {
                self.hide_scroll_hint();
            }
        }

        let config = &self.config;
        if prev.show_progress != config.show_progress {
            self.loading.set_show_percent(config.show_progress);
        }
        if prev.reset_camera_button != config.reset_camera_button
            || prev.auto_rotate_button != config.auto_rotate_button
            || prev.animation_buttons != config.animation_buttons
            || prev.screenshot_button != config.screenshot_button
            || prev.toolbar_position != config.toolbar_position
        {
            self.toolbar = Toolbar::build(config, self.mixer.is_some(), self.is_auto_rotating());
            self.sync_animation_button();
        }

        let config = &self.config;
        if prev.animation_speed != config.animation_speed {
            self.set_animation_speed(self.config.animation_speed);
        }
        if prev.animation != self.config.animation && self.config.animation.is_some() {
            self.play_animation(self.config.animation.clone());
        }

        let config = &self.config;
        if prev.camera_fov != config.camera_fov {
            self.camera.fov = config.camera_fov;
        }
        if prev.camera_target != config.camera_target {
            self.controls.target = config.camera_target_vec();
            self.controls.update(&mut self.camera, 0.0);
        }
        if prev.camera_position != config.camera_position {
            if let Some(position) = config.camera_position_vec() {
                self.camera.position = position;
                self.controls.update(&mut self.camera, 0.0);
            }
        }
        if prev.pixel_ratio != config.pixel_ratio {
            let device = self.container.borrow().device_pixel_ratio;
            self.renderer
                .set_pixel_ratio(device.min(config.pixel_ratio.unwrap_or(DEFAULT_MAX_PIXEL_RATIO)));
        }

        if prev.environment_map != self.config.environment_map {
            if let Some(url) = self.config.environment_map.clone() {
                self.request_environment(url);
            }
        }

        if prev.src != self.config.src || prev.mtl_src != self.config.mtl_src {
            if self.config.src.is_empty() {
                debug!("src cleared; keeping the current model");
            } else {
                let src = self.config.src.clone();
                let mtl = self.config.mtl_src.clone();
                drop(self.load_model(src, mtl));
            }
        }
    }

    /// Bring the renderer flag, mesh flags and ground plane in line with
    /// `config.shadows`.
    fn apply_shadows(&mut self) {
        let enabled = self.config.shadows;
        self.renderer.set_shadows_enabled(enabled);
        if let Some(root) = self.scene.model_mut() {
            root.for_each_mesh_mut(&mut |mesh| {
                mesh.cast_shadow = enabled;
                mesh.receive_shadow = enabled;
            });
        }
        if !enabled {
            self.replace_ground(None);
            return;
        }
        let ground = self
            .scene
            .model()
            .map(|root| GroundPlane::new(&root.bind_pose_bounds(), self.config.shadow_opacity));
        if ground.is_some() {
            self.replace_ground(ground);
        }
    }
}
