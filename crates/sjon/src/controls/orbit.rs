//! Orbit controls: rotate around a target, dolly in and out, pan.
//!
//! Input accumulates into pending deltas; [`OrbitControls::update`] applies
//! them once per frame. With damping on, only `damping_factor` of each delta
//! is applied per update and the rest decays, which gives the camera its
//! glide after a drag ends.
//!
//! The camera offset from the target is handled in spherical coordinates:
//!
//! ```text
//!          y
//!          │  ● camera
//!          │ ╱ phi (polar, from +y)
//!          │╱
//!  target  ●──────── z
//!         ╱ theta (azimuth, around +y)
//!        x
//! ```

use std::f32::consts::PI;

use crate::camera::PerspectiveCamera;
use crate::math::{Vec3, degrees_to_radians};

const EPS: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub enabled: bool,
    pub enable_rotate: bool,
    pub enable_zoom: bool,
    pub enable_pan: bool,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Radians.
    pub min_polar_angle: f32,
    /// Radians.
    pub max_polar_angle: f32,
    pub target: Vec3,
    pub auto_rotate: bool,
    /// Revolutions per second.
    pub auto_rotate_speed: f32,

    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    pan_offset: Vec3,
    interacting: bool,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_rotate: true,
            enable_zoom: true,
            enable_pan: true,
            enable_damping: false,
            damping_factor: 0.05,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            target: Vec3::ZERO,
            auto_rotate: false,
            auto_rotate_speed: 0.5,
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
            interacting: false,
        }
    }
}

impl OrbitControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set polar limits from degrees, swapping them if inverted.
    pub fn set_polar_range_degrees(&mut self, min: f32, max: f32) {
        let (mut lo, mut hi) = (degrees_to_radians(min), degrees_to_radians(max));
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        self.min_polar_angle = lo;
        self.max_polar_angle = hi;
    }

    /// Set dolly limits. `min` is clamped so it never exceeds `max`.
    pub fn set_distance_range(&mut self, min: f32, max: f32) {
        self.max_distance = max;
        self.min_distance = min.min(max);
    }

    pub fn is_interacting(&self) -> bool {
        self.interacting
    }

    pub fn begin_interaction(&mut self) {
        self.interacting = true;
    }

    pub fn end_interaction(&mut self) {
        self.interacting = false;
    }

    /// Drop any queued or damped motion.
    pub fn stop_motion(&mut self) {
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.pan_offset = Vec3::ZERO;
        self.scale = 1.0;
    }

    /// Queue an orbit by `theta` (azimuth) and `phi` (polar) radians.
    pub fn rotate(&mut self, theta: f32, phi: f32) {
        if !self.enabled || !self.enable_rotate {
            return;
        }
        self.delta_theta -= theta;
        self.delta_phi -= phi;
    }

    /// Orbit by a pointer drag: a drag across the full viewport height is one
    /// full turn.
    pub fn rotate_by_pixels(&mut self, dx: f32, dy: f32, viewport_height: f32) {
        let h = viewport_height.max(1.0);
        self.rotate(2.0 * PI * dx / h, 2.0 * PI * dy / h);
    }

    /// Dolly toward the target. `factor > 1` zooms in.
    pub fn dolly(&mut self, factor: f32) {
        if !self.enabled || !self.enable_zoom || factor <= 0.0 {
            return;
        }
        self.scale /= factor;
    }

    /// Zoom from a wheel delta in pixels. Negative is toward the model.
    pub fn zoom_by_wheel(&mut self, delta_y: f32) {
        let step = 0.95f32.powf(delta_y.abs() / 100.0);
        if delta_y < 0.0 {
            self.dolly(1.0 / step);
        } else if delta_y > 0.0 {
            self.dolly(step);
        }
    }

    /// Pan by a pointer drag in pixels, scaled so the target tracks the
    /// pointer at the target's depth.
    pub fn pan_by_pixels(
        &mut self,
        camera: &PerspectiveCamera,
        dx: f32,
        dy: f32,
        viewport_height: f32,
    ) {
        if !self.enabled || !self.enable_pan {
            return;
        }
        let offset = camera.position - self.target;
        let world_per_pixel = 2.0
            * offset.length()
            * (degrees_to_radians(camera.fov) / 2.0).tan()
            / viewport_height.max(1.0);
        let forward = (-offset).normalize_or(Vec3::NEG_Z);
        let right = forward.cross(Vec3::Y).normalize_or(Vec3::X);
        let up = right.cross(forward);
        self.pan_offset += right * (-dx * world_per_pixel) + up * (dy * world_per_pixel);
    }

    /// Apply pending input, auto-rotation and limits. Moves the camera and
    /// points it at the target. Returns `true` if the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera, dt: f32) -> bool {
        let before = (camera.position, self.target);
        let offset = camera.position - self.target;

        let mut radius = offset.length();
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = if radius > EPS {
            (offset.y / radius).clamp(-1.0, 1.0).acos()
        } else {
            PI / 2.0
        };

        if self.auto_rotate && !self.interacting {
            theta -= self.auto_rotate_speed * 2.0 * PI * dt;
        }

        let factor = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };
        theta += self.delta_theta * factor;
        phi += self.delta_phi * factor;

        let min_phi = self.min_polar_angle.max(EPS);
        let max_phi = self.max_polar_angle.min(PI - EPS);
        phi = phi.clamp(min_phi.min(max_phi), max_phi);

        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance.max(self.min_distance));

        self.target += self.pan_offset * factor;

        let sin_phi = phi.sin();
        let new_offset = Vec3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );
        camera.position = self.target + new_offset;
        camera.look_at = self.target;

        if self.enable_damping {
            self.delta_theta *= 1.0 - self.damping_factor;
            self.delta_phi *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;

        let (pos, target) = before;
        pos.distance_squared(camera.position) > EPS || target.distance_squared(self.target) > EPS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera_at(pos: Vec3) -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::new(45.0, 1.0);
        camera.position = pos;
        camera
    }

    #[test]
    fn inverted_polar_range_is_swapped() {
        let mut controls = OrbitControls::new();
        controls.set_polar_range_degrees(120.0, 30.0);
        assert_relative_eq!(controls.min_polar_angle, 30f32.to_radians());
        assert_relative_eq!(controls.max_polar_angle, 120f32.to_radians());
    }

    #[test]
    fn distance_clamp_applies_on_update() {
        let mut controls = OrbitControls::new();
        controls.set_distance_range(2.0, 4.0);
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 10.0));
        controls.update(&mut camera, 0.0);
        assert_relative_eq!(camera.position.length(), 4.0, epsilon = 1e-4);

        camera.position = Vec3::new(0.0, 0.0, 0.5);
        controls.update(&mut camera, 0.0);
        assert_relative_eq!(camera.position.length(), 2.0, epsilon = 1e-4);
    }

    #[test]
    fn min_distance_never_exceeds_max() {
        let mut controls = OrbitControls::new();
        controls.set_distance_range(5.0, 3.0);
        assert_eq!(controls.min_distance, 3.0);
    }

    #[test]
    fn disabled_gates_ignore_input() {
        let mut controls = OrbitControls::new();
        controls.enable_rotate = false;
        controls.enable_zoom = false;
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 3.0));
        controls.rotate(1.0, 0.0);
        controls.dolly(2.0);
        assert!(!controls.update(&mut camera, 0.016));
        assert_relative_eq!(camera.position.z, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn damping_spreads_rotation_over_frames() {
        let mut controls = OrbitControls::new();
        controls.enable_damping = true;
        controls.damping_factor = 0.1;
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 3.0));
        controls.rotate(1.0, 0.0);

        controls.update(&mut camera, 0.016);
        let first = camera.position;
        assert!(controls.update(&mut camera, 0.016));
        assert_ne!(camera.position, first);
    }

    #[test]
    fn auto_rotate_turns_at_configured_rate_and_pauses_while_interacting() {
        let mut controls = OrbitControls::new();
        controls.auto_rotate = true;
        controls.auto_rotate_speed = 0.25;
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 3.0));

        // A quarter revolution per second: one second moves +z to -x.
        controls.update(&mut camera, 1.0);
        assert_relative_eq!(camera.position.x, -3.0, epsilon = 1e-3);

        controls.begin_interaction();
        assert!(!controls.update(&mut camera, 1.0));
    }
}
