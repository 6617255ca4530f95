//! # Camera — Perspective Projection, Auto-Framing, Eased Reset
//!
//! [`PerspectiveCamera`] holds the eye position and the point it looks at.
//! [`PerspectiveCamera::fit_to_sphere`] frames a bounding sphere so it fills
//! the tighter of the horizontal and vertical field of view:
//!
//! ```text
//!            ╭──── r·1.2 ────╮
//!   eye ●───────────────────( ● )  origin
//!        ╲  fov/2          sphere
//!         distance = 1.2·r / sin(min(vfov, hfov) / 2)
//! ```
//!
//! Near and far planes follow the distance (`d/100`, `d·100`) so tiny and
//! huge models both avoid z-fighting.
//!
//! [`CameraReset`] eases position and orbit target back to an
//! [`InitialCameraPose`] over 500 ms with a cubic ease-out.

use std::time::{Duration, Instant};

use crate::animation::EaseFunction;
use crate::math::{BoundingSphere, Mat4, Vec3, degrees_to_radians};

/// Extra room around the framed sphere.
const FRAMING_PADDING: f32 = 1.2;

#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    /// Point the camera looks at. Kept in sync with the orbit target.
    pub look_at: Vec3,
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32) -> Self {
        Self {
            fov,
            aspect,
            near: 0.01,
            far: 1000.0,
            position: Vec3::new(0.0, 1.0, 3.0),
            look_at: Vec3::ZERO,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.look_at, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(degrees_to_radians(self.fov), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Vertical and horizontal field of view in radians.
    pub fn fields_of_view(&self) -> (f32, f32) {
        let vfov = degrees_to_radians(self.fov);
        let hfov = 2.0 * ((vfov / 2.0).tan() * self.aspect).atan();
        (vfov, hfov)
    }

    /// Place the camera so `sphere` fills the view, looking at the origin.
    /// Returns the framing distance.
    pub fn fit_to_sphere(&mut self, sphere: &BoundingSphere) -> f32 {
        let (vfov, hfov) = self.fields_of_view();
        let fov = vfov.min(hfov);
        let distance = sphere.radius * FRAMING_PADDING / (fov / 2.0).sin();
        self.position = Vec3::new(0.0, sphere.radius * 0.5, distance);
        self.look_at = Vec3::ZERO;
        self.near = distance / 100.0;
        self.far = distance * 100.0;
        distance
    }
}

/// Camera position and orbit target captured after each successful load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialCameraPose {
    pub position: Vec3,
    pub target: Vec3,
}

impl Default for InitialCameraPose {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.0, 3.0),
            target: Vec3::ZERO,
        }
    }
}

/// An in-flight eased move toward an [`InitialCameraPose`].
#[derive(Debug, Clone)]
pub struct CameraReset {
    from: InitialCameraPose,
    to: InitialCameraPose,
    started: Instant,
    duration: Duration,
    ease: EaseFunction,
}

impl CameraReset {
    pub const DEFAULT_DURATION: Duration = Duration::from_millis(500);

    pub fn new(from: InitialCameraPose, to: InitialCameraPose, started: Instant) -> Self {
        Self {
            from,
            to,
            started,
            duration: Self::DEFAULT_DURATION,
            ease: EaseFunction::CubicOut,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Pose at `now` and whether the move is complete. The final step lands
    /// exactly on the destination.
    pub fn sample(&self, now: Instant) -> (InitialCameraPose, bool) {
        let elapsed = now.saturating_duration_since(self.started);
        let t = if self.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
        };
        if t >= 1.0 {
            return (self.to, true);
        }
        let eased = self.ease.sample(t);
        let pose = InitialCameraPose {
            position: self.from.position.lerp(self.to.position, eased),
            target: self.from.target.lerp(self.to.target, eased),
        };
        (pose, false)
    }

    pub fn destination(&self) -> InitialCameraPose {
        self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fit_uses_tighter_fov() {
        let sphere = BoundingSphere {
            center: Vec3::ZERO,
            radius: 1.0,
        };

        let mut wide = PerspectiveCamera::new(45.0, 2.0);
        let d_wide = wide.fit_to_sphere(&sphere);
        let expected = 1.2 / (22.5f32.to_radians()).sin();
        assert_relative_eq!(d_wide, expected, epsilon = 1e-4);

        // Portrait: horizontal fov is tighter, so the camera backs off.
        let mut tall = PerspectiveCamera::new(45.0, 0.5);
        let d_tall = tall.fit_to_sphere(&sphere);
        assert!(d_tall > d_wide);

        assert_eq!(wide.position, Vec3::new(0.0, 0.5, d_wide));
        assert_relative_eq!(wide.near, d_wide / 100.0);
        assert_relative_eq!(wide.far, d_wide * 100.0);
    }

    #[test]
    fn reset_eases_and_lands_exactly() {
        let t0 = Instant::now();
        let from = InitialCameraPose {
            position: Vec3::new(10.0, 0.0, 0.0),
            target: Vec3::new(1.0, 1.0, 1.0),
        };
        let to = InitialCameraPose {
            position: Vec3::new(0.0, 0.3, 2.7),
            target: Vec3::ZERO,
        };
        let reset = CameraReset::new(from, to, t0);

        let (mid, done) = reset.sample(t0 + Duration::from_millis(250));
        assert!(!done);
        // Cubic ease-out is past the halfway point at t = 0.5.
        assert!(mid.position.x < 5.0);

        let (end, done) = reset.sample(t0 + Duration::from_millis(500));
        assert!(done);
        assert_eq!(end, to);
    }
}
