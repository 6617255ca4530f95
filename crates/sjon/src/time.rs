//! Frame timing and delta time.
//!
//! The [`Time`] clock is advanced by the render loop once per frame. Unlike a
//! wall clock, it is driven by the timestamp the host passes to
//! [`Viewer::frame_at`](crate::viewer::Viewer::frame_at), so tests can step it
//! deterministically.

use std::time::{Duration, Instant};

/// Frame timing. Owned by the viewer and updated by the render loop.
#[derive(Debug, Clone, Copy)]
pub struct Time {
    /// When the viewer was created.
    startup: Instant,
    /// When the previous frame ran.
    frame_start: Instant,
    /// Duration of the previous frame.
    delta: Duration,
    /// Total time since startup.
    elapsed: Duration,
    /// Frame counter.
    frame_count: u64,
}

impl Time {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            startup: now,
            frame_start: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Advance to `now`. Timestamps earlier than the previous frame yield a
    /// zero delta rather than going backwards.
    pub(crate) fn update(&mut self, now: Instant) {
        self.delta = now.saturating_duration_since(self.frame_start);
        self.frame_start = now.max(self.frame_start);
        self.elapsed = self.frame_start.saturating_duration_since(self.startup);
        self.frame_count += 1;
    }

    /// Timestamp of the most recent frame (or of creation, before the first).
    pub fn now(&self) -> Instant {
        self.frame_start
    }

    /// Duration of the previous frame.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Delta time in seconds (f32), the most common way to use it.
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Total elapsed time since startup.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_tracks_successive_frames() {
        let t0 = Instant::now();
        let mut time = Time::new(t0);
        time.update(t0 + Duration::from_millis(16));
        assert_eq!(time.delta(), Duration::from_millis(16));
        time.update(t0 + Duration::from_millis(48));
        assert_eq!(time.delta(), Duration::from_millis(32));
        assert_eq!(time.elapsed(), Duration::from_millis(48));
        assert_eq!(time.frame_count(), 2);
    }

    #[test]
    fn stale_timestamp_gives_zero_delta() {
        let t0 = Instant::now();
        let mut time = Time::new(t0 + Duration::from_millis(100));
        time.update(t0);
        assert_eq!(time.delta(), Duration::ZERO);
    }
}
