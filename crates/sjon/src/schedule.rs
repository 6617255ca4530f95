//! # Schedule — Frame Callbacks, Timers, and Rate Limiting
//!
//! The viewer has no thread of its own. The host calls
//! [`Viewer::frame_at`](crate::viewer::Viewer::frame_at) once per display
//! refresh, and everything time-dependent hangs off three small queues:
//!
//! ```text
//!  frame_at(now)
//!    │
//!    ├─ TimerQueue::take_due(now)      one-shot timers whose deadline passed
//!    │
//!    └─ FrameScheduler::take_pending() callbacks requested before this turn
//!         ├─ RenderLoop   ── re-requests itself every frame
//!         └─ CameraReset  ── re-requests itself until the ease completes
//! ```
//!
//! Callbacks requested *during* a turn run on the next turn, so a
//! self-rescheduling callback runs exactly once per frame.
//!
//! [`Throttle`] is the time-sliced rate limiter used for camera-change
//! notifications: the first value in a window goes out immediately, later
//! ones are deferred to the window boundary with the most recent value
//! winning.

use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Frame callbacks
// ---------------------------------------------------------------------------

/// Handle to a requested frame callback. Pass to [`FrameScheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

/// The work a frame callback performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTask {
    /// Controls update, mixer tick, render, camera-change notification.
    RenderLoop,
    /// One step of the eased camera reset.
    CameraReset,
}

/// One-shot frame callbacks, in request order.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    next_id: u64,
    pending: Vec<(FrameId, FrameTask)>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `task` to run on the next turn.
    pub fn request(&mut self, task: FrameTask) -> FrameId {
        self.next_id += 1;
        let id = FrameId(self.next_id);
        self.pending.push((id, task));
        id
    }

    /// Cancel a pending callback. Returns `false` if it already ran or was
    /// cancelled.
    pub fn cancel(&mut self, id: FrameId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(pending, _)| *pending != id);
        self.pending.len() != before
    }

    /// Remove and return everything requested so far.
    pub fn take_pending(&mut self) -> Vec<(FrameId, FrameTask)> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_pending(&self, task: FrameTask) -> bool {
        self.pending.iter().any(|(_, t)| *t == task)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// Handle to a one-shot timer. Pass to [`TimerQueue::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTask {
    /// Resume auto-rotation after the post-interaction delay.
    AutoRotateResume,
    /// Fade out the "use ctrl + scroll to zoom" hint.
    HideScrollHint,
    /// Apply a debounced container resize.
    ApplyResize { width: u32, height: u32 },
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    timers: Vec<(TimerId, Instant, TimerTask)>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to fire once `deadline` has passed.
    pub fn set(&mut self, deadline: Instant, task: TimerTask) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.push((id, deadline, task));
        id
    }

    /// Cancel a timer. Returns `false` if it already fired or was cleared.
    pub fn clear(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|(timer, _, _)| *timer != id);
        self.timers.len() != before
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<(TimerId, TimerTask)> {
        let mut due = Vec::new();
        self.timers.retain(|&(id, deadline, task)| {
            if deadline <= now {
                due.push((deadline, id, task));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(deadline, id, _)| (*deadline, id.0));
        due.into_iter().map(|(_, id, task)| (id, task)).collect()
    }

    pub fn is_set(&self, id: TimerId) -> bool {
        self.timers.iter().any(|(timer, _, _)| *timer == id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.timers.clear();
    }
}

// ---------------------------------------------------------------------------
// Rate limiter
// ---------------------------------------------------------------------------

/// Time-sliced rate limiter with a trailing emit.
///
/// At most one value leaves per `window`. A value offered inside the window
/// is held and released by [`flush_due`](Self::flush_due) once the window
/// elapses; a newer offer replaces the held one.
#[derive(Debug)]
pub struct Throttle<T> {
    window: Duration,
    last_emit: Option<Instant>,
    deferred: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit: None,
            deferred: None,
        }
    }

    /// 60 Hz.
    pub fn per_frame() -> Self {
        Self::new(Duration::from_secs_f64(1.0 / 60.0))
    }

    fn window_open(&self, now: Instant) -> bool {
        self.last_emit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.window)
    }

    /// Offer a value. Returns it back if it may be emitted now.
    pub fn offer(&mut self, now: Instant, value: T) -> Option<T> {
        if self.window_open(now) {
            self.last_emit = Some(now);
            self.deferred = None;
            Some(value)
        } else {
            self.deferred = Some(value);
            None
        }
    }

    /// Release the deferred value if its window has elapsed.
    pub fn flush_due(&mut self, now: Instant) -> Option<T> {
        if self.deferred.is_some() && self.window_open(now) {
            self.last_emit = Some(now);
            self.deferred.take()
        } else {
            None
        }
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Drop any deferred value without emitting it.
    pub fn reset(&mut self) {
        self.deferred = None;
        self.last_emit = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_requests_made_during_a_turn_wait_for_the_next() {
        let mut frames = FrameScheduler::new();
        frames.request(FrameTask::RenderLoop);
        let turn = frames.take_pending();
        assert_eq!(turn.len(), 1);
        frames.request(FrameTask::RenderLoop);
        assert_eq!(frames.pending_count(), 1);
    }

    #[test]
    fn cancelled_frame_never_runs() {
        let mut frames = FrameScheduler::new();
        let reset = frames.request(FrameTask::CameraReset);
        frames.request(FrameTask::RenderLoop);
        assert!(frames.cancel(reset));
        assert!(!frames.cancel(reset));
        let turn: Vec<_> = frames.take_pending().into_iter().map(|(_, t)| t).collect();
        assert_eq!(turn, vec![FrameTask::RenderLoop]);
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let t0 = Instant::now();
        let mut timers = TimerQueue::new();
        timers.set(t0 + Duration::from_millis(30), TimerTask::HideScrollHint);
        timers.set(t0 + Duration::from_millis(10), TimerTask::AutoRotateResume);
        timers.set(t0 + Duration::from_millis(90), TimerTask::ApplyResize { width: 1, height: 1 });

        assert!(timers.take_due(t0).is_empty());
        let due: Vec<_> = timers
            .take_due(t0 + Duration::from_millis(50))
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        assert_eq!(due, vec![TimerTask::AutoRotateResume, TimerTask::HideScrollHint]);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn cleared_timer_does_not_fire() {
        let t0 = Instant::now();
        let mut timers = TimerQueue::new();
        let id = timers.set(t0, TimerTask::AutoRotateResume);
        assert!(timers.clear(id));
        assert!(timers.take_due(t0 + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn throttle_emits_first_then_defers_latest() {
        let t0 = Instant::now();
        let ms = Duration::from_millis;
        let mut throttle = Throttle::new(ms(16));

        assert_eq!(throttle.offer(t0, 1), Some(1));
        assert_eq!(throttle.offer(t0 + ms(4), 2), None);
        assert_eq!(throttle.offer(t0 + ms(8), 3), None);
        assert_eq!(throttle.flush_due(t0 + ms(10)), None);
        assert_eq!(throttle.flush_due(t0 + ms(16)), Some(3));
        assert!(!throttle.has_deferred());

        // Window restarted at the flush.
        assert_eq!(throttle.offer(t0 + ms(20), 4), None);
        assert_eq!(throttle.offer(t0 + ms(40), 5), Some(5));
        assert_eq!(throttle.flush_due(t0 + ms(100)), None);
    }
}
