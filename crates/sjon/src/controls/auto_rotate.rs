//! Auto-rotation with pause-on-interaction.
//!
//! ```text
//!            start()
//!   Off ───────────────▶ Rotating ◀──────────────────────┐
//!    ▲                     │ interaction_start()          │ resume timer fires
//!    │ stop()              ▼                              │
//!    └──────────── PausedByInteraction ──interaction_end()──▶ PendingResume(timer)
//!                          ▲                              │
//!                          └──── interaction_start() ─────┘  (timer cleared)
//! ```
//!
//! The resume timer lives in the viewer's [`TimerQueue`]; re-interacting
//! clears it, so a stale timer can never restart rotation mid-drag.

use std::time::{Duration, Instant};

use crate::controls::OrbitControls;
use crate::schedule::{TimerId, TimerQueue, TimerTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoRotateState {
    Off,
    Rotating,
    PausedByInteraction,
    PendingResume(TimerId),
}

#[derive(Debug)]
pub struct AutoRotate {
    state: AutoRotateState,
    /// Revolutions per second.
    speed: f32,
    delay: Duration,
}

impl AutoRotate {
    pub fn new(speed: f32, delay: Duration) -> Self {
        Self {
            state: AutoRotateState::Off,
            speed,
            delay,
        }
    }

    pub fn state(&self) -> AutoRotateState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state != AutoRotateState::Off
    }

    fn clear_pending(&mut self, timers: &mut TimerQueue) {
        if let AutoRotateState::PendingResume(id) = self.state {
            timers.clear(id);
        }
    }

    pub fn start(&mut self, controls: &mut OrbitControls, timers: &mut TimerQueue) {
        self.clear_pending(timers);
        self.state = AutoRotateState::Rotating;
        controls.auto_rotate = true;
        controls.auto_rotate_speed = self.speed;
    }

    pub fn stop(&mut self, controls: &mut OrbitControls, timers: &mut TimerQueue) {
        self.clear_pending(timers);
        self.state = AutoRotateState::Off;
        controls.auto_rotate = false;
    }

    pub fn set_speed(&mut self, speed: f32, controls: &mut OrbitControls) {
        self.speed = speed;
        controls.auto_rotate_speed = speed;
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    pub fn interaction_start(&mut self, controls: &mut OrbitControls, timers: &mut TimerQueue) {
        match self.state {
            AutoRotateState::Off => {}
            AutoRotateState::Rotating | AutoRotateState::PausedByInteraction => {
                self.state = AutoRotateState::PausedByInteraction;
            }
            AutoRotateState::PendingResume(id) => {
                timers.clear(id);
                self.state = AutoRotateState::PausedByInteraction;
            }
        }
        controls.auto_rotate = false;
    }

    pub fn interaction_end(&mut self, now: Instant, timers: &mut TimerQueue) {
        if self.state == AutoRotateState::PausedByInteraction {
            let id = timers.set(now + self.delay, TimerTask::AutoRotateResume);
            self.state = AutoRotateState::PendingResume(id);
        }
    }

    /// The resume timer `id` fired.
    pub fn resume(&mut self, id: TimerId, controls: &mut OrbitControls) {
        if self.state == AutoRotateState::PendingResume(id) {
            self.state = AutoRotateState::Rotating;
            controls.auto_rotate = true;
            controls.auto_rotate_speed = self.speed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AutoRotate, OrbitControls, TimerQueue) {
        (
            AutoRotate::new(0.5, Duration::from_millis(3000)),
            OrbitControls::new(),
            TimerQueue::new(),
        )
    }

    #[test]
    fn full_cycle() {
        let (mut ar, mut controls, mut timers) = setup();
        let t0 = Instant::now();

        ar.start(&mut controls, &mut timers);
        assert!(controls.auto_rotate);
        assert_eq!(controls.auto_rotate_speed, 0.5);

        ar.interaction_start(&mut controls, &mut timers);
        assert_eq!(ar.state(), AutoRotateState::PausedByInteraction);
        assert!(!controls.auto_rotate);

        ar.interaction_end(t0, &mut timers);
        let AutoRotateState::PendingResume(id) = ar.state() else {
            panic!("expected pending resume");
        };
        assert!(timers.take_due(t0 + Duration::from_millis(2999)).is_empty());
        let due = timers.take_due(t0 + Duration::from_millis(3000));
        assert_eq!(due, vec![(id, TimerTask::AutoRotateResume)]);

        ar.resume(id, &mut controls);
        assert_eq!(ar.state(), AutoRotateState::Rotating);
        assert!(controls.auto_rotate);
    }

    #[test]
    fn reinteraction_cancels_resume_timer() {
        let (mut ar, mut controls, mut timers) = setup();
        let t0 = Instant::now();
        ar.start(&mut controls, &mut timers);
        ar.interaction_start(&mut controls, &mut timers);
        ar.interaction_end(t0, &mut timers);
        let AutoRotateState::PendingResume(stale) = ar.state() else {
            panic!("expected pending resume");
        };

        ar.interaction_start(&mut controls, &mut timers);
        assert!(timers.is_empty());

        // A late delivery of the stale timer is ignored.
        ar.resume(stale, &mut controls);
        assert_eq!(ar.state(), AutoRotateState::PausedByInteraction);
        assert!(!controls.auto_rotate);
    }

    #[test]
    fn interaction_while_off_schedules_nothing() {
        let (mut ar, mut controls, mut timers) = setup();
        ar.interaction_start(&mut controls, &mut timers);
        ar.interaction_end(Instant::now(), &mut timers);
        assert_eq!(ar.state(), AutoRotateState::Off);
        assert!(timers.is_empty());
    }

    #[test]
    fn stop_clears_pending_timer() {
        let (mut ar, mut controls, mut timers) = setup();
        ar.start(&mut controls, &mut timers);
        ar.interaction_start(&mut controls, &mut timers);
        ar.interaction_end(Instant::now(), &mut timers);
        ar.stop(&mut controls, &mut timers);
        assert!(timers.is_empty());
        assert!(!ar.is_enabled());
    }
}
