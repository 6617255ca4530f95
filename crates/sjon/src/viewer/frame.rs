//! The per-frame turn: message drain, timers, render loop, camera reset.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use log::{debug, trace};

use super::Viewer;
use crate::camera::{CameraReset, InitialCameraPose};
use crate::math::Vec3;
use crate::schedule::{FrameId, FrameTask, TimerTask};

/// Smallest squared movement reported as a camera change.
const POSE_EPSILON: f32 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The camera arrived at the initial pose.
    Completed,
    /// A newer reset or `destroy` interrupted this one.
    Cancelled,
}

/// Settles when a [`Viewer::reset_camera`] animation ends.
#[derive(Debug)]
pub struct ResetHandle {
    rx: oneshot::Receiver<ResetOutcome>,
    outcome: Option<ResetOutcome>,
}

impl ResetHandle {
    fn new(rx: oneshot::Receiver<ResetOutcome>) -> Self {
        Self { rx, outcome: None }
    }

    pub fn try_outcome(&mut self) -> Option<ResetOutcome> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => Some(ResetOutcome::Cancelled),
            };
        }
        self.outcome
    }
}

impl Future for ResetHandle {
    type Output = ResetOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<ResetOutcome> {
        if let Some(outcome) = self.outcome {
            return Poll::Ready(outcome);
        }
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(ResetOutcome::Cancelled))
    }
}

/// The reset currently easing the camera.
pub(super) struct ActiveReset {
    frame: FrameId,
    motion: CameraReset,
    done: oneshot::Sender<ResetOutcome>,
}

impl ActiveReset {
    pub(super) fn cancel(self, frames: &mut crate::schedule::FrameScheduler) {
        frames.cancel(self.frame);
        let _ = self.done.send(ResetOutcome::Cancelled);
    }
}

impl Viewer {
    /// Run one turn at the current wall-clock time.
    pub fn frame(&mut self) {
        self.frame_at(Instant::now());
    }

    /// Run one turn at `now`: apply decoder results, fire due timers, then
    /// run the frame callbacks requested before this turn.
    pub fn frame_at(&mut self, now: Instant) {
        if self.destroyed {
            self.collect_late_results(Duration::ZERO);
            return;
        }
        self.time.update(now);
        let now = self.time.now();

        self.drain_messages();

        for (id, task) in self.timers.take_due(now) {
            match task {
                TimerTask::AutoRotateResume => {
                    if let Some(auto_rotate) = &mut self.auto_rotate {
                        auto_rotate.resume(id, &mut self.controls);
                    }
                }
                TimerTask::HideScrollHint => {
                    if self.hint_timer == Some(id) {
                        self.hint_timer = None;
                        self.scroll_hint.set_visible(false);
                    }
                }
                TimerTask::ApplyResize { width, height } => {
                    if self.resize_timer == Some(id) {
                        self.resize_timer = None;
                        self.apply_resize(width, height);
                    }
                }
            }
        }

        for (id, task) in self.frames.take_pending() {
            // A callback earlier in this turn may have torn the viewer down.
            if self.destroyed {
                break;
            }
            match task {
                FrameTask::RenderLoop => self.render_tick(),
                FrameTask::CameraReset => self.reset_tick(id, now),
            }
        }
    }

    /// Frame callbacks waiting for the next turn.
    pub fn pending_frame_callbacks(&self) -> usize {
        self.frames.pending_count()
    }

    fn render_tick(&mut self) {
        self.render_frame = Some(self.frames.request(FrameTask::RenderLoop));
        let dt = self.time.delta_secs();

        self.controls.update(&mut self.camera, dt);
        if let (Some(mixer), Some(root)) = (self.mixer.as_mut(), self.scene.model_mut()) {
            mixer.update(dt, root);
        }
        self.renderer.render(&self.scene, &self.camera);
        self.notify_camera_change();
    }

    /// Report pose changes through `on_camera_change`, at most once per
    /// throttle window. The latest pose is delivered when the window ends.
    fn notify_camera_change(&mut self) {
        let now = self.time.now();
        let pose = (self.camera.position, self.controls.target);
        let moved = match self.last_camera_pose {
            None => false,
            Some((position, target)) => {
                position.distance_squared(pose.0) > POSE_EPSILON
                    || target.distance_squared(pose.1) > POSE_EPSILON
            }
        };
        if self.last_camera_pose.is_none() || moved {
            self.last_camera_pose = Some(pose);
        }

        let emit = if moved {
            self.camera_change.offer(now, pose)
        } else {
            self.camera_change.flush_due(now)
        };
        let Some((position, target)) = emit else {
            return;
        };
        if let Some(callback) = self.config.callbacks.on_camera_change.clone() {
            callback(position, target);
        }
    }

    // -- camera reset -------------------------------------------------------

    /// Ease the camera back to the pose captured after the last load. A
    /// reset already in flight is cancelled. Under reduced motion the camera
    /// jumps immediately.
    pub fn reset_camera(&mut self) -> ResetHandle {
        let (done, rx) = oneshot::channel();
        if self.destroyed {
            return ResetHandle::new(rx);
        }
        if let Some(previous) = self.reset.take() {
            debug!("camera reset superseded");
            previous.cancel(&mut self.frames);
        }

        let destination = self.initial_pose;
        if self.container.borrow().prefers_reduced_motion {
            self.apply_pose(destination);
            let _ = done.send(ResetOutcome::Completed);
            return ResetHandle::new(rx);
        }

        let from = InitialCameraPose {
            position: self.camera.position,
            target: self.controls.target,
        };
        self.reset = Some(ActiveReset {
            frame: self.frames.request(FrameTask::CameraReset),
            motion: CameraReset::new(from, destination, self.time.now()),
            done,
        });
        ResetHandle::new(rx)
    }

    pub fn is_resetting_camera(&self) -> bool {
        self.reset.is_some()
    }

    fn reset_tick(&mut self, id: FrameId, now: Instant) {
        let Some(reset) = &self.reset else {
            return;
        };
        if reset.frame != id {
            trace!("stale camera reset frame");
            return;
        }
        let (pose, done) = reset.motion.sample(now);
        self.apply_pose(pose);
        if done {
            if let Some(reset) = self.reset.take() {
                let _ = reset.done.send(ResetOutcome::Completed);
            }
        } else {
            let frame = self.frames.request(FrameTask::CameraReset);
            if let Some(reset) = &mut self.reset {
                reset.frame = frame;
            }
        }
    }

    fn apply_pose(&mut self, pose: InitialCameraPose) {
        self.controls.stop_motion();
        self.camera.position = pose.position;
        self.controls.target = pose.target;
        self.controls.update(&mut self.camera, 0.0);
    }

    pub(super) fn camera_pose(&self) -> (Vec3, Vec3) {
        (self.camera.position, self.controls.target)
    }
}
