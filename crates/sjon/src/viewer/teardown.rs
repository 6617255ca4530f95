//! Idempotent teardown.

use std::sync::mpsc::TryRecvError;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::Viewer;
use super::load::LoadMessage;
use crate::dispose::{Disposer, dispose_node};
use crate::ui::{CONTAINER_CLASS, DARK_THEME_CLASS, FULLSCREEN_CLASS};

/// How long `destroy` waits for decoders that are still running.
const LATE_RESULT_WAIT: Duration = Duration::from_secs(5);

impl Viewer {
    /// Stop everything and release every GPU-side resource exactly once.
    ///
    /// Pending loads settle as superseded, a running camera reset settles as
    /// cancelled, and decoders still running are waited on for a few seconds
    /// so their results can be released unseen.
    /// Calling this again does nothing; it also runs on drop.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Some(reset) = self.reset.take() {
            reset.cancel(&mut self.frames);
        }
        if let Some(id) = self.render_frame.take() {
            self.frames.cancel(id);
        }
        self.frames.clear();
        self.timers.clear_all();
        self.resize_timer = None;
        self.hint_timer = None;
        self.camera_change.reset();
        if let Some(auto_rotate) = &mut self.auto_rotate {
            auto_rotate.stop(&mut self.controls, &mut self.timers);
        }

        // Anything still in flight is now stale.
        self.generation += 1;
        self.waiters.clear();
        self.environment_pending = None;
        self.collect_late_results(LATE_RESULT_WAIT);
        if self.in_flight > 0 {
            warn!(
                "{} decoder(s) still running after teardown; results arriving later are released on the next frame or on drop",
                self.in_flight
            );
        }

        if let (Some(mixer), Some(root)) = (self.mixer.as_mut(), self.scene.model_mut()) {
            mixer.stop(root);
        }
        self.mixer = None;

        let model = self.scene.detach_model();
        let ground = self.scene.ground.take();
        let environment = self.scene.environment.take();
        let mut disposer = Disposer::new(self.renderer.as_mut());
        if let Some(root) = &model {
            disposer.node(root);
        }
        disposer.lights(&self.scene.lights);
        if let Some(ground) = &ground {
            disposer.ground(ground);
        }
        if let Some(environment) = &environment {
            disposer.release(environment.id());
        }
        let released = disposer.released_count();
        self.renderer.dispose();

        self.hide_scroll_hint();
        self.loading.hide();
        self.wheel_interceptor = false;
        {
            let mut container = self.container.borrow_mut();
            container.remove_class(CONTAINER_CLASS);
            container.remove_class(DARK_THEME_CLASS);
            container.remove_class(FULLSCREEN_CLASS);
        }
        info!("viewer destroyed ({released} resources released)");
    }

    /// Release decoder results that arrive after teardown, waiting up to
    /// `wait` for jobs that are still running.
    pub(super) fn collect_late_results(&mut self, wait: Duration) {
        let deadline = Instant::now() + wait;
        let mut released = 0;
        loop {
            let message = match self.rx.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if self.in_flight == 0 || remaining.is_zero() {
                        break;
                    }
                    match self.rx.recv_timeout(remaining) {
                        Ok(message) => message,
                        Err(_) => break,
                    }
                }
            };
            released += self.release_late(message);
        }
        if released > 0 {
            debug!("released {released} resources from loads overtaken by teardown");
        }
    }

    fn release_late(&mut self, message: LoadMessage) -> usize {
        match message {
            LoadMessage::Progress { .. } => 0,
            LoadMessage::Model { result, .. } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                match result {
                    Ok(model) => dispose_node(self.renderer.as_mut(), &model.root),
                    Err(_) => 0,
                }
            }
            LoadMessage::Environment { result, .. } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                match result {
                    Ok(environment) => {
                        self.renderer.release(environment.id());
                        1
                    }
                    Err(_) => 0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigPatch;
    use crate::render::HeadlessRenderer;
    use crate::source::MemorySource;
    use crate::ui::{Container, Page, WheelEvent, WheelOutcome};
    use crate::viewer::{LoadExecutor, LoadOutcome};
    use std::sync::Arc;
    use std::time::Instant;

    const TRI_STL: &str = "solid t
facet normal 0 0 1
 outer loop
  vertex 0 0 0
  vertex 1 0 0
  vertex 0 1 0
 endloop
endfacet
endsolid t
";

    fn mount() -> (Viewer, Page) {
        let mut page = Page::new();
        page.add(Container::new("v", 200, 200));
        let viewer = Viewer::builder(ConfigPatch {
            theme: Some("dark".into()),
            ..ConfigPatch::with_src("m.stl")
        })
        .with_source(Arc::new(MemorySource::new().with("m.stl", TRI_STL)))
        .with_executor(LoadExecutor::Inline)
        .mount(&page, "#v")
        .unwrap();
        (viewer, page)
    }

    #[test]
    fn destroy_twice_releases_each_resource_once() {
        let (mut viewer, page) = mount();
        viewer.frame_at(Instant::now());
        assert!(viewer.objects().model.is_some());
        let log = viewer
            .objects()
            .renderer
            .as_any()
            .downcast_ref::<HeadlessRenderer>()
            .map(HeadlessRenderer::release_log)
            .unwrap();

        viewer.destroy();
        let after_first = log.distinct();
        viewer.destroy();
        assert!(after_first > 0);
        assert_eq!(log.distinct(), after_first);
        assert!(log.duplicates().is_empty());

        assert!(viewer.is_destroyed());
        assert_eq!(viewer.pending_frame_callbacks(), 0);
        let container = page.find("#v").unwrap();
        let container = container.borrow();
        assert!(!container.has_class(CONTAINER_CLASS));
        assert!(!container.has_class(DARK_THEME_CLASS));
    }

    #[test]
    fn in_flight_load_settles_superseded_on_destroy() {
        let (mut viewer, _page) = mount();
        let mut handle = viewer.load_model("m.stl", None);
        viewer.destroy();
        assert_eq!(handle.try_outcome(), Some(Ok(LoadOutcome::Superseded)));
    }

    #[test]
    fn operations_after_destroy_are_inert() {
        let (mut viewer, _page) = mount();
        viewer.destroy();
        viewer.frame_at(Instant::now());
        viewer.update(ConfigPatch::with_src("other.stl"));
        assert_eq!(viewer.handle_wheel(WheelEvent::new(1.0)), WheelOutcome::Ignored);
        let mut handle = viewer.load_model("m.stl", None);
        assert_eq!(handle.try_outcome(), Some(Ok(LoadOutcome::Superseded)));
        assert!(viewer.objects().model.is_none());
    }
}
