//! The model load pipeline and environment maps.
//!
//! Decoding happens off the viewer: either on a worker thread or inline on
//! the caller's stack. Either way the results travel over the viewer's
//! `mpsc` channel and are only applied when [`Viewer::frame_at`] drains it,
//! after the generation check.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;

use futures::channel::oneshot;
use log::{debug, info, trace, warn};

use super::Viewer;
use crate::animation::AnimationMixer;
use crate::camera::InitialCameraPose;
use crate::dispose::{Disposer, dispose_node};
use crate::error::LoadError;
use crate::lighting::{Environment, GroundPlane};
use crate::loader::{LoadRequest, LoadedModel};
use crate::scene::{Background, Node};
use crate::ui::Toolbar;

/// Largest dimension of every model after normalization.
const TARGET_SIZE: f32 = 2.0;
/// Smallest radius used for distance limits.
const MIN_RADIUS: f32 = 1e-3;
const MIN_DISTANCE_FACTOR: f32 = 1.2;
const MAX_DISTANCE_FACTOR: f32 = 5.0;

pub(super) type LoadResult = Result<LoadOutcome, LoadError>;

/// Where decoders run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadExecutor {
    /// One worker thread per load.
    #[default]
    Threaded,
    /// On the calling thread, inside `load_model`. Results still wait for the
    /// next frame.
    Inline,
}

impl LoadExecutor {
    /// Run `job`. On error the job was dropped without running.
    fn run(self, job: impl FnOnce() + Send + 'static) -> io::Result<()> {
        match self {
            Self::Inline => {
                job();
                Ok(())
            }
            Self::Threaded => thread::Builder::new()
                .name("sjon-loader".into())
                .spawn(job)
                .map(drop),
        }
    }
}

/// How a load that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The model is in the scene.
    Attached,
    /// A newer load (or `destroy`) replaced this one; its result was dropped.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Idle,
    Loading { generation: u64 },
    Attached { generation: u64 },
    Failed { generation: u64, message: String },
}

impl LoadState {
    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::Loading { generation }
            | Self::Attached { generation }
            | Self::Failed { generation, .. } => Some(*generation),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

/// Settles when its load is attached, fails, or is superseded.
///
/// Await it from async code, or poll it with
/// [`try_outcome`](Self::try_outcome) between frames.
#[derive(Debug)]
pub struct LoadHandle {
    rx: oneshot::Receiver<LoadResult>,
    outcome: Option<LoadResult>,
}

impl LoadHandle {
    fn new(rx: oneshot::Receiver<LoadResult>) -> Self {
        Self { rx, outcome: None }
    }

    /// The outcome, if the load has settled.
    pub fn try_outcome(&mut self) -> Option<LoadResult> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(result) => result,
                Err(oneshot::Canceled) => Some(Ok(LoadOutcome::Superseded)),
            };
        }
        self.outcome.clone()
    }
}

impl Future for LoadHandle {
    type Output = LoadResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<LoadResult> {
        if let Some(outcome) = self.outcome.clone() {
            return Poll::Ready(outcome);
        }
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Ok(LoadOutcome::Superseded)))
    }
}

/// What decoders send back to the viewer.
pub(super) enum LoadMessage {
    Progress {
        generation: u64,
        fraction: f32,
    },
    Model {
        generation: u64,
        result: Result<LoadedModel, LoadError>,
    },
    Environment {
        url: String,
        result: Result<Environment, LoadError>,
    },
}

impl Viewer {
    /// Replace the current model with the one at `url`. Failures are
    /// reported through `on_error`, the error overlay and the handle; this
    /// never fails synchronously.
    pub fn load_model(&mut self, url: impl Into<String>, mtl_url: Option<String>) -> LoadHandle {
        let url = url.into();
        let (done, rx) = oneshot::channel();
        if self.destroyed {
            warn!("load_model({url}) on a destroyed viewer");
            return LoadHandle::new(rx);
        }
        self.config.src = url.clone();
        self.config.mtl_src = mtl_url.clone();
        self.begin_load(url, mtl_url, done);
        LoadHandle::new(rx)
    }

    /// Load the configured source again, typically after a failure.
    pub fn retry(&mut self) -> LoadHandle {
        let src = self.config.src.clone();
        let mtl = self.config.mtl_src.clone();
        self.load_model(src, mtl)
    }

    fn begin_load(
        &mut self,
        url: String,
        mtl_url: Option<String>,
        done: oneshot::Sender<LoadResult>,
    ) {
        self.generation += 1;
        let generation = self.generation;
        self.discard_model();
        self.progress = 0.0;
        self.error.hide();
        self.loading.show();
        if let Some(callback) = self.config.callbacks.on_load_start.clone() {
            callback();
        }

        let loader = match self.registry.resolve(&url) {
            Ok(loader) => loader,
            Err(err) => {
                self.fail(generation, &err);
                let _ = done.send(Err(err));
                return;
            }
        };

        info!("loading {url} (generation {generation})");
        self.load_state = LoadState::Loading { generation };
        self.waiters.push((generation, done));

        let mut request = LoadRequest::new(url.clone(), self.source.clone());
        request.mtl_url = mtl_url;
        request.draco = self.config.draco;
        request.draco_decoder_path = self.config.draco_decoder_path.clone();
        let tx = self.tx.clone();
        self.in_flight += 1;
        let spawned = self.executor.run(move || {
            let progress_tx = tx.clone();
            let mut progress = |fraction: f32| {
                let _ = progress_tx.send(LoadMessage::Progress {
                    generation,
                    fraction,
                });
            };
            let result = loader.load(&request, &mut progress);
            let _ = tx.send(LoadMessage::Model { generation, result });
        });
        if let Err(e) = spawned {
            self.in_flight -= 1;
            let err = LoadError::spawn(url, e.to_string());
            self.abort_load(generation, err);
        }
    }

    /// Fail a load whose decoder never started.
    fn abort_load(&mut self, generation: u64, err: LoadError) {
        self.fail(generation, &err);
        self.settle(generation, Err(err));
    }

    /// Detach and release the current model, its mixer and its ground plane.
    pub(super) fn discard_model(&mut self) {
        self.mixer = None;
        let Some(root) = self.scene.detach_model() else {
            return;
        };
        let mut disposer = Disposer::new(self.renderer.as_mut());
        disposer.node(&root);
        if let Some(ground) = self.scene.ground.take() {
            disposer.ground(&ground);
        }
        debug!(
            "disposed model \"{}\" ({} resources)",
            root.name,
            disposer.released_count()
        );
    }

    /// Swap the ground plane, releasing the old one.
    pub(super) fn replace_ground(&mut self, ground: Option<GroundPlane>) {
        if let Some(old) = std::mem::replace(&mut self.scene.ground, ground) {
            Disposer::new(self.renderer.as_mut()).ground(&old);
        }
    }

    fn fail(&mut self, generation: u64, err: &LoadError) {
        warn!("load failed (generation {generation}): {err}");
        self.loading.hide();
        self.error.show(err.to_string());
        self.load_state = LoadState::Failed {
            generation,
            message: err.to_string(),
        };
        if let Some(callback) = self.config.callbacks.on_error.clone() {
            callback(err);
        }
    }

    fn settle(&mut self, generation: u64, result: LoadResult) {
        if let Some(i) = self.waiters.iter().position(|(g, _)| *g == generation) {
            let (_, done) = self.waiters.swap_remove(i);
            let _ = done.send(result);
        }
    }

    /// Apply everything the decoders have sent since the last frame.
    pub(super) fn drain_messages(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                LoadMessage::Progress {
                    generation,
                    fraction,
                } => self.apply_progress(generation, fraction),
                LoadMessage::Model { generation, result } => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    self.finish_load(generation, result);
                }
                LoadMessage::Environment { url, result } => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    self.apply_environment(url, result);
                }
            }
        }
    }

    fn apply_progress(&mut self, generation: u64, fraction: f32) {
        if generation != self.generation || !self.load_state.is_loading() {
            trace!("dropping progress from generation {generation}");
            return;
        }
        if fraction.is_nan() {
            return;
        }
        self.progress = self.progress.max(fraction.clamp(0.0, 1.0));
        self.loading.set_progress(self.progress);
        if let Some(callback) = self.config.callbacks.on_progress.clone() {
            callback(self.progress);
        }
    }

    fn finish_load(&mut self, generation: u64, result: Result<LoadedModel, LoadError>) {
        if generation != self.generation {
            match &result {
                Ok(model) => {
                    let released = dispose_node(self.renderer.as_mut(), &model.root);
                    debug!("discarded superseded model from generation {generation} ({released} resources)");
                }
                Err(e) => debug!("ignoring failure of superseded generation {generation}: {e}"),
            }
            self.settle(generation, Ok(LoadOutcome::Superseded));
            return;
        }
        match result {
            Ok(model) => self.attach(generation, model),
            Err(err) => {
                self.fail(generation, &err);
                self.settle(generation, Err(err));
            }
        }
    }

    fn attach(&mut self, generation: u64, model: LoadedModel) {
        let LoadedModel {
            mut root,
            animations,
        } = model;

        normalize(&mut root);
        let bounds = root.bind_pose_bounds();
        if self.config.shadows {
            root.for_each_mesh_mut(&mut |mesh| {
                mesh.cast_shadow = true;
                mesh.receive_shadow = true;
            });
        }
        let clip_count = animations.len();
        self.mixer = (!animations.is_empty()).then(|| AnimationMixer::new(&root, animations));
        info!(
            "attached \"{}\" ({} meshes, {clip_count} clips, generation {generation})",
            root.name,
            root.mesh_count()
        );
        self.scene.attach_model(root);

        let sphere = bounds.bounding_sphere();
        self.apply_distance_limits(sphere.radius);
        self.controls
            .set_polar_range_degrees(self.config.polar_angle_min, self.config.polar_angle_max);
        if self.config.camera_position.is_none() {
            self.camera.fit_to_sphere(&sphere);
        }
        self.initial_pose = InitialCameraPose {
            position: self.camera.position,
            target: self.controls.target,
        };

        if self.config.shadows {
            self.replace_ground(Some(GroundPlane::new(&bounds, self.config.shadow_opacity)));
        }
        if self.config.auto_rotate {
            self.set_auto_rotate(true);
        }
        if let Some(url) = self.config.environment_map.clone() {
            self.request_environment(url);
        }
        if self.mixer.is_some() {
            if self.config.auto_play_animation || self.config.animation.is_some() {
                self.play_animation(self.config.animation.clone());
            }
            if self.config.animation_speed != 1.0 {
                self.set_animation_speed(self.config.animation_speed);
            }
        }

        self.loading.hide();
        self.toolbar = Toolbar::build(&self.config, self.mixer.is_some(), self.is_auto_rotating());
        self.sync_animation_button();
        self.load_state = LoadState::Attached { generation };
        self.settle(generation, Ok(LoadOutcome::Attached));
        if let Some(callback) = self.config.callbacks.on_load.clone() {
            callback(self);
        }
    }

    /// Dolly limits from the model radius unless configured explicitly.
    fn apply_distance_limits(&mut self, radius: f32) {
        let radius = radius.max(MIN_RADIUS);
        let min = self.config.zoom_min.unwrap_or(MIN_DISTANCE_FACTOR * radius);
        let max = self.config.zoom_max.unwrap_or(MAX_DISTANCE_FACTOR * radius);
        self.controls.set_distance_range(min, max);
    }

    // -- environment --------------------------------------------------------

    /// Fetch and decode `url` in the background. Not tied to a generation:
    /// a model reload does not cancel it.
    pub(super) fn request_environment(&mut self, url: String) {
        let loaded = self.scene.environment.as_ref().is_some_and(|env| env.url == url);
        if loaded || self.environment_pending.as_deref() == Some(url.as_str()) {
            return;
        }
        debug!("loading environment map {url}");
        self.environment_pending = Some(url.clone());
        let source = self.source.clone();
        let tx = self.tx.clone();
        self.in_flight += 1;
        let spawned = self.executor.run(move || {
            let result = source
                .fetch(&url, &mut |_| {})
                .and_then(|bytes| Environment::decode(&url, &bytes));
            let _ = tx.send(LoadMessage::Environment { url, result });
        });
        if let Err(e) = spawned {
            self.in_flight -= 1;
            self.environment_pending = None;
            warn!("environment map not loaded: {e}");
        }
    }

    fn apply_environment(&mut self, url: String, result: Result<Environment, LoadError>) {
        if self.environment_pending.as_deref() == Some(url.as_str()) {
            self.environment_pending = None;
        }
        match result {
            Ok(environment) => {
                if let Some(old) = self.scene.environment.replace(environment) {
                    self.renderer.release(old.id());
                }
                if self.config.environment_background {
                    self.scene.background = Background::Environment;
                }
                self.scene.lights.reduce_for_ibl();
                info!("environment map applied: {url}");
            }
            Err(e) => warn!("environment map failed: {e}"),
        }
    }
}

/// Scale so the largest bind-pose dimension is [`TARGET_SIZE`], then center
/// the scaled box on the origin. Empty models are left alone.
fn normalize(root: &mut Node) {
    let bounds = root.bind_pose_bounds();
    if bounds.is_empty() {
        return;
    }
    root.scale_to_fit(&bounds, TARGET_SIZE);
    let scaled = root.bind_pose_bounds();
    root.center_on_origin(&scaled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Callbacks, ConfigPatch};
    use crate::math::{Color, Transform, Vec3};
    use crate::scene::{Geometry, Material, Mesh};
    use crate::ui::{Container, Page};
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn slab() -> Node {
        let positions = vec![
            Vec3::new(-5.0, 0.0, -1.0),
            Vec3::new(5.0, 0.0, -1.0),
            Vec3::new(5.0, 2.0, 1.0),
        ];
        let mesh = Mesh::new(
            Arc::new(Geometry::new(positions, None)),
            Arc::new(Material::new(Color::WHITE)),
        );
        Node::new("slab")
            .with_transform(Transform::from_xyz(3.0, 4.0, 5.0))
            .with_mesh(mesh)
    }

    #[test]
    fn normalization_scales_then_centers() {
        let mut root = slab();
        normalize(&mut root);
        let bounds = root.bind_pose_bounds();
        assert_relative_eq!(bounds.max_dimension(), 2.0, epsilon = 1e-5);
        assert_relative_eq!(bounds.center().length(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn empty_models_are_not_normalized() {
        let mut root = Node::new("empty").with_transform(Transform::from_xyz(1.0, 0.0, 0.0));
        normalize(&mut root);
        assert_eq!(root.transform, Transform::from_xyz(1.0, 0.0, 0.0));
    }

    #[test]
    fn handles_report_superseded_when_dropped() {
        let (done, rx) = oneshot::channel::<LoadResult>();
        let mut handle = LoadHandle::new(rx);
        assert_eq!(handle.try_outcome(), None);
        drop(done);
        assert_eq!(handle.try_outcome(), Some(Ok(LoadOutcome::Superseded)));
        assert_eq!(pollster::block_on(handle), Ok(LoadOutcome::Superseded));
    }

    #[test]
    fn settled_handles_keep_their_outcome() {
        let (done, rx) = oneshot::channel::<LoadResult>();
        let mut handle = LoadHandle::new(rx);
        done.send(Ok(LoadOutcome::Attached)).unwrap();
        assert_eq!(handle.try_outcome(), Some(Ok(LoadOutcome::Attached)));
        assert_eq!(handle.try_outcome(), Some(Ok(LoadOutcome::Attached)));
    }

    #[test]
    fn inline_executor_runs_the_job_in_place() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        assert!(LoadExecutor::Inline.run(move || flag.store(true, Ordering::SeqCst)).is_ok());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn load_whose_decoder_never_starts_fails() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let mut page = Page::new();
        page.add(Container::new("v", 100, 100));
        let patch = ConfigPatch {
            callbacks: Callbacks {
                on_error: Some(Rc::new(move |e: &LoadError| sink.borrow_mut().push(e.clone()))),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut viewer = Viewer::builder(patch)
            .with_executor(LoadExecutor::Inline)
            .mount(&page, "#v")
            .unwrap();

        // the state begin_load leaves behind just before spawning
        let (done, rx) = oneshot::channel();
        let mut handle = LoadHandle::new(rx);
        viewer.generation = 1;
        viewer.load_state = LoadState::Loading { generation: 1 };
        viewer.waiters.push((1, done));
        viewer.loading.show();

        viewer.abort_load(1, LoadError::spawn("m.stl", "out of threads"));
        assert!(matches!(handle.try_outcome(), Some(Err(LoadError::Spawn { .. }))));
        assert!(matches!(viewer.load_state(), LoadState::Failed { generation: 1, .. }));
        assert!(viewer.waiters.is_empty());
        assert!(!viewer.elements().loading.is_visible());
        assert!(viewer.elements().error.is_visible());
        assert_eq!(errors.borrow().len(), 1);
    }

    #[test]
    fn load_state_generation() {
        assert_eq!(LoadState::Idle.generation(), None);
        assert_eq!(LoadState::Loading { generation: 3 }.generation(), Some(3));
        assert!(LoadState::Loading { generation: 3 }.is_loading());
        assert!(!LoadState::Attached { generation: 3 }.is_loading());
    }
}
