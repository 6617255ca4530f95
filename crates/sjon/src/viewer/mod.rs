//! # Viewer — Lifecycle Orchestration
//!
//! A [`Viewer`] owns one scene, one camera, one orbit controller and at most
//! one model. It is mounted on a host [`Container`](crate::ui::Container) and
//! driven by the host calling [`Viewer::frame_at`] once per display refresh.
//!
//! ```text
//!   mount ──▶ bootstrap scene ──▶ load_model(src) ──▶ Loading(g)
//!                                                       │
//!        worker / inline decoder ──mpsc──▶ frame_at() drains messages
//!                                                       │
//!                          g still current? ──yes──▶ Attached(g) ─▶ on_load
//!                                │                 └▶ Failed(g)   ─▶ on_error
//!                                no
//!                                └──▶ dispose result, resolve Superseded
//! ```
//!
//! Every load is stamped with a generation number. Starting a new load bumps
//! the generation; any message that arrives carrying an older stamp is
//! obsolete and its decoded resources are released without touching the
//! scene. Nothing aborts the decoder itself.
//!
//! The implementation is split by concern:
//!
//! | Module | Responsibility |
//! |---|---|
//! | `load` | load pipeline, executor, handles, environment maps |
//! | `update` | live configuration reconciler |
//! | `frame` | render loop, timers, eased camera reset |
//! | `input` | wheel, pointer, keyboard, resize, toolbar actions |
//! | `teardown` | idempotent `destroy` |

mod frame;
mod input;
mod load;
mod teardown;
mod update;

pub use frame::{ResetHandle, ResetOutcome};
pub use input::{Key, KeyEvent};
pub use load::{LoadExecutor, LoadHandle, LoadOutcome, LoadState};

use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use base64::Engine as _;
use log::{debug, info, warn};

use crate::animation::AnimationMixer;
use crate::camera::{InitialCameraPose, PerspectiveCamera};
use crate::config::{AnimationSelector, ConfigPatch, ViewerConfig};
use crate::controls::{AutoRotate, OrbitControls};
use crate::error::{CaptureError, ViewerError};
use crate::loader::DecoderRegistry;
use crate::math::Vec3;
use crate::render::{HeadlessRenderer, RenderBackend};
use crate::scene::{Background, Node, Scene};
use crate::schedule::{FrameId, FrameScheduler, FrameTask, Throttle, TimerId, TimerQueue};
use crate::source::{ByteSource, FileSource};
use crate::time::Time;
use crate::ui::{
    CONTAINER_CLASS, ContainerRef, CornerControls, DARK_THEME_CLASS, ErrorOverlay,
    LoadingOverlay, Page, ScrollHint, Toolbar,
};

use frame::ActiveReset;
use load::LoadMessage;

/// Default camera position when none is configured.
const DEFAULT_CAMERA_POSITION: Vec3 = Vec3::new(0.0, 1.0, 3.0);
/// Upper bound on the render pixel ratio when none is configured.
const DEFAULT_MAX_PIXEL_RATIO: f32 = 2.0;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures the collaborators a viewer runs with. Anything left unset uses
/// the built-in default: [`HeadlessRenderer`], the process-wide
/// [`DecoderRegistry`], [`FileSource`] and a threaded loader.
pub struct ViewerBuilder {
    patch: ConfigPatch,
    renderer: Option<Box<dyn RenderBackend>>,
    registry: Option<Arc<DecoderRegistry>>,
    source: Option<Arc<dyn ByteSource>>,
    executor: LoadExecutor,
    start: Option<Instant>,
}

impl ViewerBuilder {
    pub fn new(patch: ConfigPatch) -> Self {
        Self {
            patch,
            renderer: None,
            registry: None,
            source: None,
            executor: LoadExecutor::default(),
            start: None,
        }
    }

    pub fn with_renderer(mut self, renderer: impl RenderBackend) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Use a private registry instead of the shared one.
    pub fn with_registry(mut self, registry: Arc<DecoderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_source(mut self, source: Arc<dyn ByteSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_executor(mut self, executor: LoadExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Timestamp the viewer's clock starts from. Defaults to `Instant::now()`.
    pub fn with_start_time(mut self, start: Instant) -> Self {
        self.start = Some(start);
        self
    }

    /// Look up `selector` on `page` and mount there.
    pub fn mount(self, page: &Page, selector: &str) -> Result<Viewer, ViewerError> {
        let container = page
            .find(selector)
            .ok_or_else(|| ViewerError::ContainerNotFound {
                selector: selector.to_string(),
            })?;
        Ok(self.build(container))
    }

    /// Mount on an already resolved container.
    pub fn build(self, container: ContainerRef) -> Viewer {
        Viewer::bootstrap(self, container)
    }
}

// ---------------------------------------------------------------------------
// Viewer
// ---------------------------------------------------------------------------

/// Read-only access to the rendering objects, for advanced hosts.
pub struct ViewerObjects<'a> {
    pub scene: &'a Scene,
    pub camera: &'a PerspectiveCamera,
    pub controls: &'a OrbitControls,
    pub renderer: &'a dyn RenderBackend,
    pub model: Option<&'a Node>,
}

/// Read-only access to the presentation state.
pub struct ViewerElements<'a> {
    pub container: &'a ContainerRef,
    pub loading: &'a LoadingOverlay,
    pub error: &'a ErrorOverlay,
    pub scroll_hint: &'a ScrollHint,
    pub toolbar: Option<&'a Toolbar>,
    pub corner: CornerControls,
}

pub struct Viewer {
    config: ViewerConfig,
    container: ContainerRef,
    renderer: Box<dyn RenderBackend>,
    registry: Arc<DecoderRegistry>,
    source: Arc<dyn ByteSource>,
    executor: LoadExecutor,

    scene: Scene,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    auto_rotate: Option<AutoRotate>,
    mixer: Option<AnimationMixer>,
    initial_pose: InitialCameraPose,

    time: Time,
    frames: FrameScheduler,
    timers: TimerQueue,
    render_frame: Option<FrameId>,
    reset: Option<ActiveReset>,
    camera_change: Throttle<(Vec3, Vec3)>,
    last_camera_pose: Option<(Vec3, Vec3)>,
    resize_timer: Option<TimerId>,
    hint_timer: Option<TimerId>,

    generation: u64,
    load_state: LoadState,
    progress: f32,
    waiters: Vec<(u64, futures::channel::oneshot::Sender<load::LoadResult>)>,
    tx: mpsc::Sender<LoadMessage>,
    rx: mpsc::Receiver<LoadMessage>,
    /// Decoder jobs (models and environment maps) whose result has not been
    /// received yet.
    in_flight: usize,
    /// Environment map URL requested but not yet applied.
    environment_pending: Option<String>,

    loading: LoadingOverlay,
    error: ErrorOverlay,
    scroll_hint: ScrollHint,
    toolbar: Option<Toolbar>,
    corner: CornerControls,
    wheel_interceptor: bool,

    destroyed: bool,
}

impl Viewer {
    pub fn builder(patch: ConfigPatch) -> ViewerBuilder {
        ViewerBuilder::new(patch)
    }

    /// Mount a viewer with default collaborators on the container matching
    /// `selector`. Fails only if no container matches.
    pub fn mount(page: &Page, selector: &str, patch: ConfigPatch) -> Result<Self, ViewerError> {
        ViewerBuilder::new(patch).mount(page, selector)
    }

    /// Mount a viewer with default collaborators on `container`.
    pub fn new(container: ContainerRef, patch: ConfigPatch) -> Self {
        ViewerBuilder::new(patch).build(container)
    }

    fn bootstrap(builder: ViewerBuilder, container: ContainerRef) -> Self {
        let ViewerBuilder {
            patch,
            renderer,
            registry,
            source,
            executor,
            start,
        } = builder;

        let config = ViewerConfig::default().merge(&patch);
        for warning in config.validate() {
            warn!("config: {warning}");
        }

        let (width, height, device_ratio) = {
            let mut c = container.borrow_mut();
            c.add_class(CONTAINER_CLASS);
            if config.theme.is_dark() {
                c.add_class(DARK_THEME_CLASS);
            }
            c.set_attribute("role", "application");
            c.set_attribute("aria-roledescription", "3D viewer");
            c.set_attribute(
                "aria-label",
                format!("3D model viewer: {}", config.alt.as_deref().unwrap_or("3D model")),
            );
            c.set_attribute("tabindex", "0");
            let (w, h) = c.surface_size();
            (w, h, c.device_pixel_ratio)
        };

        let mut renderer = renderer.unwrap_or_else(|| Box::new(HeadlessRenderer::new()));
        renderer.set_size(width, height);
        renderer.set_pixel_ratio(
            device_ratio.min(config.pixel_ratio.unwrap_or(DEFAULT_MAX_PIXEL_RATIO)),
        );
        renderer.set_tone_mapping(config.tone_mapping.resolved(), config.tone_mapping_exposure);
        renderer.set_shadows_enabled(config.shadows);

        let target = config.camera_target_vec();
        let mut camera = PerspectiveCamera::new(config.camera_fov, width as f32 / height as f32);
        camera.position = config.camera_position_vec().unwrap_or(DEFAULT_CAMERA_POSITION);
        camera.look_at = target;

        let mut controls = OrbitControls::new();
        controls.target = target;
        configure_controls(&mut controls, &config);

        let scene = Scene::new(Background::from_css(&config.background), &config.lighting);
        let now = start.unwrap_or_else(Instant::now);
        let (tx, rx) = mpsc::channel();

        let mut frames = FrameScheduler::new();
        let render_frame = frames.request(FrameTask::RenderLoop);

        let mut viewer = Self {
            container,
            renderer,
            registry: registry.unwrap_or_else(DecoderRegistry::shared),
            source: source.unwrap_or_else(|| Arc::new(FileSource::new())),
            executor,
            scene,
            initial_pose: InitialCameraPose {
                position: camera.position,
                target,
            },
            camera,
            controls,
            auto_rotate: None,
            mixer: None,
            time: Time::new(now),
            frames,
            timers: TimerQueue::new(),
            render_frame: Some(render_frame),
            reset: None,
            camera_change: Throttle::per_frame(),
            last_camera_pose: None,
            resize_timer: None,
            hint_timer: None,
            generation: 0,
            load_state: LoadState::Idle,
            progress: 0.0,
            waiters: Vec::new(),
            tx,
            rx,
            in_flight: 0,
            environment_pending: None,
            loading: LoadingOverlay::new(config.show_progress),
            error: ErrorOverlay::default(),
            scroll_hint: ScrollHint::new(),
            toolbar: Toolbar::build(&config, false, config.auto_rotate),
            corner: CornerControls {
                fullscreen: config.fullscreen_button,
                background_toggle: config.background_toggle_button,
            },
            wheel_interceptor: !config.scroll_to_zoom,
            destroyed: false,
            config,
        };

        info!(
            "viewer mounted on #{} ({width}x{height})",
            viewer.container.borrow().id()
        );
        if !viewer.config.src.is_empty() {
            let src = viewer.config.src.clone();
            let mtl = viewer.config.mtl_src.clone();
            drop(viewer.load_model(src, mtl));
        }
        viewer
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    /// The current load generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The viewer's clock: the timestamp of the most recent frame.
    pub fn now(&self) -> Instant {
        self.time.now()
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn objects(&self) -> ViewerObjects<'_> {
        ViewerObjects {
            scene: &self.scene,
            camera: &self.camera,
            controls: &self.controls,
            renderer: self.renderer.as_ref(),
            model: self.scene.model(),
        }
    }

    pub fn elements(&self) -> ViewerElements<'_> {
        ViewerElements {
            container: &self.container,
            loading: &self.loading,
            error: &self.error,
            scroll_hint: &self.scroll_hint,
            toolbar: self.toolbar.as_ref(),
            corner: self.corner,
        }
    }

    pub fn toolbar(&self) -> Option<&Toolbar> {
        self.toolbar.as_ref()
    }

    pub fn initial_camera_pose(&self) -> InitialCameraPose {
        self.initial_pose
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    // -- camera -------------------------------------------------------------

    pub fn set_camera_position(&mut self, x: f32, y: f32, z: f32) {
        self.camera.position = Vec3::new(x, y, z);
        self.controls.update(&mut self.camera, 0.0);
    }

    pub fn set_camera_target(&mut self, x: f32, y: f32, z: f32) {
        self.controls.target = Vec3::new(x, y, z);
        self.controls.update(&mut self.camera, 0.0);
    }

    // -- auto-rotate --------------------------------------------------------

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        if enabled {
            let speed = self.config.auto_rotate_speed;
            let delay = Duration::from_millis(self.config.auto_rotate_delay_ms);
            self.auto_rotate
                .get_or_insert_with(|| AutoRotate::new(speed, delay))
                .start(&mut self.controls, &mut self.timers);
        } else if let Some(auto_rotate) = &mut self.auto_rotate {
            auto_rotate.stop(&mut self.controls, &mut self.timers);
        }
        if let Some(toolbar) = &mut self.toolbar {
            toolbar.auto_rotate_active = enabled;
        }
    }

    pub fn is_auto_rotating(&self) -> bool {
        self.auto_rotate.as_ref().is_some_and(AutoRotate::is_enabled)
    }

    // -- animation ----------------------------------------------------------

    /// Play a clip by index or name; `None` plays the first. Does nothing if
    /// no clip matches or the model has no animations.
    pub fn play_animation(&mut self, selector: Option<AnimationSelector>) {
        let (Some(mixer), Some(root)) = (self.mixer.as_mut(), self.scene.model_mut()) else {
            debug!("play_animation: no animations loaded");
            return;
        };
        let index = match &selector {
            None => Some(0),
            Some(AnimationSelector::Index(i)) => Some(*i),
            Some(AnimationSelector::Name(name)) => {
                mixer.clips().iter().position(|clip| clip.name == *name)
            }
        };
        if index.is_some_and(|i| mixer.play(i, root)) {
            self.sync_animation_button();
        } else {
            debug!("play_animation: no clip matches {selector:?}");
        }
    }

    pub fn pause_animation(&mut self) {
        if let Some(mixer) = &mut self.mixer {
            mixer.pause();
        }
        self.sync_animation_button();
    }

    /// Stop playback and return the model to its rest pose.
    pub fn stop_animation(&mut self) {
        if let (Some(mixer), Some(root)) = (self.mixer.as_mut(), self.scene.model_mut()) {
            mixer.stop(root);
        }
        self.sync_animation_button();
    }

    /// Playback rate. Kept for later clips and later loads.
    pub fn set_animation_speed(&mut self, speed: f32) {
        self.config.animation_speed = speed;
        if let Some(mixer) = &mut self.mixer {
            mixer.set_speed(speed);
        }
    }

    /// Clip names of the current model, in file order.
    pub fn animations(&self) -> Vec<String> {
        self.mixer
            .as_ref()
            .map(AnimationMixer::clip_names)
            .unwrap_or_default()
    }

    pub fn is_animation_playing(&self) -> bool {
        self.mixer.as_ref().is_some_and(AnimationMixer::is_playing)
    }

    fn sync_animation_button(&mut self) {
        let playing = self.is_animation_playing();
        if let Some(toolbar) = &mut self.toolbar {
            toolbar.animation_playing = playing;
        }
    }

    // -- screenshots --------------------------------------------------------

    /// Render one frame at `scale` times the surface size and read it back
    /// as PNG. The surface size is restored afterwards.
    pub fn capture_png(&mut self, scale: Option<f32>) -> Result<Vec<u8>, CaptureError> {
        let scale = scale.unwrap_or(self.config.screenshot_scale);
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        let (width, height) = self.renderer.size();
        let scaled = |v: u32| ((v as f32 * scale).round() as u32).max(1);

        self.renderer.set_size(scaled(width), scaled(height));
        self.renderer.render(&self.scene, &self.camera);
        let captured = self.renderer.capture_png();
        self.renderer.set_size(width, height);
        captured
    }

    /// A `data:image/png;base64,…` URI of the current view, or an empty
    /// string if the backend refuses readback.
    pub fn screenshot(&mut self, scale: Option<f32>) -> String {
        match self.capture_png(scale) {
            Ok(png) => format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(png)
            ),
            Err(e) => {
                warn!("screenshot failed: {e}");
                String::new()
            }
        }
    }

    /// Write `<filename>.png` into the download directory. Returns the path
    /// written.
    pub fn download_screenshot(
        &mut self,
        filename: Option<&str>,
        scale: Option<f32>,
    ) -> Result<PathBuf, CaptureError> {
        let png = self.capture_png(scale)?;
        let name = filename.unwrap_or(&self.config.screenshot_filename);
        let dir = self.config.download_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let path = dir.join(format!("{name}.png"));
        std::fs::write(&path, png)?;
        info!("screenshot saved to {}", path.display());
        Ok(path)
    }

    // -- fullscreen ---------------------------------------------------------

    pub fn enter_fullscreen(&mut self) {
        self.set_fullscreen(true);
    }

    pub fn exit_fullscreen(&mut self) {
        self.set_fullscreen(false);
    }

    pub fn is_fullscreen(&self) -> bool {
        self.container.borrow().is_fullscreen()
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        if self.destroyed || self.is_fullscreen() == fullscreen {
            return;
        }
        self.container.borrow_mut().set_fullscreen(fullscreen);
        if let Some(callback) = self.config.callbacks.on_fullscreen_change.clone() {
            callback(fullscreen);
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.destroy();
        // Anything that arrived since an explicit destroy.
        self.collect_late_results(Duration::ZERO);
    }
}

/// Push the orbit-related config fields onto the controller.
fn configure_controls(controls: &mut OrbitControls, config: &ViewerConfig) {
    controls.enable_rotate = config.controls;
    controls.enable_zoom = config.zoom;
    controls.enable_pan = config.pan;
    controls.enable_damping = config.damping;
    controls.damping_factor = config.damping_factor;
    controls.set_polar_range_degrees(config.polar_angle_min, config.polar_angle_max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::Container;

    fn page() -> Page {
        let mut page = Page::new();
        page.add(Container::new("viewer", 320, 240).with_device_pixel_ratio(3.0));
        page
    }

    #[test]
    fn mount_fails_without_container() {
        let err = Viewer::mount(&page(), "#missing", ConfigPatch::default()).err();
        assert!(matches!(err, Some(ViewerError::ContainerNotFound { .. })));
    }

    #[test]
    fn bootstrap_without_source() {
        let viewer = Viewer::mount(&page(), "#viewer", ConfigPatch::default()).unwrap();
        assert_eq!(viewer.load_state(), &LoadState::Idle);
        assert_eq!(viewer.generation(), 0);

        let objects = viewer.objects();
        assert_eq!(objects.camera.position, DEFAULT_CAMERA_POSITION);
        assert_eq!(objects.camera.fov, 45.0);
        assert_eq!(objects.renderer.size(), (320, 240));
        assert_eq!(objects.renderer.pixel_ratio(), 2.0);
        assert!(objects.renderer.shadows_enabled());
        assert!(objects.model.is_none());

        let elements = viewer.elements();
        let container = elements.container.borrow();
        assert!(container.has_class(CONTAINER_CLASS));
        assert!(!container.has_class(DARK_THEME_CLASS));
        assert_eq!(container.attribute("role"), Some("application"));
        assert_eq!(container.attribute("aria-label"), Some("3D model viewer: 3D model"));
        assert!(!elements.loading.is_visible());
    }

    #[test]
    fn zero_sized_container_falls_back() {
        let mut page = Page::new();
        page.add(Container::new("v", 0, 0));
        let viewer = Viewer::mount(&page, "v", ConfigPatch::default()).unwrap();
        assert_eq!(viewer.objects().renderer.size(), (800, 600));
    }

    #[test]
    fn configured_camera_and_controls() {
        let viewer = Viewer::mount(
            &page(),
            "#viewer",
            ConfigPatch {
                camera_position: Some([1.0, 2.0, 3.0]),
                camera_target: Some([0.0, 1.0, 0.0]),
                polar_angle_min: Some(120.0),
                polar_angle_max: Some(30.0),
                pan: Some(false),
                pixel_ratio: Some(1.5),
                ..Default::default()
            },
        )
        .unwrap();
        let objects = viewer.objects();
        assert_eq!(objects.camera.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(objects.controls.target, Vec3::new(0.0, 1.0, 0.0));
        assert!(objects.controls.min_polar_angle < objects.controls.max_polar_angle);
        assert!(!objects.controls.enable_pan);
        assert_eq!(objects.renderer.pixel_ratio(), 1.5);
    }

    #[test]
    fn animation_controls_are_safe_before_load() {
        let mut viewer = Viewer::mount(&page(), "#viewer", ConfigPatch::default()).unwrap();
        viewer.play_animation(None);
        viewer.pause_animation();
        viewer.stop_animation();
        viewer.set_animation_speed(2.0);
        assert!(viewer.animations().is_empty());
        assert!(!viewer.is_animation_playing());
        assert_eq!(viewer.config().animation_speed, 2.0);
    }

    #[test]
    fn fullscreen_toggles_class_and_notifies() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut viewer = Viewer::mount(
            &page(),
            "#viewer",
            ConfigPatch {
                callbacks: crate::config::Callbacks {
                    on_fullscreen_change: Some(Rc::new(move |on| sink.borrow_mut().push(on))),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();

        viewer.enter_fullscreen();
        viewer.enter_fullscreen();
        assert!(viewer.is_fullscreen());
        assert!(viewer.elements().container.borrow().has_class(crate::ui::FULLSCREEN_CLASS));
        viewer.exit_fullscreen();
        assert!(!viewer.is_fullscreen());
        assert_eq!(*seen.borrow(), vec![true, false]);
    }

    #[test]
    fn screenshot_is_a_png_data_uri_unless_blocked() {
        let mut viewer = Viewer::mount(&page(), "#viewer", ConfigPatch::default()).unwrap();
        let uri = viewer.screenshot(Some(1.0));
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(viewer.objects().renderer.size(), (320, 240));

        let mut renderer = HeadlessRenderer::new();
        renderer.block_capture(true);
        let mut blocked = Viewer::builder(ConfigPatch::default())
            .with_renderer(renderer)
            .mount(&page(), "#viewer")
            .unwrap();
        assert_eq!(blocked.screenshot(None), "");
    }
}
