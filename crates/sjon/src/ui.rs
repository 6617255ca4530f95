//! # UI — Container, Overlays, Toolbar
//!
//! The viewer's presentation state, kept as plain data so hosts can draw it
//! however they like and tests can inspect it.
//!
//! ```text
//!  Page ──find("#viewer")──▶ ContainerRef (Rc<RefCell<Container>>)
//!                                 │  classes: sjon-container, sjon-theme-dark, …
//!                                 │  size, device pixel ratio, reduced motion
//!  Viewer ─owns─▶ LoadingOverlay, ErrorOverlay, ScrollHint, Option<Toolbar>
//! ```
//!
//! The host shares the container with the viewer. It reports resizes and the
//! platform's reduced-motion preference through it, and reads back the
//! classes the viewer applies.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Duration;

use crate::config::{ToolbarPosition, ViewerConfig};

pub const CONTAINER_CLASS: &str = "sjon-container";
pub const DARK_THEME_CLASS: &str = "sjon-theme-dark";
pub const FULLSCREEN_CLASS: &str = "sjon-container--fullscreen";

/// Used when the container reports a zero dimension.
pub const FALLBACK_SIZE: (u32, u32) = (800, 600);

// ---------------------------------------------------------------------------
// Container and page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Container {
    id: String,
    classes: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
    width: u32,
    height: u32,
    pub device_pixel_ratio: f32,
    pub prefers_reduced_motion: bool,
    fullscreen: bool,
}

impl Container {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            classes: BTreeSet::new(),
            attributes: BTreeMap::new(),
            width,
            height,
            device_pixel_ratio: 1.0,
            prefers_reduced_motion: false,
            fullscreen: false,
        }
    }

    pub fn with_device_pixel_ratio(mut self, ratio: f32) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    pub fn with_reduced_motion(mut self, reduced: bool) -> Self {
        self.prefers_reduced_motion = reduced;
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.add_class(class);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The host reports a new layout size. The viewer picks it up through
    /// [`Viewer::resize`](crate::viewer::Viewer::resize).
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Current size, or [`FALLBACK_SIZE`] if either dimension is zero.
    pub fn surface_size(&self) -> (u32, u32) {
        if self.width == 0 || self.height == 0 {
            FALLBACK_SIZE
        } else {
            (self.width, self.height)
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn add_class(&mut self, class: &str) {
        self.classes.insert(class.to_string());
    }

    pub fn remove_class(&mut self, class: &str) {
        self.classes.remove(class);
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub(crate) fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
        if fullscreen {
            self.add_class(FULLSCREEN_CLASS);
        } else {
            self.remove_class(FULLSCREEN_CLASS);
        }
    }
}

pub type ContainerRef = Rc<RefCell<Container>>;

/// The set of containers a host exposes to selector lookup.
#[derive(Debug, Default)]
pub struct Page {
    containers: Vec<ContainerRef>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, container: Container) -> ContainerRef {
        let container = Rc::new(RefCell::new(container));
        self.containers.push(container.clone());
        container
    }

    /// Resolve `#id`, `.class`, or a bare id.
    pub fn find(&self, selector: &str) -> Option<ContainerRef> {
        let selector = selector.trim();
        let matches = |c: &Container| match selector.strip_prefix('.') {
            Some(class) => c.has_class(class),
            None => c.id() == selector.strip_prefix('#').unwrap_or(selector),
        };
        self.containers
            .iter()
            .find(|c| matches(&c.borrow()))
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Overlays
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadingOverlay {
    visible: bool,
    percent: u8,
    show_percent: bool,
}

impl LoadingOverlay {
    pub fn new(show_percent: bool) -> Self {
        Self {
            show_percent,
            ..Self::default()
        }
    }

    pub fn show(&mut self) {
        self.visible = true;
        self.percent = 0;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn set_show_percent(&mut self, show: bool) {
        self.show_percent = show;
    }

    pub fn set_progress(&mut self, fraction: f32) {
        self.percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u8;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn text(&self) -> String {
        if self.show_percent && self.percent > 0 {
            format!("Loading... {}%", self.percent)
        } else {
            "Loading...".to_string()
        }
    }
}

/// Alert panel with a retry action.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorOverlay {
    visible: bool,
    message: String,
}

impl Default for ErrorOverlay {
    fn default() -> Self {
        Self {
            visible: false,
            message: "Failed to load model".to_string(),
        }
    }
}

impl ErrorOverlay {
    pub fn show(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn retry_label(&self) -> &'static str {
        "Retry"
    }
}

/// "Ctrl + scroll to zoom", shown briefly after a plain wheel event.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollHint {
    visible: bool,
    text: &'static str,
}

impl ScrollHint {
    pub const DURATION: Duration = Duration::from_millis(1500);

    pub fn new() -> Self {
        let text = if cfg!(target_os = "macos") {
            "\u{2318} + scroll to zoom"
        } else {
            "Ctrl + scroll to zoom"
        };
        Self {
            visible: false,
            text,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn text(&self) -> &'static str {
        self.text
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

impl Default for ScrollHint {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Toolbar
// ---------------------------------------------------------------------------

/// Everything a toolbar or corner button can ask the viewer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerAction {
    ResetCamera,
    ToggleAutoRotate,
    /// Play when stopped or paused, pause when playing.
    PlayPause,
    Stop,
    Screenshot,
    ToggleFullscreen,
    ToggleBackground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolbarButton {
    ResetCamera,
    AutoRotate,
    PlayPause,
    Stop,
    Screenshot,
}

impl ToolbarButton {
    pub fn action(self) -> ViewerAction {
        match self {
            Self::ResetCamera => ViewerAction::ResetCamera,
            Self::AutoRotate => ViewerAction::ToggleAutoRotate,
            Self::PlayPause => ViewerAction::PlayPause,
            Self::Stop => ViewerAction::Stop,
            Self::Screenshot => ViewerAction::Screenshot,
        }
    }
}

/// Button groups in display order; hosts draw a separator between groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Toolbar {
    pub position: ToolbarPosition,
    pub groups: Vec<Vec<ToolbarButton>>,
    pub auto_rotate_active: bool,
    pub animation_playing: bool,
}

impl Toolbar {
    /// `None` when no button would be visible.
    pub fn build(config: &ViewerConfig, has_animations: bool, auto_rotate_active: bool) -> Option<Self> {
        let mut camera = Vec::new();
        if config.reset_camera_button {
            camera.push(ToolbarButton::ResetCamera);
        }
        if config.auto_rotate_button {
            camera.push(ToolbarButton::AutoRotate);
        }
        let mut animation = Vec::new();
        if config.animation_buttons && has_animations {
            animation.extend([ToolbarButton::PlayPause, ToolbarButton::Stop]);
        }
        let mut capture = Vec::new();
        if config.screenshot_button {
            capture.push(ToolbarButton::Screenshot);
        }

        let groups: Vec<_> = [camera, animation, capture]
            .into_iter()
            .filter(|g| !g.is_empty())
            .collect();
        if groups.is_empty() {
            return None;
        }
        Some(Self {
            position: config.toolbar_position,
            groups,
            auto_rotate_active,
            animation_playing: false,
        })
    }

    pub fn buttons(&self) -> impl Iterator<Item = ToolbarButton> + '_ {
        self.groups.iter().flatten().copied()
    }

    pub fn has(&self, button: ToolbarButton) -> bool {
        self.buttons().any(|b| b == button)
    }

    /// Accessible label for a button in its current state.
    pub fn label(&self, button: ToolbarButton) -> &'static str {
        match button {
            ToolbarButton::ResetCamera => "Reset camera",
            ToolbarButton::AutoRotate => "Toggle auto-rotate",
            ToolbarButton::PlayPause if self.animation_playing => "Pause animation",
            ToolbarButton::PlayPause => "Play animation",
            ToolbarButton::Stop => "Stop animation",
            ToolbarButton::Screenshot => "Take screenshot",
        }
    }
}

/// Top-right buttons, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CornerControls {
    pub fullscreen: bool,
    pub background_toggle: bool,
}

// ---------------------------------------------------------------------------
// Wheel gating
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelEvent {
    pub delta_y: f32,
    pub ctrl: bool,
    pub meta: bool,
}

impl WheelEvent {
    pub fn new(delta_y: f32) -> Self {
        Self {
            delta_y,
            ..Self::default()
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }
}

/// What happened to a wheel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelOutcome {
    /// The camera zoomed; the host should suppress page scrolling.
    Zoomed,
    /// The viewer let the event through to the page and showed the hint.
    PageScroll,
    /// Zoom is disabled; the event was neither used nor suppressed.
    Ignored,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors() {
        let mut page = Page::new();
        page.add(Container::new("hero", 640, 480).with_class("product"));
        page.add(Container::new("other", 10, 10));

        assert_eq!(page.find("#hero").unwrap().borrow().id(), "hero");
        assert_eq!(page.find("hero").unwrap().borrow().id(), "hero");
        assert_eq!(page.find(".product").unwrap().borrow().id(), "hero");
        assert!(page.find("#missing").is_none());
    }

    #[test]
    fn zero_size_falls_back() {
        assert_eq!(Container::new("a", 0, 300).surface_size(), FALLBACK_SIZE);
        assert_eq!(Container::new("a", 320, 200).surface_size(), (320, 200));
    }

    #[test]
    fn fullscreen_class_follows_state() {
        let mut c = Container::new("a", 1, 1);
        c.set_fullscreen(true);
        assert!(c.has_class(FULLSCREEN_CLASS));
        c.set_fullscreen(false);
        assert_eq!(c.classes().count(), 0);
    }

    #[test]
    fn loading_text() {
        let mut overlay = LoadingOverlay::new(true);
        overlay.show();
        assert_eq!(overlay.text(), "Loading...");
        overlay.set_progress(0.424);
        assert_eq!(overlay.text(), "Loading... 42%");
        overlay.set_progress(3.0);
        assert_eq!(overlay.percent(), 100);

        let mut quiet = LoadingOverlay::new(false);
        quiet.set_progress(0.5);
        assert_eq!(quiet.text(), "Loading...");
    }

    #[test]
    fn toolbar_groups() {
        let config = ViewerConfig::default();
        let plain = Toolbar::build(&config, false, false).unwrap();
        assert_eq!(plain.groups, vec![vec![ToolbarButton::ResetCamera, ToolbarButton::AutoRotate]]);

        let animated = Toolbar::build(&config, true, false).unwrap();
        assert_eq!(animated.groups.len(), 2);
        assert!(animated.has(ToolbarButton::Stop));
        assert_eq!(animated.label(ToolbarButton::PlayPause), "Play animation");

        let bare = ViewerConfig {
            reset_camera_button: false,
            auto_rotate_button: false,
            ..ViewerConfig::default()
        };
        assert!(Toolbar::build(&bare, false, false).is_none());
        assert!(Toolbar::build(&bare, true, false).is_some());
    }
}
