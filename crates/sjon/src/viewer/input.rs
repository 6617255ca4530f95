//! Host input: wheel gating, pointer orbiting, keyboard shortcuts, resizes
//! and toolbar buttons.
//!
//! Keyboard bindings:
//!
//! | Key | Action |
//! |---|---|
//! | ← → | orbit horizontally by 5° |
//! | ↑ ↓ | orbit vertically by 5° |
//! | `+` `=` / `-` | zoom in / out |
//! | `0` | reset camera |
//! | `r` | toggle auto-rotate |
//! | `f` | toggle fullscreen |
//! | space | play / pause animation |
//! | Esc | leave fullscreen |

use std::time::Duration;

use log::{debug, warn};

use super::Viewer;
use crate::config::{ConfigPatch, Theme};
use crate::math::degrees_to_radians;
use crate::schedule::TimerTask;
use crate::ui::{ScrollHint, ViewerAction, WheelEvent, WheelOutcome};

const KEY_ROTATE_STEP_DEGREES: f32 = 5.0;
const KEY_ZOOM_FACTOR: f32 = 0.9;
const RESIZE_DEBOUNCE: Duration = Duration::from_millis(16);
const DARK_BACKGROUND: &str = "#1a1a1a";
const LIGHT_BACKGROUND: &str = "#ffffff";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Escape,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub ctrl: bool,
    pub meta: bool,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            meta: false,
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

    fn has_modifier(&self) -> bool {
        self.ctrl || self.meta
    }
}

impl Viewer {
    // -- wheel --------------------------------------------------------------

    /// Route a wheel event. Unless `scroll_to_zoom` is set, only ctrl/meta +
    /// wheel zooms; a plain wheel scrolls the page and flashes the hint.
    pub fn handle_wheel(&mut self, event: WheelEvent) -> WheelOutcome {
        if self.destroyed || !self.controls.enable_zoom {
            return WheelOutcome::Ignored;
        }
        if self.wheel_interceptor && !(event.ctrl || event.meta) {
            self.show_scroll_hint();
            return WheelOutcome::PageScroll;
        }
        self.begin_interaction();
        self.controls.zoom_by_wheel(event.delta_y);
        self.end_interaction();
        WheelOutcome::Zoomed
    }

    fn show_scroll_hint(&mut self) {
        self.scroll_hint.set_visible(true);
        if let Some(id) = self.hint_timer.take() {
            self.timers.clear(id);
        }
        let deadline = self.time.now() + ScrollHint::DURATION;
        self.hint_timer = Some(self.timers.set(deadline, TimerTask::HideScrollHint));
    }

    pub(super) fn hide_scroll_hint(&mut self) {
        self.scroll_hint.set_visible(false);
        if let Some(id) = self.hint_timer.take() {
            self.timers.clear(id);
        }
    }

    // -- pointer ------------------------------------------------------------

    /// A drag, pinch or wheel gesture started. Pauses auto-rotation.
    pub fn begin_interaction(&mut self) {
        if self.destroyed {
            return;
        }
        self.controls.begin_interaction();
        if let Some(auto_rotate) = &mut self.auto_rotate {
            auto_rotate.interaction_start(&mut self.controls, &mut self.timers);
        }
    }

    /// The gesture ended. Auto-rotation resumes after the configured delay.
    pub fn end_interaction(&mut self) {
        if self.destroyed {
            return;
        }
        self.controls.end_interaction();
        let now = self.time.now();
        if let Some(auto_rotate) = &mut self.auto_rotate {
            auto_rotate.interaction_end(now, &mut self.timers);
        }
    }

    /// Orbit by a pointer drag of `dx`, `dy` pixels.
    pub fn rotate_by(&mut self, dx: f32, dy: f32) {
        if !self.controls.enabled || !self.controls.enable_rotate {
            return;
        }
        let (_, height) = self.renderer.size();
        self.controls.rotate_by_pixels(dx, dy, height as f32);
    }

    /// Pan by a pointer drag of `dx`, `dy` pixels.
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        if !self.controls.enabled || !self.controls.enable_pan {
            return;
        }
        let (_, height) = self.renderer.size();
        self.controls.pan_by_pixels(&self.camera, dx, dy, height as f32);
    }

    // -- keyboard -----------------------------------------------------------

    /// Apply a keyboard shortcut. Returns `true` if the key was handled and
    /// the host should prevent its default action.
    pub fn handle_key(&mut self, event: KeyEvent) -> bool {
        if self.destroyed {
            return false;
        }
        let step = degrees_to_radians(KEY_ROTATE_STEP_DEGREES);
        let rotate = self.controls.enabled && self.controls.enable_rotate;
        let zoom = self.controls.enabled && self.controls.enable_zoom;

        match event.key {
            Key::ArrowLeft if rotate => self.controls.rotate(step, 0.0),
            Key::ArrowRight if rotate => self.controls.rotate(-step, 0.0),
            Key::ArrowUp if rotate => self.controls.rotate(0.0, step),
            Key::ArrowDown if rotate => self.controls.rotate(0.0, -step),
            Key::Char('+' | '=') if zoom => self.controls.dolly(1.0 / KEY_ZOOM_FACTOR),
            Key::Char('-') if zoom => self.controls.dolly(KEY_ZOOM_FACTOR),
            Key::Char('0') => {
                drop(self.reset_camera());
                return true;
            }
            Key::Char('r' | 'R') if !event.has_modifier() => {
                let enabled = !self.is_auto_rotating();
                self.set_auto_rotate(enabled);
                return true;
            }
            Key::Char('f' | 'F') if !event.has_modifier() => {
                self.set_fullscreen(!self.is_fullscreen());
                return true;
            }
            Key::Char(' ') => {
                self.toggle_playback();
                return true;
            }
            Key::Escape if self.is_fullscreen() => {
                self.exit_fullscreen();
                return true;
            }
            _ => return false,
        }
        self.controls.update(&mut self.camera, 0.0);
        true
    }

    // -- resize -------------------------------------------------------------

    /// The container was resized. Applied after a short debounce; zero sizes
    /// are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.destroyed || width == 0 || height == 0 {
            return;
        }
        self.container.borrow_mut().set_size(width, height);
        if let Some(id) = self.resize_timer.take() {
            self.timers.clear(id);
        }
        let deadline = self.time.now() + RESIZE_DEBOUNCE;
        self.resize_timer = Some(
            self.timers
                .set(deadline, TimerTask::ApplyResize { width, height }),
        );
    }

    pub(super) fn apply_resize(&mut self, width: u32, height: u32) {
        debug!("resize to {width}x{height}");
        self.camera.aspect = width as f32 / height as f32;
        self.renderer.set_size(width, height);
    }

    // -- toolbar ------------------------------------------------------------

    /// Perform what a toolbar or corner button asks for.
    pub fn toolbar_action(&mut self, action: ViewerAction) {
        if self.destroyed {
            return;
        }
        match action {
            ViewerAction::ResetCamera => drop(self.reset_camera()),
            ViewerAction::ToggleAutoRotate => {
                let enabled = !self.is_auto_rotating();
                self.set_auto_rotate(enabled);
            }
            ViewerAction::PlayPause => self.toggle_playback(),
            ViewerAction::Stop => self.stop_animation(),
            ViewerAction::Screenshot => {
                if let Err(e) = self.download_screenshot(None, None) {
                    warn!("screenshot download failed: {e}");
                }
            }
            ViewerAction::ToggleFullscreen => self.set_fullscreen(!self.is_fullscreen()),
            ViewerAction::ToggleBackground => {
                let (theme, background) = if self.config.theme.is_dark() {
                    (Theme::Light, LIGHT_BACKGROUND)
                } else {
                    (Theme::Dark, DARK_BACKGROUND)
                };
                self.update(ConfigPatch {
                    theme: Some(theme),
                    background: Some(background.to_string()),
                    ..Default::default()
                });
            }
        }
    }

    fn toggle_playback(&mut self) {
        if self.is_animation_playing() {
            self.pause_animation();
            return;
        }
        let resumed = self.mixer.as_mut().is_some_and(|mixer| mixer.resume());
        if resumed {
            self.sync_animation_button();
        } else {
            self.play_animation(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::{Container, DARK_THEME_CLASS, Page};
    use approx::assert_relative_eq;
    use std::time::Instant;

    fn mount(patch: ConfigPatch) -> (Viewer, Instant) {
        let mut page = Page::new();
        page.add(Container::new("v", 400, 300));
        let start = Instant::now();
        let viewer = Viewer::builder(patch)
            .with_start_time(start)
            .mount(&page, "#v")
            .unwrap();
        (viewer, start)
    }

    #[test]
    fn plain_wheel_scrolls_page_and_shows_hint() {
        let (mut viewer, start) = mount(ConfigPatch::default());
        assert_eq!(viewer.handle_wheel(WheelEvent::new(100.0)), WheelOutcome::PageScroll);
        assert!(viewer.elements().scroll_hint.is_visible());

        viewer.frame_at(start + Duration::from_millis(1000));
        assert!(viewer.elements().scroll_hint.is_visible());
        viewer.frame_at(start + Duration::from_millis(1600));
        assert!(!viewer.elements().scroll_hint.is_visible());
    }

    #[test]
    fn modified_wheel_zooms() {
        let (mut viewer, start) = mount(ConfigPatch {
            damping: Some(false),
            ..Default::default()
        });
        let before = viewer.camera_pose().0.length();
        assert_eq!(
            viewer.handle_wheel(WheelEvent::new(100.0).with_ctrl()),
            WheelOutcome::Zoomed
        );
        viewer.frame_at(start + Duration::from_millis(16));
        assert!(viewer.camera_pose().0.length() > before);
        assert!(!viewer.elements().scroll_hint.is_visible());
    }

    #[test]
    fn scroll_to_zoom_and_disabled_zoom() {
        let (mut viewer, _) = mount(ConfigPatch {
            scroll_to_zoom: Some(true),
            ..Default::default()
        });
        assert_eq!(viewer.handle_wheel(WheelEvent::new(-50.0)), WheelOutcome::Zoomed);

        let (mut viewer, _) = mount(ConfigPatch {
            zoom: Some(false),
            ..Default::default()
        });
        assert_eq!(viewer.handle_wheel(WheelEvent::new(-50.0)), WheelOutcome::Ignored);
        assert!(!viewer.elements().scroll_hint.is_visible());
    }

    #[test]
    fn interaction_pauses_and_resumes_auto_rotate() {
        let (mut viewer, start) = mount(ConfigPatch {
            auto_rotate: Some(true),
            auto_rotate_delay_ms: Some(500),
            ..Default::default()
        });
        viewer.set_auto_rotate(true);
        viewer.begin_interaction();
        assert!(!viewer.objects().controls.auto_rotate);
        viewer.end_interaction();
        viewer.frame_at(start + Duration::from_millis(100));
        assert!(!viewer.objects().controls.auto_rotate);
        viewer.frame_at(start + Duration::from_millis(600));
        assert!(viewer.objects().controls.auto_rotate);
    }

    #[test]
    fn arrow_keys_orbit() {
        let (mut viewer, _) = mount(ConfigPatch {
            damping: Some(false),
            ..Default::default()
        });
        let before = viewer.camera_pose().0;
        assert!(viewer.handle_key(KeyEvent::new(Key::ArrowLeft)));
        let after = viewer.camera_pose().0;
        assert!(before.distance(after) > 1e-3);
        assert_relative_eq!(before.length(), after.length(), epsilon = 1e-4);
        assert!(!viewer.handle_key(KeyEvent::new(Key::Char('q'))));
    }

    #[test]
    fn keyboard_toggles() {
        let (mut viewer, _) = mount(ConfigPatch::default());
        assert!(viewer.handle_key(KeyEvent::new(Key::Char('r'))));
        assert!(viewer.is_auto_rotating());
        assert!(!viewer.handle_key(KeyEvent::new(Key::Char('r')).with_ctrl()));
        assert!(viewer.is_auto_rotating());

        assert!(!viewer.handle_key(KeyEvent::new(Key::Escape)));
        assert!(viewer.handle_key(KeyEvent::new(Key::Char('f'))));
        assert!(viewer.is_fullscreen());
        assert!(viewer.handle_key(KeyEvent::new(Key::Escape)));
        assert!(!viewer.is_fullscreen());
    }

    #[test]
    fn resize_is_debounced() {
        let (mut viewer, start) = mount(ConfigPatch::default());
        viewer.resize(640, 480);
        viewer.resize(0, 480);
        viewer.resize(1024, 512);
        assert_eq!(viewer.objects().renderer.size(), (400, 300));
        viewer.frame_at(start + Duration::from_millis(20));
        assert_eq!(viewer.objects().renderer.size(), (1024, 512));
        assert_relative_eq!(viewer.objects().camera.aspect, 2.0);
    }

    #[test]
    fn background_toggle_flips_theme() {
        let (mut viewer, _) = mount(ConfigPatch::default());
        viewer.toolbar_action(ViewerAction::ToggleBackground);
        assert!(viewer.config().theme.is_dark());
        assert_eq!(viewer.config().background, DARK_BACKGROUND);
        assert!(viewer.elements().container.borrow().has_class(DARK_THEME_CLASS));

        viewer.toolbar_action(ViewerAction::ToggleBackground);
        assert!(!viewer.config().theme.is_dark());
        assert_eq!(viewer.config().background, LIGHT_BACKGROUND);
    }
}
