//! Convenience re-exports. `use sjon::prelude::*` brings in the common items.

pub use crate::animation::{AnimationClip, AnimationMixer, EaseFunction};
pub use crate::camera::{InitialCameraPose, PerspectiveCamera};
pub use crate::config::{
    AnimationSelector, Callbacks, ConfigPatch, LightingConfig, Theme, ToneMapping,
    ToolbarPosition, ViewerConfig,
};
pub use crate::error::{CaptureError, LoadError, RegistryError, ViewerError};
pub use crate::loader::{DecoderRegistry, FormatLoader, LoadRequest, LoadedModel};
pub use crate::math::{Aabb, Color, Transform, Vec3};
pub use crate::render::{HeadlessRenderer, RenderBackend};
pub use crate::scene::{Background, Node, Scene};
pub use crate::source::{ByteSource, FileSource, MemorySource};
pub use crate::ui::{Container, ContainerRef, Page, ViewerAction, WheelEvent, WheelOutcome};
pub use crate::viewer::{
    Key, KeyEvent, LoadExecutor, LoadHandle, LoadOutcome, LoadState, ResetHandle, ResetOutcome,
    Viewer, ViewerBuilder,
};
