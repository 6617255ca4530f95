//! # Sjon — Embeddable 3D Model Viewer
//!
//! Mount a [`Viewer`](viewer::Viewer) on a host container, point it at a
//! model file, and drive it one frame at a time. The viewer owns the scene,
//! the orbit camera, the load pipeline and the presentation state; the host
//! owns the window, the event loop and the actual GPU backend.
//!
//! ```text
//!   host event loop ─┬─ frame_at(now) ──▶ Viewer ──▶ RenderBackend::render
//!                    ├─ handle_wheel / handle_key / rotate_by / resize
//!                    └─ update(ConfigPatch)
//! ```
//!
//! glTF/GLB, OBJ (+MTL), STL, 3DS and AMF decode out of the box; FBX and IFC can be
//! plugged in through the [`DecoderRegistry`](loader::DecoderRegistry).
//!
//! Start with `use sjon::prelude::*`.

pub mod animation;
pub mod camera;
pub mod config;
pub mod controls;
pub mod dispose;
pub mod error;
pub mod lighting;
pub mod loader;
pub mod math;
pub mod prelude;
pub mod render;
pub mod scene;
pub mod schedule;
pub mod source;
pub mod time;
pub mod ui;
pub mod viewer;
