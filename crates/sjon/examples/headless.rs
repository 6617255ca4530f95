//! Headless render: load a model, orbit it a little, save a screenshot.
//!
//! Usage: `cargo run --example headless -- path/to/model.glb [out-dir]`
//!
//! Set `RUST_LOG=debug` to follow the load pipeline.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use sjon::prelude::*;

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(model) = args.next() else {
        eprintln!("usage: headless <model> [out-dir]");
        std::process::exit(2);
    };
    let out_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    let mut page = Page::new();
    page.add(Container::new("viewer", 640, 480));

    let patch = ConfigPatch {
        theme: Some(Theme::Dark),
        background: Some("#1a1a1a".into()),
        auto_play_animation: Some(true),
        screenshot_scale: Some(1.0),
        download_dir: Some(out_dir),
        ..ConfigPatch::with_src(model)
    };
    let mut viewer = match Viewer::mount(&page, "#viewer", patch) {
        Ok(viewer) => viewer,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Pump frames until the load settles, at a nominal 60 Hz.
    let start = Instant::now();
    let frame = Duration::from_millis(16);
    let mut now = start;
    while viewer.load_state().is_loading() && now - start < Duration::from_secs(30) {
        now += frame;
        viewer.frame_at(now);
        std::thread::sleep(Duration::from_millis(1));
    }

    match viewer.load_state() {
        LoadState::Attached { .. } => {}
        LoadState::Failed { message, .. } => {
            eprintln!("load failed: {message}");
            std::process::exit(1);
        }
        other => {
            eprintln!("load did not finish: {other:?}");
            std::process::exit(1);
        }
    }
    println!("animations: {:?}", viewer.animations());

    viewer.begin_interaction();
    viewer.rotate_by(80.0, -20.0);
    viewer.end_interaction();
    for _ in 0..30 {
        now += frame;
        viewer.frame_at(now);
    }

    match viewer.download_screenshot(Some("headless"), None) {
        Ok(path) => println!("wrote {}", path.display()),
        Err(e) => {
            eprintln!("screenshot failed: {e}");
            std::process::exit(1);
        }
    }
    viewer.destroy();
}
