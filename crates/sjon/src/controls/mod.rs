//! Camera input: orbit/zoom/pan controls and the auto-rotate state machine.

mod auto_rotate;
mod orbit;

pub use auto_rotate::{AutoRotate, AutoRotateState};
pub use orbit::OrbitControls;
