//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and one window per frame context, and runs the
//! once-per-tick surface check before handing the frame to the app.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
