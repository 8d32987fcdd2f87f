//! Kiln engine crate.
//!
//! The GPU frame execution context: frame pacing against a fence, per-slot
//! upload arenas, batched command recording, and a surface that survives
//! resizes. The window runtime and app contract sit on top.

pub mod backend;
pub mod commands;
pub mod coords;
pub mod core;
pub mod device;
pub mod frame;
pub mod logging;
pub mod surface;
pub mod sync;
pub mod time;
pub mod upload;
pub mod window;
