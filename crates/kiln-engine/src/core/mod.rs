//! Contract between the window runtime and applications.
//!
//! Applications implement [`App`] and receive a [`FrameCtx`] per tick; the
//! runtime owns the window, the frame context and the event loop.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{FrameCtx, WindowCtx};
