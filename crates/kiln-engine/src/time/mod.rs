//! Frame timing.
//!
//! One [`FrameStats`] per window: `tick()` once per presented frame yields a
//! clamped [`FrameTime`], and a [`StatsSample`] is produced once per
//! measurement window for display.

mod frame_stats;

pub use frame_stats::{FrameStats, FrameTime, StatsSample};
