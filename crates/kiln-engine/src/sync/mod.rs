//! CPU/GPU frame pacing.
//!
//! A single fence value is signaled per ended frame. [`FrameSynchronizer`]
//! decides which frame slot is recorded next and blocks when the CPU would get
//! more than the buffering depth ahead.

mod synchronizer;
mod timeline;

pub use synchronizer::{FrameSynchronizer, FrameToken};
pub use timeline::Timeline;
