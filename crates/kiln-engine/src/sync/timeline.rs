use std::time::Duration;

use crate::device::FrameError;

/// A GPU-to-CPU completion counter (fence) on the single command queue.
///
/// Values are signaled in increasing order. `completed_value` never decreases.
pub trait Timeline {
    /// Enqueues a signal of `value` behind all previously submitted work.
    fn signal(&mut self, value: u64) -> Result<(), FrameError>;

    /// Latest value the GPU has reported complete.
    fn completed_value(&mut self) -> u64;

    /// Blocks until `completed_value() >= value`.
    ///
    /// `timeout == None` waits without bound.
    fn wait_for(&mut self, value: u64, timeout: Option<Duration>) -> Result<(), FrameError>;
}
