//! Command list recording and batch submission.
//!
//! Lists are recorded into a bounded pool and handed to the queue in one
//! submission per flush, in the order they were opened.

mod pool;
mod recorder;

pub use pool::CommandListPool;
pub use recorder::{CommandDevice, CommandRecorder, ListHandle};
