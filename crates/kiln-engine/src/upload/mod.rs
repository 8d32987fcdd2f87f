//! Per-frame upload memory.
//!
//! One [`UploadArena`] per frame slot. Clients get an [`UploadRegion`] for
//! CPU-produced data (constants, vertices, texture rows) that the GPU reads
//! within the same frame.
//!
//! Exhaustion policy: an allocation that does not fit is an error
//! ([`crate::device::FrameError::UploadExhausted`]). Nothing is drained or
//! retried; the capacity has to be raised.

mod arena;
mod region;

pub use arena::{ArenaAllocation, UploadArena};
pub use region::{UploadRegion, UploadTarget};
