//! Back-buffer and attachment lifetime across window resizes.

mod manager;
mod state;

pub use manager::{SurfaceManager, SurfaceTarget};
pub use state::SurfaceState;
