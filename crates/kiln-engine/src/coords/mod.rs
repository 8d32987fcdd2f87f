//! Pixel-space types shared by the surface manager and command recording.
//!
//! All sizes are physical pixels with the origin at the top-left.

mod extent;

pub use extent::Extent;
