//! The per-frame entry point clients record through.

mod context;
mod list;

pub use context::FrameContext;
pub use list::CommandList;
