//! Backends the frame context runs on.
//!
//! [`gpu`] drives a real device through wgpu. [`sim`] is a deterministic
//! stand-in whose GPU progress is controlled by the caller, used to exercise
//! pacing and resize behaviour without hardware.

pub mod gpu;
pub mod sim;

use crate::commands::CommandDevice;
use crate::device::DeviceHandle;
use crate::surface::SurfaceTarget;
use crate::sync::Timeline;
use crate::upload::UploadTarget;

/// Ties together the backend pieces a [`crate::frame::FrameContext`] is built from.
pub trait Backend {
    type Device: DeviceHandle;
    type Timeline: Timeline;
    type Commands: CommandDevice;
    type Surface: SurfaceTarget;
    type Uploads: UploadTarget;
    /// Entry stored in the shader-visible resource view table.
    type View;
}

/// Freshly created backend objects, handed to [`crate::frame::FrameContext::new`].
pub struct BackendParts<B: Backend> {
    pub device: B::Device,
    pub timeline: B::Timeline,
    pub commands: B::Commands,
    pub surface: B::Surface,
    pub uploads: B::Uploads,
}
