//! GPU device acquisition and startup configuration.
//!
//! This module is responsible for:
//! - the `FrameConfig` every other component is sized from
//! - creating the wgpu Instance/Adapter/Device/Queue and checking capabilities
//! - the shader-visible resource view table
//! - the error type shared by the frame execution context

mod context;
mod error;
mod init;
mod views;

pub use context::{DeviceContext, DeviceHandle};
pub use error::{FrameError, SurfaceErrorAction};
pub use init::{DepthConfig, FrameConfig, MsaaSamples, UPLOAD_ALIGNMENT};
pub use views::{ResourceViewTable, TableBinding, ViewIndex};
