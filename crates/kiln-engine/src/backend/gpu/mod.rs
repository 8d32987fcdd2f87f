//! wgpu backend.
//!
//! The surface borrows the window, hence the `'w` lifetime on
//! [`WgpuBackend`]. Contexts are created with [`create_context`].

mod commands;
mod pass;
mod surface;
mod timeline;
mod uploads;
mod views;

use std::marker::PhantomData;

use anyhow::{Context, Result};
use winit::window::Window;

use crate::coords::Extent;
use crate::device::{DeviceContext, FrameConfig, FrameError};
use crate::frame::FrameContext;

use super::{Backend, BackendParts};

pub use commands::{WgpuAllocator, WgpuCommands};
pub use surface::{FrameTarget, WgpuSurface};
pub use timeline::WgpuTimeline;
pub use uploads::{UploadAddress, WgpuUploads};

pub use views::VIEW_TABLE_GROUP;

pub(crate) use surface::choose_surface_format;
pub(crate) use views::ViewBindings;

/// Marker type selecting the wgpu backend for a window borrowed for `'w`.
pub struct WgpuBackend<'w>(PhantomData<&'w ()>);

impl<'w> Backend for WgpuBackend<'w> {
    type Device = DeviceContext;
    type Timeline = WgpuTimeline;
    type Commands = WgpuCommands;
    type Surface = WgpuSurface<'w>;
    type Uploads = WgpuUploads;
    type View = wgpu::TextureView;
}

/// Acquires a device for `window` and builds a frame context on it.
///
/// Any missing capability is reported as an error with the adapter name and
/// the list of what is absent.
pub async fn create_context<'w>(
    window: &'w Window,
    config: FrameConfig,
) -> Result<FrameContext<WgpuBackend<'w>>> {
    let (device, surface) = DeviceContext::new(window, &config).await?;

    // A window created minimized leaves the surface unconfigured; the
    // viewport stays empty until `resize_check` sees a real size.
    let window_size = Extent::from(window.inner_size());
    let config = FrameConfig {
        initial_viewport: window_size,
        ..config
    };

    let gpu = device.device().clone();
    let queue = device.queue().clone();
    let surface = WgpuSurface::new(
        surface,
        gpu.clone(),
        device.adapter(),
        device.surface_format(),
        &config,
        window_size,
    );

    let parts = BackendParts {
        timeline: WgpuTimeline::new(gpu.clone(), queue.clone()),
        commands: WgpuCommands::new(gpu.clone(), queue.clone()),
        uploads: WgpuUploads::new(&gpu, queue, config.buffering_depth, config.upload_capacity),
        surface,
        device,
    };

    FrameContext::new(parts, config).context("failed to create frame context")
}

impl<'w> FrameContext<WgpuBackend<'w>> {
    /// Logical device for creating buffers, textures and pipelines.
    pub fn gpu(&self) -> &wgpu::Device {
        self.device().device()
    }

    pub fn queue(&self) -> &wgpu::Queue {
        self.device().queue()
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.device().surface_format()
    }

    /// Layout to place at [`VIEW_TABLE_GROUP`] in pipelines reading the view table.
    pub fn view_table_layout(&self) -> &wgpu::BindGroupLayout {
        self.device().view_table_layout()
    }

    /// Bind group over the current contents of [`FrameContext::views`].
    pub fn view_bind_group(&self) -> Result<wgpu::BindGroup, FrameError> {
        self.device().view_bind_group(self.views())
    }

    /// Render targets of the current frame, once `begin_frame` acquired a back buffer.
    pub fn target(&self) -> Option<FrameTarget<'_>> {
        self.surface().target().target()
    }
}
