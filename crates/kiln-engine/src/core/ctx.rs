use winit::window::{Window, WindowId};

use crate::backend::gpu::WgpuBackend;
use crate::device::FrameError;
use crate::frame::FrameContext;
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// Per-window handles.
pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

/// Per-frame context passed to `core::App::on_frame`.
///
/// Lifetimes:
/// - `'a` is the duration of the callback invocation
/// - `'w` is the window-borrow lifetime carried by the surface
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub frame: &'a mut FrameContext<WgpuBackend<'w>>,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl<'a, 'w> FrameCtx<'a, 'w> {
    /// Runs one frame: `begin_frame`, `record`, then `present`.
    ///
    /// A frame whose back buffer cannot be acquired is skipped. Any other
    /// error is fatal: it is handed to the runtime, which exits with it.
    pub fn render<F>(&mut self, record: F) -> AppControl
    where
        F: FnOnce(&mut FrameContext<WgpuBackend<'w>>) -> Result<(), FrameError>,
    {
        match self.frame.begin_frame() {
            Ok(_) => {}
            Err(err) if !err.is_fatal() => {
                log::debug!("skipping frame: {err}");
                return AppControl::Continue;
            }
            Err(err) => return self.fail(err),
        }

        if let Err(err) = record(&mut *self.frame) {
            return self.fail(err);
        }

        self.window.window.pre_present_notify();
        match self.frame.present() {
            Ok(_) => AppControl::Continue,
            Err(err) if !err.is_fatal() => {
                log::warn!("present: {err}");
                AppControl::Continue
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: FrameError) -> AppControl {
        self.runtime.fail(anyhow::Error::new(err).context("frame failed"));
        AppControl::Exit
    }
}
