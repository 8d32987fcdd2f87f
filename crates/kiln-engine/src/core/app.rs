use winit::event::WindowEvent;
use winit::window::WindowId;

use crate::coords::Extent;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by higher layers.
pub trait App {
    /// Called for every window event before the runtime handles it.
    fn on_window_event(&mut self, window_id: WindowId, event: &WindowEvent) -> AppControl {
        let _ = (window_id, event);
        AppControl::Continue
    }

    /// Called after the back buffers were recreated at `viewport`.
    ///
    /// Size-dependent resources owned by the app should be rebuilt here.
    fn on_resized(&mut self, window_id: WindowId, viewport: Extent) {
        let _ = (window_id, viewport);
    }

    /// Called once per tick while the window has a non-empty surface.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;
}
