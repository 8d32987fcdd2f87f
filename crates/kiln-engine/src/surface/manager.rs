use crate::coords::Extent;
use crate::device::FrameError;
use crate::sync::{FrameSynchronizer, Timeline};

use super::SurfaceState;

/// Presentable back buffers plus the attachments sized with them.
pub trait SurfaceTarget {
    /// Acquires the next back buffer for rendering; returns its index.
    fn acquire(&mut self) -> Result<u32, FrameError>;

    /// Presents the acquired back buffer.
    fn present(&mut self) -> Result<(), FrameError>;

    /// Drops every handle to the current back buffers and their views.
    fn release_back_buffers(&mut self);

    /// Resizes the presentation surface.
    fn resize(&mut self, extent: Extent) -> Result<(), FrameError>;

    /// Re-acquires back-buffer handles after `resize` and recreates their views.
    fn acquire_back_buffers(&mut self) -> Result<(), FrameError>;

    /// Returns `true` if multisampled color or depth-stencil targets exist.
    fn has_attachments(&self) -> bool;

    fn recreate_attachments(&mut self, extent: Extent) -> Result<(), FrameError>;

    /// Index of the back buffer that will be acquired next.
    fn back_buffer_index(&self) -> u32;
}

/// Keeps surface resources consistent with the window size.
///
/// [`SurfaceManager::update`] is run once per tick before any recording.
/// Recreation is always preceded by a full drain so that no in-flight batch
/// still references the old back buffers.
pub struct SurfaceManager<S> {
    target: S,
    viewport: Extent,
    state: SurfaceState,
}

impl<S: SurfaceTarget> SurfaceManager<S> {
    pub fn new(target: S, viewport: Extent) -> Self {
        Self {
            target,
            viewport,
            state: SurfaceState::Normal,
        }
    }

    pub fn target(&self) -> &S {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut S {
        &mut self.target
    }

    /// Viewport the back buffers are currently sized to. Zero while minimized.
    pub fn viewport(&self) -> Extent {
        self.viewport
    }

    /// State reported by the last `update`.
    pub fn state(&self) -> SurfaceState {
        self.state
    }

    /// Enters the terminal `DeviceLost` state.
    pub fn mark_device_lost(&mut self, reason: &str) -> SurfaceState {
        if self.state != SurfaceState::DeviceLost {
            log::error!("device lost, surface will not be recreated: {reason}");
        }
        self.state = SurfaceState::DeviceLost;
        self.state
    }

    /// Reacts to the current window client size.
    pub fn update<T: Timeline>(
        &mut self,
        size: Extent,
        sync: &mut FrameSynchronizer<T>,
    ) -> Result<SurfaceState, FrameError> {
        if self.state == SurfaceState::DeviceLost {
            return Ok(SurfaceState::DeviceLost);
        }

        self.state = if size.is_empty() {
            if !self.viewport.is_empty() {
                log::info!("surface minimized (was {})", self.viewport);
                self.viewport = Extent::ZERO;
            }
            SurfaceState::Minimized
        } else if size != self.viewport {
            self.recreate(size, sync)?;
            SurfaceState::Resized
        } else {
            SurfaceState::Normal
        };

        Ok(self.state)
    }

    pub fn acquire(&mut self) -> Result<u32, FrameError> {
        self.target.acquire()
    }

    pub fn present(&mut self) -> Result<(), FrameError> {
        self.target.present()
    }

    fn recreate<T: Timeline>(
        &mut self,
        size: Extent,
        sync: &mut FrameSynchronizer<T>,
    ) -> Result<(), FrameError> {
        log::info!("surface resize {} -> {size}", self.viewport);

        sync.drain()?;

        self.target.release_back_buffers();
        self.target.resize(size)?;
        self.target.acquire_back_buffers()?;
        if self.target.has_attachments() {
            self.target.recreate_attachments(size)?;
        }

        self.viewport = size;
        sync.rebase(self.target.back_buffer_index());
        Ok(())
    }
}
