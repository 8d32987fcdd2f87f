use crate::backend::Backend;
use crate::commands::CommandDevice;
use crate::coords::Extent;
use crate::device::ResourceViewTable;

/// Recording access to one open command list.
///
/// Carries the frame's viewport and the shared resource view table so that
/// clients can set viewport/scissor and resolve view indices while recording.
pub struct CommandList<'a, B: Backend> {
    list: &'a mut <B::Commands as CommandDevice>::List,
    viewport: Extent,
    views: &'a ResourceViewTable<B::View>,
}

impl<'a, B: Backend> CommandList<'a, B> {
    pub(crate) fn new(
        list: &'a mut <B::Commands as CommandDevice>::List,
        viewport: Extent,
        views: &'a ResourceViewTable<B::View>,
    ) -> Self {
        Self {
            list,
            viewport,
            views,
        }
    }

    /// The backend list (a `wgpu::CommandEncoder` on the GPU backend).
    pub fn encoder(&mut self) -> &mut <B::Commands as CommandDevice>::List {
        self.list
    }

    pub fn viewport(&self) -> Extent {
        self.viewport
    }

    pub fn views(&self) -> &ResourceViewTable<B::View> {
        self.views
    }
}
