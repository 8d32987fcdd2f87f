use crate::commands::CommandDevice;
use crate::device::FrameError;

/// Per-slot allocator bookkeeping.
///
/// wgpu allocates command memory per encoder and reclaims it once the GPU is
/// done, so resetting only restarts the slot's list numbering.
#[derive(Debug)]
pub struct WgpuAllocator {
    slot: usize,
    opened: u32,
}

/// Records into `CommandEncoder`s and submits `CommandBuffer`s on the single queue.
pub struct WgpuCommands {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuCommands {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }
}

impl CommandDevice for WgpuCommands {
    type Allocator = WgpuAllocator;
    type List = wgpu::CommandEncoder;
    type Closed = wgpu::CommandBuffer;

    fn create_allocator(&mut self, slot: usize) -> Result<WgpuAllocator, FrameError> {
        Ok(WgpuAllocator { slot, opened: 0 })
    }

    fn reset_allocator(&mut self, allocator: &mut WgpuAllocator) -> Result<(), FrameError> {
        log::trace!(
            "slot {} allocator reset ({} lists last frame)",
            allocator.slot,
            allocator.opened
        );
        allocator.opened = 0;
        Ok(())
    }

    fn open_list(
        &mut self,
        allocator: &mut WgpuAllocator,
        label: &str,
    ) -> Result<wgpu::CommandEncoder, FrameError> {
        allocator.opened += 1;
        Ok(self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) }))
    }

    fn close_list(&mut self, list: wgpu::CommandEncoder) -> Result<wgpu::CommandBuffer, FrameError> {
        Ok(list.finish())
    }

    fn submit(&mut self, batch: Vec<wgpu::CommandBuffer>) -> Result<(), FrameError> {
        self.queue.submit(batch);
        Ok(())
    }
}
