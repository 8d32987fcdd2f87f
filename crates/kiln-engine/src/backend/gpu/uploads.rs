use crate::device::FrameError;
use crate::upload::UploadTarget;

/// Location of upload memory as seen by GPU commands.
#[derive(Debug, Clone)]
pub struct UploadAddress {
    pub buffer: wgpu::Buffer,
    pub offset: u64,
}

impl UploadAddress {
    /// Binding covering `size` bytes at this address.
    pub fn binding(&self, size: u64) -> wgpu::BufferBinding<'_> {
        wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: self.offset,
            size: wgpu::BufferSize::new(size),
        }
    }
}

/// One GPU buffer per frame slot backing that slot's upload arena.
pub struct WgpuUploads {
    queue: wgpu::Queue,
    buffers: Vec<wgpu::Buffer>,
}

impl WgpuUploads {
    pub fn new(device: &wgpu::Device, queue: wgpu::Queue, slots: u32, capacity: u64) -> Self {
        let buffers = (0..slots)
            .map(|slot| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("kiln upload heap {slot}")),
                    size: capacity,
                    usage: wgpu::BufferUsages::VERTEX
                        | wgpu::BufferUsages::INDEX
                        | wgpu::BufferUsages::UNIFORM
                        | wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_SRC
                        | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        Self { queue, buffers }
    }

    pub fn buffer(&self, slot: usize) -> Option<&wgpu::Buffer> {
        self.buffers.get(slot)
    }
}

impl UploadTarget for WgpuUploads {
    type Address = UploadAddress;

    fn address(&self, slot: usize, offset: u64) -> UploadAddress {
        UploadAddress {
            buffer: self.buffers[slot].clone(),
            offset,
        }
    }

    fn stage(&mut self, slot: usize, offset: u64, bytes: &[u8]) -> Result<(), FrameError> {
        let buffer = self
            .buffers
            .get(slot)
            .ok_or_else(|| FrameError::Backend(format!("no upload buffer for slot {slot}")))?;
        // Queue writes land before the next submitted batch.
        self.queue.write_buffer(buffer, offset, bytes);
        Ok(())
    }
}
