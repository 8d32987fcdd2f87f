use bytemuck::Pod;

use crate::device::FrameError;

/// Where the GPU sees staged upload memory.
pub trait UploadTarget {
    /// GPU-side address of an allocation (e.g. buffer + offset).
    type Address: Clone;

    fn address(&self, slot: usize, offset: u64) -> Self::Address;

    /// Makes `bytes`, written at `offset` in `slot`'s arena, visible to the
    /// next submitted batch.
    fn stage(&mut self, slot: usize, offset: u64, bytes: &[u8]) -> Result<(), FrameError>;
}

/// Scratch memory handed to a client for the current frame.
///
/// The region borrows the frame context, so it cannot outlive the frame that
/// produced it. Copy [`UploadRegion::address`] out before recording commands
/// that read from it.
pub struct UploadRegion<'a, A> {
    bytes: &'a mut [u8],
    address: A,
    slot: usize,
    offset: u64,
    aligned_size: u64,
}

impl<'a, A> UploadRegion<'a, A> {
    pub(crate) fn new(
        bytes: &'a mut [u8],
        address: A,
        slot: usize,
        offset: u64,
        aligned_size: u64,
    ) -> Self {
        Self {
            bytes,
            address,
            slot,
            offset,
            aligned_size,
        }
    }

    /// CPU-writable bytes; exactly the requested size.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.bytes
    }

    pub fn address(&self) -> &A {
        &self.address
    }

    pub fn into_address(self) -> A {
        self.address
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Byte offset inside the slot's upload buffer; a multiple of 512.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Requested size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Space consumed in the arena.
    pub fn aligned_size(&self) -> u64 {
        self.aligned_size
    }

    /// Copies `value` to the start of the region.
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> Result<(), FrameError> {
        self.write_slice(std::slice::from_ref(value))
    }

    /// Copies `values` to the start of the region.
    pub fn write_slice<T: Pod>(&mut self, values: &[T]) -> Result<(), FrameError> {
        let src: &[u8] = bytemuck::cast_slice(values);
        let size = self.bytes.len() as u64;
        let dst = self
            .bytes
            .get_mut(..src.len())
            .ok_or(FrameError::UploadRegionOverflow {
                size,
                written: src.len() as u64,
            })?;
        dst.copy_from_slice(src);
        Ok(())
    }
}
