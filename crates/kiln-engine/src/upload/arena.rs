use std::fmt;

use crate::device::{FrameError, UPLOAD_ALIGNMENT};

/// Rounds `value` up to a multiple of `alignment`, saturating at the largest
/// representable multiple.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);
    value
        .checked_next_multiple_of(alignment)
        .unwrap_or(u64::MAX / alignment * alignment)
}

/// A successful bump allocation inside an [`UploadArena`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ArenaAllocation {
    pub offset: u64,
    pub size: u64,
    pub aligned_size: u64,
}

/// Linear scratch memory for one frame slot.
///
/// Allocations are rounded up to [`UPLOAD_ALIGNMENT`] and only ever advance the
/// offset. The arena is reset wholesale when its slot is reused; there is no
/// per-allocation bookkeeping.
///
/// The bytes live on the CPU. Everything written below `offset` is staged to
/// the slot's GPU buffer before the frame's batch is submitted.
pub struct UploadArena {
    bytes: Vec<u8>,
    offset: u64,
    staged: u64,
}

impl UploadArena {
    pub fn new(capacity: u64) -> Self {
        debug_assert!(capacity % UPLOAD_ALIGNMENT == 0);
        Self {
            bytes: vec![0; capacity as usize],
            offset: 0,
            staged: 0,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Next allocation offset; also the number of bytes in use.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn remaining(&self) -> u64 {
        self.capacity() - self.offset
    }

    /// Rewinds the arena. Only legal once the GPU finished the slot's last batch.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.staged = 0;
    }

    /// Reserves `size` bytes, rounded up to the upload alignment.
    pub fn alloc(&mut self, size: u64) -> Result<ArenaAllocation, FrameError> {
        if size == 0 {
            return Err(FrameError::ZeroSizedUpload);
        }

        let aligned_size = align_up(size, UPLOAD_ALIGNMENT);
        let end = self
            .offset
            .checked_add(aligned_size)
            .filter(|end| *end <= self.capacity());
        let Some(end) = end else {
            return Err(FrameError::UploadExhausted {
                requested: size,
                aligned: aligned_size,
                remaining: self.remaining(),
                capacity: self.capacity(),
            });
        };

        let offset = self.offset;
        self.offset = end;
        Ok(ArenaAllocation {
            offset,
            size,
            aligned_size,
        })
    }

    /// CPU bytes backing `allocation`.
    pub fn bytes_mut(&mut self, allocation: &ArenaAllocation) -> &mut [u8] {
        let start = allocation.offset as usize;
        &mut self.bytes[start..start + allocation.size as usize]
    }

    /// Bytes allocated since the last call, with their starting offset.
    ///
    /// Marks them staged; an empty slice means nothing new was written.
    pub(crate) fn take_unstaged(&mut self) -> (u64, &[u8]) {
        let start = self.staged;
        self.staged = self.offset;
        (start, &self.bytes[start as usize..self.offset as usize])
    }
}

impl fmt::Debug for UploadArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadArena")
            .field("capacity", &self.capacity())
            .field("offset", &self.offset)
            .field("staged", &self.staged)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 512), 0);
        assert_eq!(align_up(1, 512), 512);
        assert_eq!(align_up(512, 512), 512);
        assert_eq!(align_up(513, 512), 1024);
        assert_eq!(align_up(u64::MAX, 512), u64::MAX / 512 * 512);
    }

    #[test]
    fn fills_to_capacity_then_fails() {
        let mut arena = UploadArena::new(4096);

        let offsets: Vec<u64> = [100, 600, 2500]
            .into_iter()
            .map(|size| arena.alloc(size).unwrap().offset)
            .collect();
        assert_eq!(offsets, vec![0, 512, 1536]);
        assert_eq!(arena.offset(), 4096);

        assert_eq!(
            arena.alloc(1),
            Err(FrameError::UploadExhausted {
                requested: 1,
                aligned: 512,
                remaining: 0,
                capacity: 4096,
            })
        );
    }

    #[test]
    fn oversized_request_fails_without_advancing() {
        let mut arena = UploadArena::new(4096);
        arena.alloc(100).unwrap();
        assert!(arena.alloc(600).is_ok());
        assert!(arena.alloc(3000).is_err());
        assert_eq!(arena.offset(), 1536);
    }

    #[test]
    fn offsets_increase_and_stay_aligned() {
        let mut arena = UploadArena::new(64 * 1024);
        let mut last = None;
        for size in [1, 17, 512, 513, 1000, 4096, 3] {
            let allocation = arena.alloc(size).unwrap();
            assert_eq!(allocation.offset % UPLOAD_ALIGNMENT, 0);
            if let Some(prev) = last {
                assert!(allocation.offset > prev);
            }
            last = Some(allocation.offset);
        }
    }

    #[test]
    fn zero_sized_alloc_is_rejected() {
        let mut arena = UploadArena::new(1024);
        assert_eq!(arena.alloc(0), Err(FrameError::ZeroSizedUpload));
    }

    #[test]
    fn reset_rewinds_to_zero() {
        let mut arena = UploadArena::new(2048);
        arena.alloc(700).unwrap();
        arena.reset();
        assert_eq!(arena.offset(), 0);
        assert_eq!(arena.alloc(1).unwrap().offset, 0);
    }

    #[test]
    fn unstaged_range_covers_new_allocations_only() {
        let mut arena = UploadArena::new(4096);
        let a = arena.alloc(4).unwrap();
        arena.bytes_mut(&a).copy_from_slice(&[1, 2, 3, 4]);

        let (start, bytes) = arena.take_unstaged();
        assert_eq!((start, bytes.len()), (0, 512));
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);

        arena.alloc(10).unwrap();
        let (start, bytes) = arena.take_unstaged();
        assert_eq!((start, bytes.len()), (512, 512));

        let (_, bytes) = arena.take_unstaged();
        assert!(bytes.is_empty());
    }
}
