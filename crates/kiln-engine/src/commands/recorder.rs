use crate::coords::Extent;
use crate::device::FrameError;

use super::CommandListPool;

/// Backend operations behind the recorder.
///
/// An allocator owns the memory of the lists recorded from it for one frame
/// slot. A list is open (`List`) until closed into an immutable `Closed`
/// batch element.
pub trait CommandDevice {
    type Allocator;
    type List;
    type Closed;

    fn create_allocator(&mut self, slot: usize) -> Result<Self::Allocator, FrameError>;

    /// Reclaims the allocator's memory. The GPU must be done with every list
    /// recorded from it.
    fn reset_allocator(&mut self, allocator: &mut Self::Allocator) -> Result<(), FrameError>;

    fn open_list(
        &mut self,
        allocator: &mut Self::Allocator,
        label: &str,
    ) -> Result<Self::List, FrameError>;

    fn close_list(&mut self, list: Self::List) -> Result<Self::Closed, FrameError>;

    /// Executes `batch` in order as a single queue submission.
    fn submit(&mut self, batch: Vec<Self::Closed>) -> Result<(), FrameError>;
}

/// Handle to a command list opened in the current batch.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ListHandle {
    index: usize,
    batch: u64,
}

impl ListHandle {
    /// Position in submission order.
    pub fn index(&self) -> usize {
        self.index
    }
}

enum ListState<L, C> {
    Idle,
    Recording(L),
    Closed(C),
}

struct ListEntry<D: CommandDevice> {
    label: String,
    state: ListState<D::List, D::Closed>,
}

impl<D: CommandDevice> ListEntry<D> {
    fn idle() -> Self {
        Self {
            label: String::new(),
            state: ListState::Idle,
        }
    }
}

/// Records command lists for the current frame slot and submits them as one batch.
///
/// Lists execute in the order `begin` was called. The slot's allocator is reset
/// on the first `begin` of a frame; the frame context only opens a slot after
/// the fence confirmed the GPU finished with it.
pub struct CommandRecorder<D: CommandDevice> {
    device: D,
    allocators: Vec<D::Allocator>,
    pool: CommandListPool<ListEntry<D>>,
    slot: Option<usize>,
    allocator_reset: bool,
    used: usize,
    batch: u64,
    viewport: Extent,
}

impl<D: CommandDevice> CommandRecorder<D> {
    pub fn new(mut device: D, slots: usize, cap: usize) -> Result<Self, FrameError> {
        let allocators = (0..slots)
            .map(|slot| device.create_allocator(slot))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            device,
            allocators,
            pool: CommandListPool::new(cap),
            slot: None,
            allocator_reset: false,
            used: 0,
            batch: 0,
            viewport: Extent::ZERO,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Lists opened since the last flush.
    pub fn open_count(&self) -> usize {
        self.used
    }

    /// Entries allocated in the pool.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn viewport(&self) -> Extent {
        self.viewport
    }

    /// Binds the recorder to `slot` for one frame.
    pub fn begin_frame(&mut self, slot: usize, viewport: Extent) {
        debug_assert!(slot < self.allocators.len());
        self.slot = Some(slot);
        self.allocator_reset = false;
        self.viewport = viewport;
    }

    /// Unbinds the slot. Closed lists must have been flushed.
    pub fn end_frame(&mut self) {
        debug_assert_eq!(self.used, 0, "command lists left unflushed");
        self.slot = None;
    }

    /// Opens the next list of the batch.
    pub fn begin(&mut self, label: &str) -> Result<ListHandle, FrameError> {
        let slot = self.slot.ok_or(FrameError::NoFrameInProgress)?;
        let index = self.used;
        self.pool.ensure(index + 1, |_| ListEntry::idle())?;

        let allocator = &mut self.allocators[slot];
        if !self.allocator_reset {
            self.device.reset_allocator(allocator)?;
            self.allocator_reset = true;
        }

        let list = self.device.open_list(allocator, label)?;
        if let Some(entry) = self.pool.get_mut(index) {
            entry.label.clear();
            entry.label.push_str(label);
            entry.state = ListState::Recording(list);
        }
        self.used += 1;

        Ok(ListHandle {
            index,
            batch: self.batch,
        })
    }

    /// Recording access to an open list.
    pub fn list_mut(&mut self, handle: ListHandle) -> Result<&mut D::List, FrameError> {
        let index = self.check(handle)?;
        match self.pool.get_mut(index).map(|entry| &mut entry.state) {
            Some(ListState::Recording(list)) => Ok(list),
            _ => Err(FrameError::CommandListNotOpen { index }),
        }
    }

    /// Label the list was opened with.
    pub fn label(&self, handle: ListHandle) -> Option<&str> {
        self.pool.get(handle.index).map(|entry| entry.label.as_str())
    }

    /// Closes a list; it can no longer be recorded into.
    pub fn end(&mut self, handle: ListHandle) -> Result<(), FrameError> {
        let index = self.check(handle)?;
        let entry = self
            .pool
            .get_mut(index)
            .ok_or(FrameError::CommandListNotOpen { index })?;

        match std::mem::replace(&mut entry.state, ListState::Idle) {
            ListState::Recording(list) => {
                entry.state = ListState::Closed(self.device.close_list(list)?);
                Ok(())
            }
            other => {
                entry.state = other;
                Err(FrameError::CommandListNotOpen { index })
            }
        }
    }

    /// Submits every closed list of the batch in `begin` order.
    ///
    /// Fails without submitting anything if a list is still open.
    pub fn flush(&mut self) -> Result<usize, FrameError> {
        let used = self.used;
        let entries = self.pool.head_mut(used);
        if let Some(index) = entries
            .iter()
            .position(|entry| matches!(entry.state, ListState::Recording(_)))
        {
            return Err(FrameError::CommandListStillOpen { index });
        }

        let batch: Vec<D::Closed> = entries
            .iter_mut()
            .filter_map(|entry| match std::mem::replace(&mut entry.state, ListState::Idle) {
                ListState::Closed(closed) => Some(closed),
                _ => None,
            })
            .collect();

        self.used = 0;
        self.batch += 1;

        let count = batch.len();
        if count > 0 {
            self.device.submit(batch)?;
        }
        Ok(count)
    }

    fn check(&self, handle: ListHandle) -> Result<usize, FrameError> {
        if handle.batch != self.batch {
            return Err(FrameError::StaleCommandList {
                index: handle.index,
            });
        }
        if handle.index >= self.used {
            return Err(FrameError::CommandListNotOpen {
                index: handle.index,
            });
        }
        Ok(handle.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::{GpuMode, SimCommands, SimEvent, SimGpu};

    fn recorder(cap: usize) -> (CommandRecorder<SimCommands>, std::sync::Arc<SimGpu>) {
        let gpu = SimGpu::new(GpuMode::CatchUpOnWait);
        let recorder = CommandRecorder::new(gpu.commands(), 2, cap).unwrap();
        (recorder, gpu)
    }

    #[test]
    fn submits_lists_in_begin_order() {
        let (mut rec, gpu) = recorder(4);
        rec.begin_frame(0, Extent::new(640, 480));

        let a = rec.begin("a").unwrap();
        let b = rec.begin("b").unwrap();
        let c = rec.begin("c").unwrap();
        rec.end(c).unwrap();
        rec.end(a).unwrap();
        rec.end(b).unwrap();
        assert_eq!(rec.flush().unwrap(), 3);

        let submits: Vec<_> = gpu
            .events()
            .into_iter()
            .filter_map(|event| match event {
                SimEvent::Submit(labels) => Some(labels),
                _ => None,
            })
            .collect();
        assert_eq!(submits, vec![vec!["a".to_string(), "b".into(), "c".into()]]);
    }

    #[test]
    fn fifth_list_exceeds_cap_of_four() {
        let (mut rec, _gpu) = recorder(4);
        rec.begin_frame(0, Extent::new(640, 480));

        for i in 0..4 {
            rec.begin(&format!("list{i}")).unwrap();
        }
        assert_eq!(
            rec.begin("list4"),
            Err(FrameError::CommandListCapExceeded { cap: 4 })
        );
        assert_eq!(rec.open_count(), 4);
    }

    #[test]
    fn allocator_resets_once_per_frame() {
        let (mut rec, gpu) = recorder(4);
        for slot in [0, 1, 0] {
            rec.begin_frame(slot, Extent::new(8, 8));
            let a = rec.begin("a").unwrap();
            let b = rec.begin("b").unwrap();
            rec.end(a).unwrap();
            rec.end(b).unwrap();
            rec.flush().unwrap();
            rec.end_frame();
        }

        let resets: Vec<usize> = gpu
            .events()
            .into_iter()
            .filter_map(|event| match event {
                SimEvent::ResetAllocator(slot) => Some(slot),
                _ => None,
            })
            .collect();
        assert_eq!(resets, vec![0, 1, 0]);
    }

    #[test]
    fn flush_rejects_open_lists() {
        let (mut rec, gpu) = recorder(4);
        rec.begin_frame(0, Extent::new(8, 8));
        let a = rec.begin("a").unwrap();
        rec.begin("b").unwrap();
        rec.end(a).unwrap();

        assert_eq!(rec.flush(), Err(FrameError::CommandListStillOpen { index: 1 }));
        assert!(!gpu.events().iter().any(|e| matches!(e, SimEvent::Submit(_))));
    }

    #[test]
    fn handles_go_stale_after_flush() {
        let (mut rec, _gpu) = recorder(4);
        rec.begin_frame(0, Extent::new(8, 8));
        let a = rec.begin("a").unwrap();
        rec.end(a).unwrap();
        rec.flush().unwrap();

        assert_eq!(rec.end(a), Err(FrameError::StaleCommandList { index: 0 }));
        assert!(rec.list_mut(a).is_err());
    }

    #[test]
    fn closed_list_cannot_be_recorded_or_closed_again() {
        let (mut rec, _gpu) = recorder(4);
        rec.begin_frame(0, Extent::new(8, 8));
        let a = rec.begin("a").unwrap();
        assert!(rec.list_mut(a).is_ok());
        rec.end(a).unwrap();
        assert_eq!(rec.end(a), Err(FrameError::CommandListNotOpen { index: 0 }));
        assert!(rec.list_mut(a).is_err());
    }

    #[test]
    fn begin_requires_a_frame() {
        let (mut rec, _gpu) = recorder(4);
        assert_eq!(rec.begin("a"), Err(FrameError::NoFrameInProgress));
    }

    #[test]
    fn pool_entries_are_reused_across_frames() {
        let (mut rec, _gpu) = recorder(8);
        for slot in 0..4 {
            rec.begin_frame(slot % 2, Extent::new(8, 8));
            for _ in 0..3 {
                let h = rec.begin("x").unwrap();
                rec.end(h).unwrap();
            }
            rec.flush().unwrap();
            rec.end_frame();
        }
        assert_eq!(rec.pool_len(), 4);
    }
}
