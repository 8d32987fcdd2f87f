use std::time::Duration;

use crate::device::FrameError;

use super::Timeline;

/// Identifies the frame opened by [`FrameSynchronizer::begin_frame`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameToken {
    /// Slot whose allocator, command lists and upload arena this frame uses.
    pub frame_index: u32,
    /// Fence value the frame will signal when it ends.
    pub fence_value: u64,
}

/// Paces CPU recording against GPU completion.
///
/// `submitted` counts ended frames and is the last value signaled on the
/// timeline. The CPU never gets more than `depth` frames ahead of the
/// completed value, and a slot is only handed out again once the last value
/// signaled for it is complete.
pub struct FrameSynchronizer<T> {
    timeline: T,
    depth: u32,
    submitted: u64,
    frame_index: u32,
    slot_fences: Vec<u64>,
    timeout: Option<Duration>,
}

impl<T: Timeline> FrameSynchronizer<T> {
    pub fn new(timeline: T, depth: u32, timeout: Option<Duration>) -> Self {
        debug_assert!(depth > 0);
        Self {
            timeline,
            depth,
            submitted: 0,
            frame_index: 0,
            slot_fences: vec![0; depth as usize],
            timeout,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Last fence value signaled.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Last fence value the GPU reported complete.
    pub fn completed(&mut self) -> u64 {
        self.timeline.completed_value()
    }

    /// Slot the next frame records into.
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Fence value last signaled by frames recorded into `slot`, or `None`
    /// past the buffering depth.
    pub fn slot_fence(&self, slot: u32) -> Option<u64> {
        self.slot_fences.get(slot as usize).copied()
    }

    /// Returns `true` when the GPU has finished everything recorded into `slot`.
    ///
    /// Slots past the buffering depth never hold work and are always idle.
    pub fn is_slot_idle(&mut self, slot: u32) -> bool {
        let fence = self.slot_fence(slot).unwrap_or(0);
        self.timeline.completed_value() >= fence
    }

    pub fn timeline(&self) -> &T {
        &self.timeline
    }

    /// Selects the frame slot, blocking until its resources are free.
    pub fn begin_frame(&mut self) -> Result<FrameToken, FrameError> {
        self.throttle()?;

        let slot_fence = self.slot_fences[self.frame_index as usize];
        self.wait_until(slot_fence)?;

        Ok(FrameToken {
            frame_index: self.frame_index,
            fence_value: self.submitted + 1,
        })
    }

    /// Signals the next fence value for the current slot and advances the slot.
    pub fn end_frame(&mut self) -> Result<u64, FrameError> {
        let value = self.submitted + 1;
        self.timeline.signal(value)?;
        self.submitted = value;
        self.slot_fences[self.frame_index as usize] = value;
        self.frame_index = (self.frame_index + 1) % self.depth;

        debug_assert!(self.submitted - self.timeline.completed_value() <= u64::from(self.depth));
        Ok(value)
    }

    /// Blocks while the CPU is `depth` or more frames ahead of the GPU.
    pub fn throttle(&mut self) -> Result<(), FrameError> {
        let depth = u64::from(self.depth);
        let completed = self.timeline.completed_value();
        if self.submitted.saturating_sub(completed) >= depth {
            self.wait_until(self.submitted - depth + 1)?;
        }
        Ok(())
    }

    /// Blocks until every signaled value is complete.
    pub fn drain(&mut self) -> Result<(), FrameError> {
        self.wait_until(self.submitted)
    }

    /// Re-derives the current slot after a drain, e.g. from the surface's
    /// back-buffer index once its buffers were recreated.
    pub fn rebase(&mut self, index: u32) {
        debug_assert!(self.timeline.completed_value() >= self.submitted);
        self.frame_index = index % self.depth;
    }

    fn wait_until(&mut self, value: u64) -> Result<(), FrameError> {
        if self.timeline.completed_value() >= value {
            return Ok(());
        }
        log::trace!("waiting for fence {value} (submitted {})", self.submitted);
        self.timeline.wait_for(value, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::backend::sim::{GpuMode, SimEvent, SimGpu};

    fn waits(events: &[SimEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|event| match event {
                SimEvent::Wait(value) => Some(*value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fence_advances_by_one_per_frame() {
        let gpu = SimGpu::new(GpuMode::CatchUpOnWait);
        let mut sync = FrameSynchronizer::new(gpu.timeline(), 2, None);

        for expected in 1..=10u64 {
            let token = sync.begin_frame().unwrap();
            assert_eq!(token.fence_value, expected);
            assert_eq!(sync.end_frame().unwrap(), expected);
            assert_eq!(sync.submitted(), expected);
            assert!(sync.submitted() - gpu.completed() <= 2);
        }
    }

    #[test]
    fn frame_index_cycles_through_slots() {
        let gpu = SimGpu::new(GpuMode::CatchUpOnWait);
        let mut sync = FrameSynchronizer::new(gpu.timeline(), 3, None);

        let indices: Vec<u32> = (0..6)
            .map(|_| {
                let token = sync.begin_frame().unwrap();
                sync.end_frame().unwrap();
                token.frame_index
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn third_frame_waits_for_the_first() {
        let gpu = SimGpu::new(GpuMode::CatchUpOnWait);
        let mut sync = FrameSynchronizer::new(gpu.timeline(), 2, None);

        sync.begin_frame().unwrap();
        sync.end_frame().unwrap();
        sync.begin_frame().unwrap();
        sync.end_frame().unwrap();
        assert!(waits(&gpu.events()).is_empty());

        // submitted(2) - completed(0) >= 2
        sync.begin_frame().unwrap();
        assert_eq!(waits(&gpu.events()), vec![1]);
        assert_eq!(gpu.completed(), 1);
    }

    #[test]
    fn third_begin_frame_blocks_until_gpu_progress() {
        let gpu = SimGpu::new(GpuMode::Manual);
        let timeline = gpu.timeline();
        let (tx, rx) = mpsc::channel();

        let worker = thread::spawn(move || {
            let mut sync = FrameSynchronizer::new(timeline, 2, None);
            for _ in 0..3 {
                let token = sync.begin_frame().unwrap();
                tx.send(token.fence_value).unwrap();
                sync.end_frame().unwrap();
            }
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(1));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(2));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        gpu.complete_up_to(1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(3));
        worker.join().unwrap();
    }

    #[test]
    fn drain_waits_for_last_signal() {
        let gpu = SimGpu::new(GpuMode::CatchUpOnWait);
        let mut sync = FrameSynchronizer::new(gpu.timeline(), 2, None);
        sync.begin_frame().unwrap();
        sync.end_frame().unwrap();

        sync.drain().unwrap();
        assert_eq!(sync.completed(), sync.submitted());
        assert!(sync.is_slot_idle(0));
        assert!(sync.is_slot_idle(1));
    }

    #[test]
    fn drain_with_nothing_submitted_does_not_wait() {
        let gpu = SimGpu::new(GpuMode::Manual);
        let mut sync = FrameSynchronizer::new(gpu.timeline(), 2, None);
        sync.drain().unwrap();
        assert!(waits(&gpu.events()).is_empty());
    }

    #[test]
    fn bounded_wait_times_out() {
        let gpu = SimGpu::new(GpuMode::Manual);
        let timeout = Duration::from_millis(20);
        let mut sync = FrameSynchronizer::new(gpu.timeline(), 1, Some(timeout));

        sync.begin_frame().unwrap();
        sync.end_frame().unwrap();
        assert_eq!(
            sync.begin_frame(),
            Err(FrameError::FenceTimeout { value: 1, timeout })
        );
    }

    #[test]
    fn rebase_moves_the_current_slot() {
        let gpu = SimGpu::new(GpuMode::CatchUpOnWait);
        let mut sync = FrameSynchronizer::new(gpu.timeline(), 2, None);
        sync.begin_frame().unwrap();
        sync.end_frame().unwrap();
        sync.drain().unwrap();

        sync.rebase(0);
        assert_eq!(sync.begin_frame().unwrap().frame_index, 0);
    }

    #[test]
    fn slot_fence_is_none_past_the_depth() {
        let gpu = SimGpu::new(GpuMode::CatchUpOnWait);
        let mut sync = FrameSynchronizer::new(gpu.timeline(), 2, None);
        sync.begin_frame().unwrap();
        sync.end_frame().unwrap();

        assert_eq!(sync.slot_fence(0), Some(1));
        assert_eq!(sync.slot_fence(1), Some(0));
        assert_eq!(sync.slot_fence(2), None);
        assert!(sync.is_slot_idle(7));
    }
}
