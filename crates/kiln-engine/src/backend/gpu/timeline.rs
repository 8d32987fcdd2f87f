use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::device::FrameError;
use crate::sync::Timeline;

/// Fence built on queue submission indices.
///
/// wgpu has no user-visible fence object. A signal submits an empty batch
/// behind the frame's work and remembers its `SubmissionIndex`; the
/// completed value is advanced by `on_submitted_work_done` callbacks and by
/// successful waits on those indices.
pub struct WgpuTimeline {
    device: wgpu::Device,
    queue: wgpu::Queue,
    completed: Arc<AtomicU64>,
    pending: VecDeque<(u64, wgpu::SubmissionIndex)>,
}

impl WgpuTimeline {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            completed: Arc::new(AtomicU64::new(0)),
            pending: VecDeque::new(),
        }
    }

    fn retire(&mut self) -> u64 {
        let completed = self.completed.load(Ordering::Acquire);
        while self
            .pending
            .front()
            .is_some_and(|(value, _)| *value <= completed)
        {
            self.pending.pop_front();
        }
        completed
    }
}

impl Timeline for WgpuTimeline {
    fn signal(&mut self, value: u64) -> Result<(), FrameError> {
        let index = self.queue.submit(std::iter::empty());

        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });

        self.pending.push_back((value, index));
        Ok(())
    }

    fn completed_value(&mut self) -> u64 {
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {err}");
        }
        self.retire()
    }

    fn wait_for(&mut self, value: u64, timeout: Option<Duration>) -> Result<(), FrameError> {
        if self.retire() >= value {
            return Ok(());
        }

        let Some((signaled, index)) = self
            .pending
            .iter()
            .find(|(signaled, _)| *signaled >= value)
            .cloned()
        else {
            return Err(FrameError::Backend(format!(
                "waiting for fence value {value} that was never signaled"
            )));
        };

        let poll = wgpu::PollType::Wait {
            submission_index: Some(index),
            timeout,
        };
        match self.device.poll(poll) {
            Ok(_) => {
                self.completed.fetch_max(signaled, Ordering::AcqRel);
                self.retire();
                Ok(())
            }
            Err(wgpu::PollError::Timeout) => Err(FrameError::FenceTimeout {
                value,
                timeout: timeout.unwrap_or_default(),
            }),
            Err(err) => Err(FrameError::Backend(format!("fence wait failed: {err}"))),
        }
    }
}
