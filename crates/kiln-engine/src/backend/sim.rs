//! Deterministic simulated GPU.
//!
//! Every backend call is appended to an event log. GPU progress is either
//! granted whenever the CPU waits ([`GpuMode::CatchUpOnWait`]) or only when the
//! test calls [`SimGpu::complete_up_to`] ([`GpuMode::Manual`]), which makes
//! blocking behaviour observable from another thread.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::commands::CommandDevice;
use crate::coords::Extent;
use crate::device::{DeviceHandle, FrameConfig, FrameError};
use crate::frame::FrameContext;
use crate::surface::SurfaceTarget;
use crate::sync::Timeline;
use crate::upload::UploadTarget;

use super::{Backend, BackendParts};

/// How the simulated GPU makes progress.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GpuMode {
    /// A wait completes everything up to the awaited value immediately.
    CatchUpOnWait,
    /// Only [`SimGpu::complete_up_to`] advances the completed value.
    Manual,
}

/// One recorded backend call.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SimEvent {
    Signal(u64),
    Wait(u64),
    ResetAllocator(usize),
    OpenList { slot: usize, label: String },
    CloseList(String),
    Submit(Vec<String>),
    Stage { slot: usize, offset: u64, len: usize },
    Acquire(u32),
    Present(u32),
    ReleaseBackBuffers,
    ResizeSurface(Extent),
    AcquireBackBuffers,
    RecreateAttachments(Extent),
}

struct SimState {
    mode: GpuMode,
    completed: u64,
    signaled: u64,
    events: Vec<SimEvent>,
    lost: Option<String>,
    fail_next_acquire: bool,
    staged: Vec<Vec<u8>>,
}

/// Shared state behind every simulated backend object.
pub struct SimGpu {
    state: Mutex<SimState>,
    progress: Condvar,
}

impl SimGpu {
    pub fn new(mode: GpuMode) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SimState {
                mode,
                completed: 0,
                signaled: 0,
                events: Vec::new(),
                lost: None,
                fail_next_acquire: false,
                staged: Vec::new(),
            }),
            progress: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: SimEvent) {
        self.lock().events.push(event);
    }

    pub fn timeline(self: &Arc<Self>) -> SimTimeline {
        SimTimeline {
            gpu: Arc::clone(self),
        }
    }

    pub fn commands(self: &Arc<Self>) -> SimCommands {
        SimCommands {
            gpu: Arc::clone(self),
        }
    }

    pub fn surface(self: &Arc<Self>, back_buffers: u32, attachments: bool) -> SimSurface {
        SimSurface {
            gpu: Arc::clone(self),
            back_buffers,
            next: 0,
            acquired: None,
            attachments,
        }
    }

    pub fn uploads(self: &Arc<Self>) -> SimUploads {
        SimUploads {
            gpu: Arc::clone(self),
        }
    }

    pub fn device(self: &Arc<Self>) -> SimDevice {
        SimDevice {
            gpu: Arc::clone(self),
        }
    }

    /// Backend objects matching `config`.
    pub fn parts(self: &Arc<Self>, config: &FrameConfig) -> BackendParts<SimBackend> {
        let attachments = config.msaa_samples.is_multisampled() || config.depth.is_some();
        BackendParts {
            device: self.device(),
            timeline: self.timeline(),
            commands: self.commands(),
            surface: self.surface(config.buffering_depth, attachments),
            uploads: self.uploads(),
        }
    }

    pub fn set_mode(&self, mode: GpuMode) {
        self.lock().mode = mode;
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Last value the simulated GPU finished.
    pub fn completed(&self) -> u64 {
        self.lock().completed
    }

    /// Last value signaled by the CPU.
    pub fn signaled(&self) -> u64 {
        self.lock().signaled
    }

    /// Marks every batch up to `value` as finished and wakes waiters.
    pub fn complete_up_to(&self, value: u64) {
        let mut state = self.lock();
        state.completed = state.completed.max(value);
        drop(state);
        self.progress.notify_all();
    }

    /// Simulates device removal; pending waits fail.
    pub fn lose_device(&self, reason: &str) {
        self.lock().lost = Some(reason.to_string());
        self.progress.notify_all();
    }

    /// Makes the next back-buffer acquisition fail with `SurfaceUnavailable`.
    pub fn fail_next_acquire(&self) {
        self.lock().fail_next_acquire = true;
    }

    /// Bytes staged into `slot`'s upload buffer so far.
    pub fn staged(&self, slot: usize) -> Vec<u8> {
        self.lock().staged.get(slot).cloned().unwrap_or_default()
    }
}

/// Marker type selecting the simulated backend.
pub struct SimBackend;

impl Backend for SimBackend {
    type Device = SimDevice;
    type Timeline = SimTimeline;
    type Commands = SimCommands;
    type Surface = SimSurface;
    type Uploads = SimUploads;
    type View = String;
}

/// Builds a frame context on a fresh simulated GPU.
pub fn simulated_context(
    config: FrameConfig,
    mode: GpuMode,
) -> Result<(FrameContext<SimBackend>, Arc<SimGpu>), FrameError> {
    let gpu = SimGpu::new(mode);
    let ctx = FrameContext::new(gpu.parts(&config), config)?;
    Ok((ctx, gpu))
}

pub struct SimDevice {
    gpu: Arc<SimGpu>,
}

impl DeviceHandle for SimDevice {
    fn lost(&self) -> Option<String> {
        self.gpu.lock().lost.clone()
    }
}

pub struct SimTimeline {
    gpu: Arc<SimGpu>,
}

impl Timeline for SimTimeline {
    fn signal(&mut self, value: u64) -> Result<(), FrameError> {
        let mut state = self.gpu.lock();
        if let Some(reason) = &state.lost {
            return Err(FrameError::DeviceLost(reason.clone()));
        }
        state.signaled = value;
        state.events.push(SimEvent::Signal(value));
        Ok(())
    }

    fn completed_value(&mut self) -> u64 {
        self.gpu.lock().completed
    }

    fn wait_for(&mut self, value: u64, timeout: Option<Duration>) -> Result<(), FrameError> {
        let mut state = self.gpu.lock();
        state.events.push(SimEvent::Wait(value));

        if state.mode == GpuMode::CatchUpOnWait {
            state.completed = state.completed.max(value);
            return Ok(());
        }

        let pending = |state: &mut SimState| state.completed < value && state.lost.is_none();
        let state = match timeout {
            Some(timeout) => {
                let (state, result) = self
                    .gpu
                    .progress
                    .wait_timeout_while(state, timeout, pending)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() && state.completed < value {
                    return Err(FrameError::FenceTimeout { value, timeout });
                }
                state
            }
            None => self
                .gpu
                .progress
                .wait_while(state, pending)
                .unwrap_or_else(PoisonError::into_inner),
        };

        match &state.lost {
            Some(reason) if state.completed < value => Err(FrameError::DeviceLost(reason.clone())),
            _ => Ok(()),
        }
    }
}

pub struct SimAllocator {
    slot: usize,
}

/// A simulated command list: a label and the commands recorded into it.
#[derive(Debug, Clone, Default)]
pub struct SimList {
    pub label: String,
    pub commands: Vec<String>,
}

impl SimList {
    pub fn record(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }
}

pub struct SimCommands {
    gpu: Arc<SimGpu>,
}

impl CommandDevice for SimCommands {
    type Allocator = SimAllocator;
    type List = SimList;
    type Closed = SimList;

    fn create_allocator(&mut self, slot: usize) -> Result<SimAllocator, FrameError> {
        Ok(SimAllocator { slot })
    }

    fn reset_allocator(&mut self, allocator: &mut SimAllocator) -> Result<(), FrameError> {
        self.gpu.record(SimEvent::ResetAllocator(allocator.slot));
        Ok(())
    }

    fn open_list(&mut self, allocator: &mut SimAllocator, label: &str) -> Result<SimList, FrameError> {
        self.gpu.record(SimEvent::OpenList {
            slot: allocator.slot,
            label: label.to_string(),
        });
        Ok(SimList {
            label: label.to_string(),
            commands: Vec::new(),
        })
    }

    fn close_list(&mut self, list: SimList) -> Result<SimList, FrameError> {
        self.gpu.record(SimEvent::CloseList(list.label.clone()));
        Ok(list)
    }

    fn submit(&mut self, batch: Vec<SimList>) -> Result<(), FrameError> {
        let labels = batch.into_iter().map(|list| list.label).collect();
        self.gpu.record(SimEvent::Submit(labels));
        Ok(())
    }
}

pub struct SimSurface {
    gpu: Arc<SimGpu>,
    back_buffers: u32,
    next: u32,
    acquired: Option<u32>,
    attachments: bool,
}

impl SurfaceTarget for SimSurface {
    fn acquire(&mut self) -> Result<u32, FrameError> {
        let mut state = self.gpu.lock();
        if std::mem::take(&mut state.fail_next_acquire) {
            return Err(FrameError::SurfaceUnavailable);
        }
        state.events.push(SimEvent::Acquire(self.next));
        self.acquired = Some(self.next);
        Ok(self.next)
    }

    fn present(&mut self) -> Result<(), FrameError> {
        let index = self.acquired.take().ok_or(FrameError::NoFrameInProgress)?;
        self.gpu.record(SimEvent::Present(index));
        self.next = (index + 1) % self.back_buffers;
        Ok(())
    }

    fn release_back_buffers(&mut self) {
        self.acquired = None;
        self.gpu.record(SimEvent::ReleaseBackBuffers);
    }

    fn resize(&mut self, extent: Extent) -> Result<(), FrameError> {
        self.gpu.record(SimEvent::ResizeSurface(extent));
        Ok(())
    }

    fn acquire_back_buffers(&mut self) -> Result<(), FrameError> {
        self.next = 0;
        self.gpu.record(SimEvent::AcquireBackBuffers);
        Ok(())
    }

    fn has_attachments(&self) -> bool {
        self.attachments
    }

    fn recreate_attachments(&mut self, extent: Extent) -> Result<(), FrameError> {
        self.gpu.record(SimEvent::RecreateAttachments(extent));
        Ok(())
    }

    fn back_buffer_index(&self) -> u32 {
        self.next
    }
}

/// GPU-side location of simulated upload memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SimAddress {
    pub slot: usize,
    pub offset: u64,
}

pub struct SimUploads {
    gpu: Arc<SimGpu>,
}

impl UploadTarget for SimUploads {
    type Address = SimAddress;

    fn address(&self, slot: usize, offset: u64) -> SimAddress {
        SimAddress { slot, offset }
    }

    fn stage(&mut self, slot: usize, offset: u64, bytes: &[u8]) -> Result<(), FrameError> {
        let mut state = self.gpu.lock();
        if state.staged.len() <= slot {
            state.staged.resize_with(slot + 1, Vec::new);
        }
        let buffer = &mut state.staged[slot];
        let end = offset as usize + bytes.len();
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[offset as usize..end].copy_from_slice(bytes);
        state.events.push(SimEvent::Stage {
            slot,
            offset,
            len: bytes.len(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_wait_returns_once_completed() {
        let gpu = SimGpu::new(GpuMode::Manual);
        let mut timeline = gpu.timeline();
        timeline.signal(1).unwrap();
        gpu.complete_up_to(1);
        timeline.wait_for(1, None).unwrap();
        assert_eq!(timeline.completed_value(), 1);
    }

    #[test]
    fn lost_device_fails_pending_waits() {
        let gpu = SimGpu::new(GpuMode::Manual);
        let mut timeline = gpu.timeline();
        timeline.signal(1).unwrap();
        gpu.lose_device("removed");
        assert_eq!(
            timeline.wait_for(1, None),
            Err(FrameError::DeviceLost("removed".into()))
        );
        assert!(timeline.signal(2).is_err());
    }

    #[test]
    fn completed_value_never_decreases() {
        let gpu = SimGpu::new(GpuMode::Manual);
        gpu.complete_up_to(3);
        gpu.complete_up_to(1);
        assert_eq!(gpu.completed(), 3);
    }
}
