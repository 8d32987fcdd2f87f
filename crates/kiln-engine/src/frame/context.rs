use crate::backend::{Backend, BackendParts};
use crate::commands::{CommandRecorder, ListHandle};
use crate::coords::Extent;
use crate::device::{DeviceHandle, FrameConfig, FrameError, ResourceViewTable};
use crate::surface::{SurfaceManager, SurfaceState};
use crate::sync::{FrameSynchronizer, FrameToken};
use crate::upload::{UploadArena, UploadRegion, UploadTarget};

use super::CommandList;

/// The frame execution context.
///
/// Owns everything a frame needs: the fence-driven synchronizer, one upload
/// arena and command allocator per frame slot, the command recorder, the
/// resource view table and the surface. A tick looks like:
///
/// ```text
/// resize_check -> begin_frame -> alloc_upload / begin_command_list ... end_command_list -> present
/// ```
///
/// Fields are declared in reverse creation order so that they are released in
/// that order once `Drop` has drained the GPU.
pub struct FrameContext<B: Backend> {
    surface: SurfaceManager<B::Surface>,
    recorder: CommandRecorder<B::Commands>,
    arenas: Vec<UploadArena>,
    uploads: B::Uploads,
    sync: FrameSynchronizer<B::Timeline>,
    views: ResourceViewTable<B::View>,
    device: B::Device,
    config: FrameConfig,
    frame: Option<FrameToken>,
}

impl<B: Backend> FrameContext<B> {
    pub fn new(parts: BackendParts<B>, config: FrameConfig) -> Result<Self, FrameError> {
        config.validate()?;

        let depth = config.buffering_depth;
        let views = ResourceViewTable::new(config.view_table_capacity);
        let sync = FrameSynchronizer::new(parts.timeline, depth, config.fence_timeout);
        let arenas = (0..depth)
            .map(|_| UploadArena::new(config.upload_capacity))
            .collect();
        let recorder =
            CommandRecorder::new(parts.commands, depth as usize, config.command_list_cap)?;
        let surface = SurfaceManager::new(parts.surface, config.initial_viewport);

        log::info!(
            "frame context: {depth} frames in flight, vsync {}, {}x MSAA, depth {:?}",
            if config.vsync { "on" } else { "off" },
            config.msaa_samples.count(),
            config.depth.map(|depth| depth.format),
        );
        log::info!(
            "upload heaps: {depth} x {} KiB, command list cap {}, view table {}",
            config.upload_capacity / 1024,
            config.command_list_cap,
            config.view_table_capacity,
        );

        Ok(Self {
            surface,
            recorder,
            arenas,
            uploads: parts.uploads,
            sync,
            views,
            device: parts.device,
            config,
            frame: None,
        })
    }

    /// Checks the window size once per tick, before recording.
    ///
    /// Skip drawing when the result is [`SurfaceState::Minimized`]; rebuild the
    /// context on [`SurfaceState::DeviceLost`].
    pub fn resize_check(&mut self, window_size: Extent) -> Result<SurfaceState, FrameError> {
        if self.frame.is_some() {
            return Err(FrameError::FrameInProgress);
        }
        if let Some(reason) = self.device.lost() {
            return Ok(self.surface.mark_device_lost(&reason));
        }
        self.surface.update(window_size, &mut self.sync)
    }

    /// Opens the next frame slot, waiting for the GPU if it is too far behind.
    ///
    /// Resets the slot's upload arena and binds the recorder to its allocator.
    pub fn begin_frame(&mut self) -> Result<FrameToken, FrameError> {
        self.check_device()?;
        if self.frame.is_some() {
            return Err(FrameError::FrameInProgress);
        }
        if self.surface.viewport().is_empty() {
            return Err(FrameError::SurfaceUnavailable);
        }

        let token = self.sync.begin_frame()?;
        self.surface.acquire()?;

        let slot = token.frame_index as usize;
        debug_assert!(self.sync.is_slot_idle(token.frame_index));
        self.arenas[slot].reset();
        self.recorder.begin_frame(slot, self.surface.viewport());

        self.frame = Some(token);
        Ok(token)
    }

    /// Bump-allocates `size` bytes of upload memory in the current slot.
    ///
    /// The region is valid for this frame only.
    pub fn alloc_upload(
        &mut self,
        size: u64,
    ) -> Result<UploadRegion<'_, <B::Uploads as UploadTarget>::Address>, FrameError> {
        let slot = self.current_slot()?;
        let arena = &mut self.arenas[slot];
        let allocation = arena.alloc(size).inspect_err(|err| {
            if matches!(err, FrameError::UploadExhausted { .. }) {
                log::error!("{err}");
            }
        })?;

        let address = self.uploads.address(slot, allocation.offset);
        Ok(UploadRegion::new(
            arena.bytes_mut(&allocation),
            address,
            slot,
            allocation.offset,
            allocation.aligned_size,
        ))
    }

    /// Opens a command list. Lists run in the order they were opened.
    pub fn begin_command_list(&mut self, label: &str) -> Result<ListHandle, FrameError> {
        self.current_slot()?;
        self.recorder.begin(label)
    }

    /// Recording access to an open list.
    pub fn list_mut(&mut self, handle: ListHandle) -> Result<CommandList<'_, B>, FrameError> {
        let viewport = self.surface.viewport();
        let list = self.recorder.list_mut(handle)?;
        Ok(CommandList::new(list, viewport, &self.views))
    }

    pub fn end_command_list(&mut self, handle: ListHandle) -> Result<(), FrameError> {
        self.recorder.end(handle)
    }

    /// Stages this frame's new upload bytes and submits every closed list as
    /// one batch. Returns the number of lists submitted.
    pub fn flush(&mut self) -> Result<usize, FrameError> {
        let slot = self.current_slot()?;
        let (offset, bytes) = self.arenas[slot].take_unstaged();
        if !bytes.is_empty() {
            self.uploads.stage(slot, offset, bytes)?;
        }
        self.recorder.flush()
    }

    /// Flushes, presents, and signals the frame's fence value.
    ///
    /// Applies the backpressure check before returning. Returns the signaled value.
    pub fn present(&mut self) -> Result<u64, FrameError> {
        self.current_slot()?;
        self.flush()?;
        self.recorder.end_frame();
        self.frame = None;

        let presented = self.surface.present();
        let value = self.sync.end_frame()?;
        presented?;

        self.sync.throttle()?;
        Ok(value)
    }

    /// Blocks until the GPU finished everything submitted.
    pub fn drain(&mut self) -> Result<(), FrameError> {
        self.sync.drain()
    }

    /// Viewport of the current back buffers.
    pub fn viewport(&self) -> Extent {
        self.surface.viewport()
    }

    /// Slot the next (or current) frame records into.
    pub fn frame_index(&self) -> u32 {
        self.frame
            .map(|token| token.frame_index)
            .unwrap_or_else(|| self.sync.frame_index())
    }

    /// Token of the frame in progress.
    pub fn frame(&self) -> Option<FrameToken> {
        self.frame
    }

    pub fn fence(&self) -> &FrameSynchronizer<B::Timeline> {
        &self.sync
    }

    pub fn views(&self) -> &ResourceViewTable<B::View> {
        &self.views
    }

    pub fn views_mut(&mut self) -> &mut ResourceViewTable<B::View> {
        &mut self.views
    }

    pub fn surface(&self) -> &SurfaceManager<B::Surface> {
        &self.surface
    }

    /// An open list together with the surface it renders into.
    pub(crate) fn list_and_surface(
        &mut self,
        handle: ListHandle,
    ) -> Result<(CommandList<'_, B>, &B::Surface), FrameError> {
        let viewport = self.surface.viewport();
        let list = self.recorder.list_mut(handle)?;
        Ok((
            CommandList::new(list, viewport, &self.views),
            self.surface.target(),
        ))
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn uploads(&self) -> &B::Uploads {
        &self.uploads
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn current_slot(&self) -> Result<usize, FrameError> {
        self.frame
            .map(|token| token.frame_index as usize)
            .ok_or(FrameError::NoFrameInProgress)
    }

    fn check_device(&mut self) -> Result<(), FrameError> {
        match self.device.lost() {
            Some(reason) => {
                self.surface.mark_device_lost(&reason);
                Err(FrameError::DeviceLost(reason))
            }
            None => Ok(()),
        }
    }
}

impl<B: Backend> Drop for FrameContext<B> {
    fn drop(&mut self) {
        if self.device.lost().is_some() {
            return;
        }
        if let Err(err) = self.sync.drain() {
            log::warn!("failed to drain GPU work on shutdown: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::backend::sim::{simulated_context, GpuMode, SimAddress, SimEvent};
    use crate::device::{DepthConfig, MsaaSamples};

    fn config() -> FrameConfig {
        FrameConfig {
            upload_capacity: 4096,
            ..FrameConfig::default()
        }
    }

    fn signals(events: &[SimEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|event| match event {
                SimEvent::Signal(value) => Some(*value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn upload_offsets_fill_the_arena() {
        let (mut ctx, _gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        ctx.begin_frame().unwrap();

        let offsets: Vec<u64> = [100, 600, 2500]
            .into_iter()
            .map(|size| ctx.alloc_upload(size).unwrap().offset())
            .collect();
        assert_eq!(offsets, vec![0, 512, 1536]);

        assert!(matches!(
            ctx.alloc_upload(1),
            Err(FrameError::UploadExhausted { remaining: 0, .. })
        ));
    }

    #[test]
    fn upload_address_names_slot_and_offset() {
        let (mut ctx, _gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        ctx.begin_frame().unwrap();
        ctx.alloc_upload(8).unwrap();
        let region = ctx.alloc_upload(8).unwrap();
        assert_eq!(*region.address(), SimAddress { slot: 0, offset: 512 });
    }

    #[test]
    fn third_frame_blocks_without_gpu_progress() {
        let (ctx, gpu) = simulated_context(config(), GpuMode::Manual).unwrap();
        let (tx, rx) = mpsc::channel();

        let worker = thread::spawn(move || {
            let mut ctx = ctx;
            for _ in 0..3 {
                let token = ctx.begin_frame().unwrap();
                tx.send(token.fence_value).unwrap();
                ctx.present().unwrap();
            }
            ctx
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(1));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(2));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        gpu.complete_up_to(1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(3));

        gpu.complete_up_to(3);
        drop(worker.join().unwrap());
    }

    #[test]
    fn fence_advances_by_one_per_present() {
        let (mut ctx, gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        for _ in 0..5 {
            ctx.begin_frame().unwrap();
            ctx.present().unwrap();
            let fence = ctx.fence();
            assert!(fence.submitted() - gpu.completed() <= u64::from(fence.depth()));
        }
        assert_eq!(signals(&gpu.events()), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn slot_is_reused_only_after_its_fence_completes() {
        let (mut ctx, gpu) = simulated_context(
            FrameConfig {
                buffering_depth: 3,
                ..config()
            },
            GpuMode::CatchUpOnWait,
        )
        .unwrap();

        for _ in 0..9 {
            let token = ctx.begin_frame().unwrap();
            assert!(Some(gpu.completed()) >= ctx.fence().slot_fence(token.frame_index));
            assert_eq!(ctx.alloc_upload(1).unwrap().offset(), 0);
            ctx.present().unwrap();
        }
    }

    #[test]
    fn flush_stages_uploads_before_submitting() {
        let (mut ctx, gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        ctx.begin_frame().unwrap();

        let mut region = ctx.alloc_upload(4).unwrap();
        region.bytes_mut().copy_from_slice(&[9, 8, 7, 6]);
        let list = ctx.begin_command_list("copy").unwrap();
        ctx.list_mut(list).unwrap().encoder().record("copy upload");
        ctx.end_command_list(list).unwrap();
        assert_eq!(ctx.flush().unwrap(), 1);

        let events = gpu.events();
        let stage = events
            .iter()
            .position(|event| matches!(event, SimEvent::Stage { slot: 0, offset: 0, len: 512 }));
        let submit = events
            .iter()
            .position(|event| matches!(event, SimEvent::Submit(_)));
        assert!(stage.is_some() && stage < submit);
        assert_eq!(&gpu.staged(0)[..4], &[9, 8, 7, 6]);
    }

    #[test]
    fn lists_submit_in_open_order_on_present() {
        let (mut ctx, gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        ctx.begin_frame().unwrap();
        let scene = ctx.begin_command_list("scene").unwrap();
        let gui = ctx.begin_command_list("gui").unwrap();
        ctx.end_command_list(gui).unwrap();
        ctx.end_command_list(scene).unwrap();
        ctx.present().unwrap();

        let submits: Vec<_> = gpu
            .events()
            .into_iter()
            .filter(|event| matches!(event, SimEvent::Submit(_)))
            .collect();
        assert_eq!(
            submits,
            vec![SimEvent::Submit(vec!["scene".into(), "gui".into()])]
        );
    }

    #[test]
    fn fifth_command_list_is_a_configuration_error() {
        let (mut ctx, _gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        ctx.begin_frame().unwrap();
        for _ in 0..4 {
            ctx.begin_command_list("pass").unwrap();
        }
        let err = ctx.begin_command_list("pass").unwrap_err();
        assert_eq!(err, FrameError::CommandListCapExceeded { cap: 4 });
        assert!(err.is_fatal());
    }

    #[test]
    fn minimize_and_restore_through_resize_check() {
        let (mut ctx, _gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        let size = Extent::new(1280, 720);

        assert_eq!(ctx.resize_check(Extent::ZERO), Ok(SurfaceState::Minimized));
        assert_eq!(ctx.begin_frame(), Err(FrameError::SurfaceUnavailable));
        assert_eq!(ctx.resize_check(size), Ok(SurfaceState::Resized));
        assert_eq!(ctx.resize_check(size), Ok(SurfaceState::Normal));
        assert!(ctx.begin_frame().is_ok());
    }

    #[test]
    fn surface_created_at_zero_size_is_configured_by_first_resize() {
        let (mut ctx, gpu) = simulated_context(
            FrameConfig {
                initial_viewport: Extent::ZERO,
                depth: Some(DepthConfig::default()),
                ..config()
            },
            GpuMode::CatchUpOnWait,
        )
        .unwrap();
        let size = Extent::new(1280, 720);

        assert_eq!(ctx.begin_frame(), Err(FrameError::SurfaceUnavailable));
        assert!(gpu.events().is_empty());

        assert_eq!(ctx.resize_check(size), Ok(SurfaceState::Resized));
        assert_eq!(ctx.viewport(), size);
        assert_eq!(
            gpu.events(),
            vec![
                SimEvent::ReleaseBackBuffers,
                SimEvent::ResizeSurface(size),
                SimEvent::AcquireBackBuffers,
                SimEvent::RecreateAttachments(size),
            ]
        );

        assert!(ctx.begin_frame().is_ok());
        assert_eq!(gpu.events().last(), Some(&SimEvent::Acquire(0)));
    }

    #[test]
    fn resize_waits_for_in_flight_frames() {
        let (mut ctx, gpu) = simulated_context(
            FrameConfig {
                msaa_samples: MsaaSamples::X4,
                depth: Some(DepthConfig::default()),
                ..config()
            },
            GpuMode::Manual,
        )
        .unwrap();
        ctx.begin_frame().unwrap();
        ctx.present().unwrap();

        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || {
            let state = ctx.resize_check(Extent::new(640, 480));
            tx.send(state).unwrap();
            ctx
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(!gpu.events().contains(&SimEvent::ReleaseBackBuffers));

        gpu.complete_up_to(1);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(Ok(SurfaceState::Resized))
        );
        let ctx = worker.join().unwrap();
        assert_eq!(ctx.viewport(), Extent::new(640, 480));
        assert!(
            gpu.events()
                .contains(&SimEvent::RecreateAttachments(Extent::new(640, 480)))
        );
    }

    #[test]
    fn resize_check_is_rejected_mid_frame() {
        let (mut ctx, _gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        ctx.begin_frame().unwrap();
        assert_eq!(
            ctx.resize_check(Extent::new(10, 10)),
            Err(FrameError::FrameInProgress)
        );
        assert_eq!(ctx.begin_frame(), Err(FrameError::FrameInProgress));
    }

    #[test]
    fn device_loss_is_reported() {
        let (mut ctx, gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        gpu.lose_device("driver reset");

        assert_eq!(
            ctx.resize_check(Extent::new(1280, 720)),
            Ok(SurfaceState::DeviceLost)
        );
        assert_eq!(
            ctx.begin_frame(),
            Err(FrameError::DeviceLost("driver reset".into()))
        );
    }

    #[test]
    fn failed_acquire_skips_the_frame() {
        let (mut ctx, gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        gpu.fail_next_acquire();

        let err = ctx.begin_frame().unwrap_err();
        assert_eq!(err, FrameError::SurfaceUnavailable);
        assert!(!err.is_fatal());
        assert!(ctx.frame().is_none());

        let token = ctx.begin_frame().unwrap();
        assert_eq!(token.fence_value, 1);
    }

    #[test]
    fn recording_requires_an_open_frame() {
        let (mut ctx, _gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        assert!(matches!(ctx.alloc_upload(16), Err(FrameError::NoFrameInProgress)));
        assert_eq!(
            ctx.begin_command_list("x"),
            Err(FrameError::NoFrameInProgress)
        );
        assert_eq!(ctx.present(), Err(FrameError::NoFrameInProgress));
    }

    #[test]
    fn view_table_is_shared_with_command_lists() {
        let (mut ctx, _gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        let index = ctx.views_mut().insert("albedo".to_string()).unwrap();

        ctx.begin_frame().unwrap();
        let handle = ctx.begin_command_list("draw").unwrap();
        let list = ctx.list_mut(handle).unwrap();
        assert_eq!(list.views().get(index).map(String::as_str), Some("albedo"));
        assert_eq!(list.viewport(), Extent::new(1280, 720));
    }

    #[test]
    fn drop_drains_outstanding_work() {
        let (mut ctx, gpu) = simulated_context(config(), GpuMode::CatchUpOnWait).unwrap();
        ctx.begin_frame().unwrap();
        ctx.present().unwrap();
        assert_eq!(gpu.completed(), 0);

        drop(ctx);
        assert_eq!(gpu.completed(), 1);
        assert_eq!(gpu.events().last(), Some(&SimEvent::Wait(1)));
    }
}
