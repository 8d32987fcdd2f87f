use crate::coords::Extent;
use crate::device::{DepthConfig, FrameConfig, FrameError, SurfaceErrorAction};
use crate::surface::SurfaceTarget;

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    Some(caps.formats[0])
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Sync interval 1 maps to `Fifo`; 0 picks the first uncapped mode available.
pub(crate) fn choose_present_mode(
    caps: &wgpu::SurfaceCapabilities,
    vsync: bool,
) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    [wgpu::PresentMode::Mailbox, wgpu::PresentMode::Immediate]
        .into_iter()
        .find(|mode| caps.present_modes.contains(mode))
        .unwrap_or(wgpu::PresentMode::Fifo)
}

pub(crate) fn map_surface_error(err: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigured,
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
        wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

struct Attachment {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct AcquiredFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    index: u32,
}

/// Views a target pass renders into.
pub struct FrameTarget<'a> {
    /// Multisampled color attachment, or the back buffer itself without MSAA.
    pub color: &'a wgpu::TextureView,
    /// The back buffer when `color` is multisampled.
    pub resolve: Option<&'a wgpu::TextureView>,
    pub depth: Option<&'a wgpu::TextureView>,
}

/// The window surface with its MSAA color and depth-stencil attachments.
pub struct WgpuSurface<'w> {
    surface: wgpu::Surface<'w>,
    device: wgpu::Device,
    config: wgpu::SurfaceConfiguration,
    sample_count: u32,
    depth_config: Option<DepthConfig>,
    color: Option<Attachment>,
    depth: Option<Attachment>,
    current: Option<AcquiredFrame>,
    back_buffers: u32,
    next: u32,
}

impl<'w> WgpuSurface<'w> {
    pub fn new(
        surface: wgpu::Surface<'w>,
        device: wgpu::Device,
        adapter: &wgpu::Adapter,
        format: wgpu::TextureFormat,
        config: &FrameConfig,
        size: Extent,
    ) -> Self {
        let caps = surface.get_capabilities(adapter);
        let present_mode = choose_present_mode(&caps, config.vsync);
        log::info!(
            "surface {size} {format:?}, {present_mode:?}, {} back buffers",
            config.buffering_depth
        );

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: choose_alpha_mode(&caps, config.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: config.buffering_depth,
        };

        // wgpu rejects 0x0 configurations; the first non-empty resize configures.
        if !size.is_empty() {
            surface.configure(&device, &surface_config);
        }

        let mut this = Self {
            surface,
            device,
            config: surface_config,
            sample_count: config.msaa_samples.count(),
            depth_config: config.depth,
            color: None,
            depth: None,
            current: None,
            back_buffers: config.buffering_depth,
            next: 0,
        };
        if !size.is_empty() {
            this.create_attachments(size);
        }
        this
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn present_mode(&self) -> wgpu::PresentMode {
        self.config.present_mode
    }

    /// Render targets of the acquired back buffer, if one is acquired.
    pub fn target(&self) -> Option<FrameTarget<'_>> {
        let frame = self.current.as_ref()?;
        let target = match &self.color {
            Some(color) => FrameTarget {
                color: &color.view,
                resolve: Some(&frame.view),
                depth: None,
            },
            None => FrameTarget {
                color: &frame.view,
                resolve: None,
                depth: None,
            },
        };
        Some(FrameTarget {
            depth: self.depth.as_ref().map(|depth| &depth.view),
            ..target
        })
    }

    fn create_attachments(&mut self, size: Extent) {
        let extent = wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        };

        self.color = (self.sample_count > 1)
            .then(|| self.attachment("kiln msaa color", extent, self.config.format));
        self.depth = self
            .depth_config
            .map(|depth| self.attachment("kiln depth", extent, depth.format));
    }

    fn attachment(
        &self,
        label: &str,
        size: wgpu::Extent3d,
        format: wgpu::TextureFormat,
    ) -> Attachment {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: self.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Attachment {
            _texture: texture,
            view,
        }
    }
}

impl SurfaceTarget for WgpuSurface<'_> {
    fn acquire(&mut self) -> Result<u32, FrameError> {
        if let Some(frame) = &self.current {
            return Ok(frame.index);
        }

        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err) => {
                log::warn!("failed to acquire back buffer: {err}");
                let action = map_surface_error(&err);
                if action == SurfaceErrorAction::Reconfigured {
                    self.surface.configure(&self.device, &self.config);
                }
                return Err(action.into());
            }
        };
        if texture.suboptimal {
            log::debug!("back buffer is suboptimal for the surface");
        }

        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let index = self.next;
        self.current = Some(AcquiredFrame {
            texture,
            view,
            index,
        });
        Ok(index)
    }

    fn present(&mut self) -> Result<(), FrameError> {
        let frame = self.current.take().ok_or(FrameError::NoFrameInProgress)?;
        drop(frame.view);
        frame.texture.present();
        self.next = (frame.index + 1) % self.back_buffers;
        Ok(())
    }

    fn release_back_buffers(&mut self) {
        self.current = None;
    }

    fn resize(&mut self, extent: Extent) -> Result<(), FrameError> {
        self.config.width = extent.width;
        self.config.height = extent.height;
        self.surface.configure(&self.device, &self.config);
        Ok(())
    }

    fn acquire_back_buffers(&mut self) -> Result<(), FrameError> {
        // Back buffers are acquired lazily by `get_current_texture`; the chain
        // restarts at index 0 after reconfiguration.
        self.next = 0;
        Ok(())
    }

    fn has_attachments(&self) -> bool {
        self.sample_count > 1 || self.depth_config.is_some()
    }

    fn recreate_attachments(&mut self, extent: Extent) -> Result<(), FrameError> {
        self.color = None;
        self.depth = None;
        self.create_attachments(extent);
        Ok(())
    }

    fn back_buffer_index(&self) -> u32 {
        self.next
    }
}
