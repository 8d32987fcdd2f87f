use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use winit::window::Window;

use crate::backend::gpu::ViewBindings;

use super::{FrameConfig, FrameError, ResourceViewTable};

/// Device state the frame context needs to observe.
pub trait DeviceHandle {
    /// Reason string once the device has been removed or reset.
    fn lost(&self) -> Option<String>;
}

/// Owns the wgpu instance, adapter, device and the single command queue.
///
/// Creation enforces the minimum capability bar from [`FrameConfig`]. A device
/// that does not meet it is an environment error: nothing here retries.
pub struct DeviceContext {
    /// wgpu instance used to create the adapter and surface.
    instance: wgpu::Instance,

    /// Selected adapter.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    /// Surface format picked for the window this device was created for.
    surface_format: wgpu::TextureFormat,

    /// Set by the device-lost callback.
    lost: Arc<Mutex<Option<String>>>,

    /// Layout of the view table bind group.
    view_layout: wgpu::BindGroupLayout,

    view_bindings: Mutex<ViewBindings>,
}

impl DeviceContext {
    /// Acquires a device able to present to `window`.
    ///
    /// Returns the surface as well, because adapter selection has to be made
    /// against it. Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new<'w>(
        window: &'w Window,
        config: &FrameConfig,
    ) -> Result<(Self, wgpu::Surface<'w>)> {
        config.validate().context("invalid frame configuration")?;

        let mut flags = wgpu::InstanceFlags::empty();
        if config.debug_validation || config.gpu_based_validation {
            flags |= wgpu::InstanceFlags::DEBUG | wgpu::InstanceFlags::VALIDATION;
        }
        if config.gpu_based_validation {
            flags |= wgpu::InstanceFlags::GPU_BASED_VALIDATION;
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: flags.with_env(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        log::info!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        if flags.contains(wgpu::InstanceFlags::VALIDATION) {
            log::info!("validation layer enabled");
        }
        if flags.contains(wgpu::InstanceFlags::GPU_BASED_VALIDATION) {
            log::info!("GPU-based validation enabled");
        }

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format =
            crate::backend::gpu::choose_surface_format(&surface_caps, config.prefer_srgb)
                .context("no supported surface formats")?;

        let depth_features = config
            .depth
            .map(|depth| adapter.get_texture_format_features(depth.format));
        let missing = missing_requirements(
            config,
            adapter.features(),
            &adapter.limits(),
            &adapter.get_texture_format_features(surface_format),
            depth_features.as_ref(),
        );
        if !missing.is_empty() {
            anyhow::bail!(
                "graphics adapter \"{}\" does not support: {}. Please update your graphics driver and try again",
                info.name,
                missing.join(", ")
            );
        }

        let (required_features, required_limits) = device_requirements(config);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("kiln device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let lost = Arc::new(Mutex::new(None));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("GPU device lost ({reason:?}): {message}");
            if let Ok(mut slot) = lost_flag.lock() {
                *slot = Some(format!("{reason:?}: {message}"));
            }
        });
        device.on_uncaptured_error(Arc::new(|error| {
            log::error!("uncaptured wgpu error: {error}");
        }));

        let view_bindings = ViewBindings::new(&device, config.view_table_capacity);
        let view_layout = view_bindings.layout().clone();

        log::info!(
            "device created (surface format {surface_format:?}, {} view slots)",
            config.view_table_capacity
        );

        Ok((
            Self {
                instance,
                adapter,
                device,
                queue,
                surface_format,
                lost,
                view_layout,
                view_bindings: Mutex::new(view_bindings),
            },
            surface,
        ))
    }

    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Returns a reference to the logical device. Clients create their
    /// buffers, textures and pipelines through it.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Returns the active surface format.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Bind group layout pipelines use to read the resource view table.
    pub fn view_table_layout(&self) -> &wgpu::BindGroupLayout {
        &self.view_layout
    }

    /// Bind group exposing `table` to shaders, rebuilt if `table` changed
    /// since the last call.
    pub fn view_bind_group(
        &self,
        table: &ResourceViewTable<wgpu::TextureView>,
    ) -> Result<wgpu::BindGroup, FrameError> {
        let mut bindings = self
            .view_bindings
            .lock()
            .map_err(|_| FrameError::Backend("view table bindings poisoned".to_string()))?;
        Ok(bindings.bind_group(&self.device, table).clone())
    }
}

impl DeviceHandle for DeviceContext {
    fn lost(&self) -> Option<String> {
        self.lost.lock().ok().and_then(|reason| reason.clone())
    }
}

/// Features and limits the device is created with: the configured bar plus
/// what a binding array over the whole view table needs.
pub(crate) fn device_requirements(config: &FrameConfig) -> (wgpu::Features, wgpu::Limits) {
    let features = config.required_features
        | wgpu::Features::TEXTURE_BINDING_ARRAY
        | wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING
        | wgpu::Features::PARTIALLY_BOUND_BINDING_ARRAY;

    let base = &config.required_limits;
    let capacity = config.view_table_capacity;
    let limits = wgpu::Limits {
        max_binding_array_elements_per_shader_stage: base
            .max_binding_array_elements_per_shader_stage
            .max(capacity),
        max_sampled_textures_per_shader_stage: base
            .max_sampled_textures_per_shader_stage
            .max(capacity),
        ..base.clone()
    };
    (features, limits)
}

/// Lists every part of the capability bar the adapter fails.
pub(crate) fn missing_requirements(
    config: &FrameConfig,
    features: wgpu::Features,
    limits: &wgpu::Limits,
    color: &wgpu::TextureFormatFeatures,
    depth: Option<&wgpu::TextureFormatFeatures>,
) -> Vec<String> {
    let mut missing = Vec::new();
    let (required_features, required_limits) = device_requirements(config);

    let absent = required_features - features;
    if !absent.is_empty() {
        missing.push(format!("features {absent:?}"));
    }

    if !config.required_limits.check_limits(limits) {
        missing.push("required device limits".to_string());
    } else if !required_limits.check_limits(limits) {
        missing.push(format!(
            "a {}-entry resource view table",
            config.view_table_capacity
        ));
    }

    let samples = config.msaa_samples.count();
    if !color.flags.sample_count_supported(samples) {
        missing.push(format!("{samples}x MSAA on the surface format"));
    }

    if let (Some(depth_config), Some(depth)) = (config.depth, depth) {
        if !depth
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        {
            missing.push(format!("{:?} depth attachments", depth_config.format));
        } else if !depth.flags.sample_count_supported(samples) {
            missing.push(format!("{samples}x MSAA on {:?}", depth_config.format));
        }
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DepthConfig, MsaaSamples};

    fn format_features(
        usages: wgpu::TextureUsages,
        flags: wgpu::TextureFormatFeatureFlags,
    ) -> wgpu::TextureFormatFeatures {
        wgpu::TextureFormatFeatures {
            allowed_usages: usages,
            flags,
        }
    }

    fn bindless_features() -> wgpu::Features {
        device_requirements(&FrameConfig::default()).0
    }

    fn bindless_limits() -> wgpu::Limits {
        wgpu::Limits {
            max_binding_array_elements_per_shader_stage: 500_000,
            max_sampled_textures_per_shader_stage: 500_000,
            ..wgpu::Limits::default()
        }
    }

    #[test]
    fn default_config_passes_on_bindless_adapter() {
        let color = format_features(
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            wgpu::TextureFormatFeatureFlags::empty(),
        );
        let missing = missing_requirements(
            &FrameConfig::default(),
            bindless_features(),
            &bindless_limits(),
            &color,
            None,
        );
        assert!(missing.is_empty(), "{missing:?}");
    }

    #[test]
    fn reports_every_missing_capability() {
        let config = FrameConfig {
            msaa_samples: MsaaSamples::X4,
            depth: Some(DepthConfig::default()),
            required_features: wgpu::Features::DEPTH_CLIP_CONTROL,
            ..FrameConfig::default()
        };
        let color = format_features(
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            wgpu::TextureFormatFeatureFlags::empty(),
        );
        let depth = format_features(
            wgpu::TextureUsages::TEXTURE_BINDING,
            wgpu::TextureFormatFeatureFlags::empty(),
        );
        let missing = missing_requirements(
            &config,
            bindless_features(),
            &bindless_limits(),
            &color,
            Some(&depth),
        );
        assert_eq!(missing.len(), 3, "{missing:?}");
        assert!(missing[0].starts_with("features"));
        assert!(missing[1].contains("4x MSAA"));
    }

    #[test]
    fn view_table_needs_binding_arrays() {
        let color = format_features(
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            wgpu::TextureFormatFeatureFlags::empty(),
        );
        let missing = missing_requirements(
            &FrameConfig::default(),
            wgpu::Features::empty(),
            &wgpu::Limits::default(),
            &color,
            None,
        );
        assert_eq!(missing.len(), 2, "{missing:?}");
        assert!(missing[0].starts_with("features"));
        assert!(missing[1].contains("32768-entry resource view table"));
    }

    #[test]
    fn requested_limits_cover_the_view_table() {
        let config = FrameConfig {
            view_table_capacity: 4096,
            ..FrameConfig::default()
        };
        let (features, limits) = device_requirements(&config);
        assert!(features.contains(wgpu::Features::PARTIALLY_BOUND_BINDING_ARRAY));
        assert_eq!(limits.max_binding_array_elements_per_shader_stage, 4096);
        assert_eq!(limits.max_sampled_textures_per_shader_stage, 4096);
    }

    #[test]
    fn multisampled_formats_pass_when_flagged() {
        let config = FrameConfig {
            msaa_samples: MsaaSamples::X4,
            ..FrameConfig::default()
        };
        let color = format_features(
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            wgpu::TextureFormatFeatureFlags::MULTISAMPLE_X4,
        );
        let missing = missing_requirements(
            &config,
            bindless_features(),
            &bindless_limits(),
            &color,
            None,
        );
        assert!(missing.is_empty(), "{missing:?}");
    }
}
