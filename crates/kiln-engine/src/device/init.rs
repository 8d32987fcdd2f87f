use std::time::Duration;

use crate::coords::Extent;

use super::FrameError;

/// Byte alignment of every upload allocation.
pub const UPLOAD_ALIGNMENT: u64 = 512;

/// Multisample count for the color attachment.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum MsaaSamples {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl MsaaSamples {
    pub fn count(self) -> u32 {
        match self {
            MsaaSamples::X1 => 1,
            MsaaSamples::X2 => 2,
            MsaaSamples::X4 => 4,
            MsaaSamples::X8 => 8,
        }
    }

    pub fn from_count(count: u32) -> Option<Self> {
        match count {
            1 => Some(MsaaSamples::X1),
            2 => Some(MsaaSamples::X2),
            4 => Some(MsaaSamples::X4),
            8 => Some(MsaaSamples::X8),
            _ => None,
        }
    }

    pub fn is_multisampled(self) -> bool {
        self != MsaaSamples::X1
    }
}

/// Depth-stencil attachment format and the value it is cleared to.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DepthConfig {
    pub format: wgpu::TextureFormat,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            format: wgpu::TextureFormat::Depth32Float,
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }
}

/// Startup configuration for the frame execution context.
///
/// Every value is fixed once the context exists. Resizing is the only thing
/// that changes surface resources at runtime, and it reuses these settings.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Frames the CPU may record ahead of the GPU. Also the back-buffer count.
    pub buffering_depth: u32,

    /// Upload arena capacity per frame slot, in bytes.
    pub upload_capacity: u64,

    /// Surface size the context starts with. The wgpu backend overrides it
    /// with the window's client size; an empty size means minimized.
    pub initial_viewport: Extent,

    /// Present at the display refresh rate (sync interval 1) when `true`.
    pub vsync: bool,

    /// Sample count of the color attachment. `X1` renders straight into the
    /// back buffer.
    pub msaa_samples: MsaaSamples,

    /// Optional depth-stencil attachment.
    pub depth: Option<DepthConfig>,

    /// Clear color used by target passes.
    pub color_clear: wgpu::Color,

    /// Enables backend validation messages.
    pub debug_validation: bool,

    /// Enables GPU-assisted validation. Slow; implies `debug_validation`.
    pub gpu_based_validation: bool,

    /// Hard cap on command lists per submitted batch.
    pub command_list_cap: usize,

    /// Slots in the shader-visible resource view table.
    pub view_table_capacity: u32,

    /// Upper bound on a single fence wait. `None` waits forever.
    pub fence_timeout: Option<Duration>,

    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// Optional alpha mode preference for the surface.
    ///
    /// If provided but unsupported on the current surface, a supported mode is selected.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Required wgpu features. Part of the minimum capability bar.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device. Part of the minimum capability bar.
    pub required_limits: wgpu::Limits,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            buffering_depth: 2,
            upload_capacity: 64 * 1024 * 1024,
            initial_viewport: Extent::new(1280, 720),
            vsync: false,
            msaa_samples: MsaaSamples::X1,
            depth: None,
            color_clear: wgpu::Color {
                r: 0.2,
                g: 0.4,
                b: 0.8,
                a: 1.0,
            },
            debug_validation: cfg!(debug_assertions),
            gpu_based_validation: false,
            command_list_cap: 4,
            view_table_capacity: 32 * 1024,
            fence_timeout: None,
            prefer_srgb: true,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        }
    }
}

impl FrameConfig {
    /// Checks value ranges that the rest of the context relies on.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.buffering_depth == 0 {
            return Err(FrameError::InvalidConfig("buffering_depth must be at least 1"));
        }
        if self.upload_capacity < UPLOAD_ALIGNMENT {
            return Err(FrameError::InvalidConfig(
                "upload_capacity must hold at least one 512-byte allocation",
            ));
        }
        if self.upload_capacity % UPLOAD_ALIGNMENT != 0 {
            return Err(FrameError::InvalidConfig(
                "upload_capacity must be a multiple of 512",
            ));
        }
        if self.command_list_cap == 0 {
            return Err(FrameError::InvalidConfig("command_list_cap must be at least 1"));
        }
        if self.view_table_capacity == 0 {
            return Err(FrameError::InvalidConfig("view_table_capacity must be at least 1"));
        }
        if let Some(depth) = &self.depth {
            if !depth.format.is_depth_stencil_format() {
                return Err(FrameError::InvalidConfig("depth format is not a depth-stencil format"));
            }
        }
        Ok(())
    }

    /// Present sync interval derived from `vsync`.
    pub fn sync_interval(&self) -> u32 {
        u32::from(self.vsync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FrameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffering_depth, 2);
        assert_eq!(config.command_list_cap, 4);
    }

    #[test]
    fn rejects_zero_depth() {
        let config = FrameConfig {
            buffering_depth: 0,
            ..FrameConfig::default()
        };
        assert!(matches!(config.validate(), Err(FrameError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_unaligned_upload_capacity() {
        let config = FrameConfig {
            upload_capacity: 4000,
            ..FrameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_color_format_as_depth() {
        let config = FrameConfig {
            depth: Some(DepthConfig {
                format: wgpu::TextureFormat::Rgba8Unorm,
                ..DepthConfig::default()
            }),
            ..FrameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn msaa_counts_round_trip() {
        for count in [1, 2, 4, 8] {
            assert_eq!(MsaaSamples::from_count(count).map(MsaaSamples::count), Some(count));
        }
        assert_eq!(MsaaSamples::from_count(3), None);
    }

    #[test]
    fn sync_interval_follows_vsync() {
        let mut config = FrameConfig::default();
        assert_eq!(config.sync_interval(), 0);
        config.vsync = true;
        assert_eq!(config.sync_interval(), 1);
    }
}
