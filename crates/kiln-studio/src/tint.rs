use bytemuck::{Pod, Zeroable};
use kiln_engine::backend::gpu::{UploadAddress, WgpuBackend, VIEW_TABLE_GROUP};
use kiln_engine::device::{FrameError, ViewIndex};
use kiln_engine::frame::FrameContext;

/// Per-frame constants, written into upload memory every frame.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct Tint {
    pub color: [f32; 4],
    pub time: f32,
    pub aspect: f32,
    /// View table slot of the pattern texture.
    pub pattern: u32,
    pub _pad: f32,
}

const TINT_SIZE: u64 = std::mem::size_of::<Tint>() as u64;

const PATTERN_SIZE: u32 = 8;

/// Fullscreen pass shading with constants read straight from the upload arena
/// and a pattern texture read through the resource view table.
pub struct TintPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    pattern: ViewIndex,
}

impl TintPass {
    pub fn new(frame: &mut FrameContext<WgpuBackend<'_>>) -> Result<Self, FrameError> {
        let checker = checker_view(frame);
        let pattern = frame.views_mut().insert(checker)?;

        let device = frame.gpu();
        let config = frame.config();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kiln tint shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/tint.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln tint bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(TINT_SIZE),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kiln tint pipeline layout"),
            bind_group_layouts: &[frame.view_table_layout(), &layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("kiln tint pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: frame.surface_format(),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: config.depth.map(|depth| wgpu::DepthStencilState {
                format: depth.format,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: config.msaa_samples.count(),
                ..Default::default()
            },
            multiview_mask: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kiln tint sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            ..Default::default()
        });

        Ok(Self {
            pipeline,
            layout,
            sampler,
            pattern,
        })
    }

    /// Constants for this frame, pointing the shader at the pattern slot.
    pub fn constants(&self, color: [f32; 4], time: f32, aspect: f32) -> Tint {
        Tint {
            color,
            time,
            aspect,
            pattern: self.pattern.0,
            _pad: 0.0,
        }
    }

    /// Uploads `tint` and records two lists: a clear, then the fullscreen pass.
    pub fn record(
        &self,
        frame: &mut FrameContext<WgpuBackend<'_>>,
        tint: &Tint,
    ) -> Result<(), FrameError> {
        let mut region = frame.alloc_upload(TINT_SIZE)?;
        region.write_pod(tint)?;
        let address: UploadAddress = region.into_address();

        let bind_group = frame.gpu().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln tint bind group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(address.binding(TINT_SIZE)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let clear = frame.begin_command_list("clear")?;
        let color = frame.config().color_clear;
        frame.with_target_pass(clear, "clear pass", Some(color), |_| {})?;
        frame.end_command_list(clear)?;

        let list = frame.begin_command_list("tint")?;
        frame.with_target_pass(list, "tint pass", None, |pass| {
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(VIEW_TABLE_GROUP + 1, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        })?;
        frame.end_command_list(list)
    }
}

/// An 8x8 black and white checkerboard.
fn checker_view(frame: &FrameContext<WgpuBackend<'_>>) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width: PATTERN_SIZE,
        height: PATTERN_SIZE,
        depth_or_array_layers: 1,
    };
    let texture = frame.gpu().create_texture(&wgpu::TextureDescriptor {
        label: Some("kiln tint pattern"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let texels: Vec<[u8; 4]> = (0..PATTERN_SIZE * PATTERN_SIZE)
        .map(|i| {
            let on = (i % PATTERN_SIZE + i / PATTERN_SIZE) % 2 == 0;
            let v = if on { 255 } else { 0 };
            [v, v, v, 255]
        })
        .collect();

    frame.queue().write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(&texels),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(PATTERN_SIZE * 4),
            rows_per_image: Some(PATTERN_SIZE),
        },
        size,
    );

    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
