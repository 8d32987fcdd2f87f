use std::num::NonZeroU32;

use crate::device::{ResourceViewTable, TableBinding, ViewIndex};

/// Bind group index the view table occupies in every pass recorded by
/// `with_target_pass`. Pipelines that read the table put
/// [`crate::device::DeviceContext::view_table_layout`] at this index.
pub const VIEW_TABLE_GROUP: u32 = 0;

/// The resource view table as one bind group: binding 0 is a
/// `binding_array<texture_2d<f32>>` indexed by [`ViewIndex`].
///
/// Entries must be 2D views of filterable float textures. Free slots below
/// the table's span hold a 1x1 placeholder.
pub(crate) struct ViewBindings {
    layout: wgpu::BindGroupLayout,
    placeholder: wgpu::TextureView,
    bind_group: TableBinding<wgpu::BindGroup>,
}

impl ViewBindings {
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln view table bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: NonZeroU32::new(capacity),
            }],
        });

        let placeholder = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("kiln view table placeholder"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            layout,
            placeholder,
            bind_group: TableBinding::new(),
        }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Bind group for the table's current contents; rebuilt after any change.
    pub fn bind_group(
        &mut self,
        device: &wgpu::Device,
        table: &ResourceViewTable<wgpu::TextureView>,
    ) -> &wgpu::BindGroup {
        let Self {
            layout,
            placeholder,
            bind_group,
        } = self;
        let (layout, placeholder) = (&*layout, &*placeholder);

        bind_group.get_or_rebuild(table, |table| {
            log::debug!("rebuilding view table bind group ({} live views)", table.len());
            let views: Vec<&wgpu::TextureView> = (0..table.span().max(1))
                .map(|index| table.get(ViewIndex(index)).unwrap_or(placeholder))
                .collect();

            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kiln view table"),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureViewArray(&views),
                }],
            })
        })
    }
}
