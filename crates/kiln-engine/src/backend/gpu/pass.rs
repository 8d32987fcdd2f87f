use crate::commands::ListHandle;
use crate::device::FrameError;
use crate::frame::FrameContext;

use super::{WgpuBackend, VIEW_TABLE_GROUP};

impl<'w> FrameContext<WgpuBackend<'w>> {
    /// Records a render pass into `handle` targeting the acquired back buffer.
    ///
    /// The color target is cleared to `clear` and the depth target to its
    /// configured clear values; with `None` both are loaded. With MSAA the
    /// pass resolves into the back buffer. Viewport and scissor cover the
    /// whole surface, and the resource view table is bound at
    /// [`VIEW_TABLE_GROUP`].
    pub fn with_target_pass<R>(
        &mut self,
        handle: ListHandle,
        label: &str,
        clear: Option<wgpu::Color>,
        draw: impl FnOnce(&mut wgpu::RenderPass<'_>) -> R,
    ) -> Result<R, FrameError> {
        let depth_config = self.config().depth;
        let views = self.view_bind_group()?;
        let (mut list, surface) = self.list_and_surface(handle)?;
        let viewport = list.viewport();
        let target = surface.target().ok_or(FrameError::NoFrameInProgress)?;

        let load = match clear {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };
        // Later passes of the frame load the multisampled color again.
        let store = wgpu::StoreOp::Store;

        let depth_stencil_attachment = target.depth.zip(depth_config).map(|(view, depth)| {
            wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if clear.is_some() {
                        wgpu::LoadOp::Clear(depth.clear_depth)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: depth.format.has_stencil_aspect().then_some(wgpu::Operations {
                    load: if clear.is_some() {
                        wgpu::LoadOp::Clear(depth.clear_stencil)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
            }
        });

        let mut pass = list.encoder().begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color,
                resolve_target: target.resolve,
                ops: wgpu::Operations { load, store },
                depth_slice: None,
            })],
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        pass.set_viewport(
            0.0,
            0.0,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        pass.set_scissor_rect(0, 0, viewport.width, viewport.height);
        pass.set_bind_group(VIEW_TABLE_GROUP, &views, &[]);

        Ok(draw(&mut pass))
    }
}
