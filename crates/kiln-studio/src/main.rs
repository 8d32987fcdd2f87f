mod tint;

use std::time::Instant;

use anyhow::Result;
use kiln_engine::coords::Extent;
use kiln_engine::core::{App, AppControl, FrameCtx};
use kiln_engine::device::{DepthConfig, FrameConfig};
use kiln_engine::logging::{init_logging, LoggingConfig};
use kiln_engine::window::{Runtime, RuntimeConfig};
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use crate::tint::TintPass;

struct Studio {
    started: Instant,
    tint: Option<TintPass>,
}

impl App for Studio {
    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        match event {
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                AppControl::Exit
            }
            _ => AppControl::Continue,
        }
    }

    fn on_resized(&mut self, _window_id: WindowId, viewport: Extent) {
        log::debug!("studio viewport {viewport}");
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if self.tint.is_none() {
            match TintPass::new(ctx.frame) {
                Ok(pass) => self.tint = Some(pass),
                Err(err) => {
                    ctx.runtime
                        .fail(anyhow::Error::new(err).context("failed to set up the tint pass"));
                    return AppControl::Exit;
                }
            }
        }
        let Some(tint) = &self.tint else {
            return AppControl::Continue;
        };

        let t = self.started.elapsed().as_secs_f32();
        let constants = tint.constants(
            [
                0.5 + 0.5 * (t * 0.7).sin(),
                0.5 + 0.5 * (t * 0.9 + 2.0).sin(),
                0.5 + 0.5 * (t * 1.1 + 4.0).sin(),
                1.0,
            ],
            t,
            ctx.frame.viewport().aspect(),
        );

        ctx.render(|frame| tint.record(frame, &constants))
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "kiln studio".to_string(),
        frame: FrameConfig {
            depth: Some(DepthConfig::default()),
            vsync: true,
            view_table_capacity: 1024,
            ..FrameConfig::default()
        },
        ..RuntimeConfig::default()
    };

    Runtime::run(
        config,
        Studio {
            started: Instant::now(),
            tint: None,
        },
    )
}
