use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::backend::gpu::{create_context, WgpuBackend};
use crate::coords::Extent;
use crate::core::{App as CoreApp, AppControl, FrameCtx, WindowCtx};
use crate::device::FrameConfig;
use crate::frame::FrameContext;
use crate::surface::SurfaceState;
use crate::time::FrameStats;

/// How long a minimized window yields before checking its size again.
const MINIMIZED_SLEEP: Duration = Duration::from_millis(1);

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    /// Appends FPS and frame time to the title once per second.
    pub show_stats: bool,
    pub frame: FrameConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "kiln".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            show_stats: true,
            frame: FrameConfig::default(),
        }
    }
}

/// Runtime context passed to the application.
///
/// Commands are buffered and applied after the current callback returns.
#[derive(Default)]
pub struct RuntimeCtx {
    commands: Vec<Command>,
}

impl RuntimeCtx {
    pub fn close_window(&mut self, id: WindowId) {
        self.commands.push(Command::CloseWindow(id));
    }

    pub fn exit(&mut self) {
        self.commands.push(Command::Exit);
    }

    /// Stops the runtime; [`Runtime::run`] returns `error`.
    pub fn fail(&mut self, error: anyhow::Error) {
        self.commands.push(Command::Fail(error));
    }
}

enum Command {
    CloseWindow(WindowId),
    Exit,
    Fail(anyhow::Error),
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens the initial window and drives frames until exit.
    ///
    /// Fatal conditions (no capable GPU, device loss, frame errors) end the
    /// loop and are returned as the error.
    pub fn run<A>(initial: RuntimeConfig, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(initial, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    stats: FrameStats,
    title: String,
    show_stats: bool,

    window: Window,

    #[borrows(window)]
    #[not_covariant]
    frame: FrameContext<WgpuBackend<'this>>,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    initial: RuntimeConfig,
    app: A,

    windows: HashMap<WindowId, WindowEntry>,
    exit_requested: bool,
    error: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(initial: RuntimeConfig, app: A) -> Self {
        Self {
            initial,
            app,
            windows: HashMap::new(),
            exit_requested: false,
            error: None,
        }
    }

    fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    fn fail(&mut self, error: anyhow::Error) {
        log::error!("{error:#}");
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.request_exit();
    }

    fn create_window_entry(
        &mut self,
        event_loop: &ActiveEventLoop,
        config: RuntimeConfig,
    ) -> Result<WindowId> {
        let attrs = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let id = window.id();
        let frame_config = config.frame;

        let entry = WindowEntryTryBuilder {
            stats: FrameStats::default(),
            title: config.title,
            show_stats: config.show_stats,
            window,
            frame_builder: |w| pollster::block_on(create_context(w, frame_config)),
        }
        .try_build()
        .context("GPU initialization failed")?;

        self.windows.insert(id, entry);
        Ok(id)
    }

    fn destroy_window_entry(&mut self, id: WindowId) {
        // Dropping the entry drains the GPU before releasing the surface.
        self.windows.remove(&id);
    }

    fn apply_commands(&mut self, event_loop: &ActiveEventLoop, ctx: RuntimeCtx) {
        for cmd in ctx.commands {
            match cmd {
                Command::CloseWindow(id) => self.destroy_window_entry(id),
                Command::Exit => self.request_exit(),
                Command::Fail(error) => self.fail(error),
            }
        }

        if self.windows.is_empty() {
            self.request_exit();
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId) {
        let mut runtime_ctx = RuntimeCtx::default();
        let mut app_control = AppControl::Continue;
        let mut minimized = false;

        let (app, windows) = (&mut self.app, &mut self.windows);
        let Some(entry) = windows.get_mut(&window_id) else {
            return;
        };

        entry.with_mut(|fields| {
            let size = Extent::from(fields.window.inner_size());
            let state = match fields.frame.resize_check(size) {
                Ok(state) => state,
                Err(err) => {
                    runtime_ctx.fail(anyhow::Error::new(err).context("surface update failed"));
                    return;
                }
            };

            match state {
                SurfaceState::DeviceLost => {
                    runtime_ctx.fail(anyhow::anyhow!(
                        "GPU device lost; the frame context has to be rebuilt"
                    ));
                    return;
                }
                SurfaceState::Minimized => {
                    minimized = true;
                    fields.stats.reset();
                    return;
                }
                SurfaceState::Resized => app.on_resized(window_id, fields.frame.viewport()),
                SurfaceState::Normal => {}
            }

            let time = fields.stats.tick();

            // Scope to ensure `ctx` is dropped before touching the window again.
            {
                let mut ctx = FrameCtx {
                    window: WindowCtx {
                        id: window_id,
                        window: fields.window,
                    },
                    frame: fields.frame,
                    time,
                    runtime: &mut runtime_ctx,
                };

                app_control = app.on_frame(&mut ctx);
            }

            if *fields.show_stats {
                if let Some(sample) = fields.stats.take_sample() {
                    fields.window.set_title(&format!(
                        "{}  {:.0} fps  {:.2} ms",
                        fields.title, sample.fps, sample.frame_ms
                    ));
                }
            }
        });

        if minimized {
            std::thread::sleep(MINIMIZED_SLEEP);
        }

        if app_control == AppControl::Exit {
            runtime_ctx.exit();
        }

        self.apply_commands(event_loop, runtime_ctx);
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.windows.is_empty() {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop, self.initial.clone()) {
            self.fail(e.context("failed to create initial window"));
            event_loop.exit();
            return;
        }

        for entry in self.windows.values() {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw; pacing comes from the frame synchronizer.
        for entry in self.windows.values() {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        if self.app.on_window_event(window_id, &event) == AppControl::Exit {
            self.request_exit();
            event_loop.exit();
            return;
        }

        match &event {
            WindowEvent::CloseRequested => {
                self.destroy_window_entry(window_id);
                if self.windows.is_empty() {
                    self.request_exit();
                    event_loop.exit();
                }
            }

            // Surface resources follow the size observed by `resize_check`
            // at the start of the next frame.
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.windows.get(&window_id) {
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop, window_id),

            _ => {}
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }
}
