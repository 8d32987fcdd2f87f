use std::fmt;

/// Result of the once-per-tick surface check.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum SurfaceState {
    /// Steady-state presentation.
    #[default]
    Normal,
    /// The window has no area. Skip drawing and yield the CPU.
    Minimized,
    /// Back buffers and attachments were just recreated. Reported once.
    Resized,
    /// The device was removed or reset. Terminal: the whole context has to be rebuilt.
    DeviceLost,
}

impl SurfaceState {
    /// Returns `true` when a frame may be recorded this tick.
    pub fn can_render(self) -> bool {
        matches!(self, SurfaceState::Normal | SurfaceState::Resized)
    }
}

impl fmt::Display for SurfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SurfaceState::Normal => "normal",
            SurfaceState::Minimized => "minimized",
            SurfaceState::Resized => "resized",
            SurfaceState::DeviceLost => "device lost",
        };
        f.write_str(name)
    }
}
