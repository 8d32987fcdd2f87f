use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous tick, in seconds. Clamped.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_number: u64,
}

/// Averages over one measurement window.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StatsSample {
    pub fps: f32,
    /// Mean CPU frame time in milliseconds.
    pub frame_ms: f32,
}

/// Per-window frame timing and throughput.
///
/// Delta time is clamped so that a stall (debugger, minimized window, resize
/// drain) does not produce a pathological `dt`. Throughput is measured from
/// unclamped intervals.
#[derive(Debug, Clone)]
pub struct FrameStats {
    last: Instant,
    frame_number: u64,
    dt_min: Duration,
    dt_max: Duration,

    window: Duration,
    window_start: Instant,
    window_frames: u32,
    window_busy: Duration,
    latest: Option<StatsSample>,
    pending: bool,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now(), Duration::from_secs(1))
    }

    /// Creates stats measuring over `window` with `start` as the baseline.
    pub fn starting_at(start: Instant, window: Duration) -> Self {
        debug_assert!(!window.is_zero());
        Self {
            last: start,
            frame_number: 0,
            dt_min: Duration::from_micros(100),
            dt_max: Duration::from_millis(250),
            window,
            window_start: start,
            window_frames: 0,
            window_busy: Duration::ZERO,
            latest: None,
            pending: false,
        }
    }

    /// Restarts the baseline, e.g. after the window was minimized.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.last = now;
        self.window_start = now;
        self.window_frames = 0;
        self.window_busy = Duration::ZERO;
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// Advances to `now`.
    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let elapsed = now.saturating_duration_since(self.last);
        let dt = elapsed.clamp(self.dt_min, self.dt_max);
        self.last = now;

        self.window_frames += 1;
        self.window_busy += elapsed;
        let span = now.saturating_duration_since(self.window_start);
        if span >= self.window {
            let frames = self.window_frames as f32;
            self.latest = Some(StatsSample {
                fps: frames / span.as_secs_f32(),
                frame_ms: self.window_busy.as_secs_f32() * 1000.0 / frames,
            });
            self.pending = true;
            self.window_start = now;
            self.window_frames = 0;
            self.window_busy = Duration::ZERO;
        }

        let time = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_number: self.frame_number,
        };
        self.frame_number = self.frame_number.wrapping_add(1);
        time
    }

    /// Most recent completed window.
    pub fn latest(&self) -> Option<StatsSample> {
        self.latest
    }

    /// Returns a sample once per completed window.
    pub fn take_sample(&mut self) -> Option<StatsSample> {
        if std::mem::take(&mut self.pending) {
            self.latest
        } else {
            None
        }
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_is_clamped() {
        let start = Instant::now();
        let mut stats = FrameStats::starting_at(start, Duration::from_secs(1));

        let t = stats.tick_at(start + Duration::from_secs(3));
        assert!((t.dt - 0.25).abs() < 1e-6);

        let t = stats.tick_at(start + Duration::from_secs(3));
        assert!((t.dt - 0.0001).abs() < 1e-6);
        assert_eq!(t.frame_number, 1);
    }

    #[test]
    fn reports_one_sample_per_window() {
        let start = Instant::now();
        let mut stats = FrameStats::starting_at(start, Duration::from_secs(1));

        for i in 1..=59 {
            stats.tick_at(start + Duration::from_millis(i * 1000 / 60));
            assert_eq!(stats.take_sample(), None);
        }
        stats.tick_at(start + Duration::from_secs(1));

        let sample = stats.take_sample().unwrap();
        assert!((sample.fps - 60.0).abs() < 0.01, "{sample:?}");
        assert!((sample.frame_ms - 16.667).abs() < 0.01, "{sample:?}");
        assert_eq!(stats.take_sample(), None);
        assert_eq!(stats.latest(), Some(sample));
    }
}
