use std::time::Duration;

/// Frame counter with a smoothed frames-per-second estimate.
///
/// Deltas are supplied by the caller (the render loop scheduler measures
/// them), so the same type serves native, wasm and headless loops.
pub struct FrameTiming {
    /// Frames recorded so far
    frames: u64,
    /// Smoothed FPS using exponential moving average
    smoothed_fps: f32,
    /// Smoothing factor (lower = smoother, 0.0-1.0)
    smoothing: f32,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTiming {
    /// Create a frame timer with no recorded frames.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: 0,
            smoothed_fps: 60.0, // Start with reasonable default
            smoothing: 0.05,    // 5% new value, 95% old value
        }
    }

    /// Record one drawn frame that took `elapsed` since the previous one.
    pub fn record(&mut self, elapsed: Duration) {
        self.frames += 1;
        let frame_time = elapsed.as_secs_f32();
        if frame_time > 0.0 {
            let instant_fps = 1.0 / frame_time;
            self.smoothed_fps = self.smoothed_fps * (1.0 - self.smoothing)
                + instant_fps * self.smoothing;
        }
    }

    /// Get the current FPS (smoothed).
    #[must_use]
    pub fn fps(&self) -> f32 {
        self.smoothed_fps
    }

    /// Number of frames recorded.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_toward_steady_rate() {
        let mut timing = FrameTiming::new();
        for _ in 0..400 {
            timing.record(Duration::from_millis(20));
        }
        assert_eq!(timing.frames(), 400);
        assert!((timing.fps() - 50.0).abs() < 0.5);
    }

    #[test]
    fn zero_delta_counts_frame_but_keeps_estimate() {
        let mut timing = FrameTiming::new();
        timing.record(Duration::ZERO);
        assert_eq!(timing.frames(), 1);
        assert_eq!(timing.fps(), 60.0);
    }
}
