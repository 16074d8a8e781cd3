/// Counts frames over a fixed window and derives frames per second.
///
/// Shared by the signal sampler and the theme-transition profiler, which each
/// keep their own meter and therefore their own history.
#[derive(Debug, Clone)]
pub struct FrameRateMeter {
    window_ms: f64,
    window_start_ms: Option<f64>,
    frames: u32,
    fps: f32,
}

impl FrameRateMeter {
    /// Creates a meter reporting the optimistic 60 fps until its first window
    /// closes.
    pub fn new(window_ms: f64) -> Self {
        Self {
            window_ms,
            window_start_ms: None,
            frames: 0,
            fps: 60.0,
        }
    }

    /// Latest completed measurement.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Opens a fresh window at `now_ms`, discarding any partial count.
    pub fn restart(&mut self, now_ms: f64) {
        self.window_start_ms = Some(now_ms);
        self.frames = 0;
    }

    /// Records one frame. Returns the new fps when the frame closes a window.
    pub fn record_frame(&mut self, now_ms: f64) -> Option<f32> {
        let start = match self.window_start_ms {
            Some(start) => start,
            None => {
                self.restart(now_ms);
                return None;
            }
        };

        self.frames += 1;
        let elapsed = now_ms - start;
        if elapsed < self.window_ms || elapsed <= 0.0 {
            return None;
        }

        self.fps = (f64::from(self.frames) * 1_000.0 / elapsed) as f32;
        self.frames = 0;
        self.window_start_ms = Some(now_ms);
        Some(self.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(meter: &mut FrameRateMeter, frame_ms: f64, frames: usize, start: f64) -> Vec<f32> {
        (1..=frames)
            .filter_map(|i| meter.record_frame(start + frame_ms * i as f64))
            .collect()
    }

    #[test]
    fn reports_sixty_before_first_window() {
        let meter = FrameRateMeter::new(1_000.0);
        assert_eq!(meter.fps(), 60.0);
    }

    #[test]
    fn measures_steady_rate() {
        let mut meter = FrameRateMeter::new(1_000.0);
        meter.restart(0.0);

        let readings = drive(&mut meter, 20.0, 50, 0.0);
        assert_eq!(readings.len(), 1);
        assert!((readings[0] - 50.0).abs() < 0.01);
    }

    #[test]
    fn first_frame_without_restart_opens_window() {
        let mut meter = FrameRateMeter::new(100.0);
        assert_eq!(meter.record_frame(5.0), None);

        let readings = drive(&mut meter, 25.0, 4, 5.0);
        assert_eq!(readings, vec![40.0]);
    }
}
