//! Per-stream frame-rate bookkeeping

use std::time::{Duration, Instant};

use crate::capture::StreamKind;

const WINDOW: Duration = Duration::from_secs(1);

/// Average frame rate over windows of at least one second.
#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
    average: f64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a frame seen at `at`; returns the current average.
    pub fn record(&mut self, at: Instant) -> f64 {
        let start = *self.window_start.get_or_insert(at);
        self.frames += 1;

        let elapsed = at.saturating_duration_since(start);
        if elapsed >= WINDOW {
            self.average = f64::from(self.frames - 1) / elapsed.as_secs_f64();
            self.window_start = Some(at);
            self.frames = 1;
        }
        self.average
    }

    /// Last completed window's average; zero until a full window elapsed.
    pub fn average(&self) -> f64 {
        self.average
    }
}

/// Frame-rate counters for every stream the device can deliver.
#[derive(Debug, Clone, Default)]
pub struct StreamRates {
    color: FpsCounter,
    depth: FpsCounter,
    infrared: FpsCounter,
}

impl StreamRates {
    pub fn record(&mut self, stream: StreamKind, at: Instant) -> f64 {
        let fps = self.counter_mut(stream).record(at);
        metrics::gauge!("stream_fps", "stream" => stream.as_str()).set(fps);
        fps
    }

    pub fn average(&self, stream: StreamKind) -> f64 {
        match stream {
            StreamKind::Color => self.color.average(),
            StreamKind::Depth => self.depth.average(),
            StreamKind::Infrared => self.infrared.average(),
        }
    }

    fn counter_mut(&mut self, stream: StreamKind) -> &mut FpsCounter {
        match stream {
            StreamKind::Color => &mut self.color,
            StreamKind::Depth => &mut self.depth,
            StreamKind::Infrared => &mut self.infrared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_frames_per_second() {
        let start = Instant::now();
        let mut fps = FpsCounter::new();
        let step = Duration::from_millis(50);

        let mut last = 0.0;
        for i in 0..=20 {
            last = fps.record(start + step * i);
        }
        assert!((last - 20.0).abs() < 0.01, "got {last}");
    }

    #[test]
    fn average_is_zero_before_first_window() {
        let start = Instant::now();
        let mut fps = FpsCounter::new();
        fps.record(start);
        fps.record(start + Duration::from_millis(100));
        assert_eq!(fps.average(), 0.0);
    }

    #[test]
    fn streams_are_tracked_independently() {
        let start = Instant::now();
        let mut rates = StreamRates::default();
        for i in 0..=10u32 {
            rates.record(StreamKind::Color, start + Duration::from_millis(100) * i);
        }
        assert!(rates.average(StreamKind::Color) > 9.9);
        assert_eq!(rates.average(StreamKind::Depth), 0.0);
    }
}
