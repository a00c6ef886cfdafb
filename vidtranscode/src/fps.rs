/*!
    Encoding speed meter.
*/

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/**
    An f32 readable from any thread.
*/
#[derive(Debug, Default)]
pub struct AtomicF32 {
    inner: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn load(&self, ordering: Ordering) -> f32 {
        f32::from_bits(self.inner.load(ordering))
    }

    pub fn store(&self, value: f32, ordering: Ordering) {
        self.inner.store(value.to_bits(), ordering);
    }
}

const WINDOW: Duration = Duration::from_secs(1);

/**
    Counts encoded video frames and reports frames per second of wall time.

    The rate is refreshed once per one-second window. [`FpsCounter::finish`]
    replaces it with the average over the whole run, so short jobs that
    never fill a window still report a rate.
*/
#[derive(Debug)]
pub struct FpsCounter {
    started: Instant,
    window_start: Instant,
    window_frames: u64,
    total_frames: u64,
    fps: f32,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            started: now,
            window_start: now,
            window_frames: 0,
            total_frames: 0,
            fps: 0.0,
        }
    }

    /**
        Record `frames` frames. Returns the new rate when a window closed.
    */
    pub fn tick(&mut self, frames: u64) -> Option<f32> {
        self.tick_at(frames, Instant::now())
    }

    fn tick_at(&mut self, frames: u64, now: Instant) -> Option<f32> {
        self.window_frames += frames;
        self.total_frames += frames;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < WINDOW {
            return None;
        }
        self.fps = (self.window_frames as f64 / elapsed.as_secs_f64()) as f32;
        self.window_start = now;
        self.window_frames = 0;
        Some(self.fps)
    }

    pub fn finish(&mut self) -> f32 {
        self.finish_at(Instant::now())
    }

    fn finish_at(&mut self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        if self.total_frames > 0 && elapsed > 0.0 {
            self.fps = (self.total_frames as f64 / elapsed) as f32;
        }
        self.fps
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_updates_once_per_window() {
        let start = Instant::now();
        let mut counter = FpsCounter::starting_at(start);
        assert_eq!(counter.tick_at(10, start + Duration::from_millis(500)), None);
        assert_eq!(counter.fps(), 0.0);

        let fps = counter.tick_at(20, start + Duration::from_secs(1)).unwrap();
        assert!((fps - 30.0).abs() < 0.01);

        assert_eq!(counter.tick_at(5, start + Duration::from_millis(1500)), None);
        let fps = counter.tick_at(5, start + Duration::from_secs(2)).unwrap();
        assert!((fps - 10.0).abs() < 0.01);
        assert_eq!(counter.total_frames(), 40);
    }

    #[test]
    fn finish_reports_the_run_average() {
        let start = Instant::now();
        let mut counter = FpsCounter::starting_at(start);
        counter.tick_at(12, start + Duration::from_millis(100));
        let fps = counter.finish_at(start + Duration::from_millis(400));
        assert!((fps - 30.0).abs() < 0.01);
    }

    #[test]
    fn finish_without_frames_keeps_zero() {
        let start = Instant::now();
        let mut counter = FpsCounter::starting_at(start);
        assert_eq!(counter.finish_at(start + Duration::from_secs(3)), 0.0);
    }

    #[test]
    fn atomic_round_trips_bits() {
        let value = AtomicF32::new(1.5);
        value.store(29.97, Ordering::Relaxed);
        assert_eq!(value.load(Ordering::Relaxed), 29.97);
    }
}
