//! Frame rate measurement for the preview.

use std::sync::Mutex;
use std::time::Instant;

struct Counter {
    count: u64,
    prev_count: u64,
    start: Instant,
    prev: Instant,
    fps: f32,
    total_fps: f32,
}

impl Counter {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            prev_count: 0,
            start: now,
            prev: now,
            fps: 0.0,
            total_fps: 0.0,
        }
    }
}

/// Counts frame-available signals and derives a frame rate.
///
/// `count` is called from the producer side for every frame; `update`
/// recomputes the rates from the counts since the previous update.
pub struct FpsCounter {
    inner: Mutex<Counter>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counter::new(Instant::now())),
        }
    }

    /// Record one frame.
    pub fn count(&self) {
        self.lock().count += 1;
    }

    /// Recompute `fps` and `total_fps`.
    pub fn update(&self) {
        self.update_at(Instant::now());
    }

    fn update_at(&self, now: Instant) {
        let mut c = self.lock();
        let since_prev = now.duration_since(c.prev).as_secs_f32();
        if since_prev > 0.0 {
            c.fps = (c.count - c.prev_count) as f32 / since_prev;
            c.prev_count = c.count;
            c.prev = now;
        }
        let since_start = now.duration_since(c.start).as_secs_f32();
        if since_start > 0.0 {
            c.total_fps = c.count as f32 / since_start;
        }
    }

    /// Frame rate over the last update interval.
    pub fn fps(&self) -> f32 {
        self.lock().fps
    }

    /// Frame rate since creation or the last reset.
    pub fn total_fps(&self) -> f32 {
        self.lock().total_fps
    }

    /// Frames counted since creation or the last reset.
    pub fn frames(&self) -> u64 {
        self.lock().count
    }

    pub fn reset(&self) {
        *self.lock() = Counter::new(Instant::now());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counter> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
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
    use std::time::Duration;

    #[test]
    fn test_fps_over_interval() {
        let counter = FpsCounter::new();
        let start = counter.lock().start;
        for _ in 0..30 {
            counter.count();
        }
        counter.update_at(start + Duration::from_secs(1));
        assert!((counter.fps() - 30.0).abs() < 0.01);
        assert!((counter.total_fps() - 30.0).abs() < 0.01);

        for _ in 0..10 {
            counter.count();
        }
        counter.update_at(start + Duration::from_secs(2));
        assert!((counter.fps() - 10.0).abs() < 0.01);
        assert!((counter.total_fps() - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_reset() {
        let counter = FpsCounter::new();
        counter.count();
        counter.reset();
        assert_eq!(counter.frames(), 0);
        assert_eq!(counter.fps(), 0.0);
    }
}
