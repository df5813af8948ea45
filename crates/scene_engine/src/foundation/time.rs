//! Frame timing utilities

use std::time::{Duration, Instant};

/// Frame timer that produces the `dt` fed to scene steps
///
/// Large hitches (debugger pauses, window drags) are clamped to
/// `max_delta` so a single step never integrates an absurd interval.
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f64,
    frame_count: u64,
    max_delta: f32,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer with a quarter-second clamp
    pub fn new() -> Self {
        Self::with_max_delta(0.25)
    }

    /// Create a timer with a custom clamp for per-frame deltas
    pub fn with_max_delta(max_delta: f32) -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
            max_delta,
        }
    }

    /// Advance the timer and return the clamped delta in seconds
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.advance(elapsed)
    }

    /// Advance by an explicit interval (fixed-step loops, tests)
    pub fn advance(&mut self, seconds: f32) -> f32 {
        self.delta_time = seconds.clamp(0.0, self.max_delta);
        self.total_time += f64::from(self.delta_time);
        self.frame_count += 1;
        self.delta_time
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total simulated time
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Simple stopwatch for measuring elapsed wall time
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Create a stopwatch that starts immediately
    pub fn start_new() -> Self {
        Self { started: Instant::now() }
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Get the elapsed time in milliseconds
    pub fn elapsed_millis(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_clamps_large_deltas() {
        let mut timer = Timer::with_max_delta(0.1);
        assert_eq!(timer.advance(0.05), 0.05);
        assert_eq!(timer.advance(3.0), 0.1);
        assert_eq!(timer.frame_count(), 2);
        assert!((timer.total_time() - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_negative_delta_is_zeroed() {
        let mut timer = Timer::new();
        assert_eq!(timer.advance(-1.0), 0.0);
    }
}
