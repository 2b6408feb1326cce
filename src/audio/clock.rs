// Clock sources for trigger scheduling
// The audio callback is the only ground truth for "now"

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic, high-resolution time reference in seconds.
///
/// Schedulers never read wall-clock time directly; everything is placed
/// against a `ClockSource` so tests can substitute a manually advanced
/// clock for the audio-driven one.
pub trait ClockSource: Send + Sync {
    /// Current time in seconds. Monotonically non-decreasing.
    fn now(&self) -> f64;
}

/// Sample-counter clock advanced by the audio callback.
///
/// Thread-safe via atomics: the callback advances, any thread reads.
#[derive(Clone)]
pub struct SampleClock {
    sample_position: Arc<AtomicU64>,
    sample_rate: f64,
}

impl SampleClock {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Current sample position (read from any thread)
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Relaxed)
    }

    /// Advance by one buffer worth of frames (called from the audio callback)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Convert a duration in seconds to whole samples
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds * self.sample_rate) as u64
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl ClockSource for SampleClock {
    fn now(&self) -> f64 {
        self.current_sample() as f64 / self.sample_rate
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Stores microseconds in an atomic so `advance` is a single fetch_add.
#[derive(Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `seconds`
    pub fn advance(&self, seconds: f64) {
        assert!(seconds >= 0.0, "clock cannot move backwards");
        self.micros
            .fetch_add((seconds * 1_000_000.0).round() as u64, Ordering::Relaxed);
    }

    /// Jump to an absolute time in seconds (must not move backwards)
    pub fn set(&self, seconds: f64) {
        let target = (seconds * 1_000_000.0).round() as u64;
        let prev = self.micros.swap(target, Ordering::Relaxed);
        assert!(target >= prev, "clock cannot move backwards");
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        self.micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_clock_advance() {
        let clock = SampleClock::new(48000.0);
        assert_eq!(clock.current_sample(), 0);
        assert_eq!(clock.now(), 0.0);

        clock.advance(480);
        assert_eq!(clock.current_sample(), 480);
        // 480 samples at 48kHz = 10ms
        assert!((clock.now() - 0.010).abs() < 1e-9);

        clock.advance(480);
        assert_eq!(clock.current_sample(), 960);
    }

    #[test]
    fn test_sample_clock_shared_between_clones() {
        let clock = SampleClock::new(48000.0);
        let reader = clock.clone();

        clock.advance(48000);
        assert_eq!(reader.current_sample(), 48000);
        assert!((reader.now() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_seconds_to_samples() {
        let clock = SampleClock::new(48000.0);
        assert_eq!(clock.seconds_to_samples(1.0), 48000);
        assert_eq!(clock.seconds_to_samples(0.010), 480);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);

        clock.advance(0.5);
        assert!((clock.now() - 0.5).abs() < 1e-6);

        clock.advance(0.25);
        assert!((clock.now() - 0.75).abs() < 1e-6);

        clock.set(2.0);
        assert!((clock.now() - 2.0).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "clock cannot move backwards")]
    fn test_manual_clock_rejects_backwards_jump() {
        let clock = ManualClock::new();
        clock.advance(1.0);
        clock.set(0.5);
    }
}
