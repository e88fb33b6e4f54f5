//! Observed frame rate and throughput health.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Fraction of the expected rate below which throughput counts as degraded.
pub const HEALTHY_RATIO: f32 = 0.83;

#[derive(Debug)]
struct Window {
    started: Instant,
    completed: u32,
}

/// Accumulates completions over wall-clock windows.
#[derive(Debug)]
pub struct FpsEstimator {
    window: Mutex<Window>,
    length: Duration,
}

impl FpsEstimator {
    /// One-second windows.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(length: Duration) -> Self {
        Self {
            window: Mutex::new(Window {
                started: Instant::now(),
                completed: 0,
            }),
            length,
        }
    }

    /// Records one completion. Returns the rate when this completion closed
    /// the current window.
    pub fn record(&self) -> Option<f32> {
        self.record_at(Instant::now())
    }

    pub fn record_at(&self, now: Instant) -> Option<f32> {
        let mut window = self.window.lock();
        window.completed += 1;

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed < self.length {
            return None;
        }

        let elapsed_ms = elapsed.as_millis().max(1) as f32;
        let fps = window.completed as f32 * 1000.0 / elapsed_ms;
        window.completed = 0;
        window.started = now;
        Some(fps)
    }

    /// Starts a fresh window now.
    pub fn reset(&self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&self, now: Instant) {
        let mut window = self.window.lock();
        window.completed = 0;
        window.started = now;
    }
}

impl Default for FpsEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of comparing an observed rate with the expected one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsReport {
    pub observed: f32,
    /// `native_fps / skip`.
    pub expected: f32,
    pub healthy: bool,
}

/// Tracks whether the pipeline keeps up with the sampling rate.
///
/// Starts healthy; a single window under the threshold marks it degraded
/// and the next window at or above it recovers.
#[derive(Debug, Clone)]
pub struct ThroughputMonitor {
    expected: f32,
    min_ratio: f32,
    last: Option<FpsReport>,
    degraded_windows: u64,
    total_windows: u64,
}

impl ThroughputMonitor {
    pub fn new(native_fps: u32, skip: u32) -> Self {
        Self::with_ratio(native_fps, skip, HEALTHY_RATIO)
    }

    pub fn with_ratio(native_fps: u32, skip: u32, min_ratio: f32) -> Self {
        Self {
            expected: native_fps as f32 / skip.max(1) as f32,
            min_ratio,
            last: None,
            degraded_windows: 0,
            total_windows: 0,
        }
    }

    /// Classifies one observed rate.
    pub fn observe(&mut self, observed: f32) -> FpsReport {
        let report = FpsReport {
            observed,
            expected: self.expected,
            healthy: observed >= self.expected * self.min_ratio,
        };
        let was_healthy = self.last.map_or(true, |r| r.healthy);
        self.total_windows += 1;

        if report.healthy {
            if !was_healthy {
                tracing::info!(
                    observed = format_args!("{observed:.1}"),
                    expected = format_args!("{:.1}", self.expected),
                    "Frame rate recovered"
                );
            }
        } else {
            self.degraded_windows += 1;
            if was_healthy {
                tracing::warn!(
                    observed = format_args!("{observed:.1}"),
                    expected = format_args!("{:.1}", self.expected),
                    "Frame rate below expected"
                );
            }
        }

        self.last = Some(report);
        report
    }

    pub fn expected(&self) -> f32 {
        self.expected
    }

    pub fn last_report(&self) -> Option<FpsReport> {
        self.last
    }

    pub fn is_healthy(&self) -> bool {
        self.last.map_or(true, |r| r.healthy)
    }

    /// Windows observed below the threshold since creation.
    pub fn degraded_windows(&self) -> u64 {
        self.degraded_windows
    }

    pub fn total_windows(&self) -> u64 {
        self.total_windows
    }
}
