//! Frame sampling: which native-rate frames are kept.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Capture profile, selecting the default in-flight ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureProfile {
    /// Keeps one of every N frames with a generous ceiling.
    #[default]
    SkipBased,
    /// Tries to save as many frames as possible; a low ceiling keeps latency
    /// bounded.
    HighestRate,
}

impl CaptureProfile {
    /// Maximum number of frames concurrently being encoded or written.
    pub fn default_ceiling(self) -> usize {
        match self {
            CaptureProfile::SkipBased => 6,
            CaptureProfile::HighestRate => 2,
        }
    }
}

/// Counts native-rate ticks and admits one of every `skip`.
///
/// The first tick after a reset is always admitted.
#[derive(Debug)]
pub struct SamplingCounter {
    ticks: AtomicU64,
    skip: AtomicU32,
}

impl SamplingCounter {
    pub fn new(skip: u32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            skip: AtomicU32::new(skip.max(1)),
        }
    }

    /// Registers one tick and returns whether its frame is kept.
    #[inline]
    pub fn admit(&self) -> bool {
        let n = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        let skip = u64::from(self.skip.load(Ordering::Acquire));
        (n - 1) % skip == 0
    }

    /// Zeroes the tick counter and installs a new skip factor.
    pub fn reset(&self, skip: u32) {
        self.skip.store(skip.max(1), Ordering::Release);
        self.ticks.store(0, Ordering::Release);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn skip(&self) -> u32 {
        self.skip.load(Ordering::Acquire)
    }
}

impl Default for SamplingCounter {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Human-readable form of a skip factor.
pub fn frame_skip_description(skip: u32) -> String {
    match skip {
        0 | 1 => "Every frame".to_string(),
        2 => "Every 2nd frame".to_string(),
        3 => "Every 3rd frame".to_string(),
        n => format!("Every {n}th frame"),
    }
}
