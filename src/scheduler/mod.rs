//! Frame ingestion and backpressure.
//!
//! Every native-rate frame passes through [`FrameScheduler::on_frame`]:
//!
//! ```text
//! sensor → capturing? → sampling (1 of N) → in-flight < ceiling? → encode pool
//!              ↓               ↓                      ↓
//!           release         release                release
//! ```
//!
//! Dropped frames are released immediately so the sensor can reuse its
//! buffers.

mod fps;
mod frame_scheduler;
mod pool;
mod sampling;

pub use fps::{FpsEstimator, FpsReport, ThroughputMonitor, HEALTHY_RATIO};
pub use frame_scheduler::{
    CaptureCallbacks, CaptureSwitch, FpsCallback, FrameCallback, FrameDecision, FrameProcessor,
    FrameScheduler, SchedulerStats,
};
pub use pool::{PoolError, WorkerPool};
pub use sampling::{frame_skip_description, CaptureProfile, SamplingCounter};
