//! Frame ingestion with bounded in-flight work.

use super::fps::{FpsEstimator, FpsReport, ThroughputMonitor};
use super::pool::{PoolError, WorkerPool};
use super::sampling::{frame_skip_description, SamplingCounter};
use crate::capture::RawFrame;
use crate::pipeline::{CapturedFrame, PipelineError};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Jobs slower than this are logged.
const SLOW_JOB: Duration = Duration::from_millis(50);
/// One overload warning per this many drops.
const OVERLOAD_LOG_EVERY: u64 = 30;

/// Turns a raw frame into a stored file.
pub trait FrameProcessor: Send + Sync {
    fn process(&self, frame: RawFrame) -> Result<CapturedFrame, PipelineError>;
}

/// Called with the frame timestamp after a frame has been stored.
pub type FrameCallback = Arc<dyn Fn(i64) + Send + Sync>;
/// Called once per window with the observed rate and whether it keeps up
/// with the expected one.
pub type FpsCallback = Arc<dyn Fn(FpsReport) + Send + Sync>;

#[derive(Clone, Default)]
pub struct CaptureCallbacks {
    pub on_frame: Option<FrameCallback>,
    pub on_fps: Option<FpsCallback>,
}

/// What happened to a frame handed to [`FrameScheduler::on_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    /// Moved into an encode job.
    Dispatched,
    /// Not selected by the skip factor.
    SamplingDrop,
    /// Selected, but the in-flight ceiling was reached.
    OverloadDrop,
    /// Capture is stopped.
    NotCapturing,
}

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub sampling_drops: u64,
    pub overload_drops: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: usize,
    pub last_fps: f32,
    /// False while the last window fell below the healthy ratio.
    pub fps_healthy: bool,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    sampling_drops: AtomicU64,
    overload_drops: AtomicU64,
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    last_fps: AtomicU32,
    fps_degraded: AtomicBool,
}

struct ActiveCapture {
    processor: Arc<dyn FrameProcessor>,
    callbacks: CaptureCallbacks,
    monitor: Mutex<ThroughputMonitor>,
}

struct Shared {
    capturing: AtomicBool,
    active: RwLock<Option<Arc<ActiveCapture>>>,
    sampling: SamplingCounter,
    in_flight: AtomicUsize,
    ceiling: usize,
    native_fps: u32,
    fps: FpsEstimator,
    counters: Counters,
}

impl Shared {
    fn stop(&self) {
        let was_capturing = self.capturing.swap(false, Ordering::AcqRel);
        // dropping the active capture releases its callbacks
        self.active.write().take();
        if was_capturing {
            tracing::info!(
                in_flight = self.in_flight.load(Ordering::Acquire),
                "Capture stopped"
            );
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight.load(Ordering::Acquire) > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }
}

/// Releases one in-flight slot when dropped.
struct InFlightGuard {
    shared: Arc<Shared>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Handle that stops capture from anywhere, including a frame callback.
#[derive(Clone)]
pub struct CaptureSwitch {
    shared: Arc<Shared>,
}

impl CaptureSwitch {
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.capturing.load(Ordering::Acquire)
    }

    /// Waits until no frame is in flight. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.wait_idle(timeout)
    }
}

impl std::fmt::Debug for CaptureSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSwitch")
            .field("capturing", &self.is_capturing())
            .finish()
    }
}

/// Decides, for every native-rate frame, whether it is kept, and bounds
/// the number of frames concurrently encoding or writing.
///
/// [`FrameScheduler::on_frame`] never blocks. Kept frames run on a pool
/// with one thread per in-flight slot.
pub struct FrameScheduler {
    shared: Arc<Shared>,
    pool: WorkerPool,
}

impl FrameScheduler {
    pub fn new(ceiling: usize, native_fps: u32) -> Result<Self, PoolError> {
        let ceiling = ceiling.max(1);
        let pool = WorkerPool::new("encode", ceiling, ceiling)?;
        Ok(Self {
            shared: Arc::new(Shared {
                capturing: AtomicBool::new(false),
                active: RwLock::new(None),
                sampling: SamplingCounter::default(),
                in_flight: AtomicUsize::new(0),
                ceiling,
                native_fps: native_fps.max(1),
                fps: FpsEstimator::new(),
                counters: Counters::default(),
            }),
            pool,
        })
    }

    /// Sets the window the observed frame rate is measured over.
    ///
    /// Only takes effect before capture starts or a switch is handed out.
    pub fn with_fps_window(mut self, window: Duration) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.fps = FpsEstimator::with_window(window);
        }
        self
    }

    /// Starts sampling with the given skip factor.
    ///
    /// Replaces any previous processor and callbacks.
    pub fn start(
        &self,
        processor: Arc<dyn FrameProcessor>,
        skip: u32,
        callbacks: CaptureCallbacks,
    ) -> CaptureSwitch {
        let skip = skip.max(1);
        self.shared.sampling.reset(skip);
        self.shared.fps.reset();
        self.shared.counters.fps_degraded.store(false, Ordering::Relaxed);
        *self.shared.active.write() = Some(Arc::new(ActiveCapture {
            processor,
            callbacks,
            monitor: Mutex::new(ThroughputMonitor::new(self.shared.native_fps, skip)),
        }));
        self.shared.capturing.store(true, Ordering::Release);

        tracing::info!(
            skip,
            expected_fps = self.expected_fps(),
            ceiling = self.shared.ceiling,
            "Capture started"
        );
        self.switch()
    }

    /// Stops accepting frames. Dispatched jobs still finish.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn switch(&self) -> CaptureSwitch {
        CaptureSwitch {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.capturing.load(Ordering::Acquire)
    }

    /// Handles one frame from the sensor. Frames not dispatched are released
    /// before this returns.
    pub fn on_frame(&self, frame: RawFrame) -> FrameDecision {
        let shared = &self.shared;
        if !shared.capturing.load(Ordering::Acquire) {
            return FrameDecision::NotCapturing;
        }
        let Some(active) = shared.active.read().clone() else {
            return FrameDecision::NotCapturing;
        };

        shared.counters.ticks.fetch_add(1, Ordering::Relaxed);
        if !shared.sampling.admit() {
            shared.counters.sampling_drops.fetch_add(1, Ordering::Relaxed);
            return FrameDecision::SamplingDrop;
        }

        let reserved = shared
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < shared.ceiling).then_some(n + 1)
            });
        let in_flight = match reserved {
            Ok(previous) => previous + 1,
            Err(current) => {
                self.record_overload(current);
                return FrameDecision::OverloadDrop;
            }
        };
        if in_flight * 2 > shared.ceiling {
            tracing::debug!(in_flight, ceiling = shared.ceiling, "High processing queue");
        }

        let guard = InFlightGuard {
            shared: Arc::clone(shared),
        };
        let job_shared = Arc::clone(shared);
        match self
            .pool
            .try_execute(move || run_job(&job_shared, &active, frame, guard))
        {
            Ok(()) => {
                shared.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                FrameDecision::Dispatched
            }
            Err(e) => {
                tracing::debug!(error = %e, "Encode job rejected");
                self.record_overload(shared.in_flight.load(Ordering::Acquire));
                FrameDecision::OverloadDrop
            }
        }
    }

    fn record_overload(&self, in_flight: usize) {
        let drops = self
            .shared
            .counters
            .overload_drops
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        if drops % OVERLOAD_LOG_EVERY == 1 {
            tracing::warn!(in_flight, drops, "Dropping frame, processing queue backed up");
        }
    }

    /// Waits until no frame is in flight. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.wait_idle(timeout)
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn ceiling(&self) -> usize {
        self.shared.ceiling
    }

    pub fn native_fps(&self) -> u32 {
        self.shared.native_fps
    }

    pub fn skip(&self) -> u32 {
        self.shared.sampling.skip()
    }

    /// `native_fps / skip`.
    pub fn expected_fps(&self) -> f32 {
        self.shared.native_fps as f32 / self.skip() as f32
    }

    pub fn frame_skip_description(&self) -> String {
        frame_skip_description(self.skip())
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.shared.counters;
        SchedulerStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            sampling_drops: c.sampling_drops.load(Ordering::Relaxed),
            overload_drops: c.overload_drops.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
            last_fps: f32::from_bits(c.last_fps.load(Ordering::Relaxed)),
            fps_healthy: !c.fps_degraded.load(Ordering::Relaxed),
        }
    }

    /// Stops capture and cancels the encode pool. Queued jobs are dropped
    /// and give back their slots; running jobs finish.
    pub fn shutdown(&self) {
        self.shared.stop();
        self.pool.shutdown();
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(shared: &Shared, active: &ActiveCapture, frame: RawFrame, _slot: InFlightGuard) {
    let started = Instant::now();
    let timestamp = frame.timestamp_ms();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| active.processor.process(frame)));

    let elapsed = started.elapsed();
    if elapsed > SLOW_JOB {
        tracing::warn!(
            timestamp,
            elapsed_ms = elapsed.as_millis() as u64,
            "Slow save"
        );
    }

    match outcome {
        Ok(Ok(saved)) => {
            shared.counters.completed.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                timestamp,
                bytes = saved.bytes,
                elapsed_us = elapsed.as_micros() as u64,
                "Frame stored"
            );

            if let Some(fps) = shared.fps.record() {
                shared
                    .counters
                    .last_fps
                    .store(fps.to_bits(), Ordering::Relaxed);
                let report = active.monitor.lock().observe(fps);
                shared
                    .counters
                    .fps_degraded
                    .store(!report.healthy, Ordering::Relaxed);
                tracing::debug!(
                    fps = format_args!("{fps:.1}"),
                    expected = format_args!("{:.1}", report.expected),
                    healthy = report.healthy,
                    skip = shared.sampling.skip(),
                    "Frame rate"
                );
                if let Some(on_fps) = &active.callbacks.on_fps {
                    on_fps(report);
                }
            }

            if let Some(on_frame) = &active.callbacks.on_frame {
                on_frame(saved.timestamp_ms);
            }
        }
        Ok(Err(e)) => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(timestamp, error = %e, "Frame discarded");
        }
        Err(_) => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(timestamp, "Frame processor panicked");
        }
    }
}
