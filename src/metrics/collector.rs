//! Metrics collection and registry.

use crate::pipeline::CapturePipeline;
use crate::scheduler::FrameScheduler;
use crate::session::SessionManager;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of system state for metrics update.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Name of the open route.
    pub route: Option<String>,
    /// Whether a route is currently recording.
    pub recording: bool,
    /// Frames stored in the open route.
    pub route_frames: u64,
    /// Estimated duration of the open route.
    pub route_duration_ms: i64,
    /// Native-rate frames seen while capturing.
    pub ticks: u64,
    /// Frames not selected by the skip factor.
    pub sampling_drops: u64,
    /// Frames dropped at the in-flight ceiling.
    pub overload_drops: u64,
    /// Frames handed to the encode pool.
    pub dispatched: u64,
    /// Frames stored.
    pub completed: u64,
    /// Frames discarded after dispatch.
    pub failed: u64,
    /// Frames currently encoding or writing.
    pub in_flight: usize,
    /// In-flight ceiling.
    pub ceiling: usize,
    /// Last observed frame rate.
    pub observed_fps: f32,
    /// Native rate divided by the skip factor.
    pub expected_fps: f32,
    /// Whether the last observed rate kept up with the expected one.
    pub fps_healthy: bool,
    /// Tag-block updates skipped because their queue was full.
    pub skipped_tag_updates: u64,
    /// Free bytes on the recording volume, if known.
    pub storage_available_bytes: Option<u64>,
}

/// Prometheus metrics registry for the capture pipeline.
pub struct MetricsRegistry {
    registry: Registry,

    // Route metrics
    recording: IntGauge,
    route_frames: IntGauge,
    route_duration_seconds: Gauge,

    // Scheduler metrics
    ticks_total: IntCounter,
    sampling_drops_total: IntCounter,
    overload_drops_total: IntCounter,
    dispatched_total: IntCounter,
    completed_total: IntCounter,
    failed_total: IntCounter,
    in_flight: IntGauge,
    ceiling: IntGauge,
    observed_fps: Gauge,
    expected_fps: Gauge,
    fps_healthy: IntGauge,

    // Storage metrics
    skipped_tag_updates_total: IntCounter,
    storage_available_bytes: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new registry with all pipeline metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let recording = IntGauge::new(
            "trailcap_recording",
            "Whether a route is recording (1=recording, 0=paused)",
        )?;
        let route_frames = IntGauge::new(
            "trailcap_route_frames",
            "Frames stored in the open route",
        )?;
        let route_duration_seconds = Gauge::new(
            "trailcap_route_duration_seconds",
            "Estimated duration of the open route",
        )?;

        let ticks_total = IntCounter::new(
            "trailcap_frames_seen_total",
            "Native-rate frames seen while capturing",
        )?;
        let sampling_drops_total = IntCounter::new(
            "trailcap_frames_skipped_total",
            "Frames not selected by the frame-skip factor",
        )?;
        let overload_drops_total = IntCounter::new(
            "trailcap_frames_dropped_total",
            "Frames dropped because the in-flight ceiling was reached",
        )?;
        let dispatched_total = IntCounter::new(
            "trailcap_frames_dispatched_total",
            "Frames handed to the encode pool",
        )?;
        let completed_total = IntCounter::new(
            "trailcap_frames_stored_total",
            "Frames encoded and written",
        )?;
        let failed_total = IntCounter::new(
            "trailcap_frames_failed_total",
            "Frames discarded after dispatch",
        )?;
        let in_flight = IntGauge::new(
            "trailcap_frames_in_flight",
            "Frames currently being encoded or written",
        )?;
        let ceiling = IntGauge::new(
            "trailcap_in_flight_ceiling",
            "Maximum frames in flight",
        )?;
        let observed_fps = Gauge::new(
            "trailcap_observed_fps",
            "Stored frames per second over the last window",
        )?;
        let expected_fps = Gauge::new(
            "trailcap_expected_fps",
            "Native frame rate divided by the frame-skip factor",
        )?;
        let fps_healthy = IntGauge::new(
            "trailcap_fps_healthy",
            "Whether throughput is at least 83% of the expected rate (1=healthy)",
        )?;

        let skipped_tag_updates_total = IntCounter::new(
            "trailcap_tag_updates_skipped_total",
            "Tag-block updates skipped because their queue was full",
        )?;
        let storage_available_bytes = IntGauge::new(
            "trailcap_storage_available_bytes",
            "Free bytes on the recording volume",
        )?;

        registry.register(Box::new(recording.clone()))?;
        registry.register(Box::new(route_frames.clone()))?;
        registry.register(Box::new(route_duration_seconds.clone()))?;
        registry.register(Box::new(ticks_total.clone()))?;
        registry.register(Box::new(sampling_drops_total.clone()))?;
        registry.register(Box::new(overload_drops_total.clone()))?;
        registry.register(Box::new(dispatched_total.clone()))?;
        registry.register(Box::new(completed_total.clone()))?;
        registry.register(Box::new(failed_total.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(ceiling.clone()))?;
        registry.register(Box::new(observed_fps.clone()))?;
        registry.register(Box::new(expected_fps.clone()))?;
        registry.register(Box::new(fps_healthy.clone()))?;
        registry.register(Box::new(skipped_tag_updates_total.clone()))?;
        registry.register(Box::new(storage_available_bytes.clone()))?;

        Ok(Self {
            registry,
            recording,
            route_frames,
            route_duration_seconds,
            ticks_total,
            sampling_drops_total,
            overload_drops_total,
            dispatched_total,
            completed_total,
            failed_total,
            in_flight,
            ceiling,
            observed_fps,
            expected_fps,
            fps_healthy,
            skipped_tag_updates_total,
            storage_available_bytes,
        })
    }

    /// Updates all metrics from a snapshot of system state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.recording.set(i64::from(snapshot.recording));
        self.route_frames.set(snapshot.route_frames as i64);
        self.route_duration_seconds
            .set(snapshot.route_duration_ms as f64 / 1000.0);

        advance(&self.ticks_total, snapshot.ticks);
        advance(&self.sampling_drops_total, snapshot.sampling_drops);
        advance(&self.overload_drops_total, snapshot.overload_drops);
        advance(&self.dispatched_total, snapshot.dispatched);
        advance(&self.completed_total, snapshot.completed);
        advance(&self.failed_total, snapshot.failed);
        self.in_flight.set(snapshot.in_flight as i64);
        self.ceiling.set(snapshot.ceiling as i64);
        self.observed_fps.set(f64::from(snapshot.observed_fps));
        self.expected_fps.set(f64::from(snapshot.expected_fps));
        self.fps_healthy.set(i64::from(snapshot.fps_healthy));

        advance(&self.skipped_tag_updates_total, snapshot.skipped_tag_updates);
        // only update if known
        if let Some(bytes) = snapshot.storage_available_bytes {
            self.storage_available_bytes.set(bytes as i64);
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Counters only move forward: increment by the difference.
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from the live capture components.
    pub fn from_components(
        scheduler: &FrameScheduler,
        session: &SessionManager,
        pipeline: Option<&CapturePipeline>,
    ) -> Self {
        let stats = scheduler.stats();
        let route = session.state();

        Self {
            recording: route.as_ref().is_some_and(|r| r.is_recording),
            route: route.as_ref().map(|r| r.route_name.clone()),
            route_frames: route.as_ref().map_or(0, |r| r.frame_count),
            route_duration_ms: route.as_ref().map_or(0, |r| r.duration_ms),
            ticks: stats.ticks,
            sampling_drops: stats.sampling_drops,
            overload_drops: stats.overload_drops,
            dispatched: stats.dispatched,
            completed: stats.completed,
            failed: stats.failed,
            in_flight: stats.in_flight,
            ceiling: scheduler.ceiling(),
            observed_fps: stats.last_fps,
            expected_fps: scheduler.expected_fps(),
            fps_healthy: stats.fps_healthy,
            skipped_tag_updates: pipeline.map_or(0, |p| p.skipped_tag_updates()),
            storage_available_bytes: session.available_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{StaticStorageProbe, StorageThresholds, GIB};
    use std::sync::Arc;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            route: Some("ridge".to_string()),
            recording: true,
            route_frames: 120,
            route_duration_ms: 4_000,
            ticks: 240,
            sampling_drops: 120,
            overload_drops: 3,
            dispatched: 117,
            completed: 115,
            failed: 2,
            in_flight: 0,
            ceiling: 6,
            observed_fps: 14.5,
            expected_fps: 15.0,
            fps_healthy: false,
            skipped_tag_updates: 0,
            storage_available_bytes: Some(50 * GIB),
        };

        registry.update(&snapshot);
        // counters never move backwards
        registry.update(&MetricsSnapshot {
            completed: 10,
            ..snapshot.clone()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("trailcap_recording 1"));
        assert!(output.contains("trailcap_route_frames 120"));
        assert!(output.contains("trailcap_frames_stored_total 115"));
        assert!(output.contains("trailcap_frames_dropped_total 3"));
        assert!(output.contains("trailcap_in_flight_ceiling 6"));
        assert!(output.contains("trailcap_fps_healthy 0"));
    }

    #[test]
    fn test_snapshot_from_components() {
        let base = tempfile::tempdir().unwrap();
        let session = SessionManager::new(
            base.path(),
            Arc::new(StaticStorageProbe::new(3 * GIB)),
            StorageThresholds::default(),
        )
        .unwrap();
        session.open("A", 2).unwrap();
        let scheduler = FrameScheduler::new(6, 30).unwrap();

        let snapshot = MetricsSnapshot::from_components(&scheduler, &session, None);
        assert!(!snapshot.recording);
        assert_eq!(snapshot.route.as_deref(), Some("A"));
        assert_eq!(snapshot.ceiling, 6);
        assert!(snapshot.fps_healthy);
        assert_eq!(snapshot.storage_available_bytes, Some(3 * GIB));
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        assert!(output.contains("trailcap_recording"));
        assert!(output.contains("trailcap_frames_in_flight"));
        assert!(output.contains("trailcap_storage_available_bytes"));
    }
}
