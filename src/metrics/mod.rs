//! Prometheus metrics exporter for the capture pipeline.
//!
//! # Metrics Exposed
//!
//! ## Route Metrics
//! - `trailcap_recording` - Whether a route is recording (1=recording, 0=paused)
//! - `trailcap_route_frames` - Frames stored in the open route
//! - `trailcap_route_duration_seconds` - Estimated route duration
//!
//! ## Scheduler Metrics
//! - `trailcap_frames_seen_total` - Native-rate frames seen while capturing
//! - `trailcap_frames_skipped_total` - Frames not selected by the skip factor
//! - `trailcap_frames_dropped_total` - Frames dropped at the in-flight ceiling
//! - `trailcap_frames_dispatched_total` - Frames handed to the encode pool
//! - `trailcap_frames_stored_total` - Frames encoded and written
//! - `trailcap_frames_failed_total` - Frames discarded after dispatch
//! - `trailcap_frames_in_flight` - Frames currently encoding or writing
//! - `trailcap_in_flight_ceiling` - Maximum frames in flight
//! - `trailcap_observed_fps` / `trailcap_expected_fps` - Stored vs expected rate
//! - `trailcap_fps_healthy` - 1 while throughput is at least 83% of expected
//!
//! ## Storage Metrics
//! - `trailcap_tag_updates_skipped_total` - Tag-block updates skipped
//! - `trailcap_storage_available_bytes` - Free bytes on the recording volume
//!
//! With the `metrics` feature, `MetricsServer` also serves the last
//! snapshot as JSON on `/status` and a liveness probe on `/health`.
//!
//! # Example
//!
//! ```no_run
//! use trailcap::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     recording: true,
//!     route_frames: 450,
//!     completed: 450,
//!     ceiling: 6,
//!     expected_fps: 15.0,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
