//! Trail Capture Library
//!
//! Records a live camera stream as a sequence of geotagged JPEG stills.
//! Frames arrive at the sensor's native rate; a subsampled subset is
//! compressed, stamped with the latest positioning, heading and weather
//! data, and stored in a resumable route directory.
//!
//! # Architecture
//!
//! ```text
//! sensor ──→ scheduler ──→ encoding ──→ metadata ──→ file ──→ tag pool
//!               │                          ↑                    │
//!               │                       sensors                 │
//!               └────────── session (frame count, storage) ←────┘
//! ```
//!
//! # Design Principles
//!
//! - **Never block the sensor**: frames that cannot be handled right away
//!   are released immediately
//! - **Bounded work**: at most `ceiling` frames are in flight at once
//! - **Metadata never costs a frame**: embedding failures leave the image
//!   without metadata rather than discarding it
//! - **Resumable routes**: frame counts are recovered from disk on reopen
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trailcap::{
//!     capture::{CaptureConfig, FrameSource, PipelineConfig, SyntheticCamera},
//!     metadata::MetadataEmbedder,
//!     pipeline::CapturePipeline,
//!     scheduler::FrameScheduler,
//!     sensors::SensorHub,
//!     session::{DiskStorageProbe, SessionManager, StorageThresholds},
//! };
//!
//! let session = SessionManager::new(
//!     "TrailTracker",
//!     Arc::new(DiskStorageProbe),
//!     StorageThresholds::default(),
//! )
//! .unwrap();
//! session.open("morning-loop", 2).unwrap();
//!
//! let sensors = Arc::new(SensorHub::new());
//! let pipeline = Arc::new(
//!     CapturePipeline::new(
//!         session.route_dir("morning-loop").unwrap(),
//!         &PipelineConfig::default(),
//!         MetadataEmbedder::default(),
//!         sensors,
//!     )
//!     .unwrap(),
//! );
//! let scheduler = FrameScheduler::new(6, 30).unwrap();
//! session.start_capture(&scheduler, pipeline, None).unwrap();
//!
//! let mut camera = SyntheticCamera::new();
//! camera.open(&CaptureConfig::default()).unwrap();
//! for _ in 0..30 {
//!     scheduler.on_frame(camera.next_frame().unwrap());
//! }
//!
//! session.close();
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod encoding;
pub mod metadata;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod sensors;
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{CaptureConfig, FileConfig, FrameSource, RawFrame, SyntheticCamera};
pub use encoding::{CropPolicy, FrameEncoder};
pub use metadata::{DeviceInfo, FrameStamp, MetadataEmbedder};
pub use pipeline::{CapturePipeline, CapturedFrame};
pub use scheduler::{CaptureProfile, FrameDecision, FrameScheduler};
pub use sensors::{PositioningSample, SensorHub, SensorSnapshot, WeatherSnapshot};
pub use session::{SessionConfig, SessionManager};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
