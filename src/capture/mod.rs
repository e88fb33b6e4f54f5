//! Sensor input and frame handling.
//!
//! This module provides the raw frame type handed from the sensor callback
//! to the scheduler, the trait a frame source implements, and the
//! process-wide configuration file.

mod camera;
mod config;
mod frame;

pub use camera::{CameraError, FrameSource, SyntheticCamera};
pub use config::{
    CaptureConfig, ConfigError, FileConfig, OutputConfig, PipelineConfig, JPEG_QUALITY_RANGE,
};
pub use frame::{ChromaLayout, RawFrame};
