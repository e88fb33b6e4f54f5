//! Capture and pipeline configuration.
//!
//! The file format is TOML. Everything here is fixed for the lifetime of a
//! process; per-route settings (the frame-skip factor) live in the route's
//! own `config.json` instead.

use crate::encoding::{CropPolicy, DEFAULT_JPEG_QUALITY};
use crate::metadata::DeviceInfo;
use crate::scheduler::CaptureProfile;
use crate::session::StorageThresholds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Accepted range for the fixed JPEG quality.
pub const JPEG_QUALITY_RANGE: std::ops::RangeInclusive<u8> = 60..=92;

/// Configuration for the frame source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Rate at which the sensor delivers frames.
    pub native_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            native_fps: 30,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width < 2 || self.height < 2 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.native_fps == 0 || self.native_fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("jpeg quality {0} outside 60-92")]
    InvalidQuality(u8),
    #[error("in-flight ceiling must be at least 1")]
    InvalidCeiling,
    #[error("storage floor must be below the warning threshold")]
    InvalidStorageThresholds,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageThresholds,
    #[serde(default)]
    pub device: DeviceInfo,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Encode/embed pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Selects the default in-flight ceiling.
    pub profile: CaptureProfile,
    /// Overrides the profile's in-flight ceiling.
    pub in_flight_ceiling: Option<usize>,
    /// Fixed JPEG quality.
    pub jpeg_quality: u8,
    /// Crop applied before compression.
    pub crop: CropPolicy,
    /// Threads dedicated to tag-block updates.
    pub tag_workers: usize,
    /// Queue depth of the tag-block pool.
    pub tag_queue: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            profile: CaptureProfile::SkipBased,
            in_flight_ceiling: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            crop: CropPolicy::Widescreen,
            tag_workers: 4,
            tag_queue: 64,
        }
    }
}

impl PipelineConfig {
    /// Returns the effective in-flight ceiling.
    pub fn ceiling(&self) -> usize {
        self.in_flight_ceiling
            .unwrap_or_else(|| self.profile.default_ceiling())
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !JPEG_QUALITY_RANGE.contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidQuality(self.jpeg_quality));
        }
        if self.ceiling() == 0 {
            return Err(ConfigError::InvalidCeiling);
        }
        Ok(())
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory holding one subdirectory per route.
    pub base_dir: PathBuf,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("TrailTracker"),
            metrics_port: 0,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.pipeline.validate()?;
        if self.storage.floor_bytes >= self.storage.warning_bytes {
            return Err(ConfigError::InvalidStorageThresholds);
        }
        Ok(())
    }
}
