//! Frame source abstraction.
//!
//! The sensor driver is an external collaborator. This trait is the seam it
//! plugs into; `SyntheticCamera` stands in for it in tests and in the CLI.

use super::{CaptureConfig, ChromaLayout, RawFrame};
use thiserror::Error;

/// Errors reported by a frame source.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("frame source unavailable: {0}")]
    OpenFailed(String),
    #[error("unsupported capture settings: {0}")]
    ConfigFailed(String),
    #[error("sensor delivered no frame: {0}")]
    CaptureFailed(String),
    #[error("frame source is not open")]
    NotInitialized,
}

/// Trait for frame sources delivering YUV 4:2:0 frames at the native rate.
pub trait FrameSource {
    /// Opens and initializes the source with the given configuration.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Returns the next frame.
    fn next_frame(&mut self) -> Result<RawFrame, CameraError>;

    /// Checks if the source is currently open.
    fn is_open(&self) -> bool;

    /// Closes the source and releases resources.
    fn close(&mut self);
}

/// Synthetic camera that produces a moving gradient.
#[derive(Debug, Default)]
pub struct SyntheticCamera {
    config: Option<CaptureConfig>,
    sequence: u64,
    layout: ChromaLayout,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces frames with the given chroma layout instead of I420.
    pub fn with_layout(layout: ChromaLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    /// Number of frames produced since the last `open`.
    pub fn frames_produced(&self) -> u64 {
        self.sequence
    }
}

impl FrameSource for SyntheticCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        tracing::info!(
            width = config.width,
            height = config.height,
            fps = config.native_fps,
            "SyntheticCamera opened"
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;
        let (width, height) = (config.width as usize, config.height as usize);
        let shift = self.sequence as usize;

        let y: Vec<u8> = (0..width * height)
            .map(|i| ((i % width + i / width + shift) % 256) as u8)
            .collect();

        let samples = width.div_ceil(2) * height.div_ceil(2);
        let stride = self.layout.pixel_stride();
        let len = self.layout.required_len(samples);
        let mut u = vec![128u8; len];
        let mut v = vec![128u8; len];
        for i in 0..samples {
            u[i * stride] = (96 + (i + shift) % 64) as u8;
            v[i * stride] = (160 - (i + shift) % 64) as u8;
        }

        self.sequence += 1;
        Ok(RawFrame::new(
            y,
            u,
            v,
            config.width,
            config.height,
            self.layout,
            chrono::Utc::now().timestamp_millis(),
        ))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        tracing::info!(frames = self.sequence, "SyntheticCamera closed");
    }
}
