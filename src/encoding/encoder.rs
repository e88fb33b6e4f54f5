//! YUV 4:2:0 to JPEG conversion.

use crate::capture::{ChromaLayout, RawFrame};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JPEG quality used unless the deployment profile selects another one.
///
/// 85 keeps a 1080p trail frame around 300-500 KB while preserving
/// enough texture to read signs and surface detail.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Errors raised while converting a raw frame.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("{plane} plane holds {actual} bytes, expected at least {expected}")]
    PlaneSize {
        plane: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("jpeg compression failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Crop applied before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropPolicy {
    /// Square frames are cropped to a centered 16:9 band; other aspect
    /// ratios are kept whole.
    #[default]
    Widescreen,
    /// Always compress the full frame.
    Full,
}

/// Pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropPolicy {
    /// Returns the rectangle to compress for a frame of the given size.
    pub fn rect(self, width: u32, height: u32) -> CropRect {
        match self {
            CropPolicy::Widescreen if width == height => {
                // margins must be equal and even so the band starts on a chroma row
                let target = ((width as u64 * 9 / 16) as u32).min(height);
                match target.checked_sub((height - target) % 4) {
                    Some(crop_height) if crop_height > 0 => CropRect {
                        x: 0,
                        y: (height - crop_height) / 2,
                        width,
                        height: crop_height,
                    },
                    _ => CropRect {
                        x: 0,
                        y: 0,
                        width,
                        height,
                    },
                }
            }
            _ => CropRect {
                x: 0,
                y: 0,
                width,
                height,
            },
        }
    }
}

/// A compressed frame.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    /// Dimensions after cropping.
    pub width: u32,
    pub height: u32,
}

/// Stateless frame compressor.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder {
    /// Creates an encoder with a fixed quality (clamped to 1-100).
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Compresses one frame.
    pub fn encode(&self, frame: &RawFrame, crop: CropPolicy) -> Result<EncodedFrame, EncodeError> {
        let nv21 = repack_nv21(frame)?;
        let rect = crop.rect(frame.width(), frame.height());
        let rgb = nv21_to_rgb(&nv21, frame.width(), frame.height(), rect);

        let mut bytes = Vec::with_capacity(rgb.len() / 8);
        JpegEncoder::new_with_quality(&mut bytes, self.quality).encode(
            &rgb,
            rect.width,
            rect.height,
            ExtendedColorType::Rgb8,
        )?;

        tracing::trace!(
            width = rect.width,
            height = rect.height,
            bytes = bytes.len(),
            "Encoded frame"
        );

        Ok(EncodedFrame {
            bytes,
            width: rect.width,
            height: rect.height,
        })
    }
}

/// Repacks the three planes into NV21: the luma plane followed by
/// interleaved chroma with V first.
///
/// The input planes arrive in U, V order; the compressor expects V, U.
/// Keeping U first produces frames with swapped red and blue casts.
pub fn repack_nv21(frame: &RawFrame) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }

    let luma = frame.luma_len();
    check_plane("y", frame.y_plane(), luma)?;

    let (cw, ch) = frame.chroma_dimensions();
    let samples = cw * ch;
    let layout = frame.layout();
    let required = layout.required_len(samples);
    check_plane("u", frame.u_plane(), required)?;
    check_plane("v", frame.v_plane(), required)?;

    let mut nv21 = Vec::with_capacity(luma + 2 * samples);
    nv21.extend_from_slice(&frame.y_plane()[..luma]);

    match layout {
        ChromaLayout::Planar => {
            for (&v, &u) in frame.v_plane()[..samples]
                .iter()
                .zip(&frame.u_plane()[..samples])
            {
                nv21.push(v);
                nv21.push(u);
            }
        }
        ChromaLayout::Interleaved => {
            let stride = layout.pixel_stride();
            for i in 0..samples {
                nv21.push(frame.v_plane()[i * stride]);
                nv21.push(frame.u_plane()[i * stride]);
            }
        }
    }

    Ok(nv21)
}

fn check_plane(plane: &'static str, data: &[u8], expected: usize) -> Result<(), EncodeError> {
    if data.len() < expected {
        return Err(EncodeError::PlaneSize {
            plane,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Full-range BT.601 conversion of the cropped region of an NV21 buffer.
fn nv21_to_rgb(nv21: &[u8], width: u32, height: u32, rect: CropRect) -> Vec<u8> {
    let width = width as usize;
    let chroma_width = width.div_ceil(2);
    let chroma = &nv21[width * height as usize..];

    let mut rgb = Vec::with_capacity(rect.width as usize * rect.height as usize * 3);
    for row in rect.y as usize..(rect.y + rect.height) as usize {
        let chroma_row = (row / 2) * chroma_width;
        for col in rect.x as usize..(rect.x + rect.width) as usize {
            let luma = nv21[row * width + col] as f32;
            let idx = 2 * (chroma_row + col / 2);
            let v = chroma[idx] as f32 - 128.0;
            let u = chroma[idx + 1] as f32 - 128.0;

            rgb.push(clamp_channel(luma + 1.402 * v));
            rgb.push(clamp_channel(luma - 0.344_136 * u - 0.714_136 * v));
            rgb.push(clamp_channel(luma + 1.772 * u));
        }
    }
    rgb
}

#[inline]
fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
