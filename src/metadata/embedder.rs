//! Frame metadata stamping.

use super::exif::{self, TagBlock};
use super::segment::{self, SegmentError, XMP_HEADER};
use super::xmp;
use crate::sensors::SensorSnapshot;
use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors raised while writing metadata. Never surfaced to the user; the
/// image stays valid without its metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("segment edit failed: {0}")]
    Segment(#[from] SegmentError),
    #[error("timestamp {0} out of range")]
    Timestamp(i64),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Device identification written into every packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub make: String,
    pub model: String,
    pub software: String,
    pub creator_tool: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            make: "Generic".to_string(),
            model: "Camera".to_string(),
            software: format!("trailcap {}", crate::VERSION),
            creator_tool: "TrailTracker".to_string(),
        }
    }
}

/// Everything needed to stamp one frame.
#[derive(Debug, Clone)]
pub struct FrameStamp {
    /// Frame arrival time in epoch milliseconds.
    pub captured_at_ms: i64,
    pub sensors: SensorSnapshot,
    /// Encoded image dimensions.
    pub width: u32,
    pub height: u32,
}

/// Writes the extension packet and the standard tag block.
#[derive(Debug, Clone)]
pub struct MetadataEmbedder {
    device: DeviceInfo,
    /// Offset used for the local-time Exif date fields.
    utc_offset: FixedOffset,
}

impl MetadataEmbedder {
    pub fn new(device: DeviceInfo, utc_offset: FixedOffset) -> Self {
        Self { device, utc_offset }
    }

    /// Uses the host's current UTC offset for the Exif date fields.
    pub fn with_local_offset(device: DeviceInfo) -> Self {
        Self::new(device, Local::now().offset().fix())
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Inserts the extension packet right after the start-of-image marker.
    ///
    /// Never fails: if the packet cannot be inserted the input is returned
    /// unchanged and the failure is logged.
    pub fn embed(&self, jpeg: Vec<u8>, stamp: &FrameStamp) -> Vec<u8> {
        match self.try_embed(&jpeg, stamp) {
            Ok(stamped) => stamped,
            Err(e) => {
                tracing::warn!(
                    timestamp = stamp.captured_at_ms,
                    error = %e,
                    "Extension packet not written"
                );
                jpeg
            }
        }
    }

    /// Fallible form of [`MetadataEmbedder::embed`].
    pub fn try_embed(&self, jpeg: &[u8], stamp: &FrameStamp) -> Result<Vec<u8>, MetadataError> {
        let packet = xmp::build_packet(stamp, &self.device);
        Ok(segment::insert_app1(jpeg, XMP_HEADER, &packet)?)
    }

    /// Builds the tag block values for a frame.
    pub fn tag_block(&self, stamp: &FrameStamp) -> Result<TagBlock, MetadataError> {
        let captured_at = DateTime::<Utc>::from_timestamp_millis(stamp.captured_at_ms)
            .ok_or(MetadataError::Timestamp(stamp.captured_at_ms))?
            .with_timezone(&self.utc_offset);
        Ok(TagBlock {
            captured_at,
            positioning: stamp.sensors.positioning.as_deref().copied(),
            heading: stamp.sensors.heading,
        })
    }

    /// Returns `jpeg` with its standard tag block written.
    pub fn write_tag_block(&self, jpeg: &[u8], stamp: &FrameStamp) -> Result<Vec<u8>, MetadataError> {
        let block = self.tag_block(stamp)?;
        Ok(exif::write_tag_block(jpeg, &block)?)
    }

    /// Rewrites the tag block of a file already on disk.
    ///
    /// The new content goes to a sibling temporary file that replaces the
    /// original by rename, so readers see either the old or the new file.
    pub fn update_tags_in_file(&self, path: &Path, stamp: &FrameStamp) -> Result<(), MetadataError> {
        let original = std::fs::read(path)?;
        let updated = self.write_tag_block(&original, stamp)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tags");
        std::fs::write(&tmp, &updated)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::trace!(path = %path.display(), "Tag block written");
        Ok(())
    }
}

impl Default for MetadataEmbedder {
    fn default() -> Self {
        Self::with_local_offset(DeviceInfo::default())
    }
}
