//! Per-frame work: encode, stamp, store, then queue the tag block.

use crate::capture::{PipelineConfig, RawFrame};
use crate::encoding::{CropPolicy, EncodeError, FrameEncoder};
use crate::metadata::{FrameStamp, MetadataEmbedder};
use crate::scheduler::{FrameProcessor, PoolError, WorkerPool};
use crate::sensors::SensorHub;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors that discard a frame.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A frame that reached storage.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub timestamp_ms: i64,
    pub path: PathBuf,
    /// Size of the stored file.
    pub bytes: usize,
}

/// The [`FrameProcessor`] used while recording a route.
///
/// Frames are stored as `<epochMillis>.jpg` in the output directory with
/// the extension packet already embedded. The standard tag block is written
/// afterwards by a separate pool; if that pool is saturated the update is
/// skipped and the file keeps only its extension packet.
pub struct CapturePipeline {
    encoder: FrameEncoder,
    crop: CropPolicy,
    embedder: Arc<MetadataEmbedder>,
    sensors: Arc<SensorHub>,
    output_dir: PathBuf,
    tag_pool: WorkerPool,
    skipped_tag_updates: AtomicU64,
}

impl CapturePipeline {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        config: &PipelineConfig,
        embedder: MetadataEmbedder,
        sensors: Arc<SensorHub>,
    ) -> Result<Self, PoolError> {
        Ok(Self {
            encoder: FrameEncoder::new(config.jpeg_quality),
            crop: config.crop,
            embedder: Arc::new(embedder),
            sensors,
            output_dir: output_dir.into(),
            tag_pool: WorkerPool::new("tags", config.tag_workers, config.tag_queue)?,
            skipped_tag_updates: AtomicU64::new(0),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path a frame with this timestamp is stored at.
    pub fn frame_path(&self, timestamp_ms: i64) -> PathBuf {
        self.output_dir.join(format!("{timestamp_ms}.jpg"))
    }

    /// Tag updates not performed because the tag queue was full.
    pub fn skipped_tag_updates(&self) -> u64 {
        self.skipped_tag_updates.load(Ordering::Relaxed)
    }

    pub fn pending_tag_updates(&self) -> usize {
        self.tag_pool.queued()
    }

    /// Lets queued tag updates finish, then stops the tag pool.
    pub fn drain(&self) {
        self.tag_pool.drain();
    }

    /// Stops the tag pool, dropping queued updates.
    pub fn shutdown(&self) {
        self.tag_pool.shutdown();
    }

    fn queue_tag_update(&self, path: PathBuf, stamp: FrameStamp) {
        let embedder = Arc::clone(&self.embedder);
        let queued = self.tag_pool.try_execute(move || {
            if let Err(e) = embedder.update_tags_in_file(&path, &stamp) {
                tracing::warn!(path = %path.display(), error = %e, "Tag block not written");
            }
        });
        if let Err(e) = queued {
            self.skipped_tag_updates.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %e, "Tag update skipped");
        }
    }
}

impl FrameProcessor for CapturePipeline {
    fn process(&self, frame: RawFrame) -> Result<CapturedFrame, PipelineError> {
        let timestamp_ms = frame.timestamp_ms();
        let sensors = self.sensors.snapshot();

        let encoded = self.encoder.encode(&frame, self.crop)?;
        // sensor buffers go back as soon as the pixels are compressed
        drop(frame);

        let stamp = FrameStamp {
            captured_at_ms: timestamp_ms,
            sensors,
            width: encoded.width,
            height: encoded.height,
        };
        let bytes = self.embedder.embed(encoded.bytes, &stamp);

        let path = self.frame_path(timestamp_ms);
        write_frame(&path, &bytes).map_err(|source| PipelineError::Io {
            path: path.clone(),
            source,
        })?;

        let size = bytes.len();
        self.queue_tag_update(path.clone(), stamp);

        Ok(CapturedFrame {
            timestamp_ms,
            path,
            bytes: size,
        })
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.tag_pool.drain();
    }
}

/// Writes to `<path>.part` and renames, so a reader never sees a partial
/// frame under its final name.
fn write_frame(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let result = File::create(&part)
        .and_then(|mut file| file.write_all(bytes))
        .and_then(|()| std::fs::rename(&part, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ChromaLayout;
    use crate::metadata::segment::{find_app1, EXIF_HEADER};
    use crate::metadata::{find_xmp_packet, DeviceInfo};
    use crate::sensors::fixtures::sample_fix;
    use chrono::FixedOffset;

    fn frame(size: u32, timestamp_ms: i64) -> RawFrame {
        let (w, h) = (size as usize, size as usize);
        let chroma = w.div_ceil(2) * h.div_ceil(2);
        RawFrame::new(
            vec![120; w * h],
            vec![128; chroma],
            vec![128; chroma],
            size,
            size,
            ChromaLayout::Planar,
            timestamp_ms,
        )
    }

    fn pipeline(dir: &Path, sensors: Arc<SensorHub>) -> CapturePipeline {
        let embedder = MetadataEmbedder::new(DeviceInfo::default(), FixedOffset::east_opt(0).unwrap());
        CapturePipeline::new(dir, &PipelineConfig::default(), embedder, sensors).unwrap()
    }

    #[test]
    fn test_frame_stored_with_both_metadata_channels() {
        let dir = tempfile::tempdir().unwrap();
        let sensors = Arc::new(SensorHub::new());
        sensors.publish_positioning(sample_fix());
        let pipeline = pipeline(dir.path(), sensors);

        let saved = pipeline.process(frame(64, 1_700_000_000_123)).unwrap();
        assert_eq!(saved.path, dir.path().join("1700000000123.jpg"));
        pipeline.drain();

        let bytes = std::fs::read(&saved.path).unwrap();
        assert!(find_xmp_packet(&bytes).is_some());
        assert!(find_app1(&bytes, EXIF_HEADER).unwrap().is_some());

        // square input is cropped to 16:9
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 36));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["1700000000123.jpg".to_string()]);
    }

    #[test]
    fn test_encode_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), Arc::new(SensorHub::new()));

        let broken = RawFrame::new(vec![0; 8], vec![], vec![], 64, 64, ChromaLayout::Planar, 5);
        assert!(matches!(
            pipeline.process(broken),
            Err(PipelineError::Encode(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir.path().join("absent"), Arc::new(SensorHub::new()));
        assert!(matches!(
            pipeline.process(frame(16, 7)),
            Err(PipelineError::Io { .. })
        ));
    }
}
