//! Raw planar frame as delivered by the image sensor.

use std::fmt;

/// How the two chroma planes are laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaLayout {
    /// I420: U and V are separate quarter-size planes, one byte per sample.
    #[default]
    Planar,
    /// Semi-planar views with a pixel stride of 2, as handed out by most
    /// mobile camera stacks. Each buffer holds `2 * samples - 1` bytes.
    Interleaved,
}

impl ChromaLayout {
    /// Distance in bytes between consecutive chroma samples.
    #[inline]
    pub fn pixel_stride(self) -> usize {
        match self {
            ChromaLayout::Planar => 1,
            ChromaLayout::Interleaved => 2,
        }
    }

    /// Minimum buffer length needed to hold `samples` chroma samples.
    #[inline]
    pub fn required_len(self, samples: usize) -> usize {
        match (self, samples) {
            (_, 0) => 0,
            (ChromaLayout::Planar, n) => n,
            (ChromaLayout::Interleaved, n) => 2 * n - 1,
        }
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// A single YUV 4:2:0 frame from the sensor.
///
/// The frame owns its plane buffers. An optional release hook models the
/// sensor's underlying buffer: it runs exactly once, when the frame is
/// dropped, whichever path (sampling drop, overload drop, worker completion)
/// gets there first.
pub struct RawFrame {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    width: u32,
    height: u32,
    layout: ChromaLayout,
    /// Arrival time in milliseconds since the Unix epoch.
    timestamp_ms: i64,
    release: Option<ReleaseHook>,
}

impl RawFrame {
    /// Creates a frame from its three planes.
    pub fn new(
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
        width: u32,
        height: u32,
        layout: ChromaLayout,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            y,
            u,
            v,
            width,
            height,
            layout,
            timestamp_ms,
            release: None,
        }
    }

    /// Attaches a hook that runs once when the frame is released.
    pub fn with_release_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    #[inline]
    pub fn y_plane(&self) -> &[u8] {
        &self.y
    }

    #[inline]
    pub fn u_plane(&self) -> &[u8] {
        &self.u
    }

    #[inline]
    pub fn v_plane(&self) -> &[u8] {
        &self.v
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn layout(&self) -> ChromaLayout {
        self.layout
    }

    /// Returns the arrival timestamp in epoch milliseconds.
    #[inline]
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Number of luma samples (width * height).
    #[inline]
    pub fn luma_len(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Chroma plane dimensions after 2x2 subsampling.
    #[inline]
    pub fn chroma_dimensions(&self) -> (usize, usize) {
        (
            (self.width as usize).div_ceil(2),
            (self.height as usize).div_ceil(2),
        )
    }

    /// Returns true if the plane buffers are large enough for the dimensions.
    pub fn is_valid(&self) -> bool {
        let (cw, ch) = self.chroma_dimensions();
        let chroma = self.layout.required_len(cw * ch);
        self.width > 0
            && self.height > 0
            && self.y.len() >= self.luma_len()
            && self.u.len() >= chroma
            && self.v.len() >= chroma
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("y_bytes", &self.y.len())
            .field("u_bytes", &self.u.len())
            .field("v_bytes", &self.v.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn planar(width: u32, height: u32) -> RawFrame {
        let luma = (width * height) as usize;
        let chroma = (width.div_ceil(2) * height.div_ceil(2)) as usize;
        RawFrame::new(
            vec![0; luma],
            vec![128; chroma],
            vec![128; chroma],
            width,
            height,
            ChromaLayout::Planar,
            0,
        )
    }

    #[test]
    fn test_frame_creation() {
        let frame = planar(640, 480);
        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert_eq!(frame.chroma_dimensions(), (320, 240));
        assert!(frame.is_valid());
    }

    #[test]
    fn test_frame_invalid_size() {
        let frame = RawFrame::new(
            vec![0; 100],
            vec![0; 10],
            vec![0; 10],
            640,
            480,
            ChromaLayout::Planar,
            0,
        );
        assert!(!frame.is_valid());
    }

    #[test]
    fn test_interleaved_required_len() {
        assert_eq!(ChromaLayout::Interleaved.required_len(4), 7);
        assert_eq!(ChromaLayout::Planar.required_len(4), 4);
        assert_eq!(ChromaLayout::Interleaved.required_len(0), 0);
    }

    #[test]
    fn test_release_hook_runs_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let frame = planar(4, 4).with_release_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(frame);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
