//! Raw frame compression.
//!
//! Frames arrive as planar YUV 4:2:0 and leave as JPEG bytes. The encoder
//! holds no per-frame state, so one instance is shared by every worker.

mod encoder;

pub use encoder::{
    repack_nv21, CropPolicy, CropRect, EncodeError, EncodedFrame, FrameEncoder,
    DEFAULT_JPEG_QUALITY,
};
