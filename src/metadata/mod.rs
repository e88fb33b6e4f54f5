//! Per-frame metadata: Exif tag block and XMP extension packet.
//!
//! Two independent channels are written into every stored frame:
//!
//! - the **extension packet**, an XMP document inserted as an APP1 segment
//!   directly after the start-of-image marker while the frame is still in
//!   memory;
//! - the **standard tag block**, an Exif APP1 segment written afterwards on
//!   a separate pool, once the file exists on disk.
//!
//! Both edits splice marker segments and never touch entropy-coded data.

mod embedder;
pub mod exif;
pub mod segment;
pub mod xmp;

pub use embedder::{DeviceInfo, FrameStamp, MetadataEmbedder, MetadataError};
pub use exif::TagBlock;
pub use segment::{find_xmp_packet, insert_app1, SegmentError};
