//! Byte-level JPEG marker segment editing.
//!
//! Nothing here decodes image data. Segments are located by walking the
//! marker headers between SOI and SOS, and new segments are spliced in by
//! copying the surrounding bytes unchanged.

use thiserror::Error;

/// Start-of-image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// Low byte of the APP1 marker.
pub const APP1: u8 = 0xE1;
/// Identifying header of an XMP APP1 segment.
pub const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
/// Identifying header of an Exif APP1 segment.
pub const EXIF_HEADER: &[u8] = b"Exif\0\0";

const SOS: u8 = 0xDA;
const MAX_SEGMENT_LEN: usize = u16::MAX as usize;

/// Errors raised while editing segments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("missing start-of-image marker")]
    MissingSoi,
    #[error("segment of {0} bytes exceeds the 65535 byte limit")]
    TooLarge(usize),
    #[error("truncated segment at offset {0}")]
    Truncated(usize),
    #[error("expected a marker at offset {0}")]
    BadMarker(usize),
}

/// A marker segment located inside a JPEG stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Low byte of the marker (e.g. `0xE1` for APP1).
    pub marker: u8,
    /// Offset of the `0xFF` marker byte.
    pub offset: usize,
    /// Total length including the two marker bytes.
    pub len: usize,
}

impl Segment {
    /// Returns true for APP0 through APP15.
    pub fn is_app(&self) -> bool {
        (0xE0..=0xEF).contains(&self.marker)
    }

    /// Byte range of the segment payload (after marker and length field).
    pub fn payload<'a>(&self, jpeg: &'a [u8]) -> &'a [u8] {
        &jpeg[self.offset + 4..self.offset + self.len]
    }

    /// Byte offset one past the end of the segment.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Builds the bytes of one APP1 segment: marker, big-endian length, header
/// and payload. The length field covers itself, the header and the payload.
pub fn app1_segment(header: &[u8], payload: &[u8]) -> Result<Vec<u8>, SegmentError> {
    let declared = header.len() + payload.len() + 2;
    if declared > MAX_SEGMENT_LEN {
        return Err(SegmentError::TooLarge(declared));
    }
    let mut segment = Vec::with_capacity(declared + 2);
    segment.extend_from_slice(&[0xFF, APP1]);
    segment.extend_from_slice(&(declared as u16).to_be_bytes());
    segment.extend_from_slice(header);
    segment.extend_from_slice(payload);
    Ok(segment)
}

/// Inserts a new APP1 segment directly after the start-of-image marker.
pub fn insert_app1(jpeg: &[u8], header: &[u8], payload: &[u8]) -> Result<Vec<u8>, SegmentError> {
    if !jpeg.starts_with(&SOI) {
        return Err(SegmentError::MissingSoi);
    }
    let segment = app1_segment(header, payload)?;

    let mut out = Vec::with_capacity(jpeg.len() + segment.len());
    out.extend_from_slice(&SOI);
    out.extend_from_slice(&segment);
    out.extend_from_slice(&jpeg[2..]);
    Ok(out)
}

/// Lists the marker segments between SOI and the start of scan.
pub fn segments(jpeg: &[u8]) -> Result<Vec<Segment>, SegmentError> {
    if !jpeg.starts_with(&SOI) {
        return Err(SegmentError::MissingSoi);
    }

    let mut found = Vec::new();
    let mut offset = 2;
    while offset + 4 <= jpeg.len() {
        if jpeg[offset] != 0xFF {
            return Err(SegmentError::BadMarker(offset));
        }
        let marker = jpeg[offset + 1];
        if marker == SOS {
            break;
        }
        let declared = u16::from_be_bytes([jpeg[offset + 2], jpeg[offset + 3]]) as usize;
        if declared < 2 || offset + 2 + declared > jpeg.len() {
            return Err(SegmentError::Truncated(offset));
        }
        found.push(Segment {
            marker,
            offset,
            len: declared + 2,
        });
        offset += declared + 2;
    }
    Ok(found)
}

/// Finds the first APP1 segment whose payload starts with `header`.
pub fn find_app1(jpeg: &[u8], header: &[u8]) -> Result<Option<Segment>, SegmentError> {
    Ok(segments(jpeg)?
        .into_iter()
        .find(|s| s.marker == APP1 && s.payload(jpeg).starts_with(header)))
}

/// Returns the XMP packet if it sits directly after the start-of-image
/// marker and its declared length matches the bytes present.
pub fn find_xmp_packet(jpeg: &[u8]) -> Option<&[u8]> {
    if jpeg.len() < 6 || !jpeg.starts_with(&SOI) || jpeg[2] != 0xFF || jpeg[3] != APP1 {
        return None;
    }
    let declared = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
    let end = 4 + declared;
    if declared < 2 + XMP_HEADER.len() || end > jpeg.len() {
        return None;
    }
    let body = &jpeg[6..end];
    body.strip_prefix(XMP_HEADER)
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Smallest marker layout the segment walker accepts: SOI, APP0 (JFIF),
    /// DQT stub, SOS stub, EOI.
    pub fn minimal_jpeg() -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        jpeg.extend_from_slice(b"JFIF\0\x01\x01\x00\x00\x01\x00\x01\x00\x00");
        jpeg.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x04, 0x00, 0x01]);
        jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0x12, 0x34, 0x56]);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }
}
