//! Exif tag block writer.
//!
//! Produces a big-endian TIFF structure with three IFDs (IFD0, the Exif
//! sub-IFD and the GPS sub-IFD) and splices it into a JPEG as an `Exif`
//! APP1 segment. Only the tags this recorder stamps are written.

use super::segment::{self, SegmentError, EXIF_HEADER};
use crate::sensors::PositioningSample;
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

const TAG_DATE_TIME: u16 = 0x0132;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;

const GPS_VERSION_ID: u16 = 0x0000;
const GPS_LATITUDE_REF: u16 = 0x0001;
const GPS_LATITUDE: u16 = 0x0002;
const GPS_LONGITUDE_REF: u16 = 0x0003;
const GPS_LONGITUDE: u16 = 0x0004;
const GPS_ALTITUDE_REF: u16 = 0x0005;
const GPS_ALTITUDE: u16 = 0x0006;
const GPS_TIME_STAMP: u16 = 0x0007;
const GPS_SPEED_REF: u16 = 0x000C;
const GPS_SPEED: u16 = 0x000D;
const GPS_IMG_DIRECTION_REF: u16 = 0x0010;
const GPS_IMG_DIRECTION: u16 = 0x0011;
const GPS_DATE_STAMP: u16 = 0x001D;

const TIFF_HEADER_LEN: u32 = 8;

/// Values written into the standard tag block of one frame.
#[derive(Debug, Clone)]
pub struct TagBlock {
    /// Capture time, written to both `DateTime` and `DateTimeOriginal`.
    pub captured_at: DateTime<FixedOffset>,
    pub positioning: Option<PositioningSample>,
    /// Orientation heading in degrees, referenced to magnetic north.
    pub heading: f32,
}

impl TagBlock {
    /// Serializes the block into a TIFF byte structure.
    pub fn to_tiff(&self) -> Vec<u8> {
        let stamp = self
            .captured_at
            .format("%Y:%m:%d %H:%M:%S")
            .to_string();

        let ifd0 = vec![
            Entry::ascii(TAG_DATE_TIME, &stamp),
            Entry::long(TAG_EXIF_IFD, 0),
            Entry::long(TAG_GPS_IFD, 0),
        ];
        let exif = vec![Entry::ascii(TAG_DATE_TIME_ORIGINAL, &stamp)];
        let gps = self.gps_entries();

        let exif_offset = TIFF_HEADER_LEN + ifd_size(&ifd0);
        let gps_offset = exif_offset + ifd_size(&exif);
        let ifd0 = vec![
            ifd0[0].clone(),
            Entry::long(TAG_EXIF_IFD, exif_offset),
            Entry::long(TAG_GPS_IFD, gps_offset),
        ];

        let mut out = Vec::with_capacity((gps_offset + ifd_size(&gps)) as usize);
        out.extend_from_slice(b"MM\x00\x2A");
        out.extend_from_slice(&TIFF_HEADER_LEN.to_be_bytes());
        write_ifd(&mut out, &ifd0, TIFF_HEADER_LEN);
        write_ifd(&mut out, &exif, exif_offset);
        write_ifd(&mut out, &gps, gps_offset);
        out
    }

    fn gps_entries(&self) -> Vec<Entry> {
        let mut entries = vec![Entry::bytes(GPS_VERSION_ID, &[2, 3, 0, 0])];

        if let Some(fix) = &self.positioning {
            let lat_ref = if fix.latitude >= 0.0 { "N" } else { "S" };
            let lon_ref = if fix.longitude >= 0.0 { "E" } else { "W" };
            entries.push(Entry::ascii(GPS_LATITUDE_REF, lat_ref));
            entries.push(Entry::rationals(GPS_LATITUDE, &dms(fix.latitude)));
            entries.push(Entry::ascii(GPS_LONGITUDE_REF, lon_ref));
            entries.push(Entry::rationals(GPS_LONGITUDE, &dms(fix.longitude)));
            entries.push(Entry::bytes(
                GPS_ALTITUDE_REF,
                &[if fix.altitude >= 0.0 { 0 } else { 1 }],
            ));
            entries.push(Entry::rationals(
                GPS_ALTITUDE,
                &[rational(fix.altitude.abs(), 1000)],
            ));

            let fix_time = DateTime::<Utc>::from_timestamp_millis(fix.timestamp_ms);
            if let Some(t) = fix_time {
                let seconds = t.second() as f64 + t.timestamp_subsec_millis() as f64 / 1000.0;
                entries.push(Entry::rationals(
                    GPS_TIME_STAMP,
                    &[(t.hour(), 1), (t.minute(), 1), rational(seconds, 1000)],
                ));
            }

            if fix.speed > 0.0 {
                // Exif speed references are K (km/h), M (mph) or N (knots)
                entries.push(Entry::ascii(GPS_SPEED_REF, "K"));
                entries.push(Entry::rationals(
                    GPS_SPEED,
                    &[rational(fix.speed as f64 * 3.6, 100)],
                ));
            }

            entries.push(Entry::ascii(GPS_IMG_DIRECTION_REF, "M"));
            entries.push(Entry::rationals(
                GPS_IMG_DIRECTION,
                &[rational(self.heading as f64, 100)],
            ));

            if let Some(t) = fix_time {
                let date = format!("{:04}:{:02}:{:02}", t.year(), t.month(), t.day());
                entries.push(Entry::ascii(GPS_DATE_STAMP, &date));
            }
        } else {
            entries.push(Entry::ascii(GPS_IMG_DIRECTION_REF, "M"));
            entries.push(Entry::rationals(
                GPS_IMG_DIRECTION,
                &[rational(self.heading as f64, 100)],
            ));
        }

        entries
    }
}

/// Writes `block` into `jpeg`, replacing an existing Exif segment in place
/// or inserting one after the leading run of APPn segments.
pub fn write_tag_block(jpeg: &[u8], block: &TagBlock) -> Result<Vec<u8>, SegmentError> {
    let segment = segment::app1_segment(EXIF_HEADER, &block.to_tiff())?;
    let layout = segment::segments(jpeg)?;

    let (start, end) = match layout
        .iter()
        .find(|s| s.marker == segment::APP1 && s.payload(jpeg).starts_with(EXIF_HEADER))
    {
        Some(existing) => (existing.offset, existing.end()),
        None => {
            let at = layout
                .iter()
                .take_while(|s| s.is_app())
                .last()
                .map_or(2, |s| s.end());
            (at, at)
        }
    };

    let mut out = Vec::with_capacity(jpeg.len() + segment.len());
    out.extend_from_slice(&jpeg[..start]);
    out.extend_from_slice(&segment);
    out.extend_from_slice(&jpeg[end..]);
    Ok(out)
}

#[derive(Debug, Clone)]
struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

impl Entry {
    fn ascii(tag: u16, value: &str) -> Self {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            kind: TYPE_ASCII,
            count: data.len() as u32,
            data,
        }
    }

    fn bytes(tag: u16, value: &[u8]) -> Self {
        Self {
            tag,
            kind: TYPE_BYTE,
            count: value.len() as u32,
            data: value.to_vec(),
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            kind: TYPE_LONG,
            count: 1,
            data: value.to_be_bytes().to_vec(),
        }
    }

    fn rationals(tag: u16, values: &[(u32, u32)]) -> Self {
        let data = values
            .iter()
            .flat_map(|(n, d)| n.to_be_bytes().into_iter().chain(d.to_be_bytes()))
            .collect();
        Self {
            tag,
            kind: TYPE_RATIONAL,
            count: values.len() as u32,
            data,
        }
    }

    /// Bytes stored outside the entry (values longer than four bytes),
    /// padded to an even length.
    fn external_len(&self) -> u32 {
        if self.data.len() <= 4 {
            0
        } else {
            (self.data.len() as u32 + 1) & !1
        }
    }
}

fn ifd_size(entries: &[Entry]) -> u32 {
    2 + 12 * entries.len() as u32 + 4 + entries.iter().map(Entry::external_len).sum::<u32>()
}

/// Writes one IFD starting at TIFF offset `at`. The caller guarantees that
/// `out.len()` equals `at` on entry.
fn write_ifd(out: &mut Vec<u8>, entries: &[Entry], at: u32) {
    debug_assert_eq!(out.len() as u32, at);
    let mut data_offset = at + 2 + 12 * entries.len() as u32 + 4;
    let mut data = Vec::new();

    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.tag.to_be_bytes());
        out.extend_from_slice(&entry.kind.to_be_bytes());
        out.extend_from_slice(&entry.count.to_be_bytes());
        if entry.data.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..entry.data.len()].copy_from_slice(&entry.data);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&data_offset.to_be_bytes());
            data.extend_from_slice(&entry.data);
            if entry.data.len() % 2 == 1 {
                data.push(0);
            }
            data_offset += entry.external_len();
        }
    }
    // no chained IFD
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&data);
}

/// Converts a coordinate to degree/minute/second rationals.
fn dms(coordinate: f64) -> [(u32, u32); 3] {
    let abs = coordinate.abs();
    let degrees = abs.trunc();
    let minutes_full = (abs - degrees) * 60.0;
    let minutes = minutes_full.trunc();
    let seconds = (minutes_full - minutes) * 60.0;
    [
        (degrees as u32, 1),
        (minutes as u32, 1),
        rational(seconds, 10_000),
    ]
}

fn rational(value: f64, denominator: u32) -> (u32, u32) {
    let scaled = (value * denominator as f64).round();
    (scaled.clamp(0.0, u32::MAX as f64) as u32, denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::segment::fixtures::minimal_jpeg;
    use crate::sensors::fixtures::sample_fix;
    use chrono::TimeZone;

    fn block(positioning: Option<PositioningSample>) -> TagBlock {
        TagBlock {
            captured_at: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2023, 11, 14, 22, 13, 20)
                .unwrap(),
            positioning,
            heading: 271.5,
        }
    }

    /// Minimal IFD reader used to check what the writer produced.
    fn read_ifd(tiff: &[u8], at: usize) -> Vec<(u16, u16, u32, Vec<u8>)> {
        let be16 = |o: usize| u16::from_be_bytes([tiff[o], tiff[o + 1]]);
        let be32 = |o: usize| u32::from_be_bytes([tiff[o], tiff[o + 1], tiff[o + 2], tiff[o + 3]]);
        let size = |kind: u16| match kind {
            TYPE_BYTE | TYPE_ASCII => 1,
            TYPE_LONG => 4,
            TYPE_RATIONAL => 8,
            _ => unreachable!(),
        };

        (0..be16(at) as usize)
            .map(|i| {
                let e = at + 2 + 12 * i;
                let (tag, kind, count) = (be16(e), be16(e + 2), be32(e + 4));
                let len = size(kind) * count as usize;
                let start = if len <= 4 { e + 8 } else { be32(e + 8) as usize };
                (tag, kind, count, tiff[start..start + len].to_vec())
            })
            .collect()
    }

    fn find<'a>(ifd: &'a [(u16, u16, u32, Vec<u8>)], tag: u16) -> Option<&'a Vec<u8>> {
        ifd.iter().find(|e| e.0 == tag).map(|e| &e.3)
    }

    fn pointer(ifd: &[(u16, u16, u32, Vec<u8>)], tag: u16) -> usize {
        let v = find(ifd, tag).unwrap();
        u32::from_be_bytes([v[0], v[1], v[2], v[3]]) as usize
    }

    #[test]
    fn test_timestamps_written_twice() {
        let tiff = block(None).to_tiff();
        assert_eq!(&tiff[..4], b"MM\x00\x2A");

        let ifd0 = read_ifd(&tiff, 8);
        assert_eq!(
            find(&ifd0, TAG_DATE_TIME).unwrap(),
            b"2023:11:14 22:13:20\0"
        );
        let exif = read_ifd(&tiff, pointer(&ifd0, TAG_EXIF_IFD));
        assert_eq!(
            find(&exif, TAG_DATE_TIME_ORIGINAL).unwrap(),
            b"2023:11:14 22:13:20\0"
        );
    }

    #[test]
    fn test_gps_fields_with_fix() {
        let mut fix = sample_fix();
        fix.altitude = -3.25;
        fix.longitude = -122.5;
        let tiff = block(Some(fix)).to_tiff();
        let ifd0 = read_ifd(&tiff, 8);
        let gps = read_ifd(&tiff, pointer(&ifd0, TAG_GPS_IFD));

        assert_eq!(find(&gps, GPS_LATITUDE_REF).unwrap(), b"N\0");
        assert_eq!(find(&gps, GPS_LONGITUDE_REF).unwrap(), b"W\0");
        assert_eq!(find(&gps, GPS_ALTITUDE_REF).unwrap(), &vec![1]);
        assert_eq!(find(&gps, GPS_SPEED_REF).unwrap(), b"K\0");
        assert_eq!(find(&gps, GPS_IMG_DIRECTION_REF).unwrap(), b"M\0");

        // 122.5 degrees = 122 deg 30 min 0 sec
        let lon = find(&gps, GPS_LONGITUDE).unwrap();
        assert_eq!(&lon[..8], &[0, 0, 0, 122, 0, 0, 0, 1]);
        assert_eq!(&lon[8..16], &[0, 0, 0, 30, 0, 0, 0, 1]);

        // 1.5 m/s = 5.40 km/h
        let speed = find(&gps, GPS_SPEED).unwrap();
        assert_eq!(&speed[..4], &540u32.to_be_bytes());

        let direction = find(&gps, GPS_IMG_DIRECTION).unwrap();
        assert_eq!(&direction[..4], &27150u32.to_be_bytes());
        assert!(find(&gps, GPS_DATE_STAMP).is_some());
        assert!(find(&gps, GPS_TIME_STAMP).is_some());
    }

    #[test]
    fn test_heading_written_without_fix() {
        let tiff = block(None).to_tiff();
        let ifd0 = read_ifd(&tiff, 8);
        let gps = read_ifd(&tiff, pointer(&ifd0, TAG_GPS_IFD));
        assert!(find(&gps, GPS_LATITUDE).is_none());
        assert!(find(&gps, GPS_IMG_DIRECTION).is_some());
    }

    #[test]
    fn test_stationary_fix_omits_speed() {
        let mut fix = sample_fix();
        fix.speed = 0.0;
        let tiff = block(Some(fix)).to_tiff();
        let ifd0 = read_ifd(&tiff, 8);
        let gps = read_ifd(&tiff, pointer(&ifd0, TAG_GPS_IFD));
        assert!(find(&gps, GPS_SPEED).is_none());
        assert!(find(&gps, GPS_SPEED_REF).is_none());
    }

    #[test]
    fn test_tag_block_inserted_after_app_run_then_replaced() {
        let jpeg = minimal_jpeg();
        let once = write_tag_block(&jpeg, &block(None)).unwrap();

        let layout = segment::segments(&once).unwrap();
        assert_eq!(layout[0].marker, 0xE0);
        assert_eq!(layout[1].marker, segment::APP1);
        assert!(layout[1].payload(&once).starts_with(EXIF_HEADER));

        let twice = write_tag_block(&once, &block(Some(sample_fix()))).unwrap();
        let exif_segments = segment::segments(&twice)
            .unwrap()
            .into_iter()
            .filter(|s| s.payload(&twice).starts_with(EXIF_HEADER))
            .count();
        assert_eq!(exif_segments, 1);
        // image data untouched
        assert!(twice.ends_with(&jpeg[jpeg.len() - 9..]));
    }
}
