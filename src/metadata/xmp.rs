//! XMP extension packet.
//!
//! The packet mirrors the Exif GPS fields in the standard `exif` namespace
//! and carries full-precision values in the `tt` namespace, which generic
//! readers pass through untouched.

use super::{DeviceInfo, FrameStamp};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;

/// Namespace URI of the application fields.
pub const TT_NAMESPACE: &str = "http://ns.trailtracker/1.0/";
/// Whitespace reserved for in-place rewrites by other tools.
pub const PACKET_PADDING: usize = 2000;

const PACKET_BEGIN: &str = "<?xpacket begin=\"\u{FEFF}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n";
const PACKET_END: &str = "<?xpacket end=\"w\"?>";

/// Builds the serialized packet for one frame.
pub fn build_packet(stamp: &FrameStamp, device: &DeviceInfo) -> Vec<u8> {
    let iso = iso_timestamp(stamp.captured_at_ms);
    let mut xmp = String::with_capacity(4096 + PACKET_PADDING);

    xmp.push_str(PACKET_BEGIN);
    xmp.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    xmp.push_str("<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
    xmp.push_str("<rdf:Description rdf:about=\"\"\n");
    xmp.push_str("    xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\"\n");
    xmp.push_str("    xmlns:exif=\"http://ns.adobe.com/exif/1.0/\"\n");
    xmp.push_str("    xmlns:tiff=\"http://ns.adobe.com/tiff/1.0/\"\n");
    xmp.push_str("    xmlns:photoshop=\"http://ns.adobe.com/photoshop/1.0/\"\n");
    let _ = writeln!(xmp, "    xmlns:tt=\"{TT_NAMESPACE}\">");

    field(&mut xmp, "xmp:CreateDate", &iso);
    field(&mut xmp, "xmp:CreatorTool", &device.creator_tool);
    field(&mut xmp, "xmp:ModifyDate", &iso);
    field(&mut xmp, "xmp:MetadataDate", &iso);

    field(&mut xmp, "tiff:Make", &device.make);
    field(&mut xmp, "tiff:Model", &device.model);
    field(&mut xmp, "tiff:Software", &device.software);

    field(&mut xmp, "tiff:ImageWidth", stamp.width);
    field(&mut xmp, "tiff:ImageLength", stamp.height);
    field(&mut xmp, "exif:PixelXDimension", stamp.width);
    field(&mut xmp, "exif:PixelYDimension", stamp.height);

    let heading = stamp.sensors.heading;
    if let Some(fix) = stamp.sensors.positioning.as_deref() {
        field(&mut xmp, "exif:GPSLatitude", fix.latitude);
        field(&mut xmp, "exif:GPSLongitude", fix.longitude);
        field(&mut xmp, "exif:GPSAltitude", fix.altitude);
        field(&mut xmp, "exif:GPSAltitudeRef", u8::from(fix.altitude < 0.0));
        field(&mut xmp, "exif:GPSSpeed", fix.speed);
        field(&mut xmp, "exif:GPSSpeedRef", "M");
        field(&mut xmp, "exif:GPSImgDirection", heading);
        field(&mut xmp, "exif:GPSImgDirectionRef", "M");
        field(&mut xmp, "exif:GPSTimeStamp", &iso_timestamp(fix.timestamp_ms));
        // horizontal dilution of precision, approximated from accuracy
        field(
            &mut xmp,
            "exif:GPSDOP",
            format_args!("{:.2}", fix.accuracy / 5.0),
        );
    }

    field(&mut xmp, "tt:TimestampMs", stamp.captured_at_ms);
    field(&mut xmp, "tt:Compass", heading);

    if let Some(fix) = stamp.sensors.positioning.as_deref() {
        field(&mut xmp, "tt:Latitude", fix.latitude);
        field(&mut xmp, "tt:Longitude", fix.longitude);
        field(&mut xmp, "tt:Altitude", fix.altitude);
        field(&mut xmp, "tt:Speed", fix.speed);
        field(&mut xmp, "tt:Accuracy", fix.accuracy);
        field(&mut xmp, "tt:GPSCompass", fix.heading);
        field(&mut xmp, "tt:GPSTimestamp", fix.timestamp_ms);
    }

    if let Some(w) = stamp.sensors.weather.as_deref() {
        field(&mut xmp, "tt:WeatherTemperature", w.temperature);
        field(&mut xmp, "tt:WeatherTemperatureUnit", "C");
        field(&mut xmp, "tt:WeatherWindSpeed", w.wind_speed);
        field(&mut xmp, "tt:WeatherWindSpeedUnit", "kmh");
        field(&mut xmp, "tt:WeatherWindDirection", w.wind_direction);
        field(&mut xmp, "tt:WeatherCode", w.weather_code);
        field(&mut xmp, "tt:WeatherIsDay", w.is_day);
        field(&mut xmp, "tt:WeatherInterval", w.interval);
        // measurement time, as reported by the provider
        field(&mut xmp, "tt:WeatherTime", &w.time);
        field(&mut xmp, "tt:WeatherTimeUnix", w.time_unix);
        // retrieval time
        field(&mut xmp, "tt:WeatherFetchedAtUnix", w.fetched_at_ms / 1000);
        field(&mut xmp, "tt:WeatherLatitude", w.latitude);
        field(&mut xmp, "tt:WeatherLongitude", w.longitude);
        if let Some(elevation) = w.elevation {
            field(&mut xmp, "tt:WeatherElevation", elevation);
        }
        if let Some(ms) = w.generation_time_ms {
            field(&mut xmp, "tt:WeatherGenerationTimeMs", ms);
        }
        if let Some(offset) = w.utc_offset_seconds {
            field(&mut xmp, "tt:WeatherUtcOffsetSeconds", offset);
        }
        if let Some(tz) = &w.timezone {
            field(&mut xmp, "tt:WeatherTimezone", tz);
        }
        if let Some(abbr) = &w.timezone_abbreviation {
            field(&mut xmp, "tt:WeatherTimezoneAbbreviation", abbr);
        }
    }

    xmp.push_str("</rdf:Description>\n");
    xmp.push_str("</rdf:RDF>\n");
    xmp.push_str("</x:xmpmeta>\n");
    xmp.extend(std::iter::repeat(' ').take(PACKET_PADDING));
    xmp.push('\n');
    xmp.push_str(PACKET_END);

    xmp.into_bytes()
}

/// Formats epoch milliseconds as `2023-11-14T22:13:20.123Z`.
pub fn iso_timestamp(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn field(xmp: &mut String, name: &str, value: impl std::fmt::Display) {
    let value = value.to_string();
    let _ = writeln!(xmp, "  <{name}>{}</{name}>", escape(&value));
}

fn escape(value: &str) -> std::borrow::Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return value.into();
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out.into()
}
