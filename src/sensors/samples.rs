//! Immutable sensor readings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single positioning fix.
///
/// Field names on the wire match the `points.jsonl` format written by
/// earlier recorders, so old and new logs can be read the same way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositioningSample {
    /// Capture time in epoch milliseconds.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    /// Meters above the reference ellipsoid.
    #[serde(rename = "alt")]
    pub altitude: f64,
    /// Ground speed in meters per second.
    pub speed: f32,
    /// Horizontal accuracy radius in meters.
    pub accuracy: f32,
    /// Orientation heading at the time of the fix, in degrees.
    #[serde(rename = "compass")]
    pub heading: f32,
}

/// An orientation reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub timestamp_ms: i64,
    heading: f32,
}

impl OrientationSample {
    /// Creates a sample, normalizing the heading into `[0, 360)`.
    pub fn new(timestamp_ms: i64, heading: f32) -> Self {
        Self {
            timestamp_ms,
            heading: normalize_heading(heading),
        }
    }

    /// Heading in degrees, always in `[0, 360)`.
    #[inline]
    pub fn heading(&self) -> f32 {
        self.heading
    }
}

/// Wraps any finite angle into `[0, 360)`. Non-finite input maps to 0.
pub fn normalize_heading(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Current-conditions weather report for the recording area.
///
/// `time_unix` is when the provider measured the conditions; `fetched_at_ms`
/// is when the report was retrieved. The two can be hours apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Air temperature in degrees Celsius.
    pub temperature: f32,
    /// Wind speed in km/h.
    pub wind_speed: f32,
    /// Wind direction in degrees.
    pub wind_direction: i32,
    /// WMO weather interpretation code.
    pub weather_code: i32,
    /// 1 during daylight, 0 at night.
    pub is_day: i32,
    /// Reporting interval in seconds.
    pub interval: i32,
    /// Measurement time as reported by the provider (ISO 8601).
    pub time: String,
    /// Measurement time in Unix seconds.
    pub time_unix: i64,
    /// Fetch time in epoch milliseconds.
    pub fetched_at_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f32>,
    pub generation_time_ms: Option<f32>,
    pub utc_offset_seconds: Option<i32>,
    pub timezone: Option<String>,
    pub timezone_abbreviation: Option<String>,
}

impl WeatherSnapshot {
    /// Human readable description of the WMO condition code.
    pub fn condition_description(&self) -> &'static str {
        match self.weather_code {
            0 => "Clear sky",
            1..=3 => "Partly cloudy",
            45 | 48 => "Foggy",
            51 | 53 | 55 => "Drizzle",
            56 | 57 => "Freezing drizzle",
            61 | 63 | 65 => "Rain",
            66 | 67 => "Freezing rain",
            71 | 73 | 75 => "Snow",
            77 => "Snow grains",
            80..=82 => "Rain showers",
            85 | 86 => "Snow showers",
            95 => "Thunderstorm",
            96 | 99 => "Thunderstorm with hail",
            _ => "Unknown",
        }
    }

    /// Time elapsed between the measurement and `now_ms`.
    pub fn measurement_age(&self, now_ms: i64) -> Duration {
        let age_ms = now_ms.saturating_sub(self.time_unix.saturating_mul(1000));
        Duration::from_millis(age_ms.max(0) as u64)
    }

    /// Returns true if the day/night flag reports daylight.
    pub fn is_daylight(&self) -> bool {
        self.is_day != 0
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_heading_normalization() {
        assert_eq!(OrientationSample::new(0, 370.0).heading(), 10.0);
        assert_eq!(OrientationSample::new(0, -90.0).heading(), 270.0);
        assert_eq!(OrientationSample::new(0, 360.0).heading(), 0.0);
        assert_eq!(OrientationSample::new(0, f32::NAN).heading(), 0.0);
        let tiny = OrientationSample::new(0, -1e-9).heading();
        assert!((0.0..360.0).contains(&tiny));
    }

    #[test]
    fn test_positioning_sample_wire_names() {
        let json = serde_json::to_value(sample_fix()).unwrap();
        for key in ["timestamp", "lat", "lon", "alt", "speed", "accuracy", "compass"] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn test_weather_description_and_age() {
        let weather = sample_weather();
        assert_eq!(weather.condition_description(), "Partly cloudy");
        assert!(weather.is_daylight());
        // measured at 22:00, fetched 850 s later
        assert_eq!(
            weather.measurement_age(weather.fetched_at_ms),
            Duration::from_secs(850)
        );
    }
}
