//! Route progress and the last-session pointer.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Progress of the open route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteState {
    pub route_name: String,
    pub is_recording: bool,
    /// Frames stored, counted once at open and then incremented in memory.
    pub frame_count: u64,
    /// When the route was opened, in epoch milliseconds.
    pub start_time: i64,
    pub duration_ms: i64,
}

/// Estimated duration of a route.
///
/// Playback length at the native rate once frames exist; wall-clock time
/// since opening while recording the first frames; zero otherwise.
pub fn estimate_duration_ms(
    frame_count: u64,
    native_fps: u32,
    start_time: i64,
    is_recording: bool,
    now_ms: i64,
) -> i64 {
    if frame_count > 0 {
        (frame_count.saturating_mul(1000) / u64::from(native_fps.max(1))) as i64
    } else if start_time > 0 && is_recording {
        (now_ms - start_time).max(0)
    } else {
        0
    }
}

/// `lastSession.json`: which route to offer for resumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSessionPointer {
    #[serde(rename = "routeName")]
    pub route_name: String,
    #[serde(rename = "isRecording")]
    pub is_recording: bool,
    #[serde(rename = "startTime")]
    pub start_time: i64,
}

impl LastSessionPointer {
    /// Reads the pointer; a missing or unreadable file yields `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(pointer) => Some(pointer),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Ignoring unreadable session pointer");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
    }
}
