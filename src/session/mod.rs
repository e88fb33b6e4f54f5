//! Route (recording session) state.
//!
//! Layout below the base directory:
//!
//! ```text
//! <base>/lastSession.json
//! <base>/<route>/config.json
//! <base>/<route>/points.jsonl
//! <base>/<route>/<epochMillis>.jpg
//! ```
//!
//! Frames are counted once when a route is opened; afterwards the count is
//! kept in memory and incremented by the capture pipeline.

mod config;
mod log;
mod manager;
mod state;
mod storage;

pub use config::{skip_for_target_fps, SessionConfig};
pub use log::PositioningLog;
pub use manager::{
    validate_route_name, SessionManager, WarningHandler, CONFIG_FILE, POINTER_FILE, POINTS_FILE,
};
pub use state::{estimate_duration_ms, LastSessionPointer, RouteState};
pub use storage::{
    DiskStorageProbe, StaticStorageProbe, StorageProbe, StorageStatus, StorageThresholds, GIB,
};

use thiserror::Error;

/// Errors raised by route operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid route name {0:?}")]
    InvalidRouteName(String),
    #[error("no route is open")]
    NoOpenRoute,
    #[error("route not found: {0}")]
    RouteNotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Current time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
