//! Available-storage queries and thresholds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::Disks;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Answers "how many bytes are free where this path lives".
pub trait StorageProbe: Send + Sync {
    /// `None` when the volume cannot be determined.
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

/// Queries the mounted disks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskStorageProbe;

impl StorageProbe for DiskStorageProbe {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let disks = Disks::new_with_refreshed_list();
        // the most specific mount point containing the path
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Reports a fixed, adjustable amount of free space.
#[derive(Debug)]
pub struct StaticStorageProbe {
    bytes: AtomicU64,
}

impl StaticStorageProbe {
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
        }
    }

    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::Release);
    }
}

impl StorageProbe for StaticStorageProbe {
    fn available_bytes(&self, _path: &Path) -> Option<u64> {
        Some(self.bytes.load(Ordering::Acquire))
    }
}

/// Free-space thresholds checked while recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageThresholds {
    /// Below this the session pauses.
    pub floor_bytes: u64,
    /// Below this a warning is raised.
    pub warning_bytes: u64,
    /// Stored frames between two checks.
    pub check_interval_frames: u64,
}

impl Default for StorageThresholds {
    fn default() -> Self {
        Self {
            floor_bytes: 2 * GIB,
            warning_bytes: 10 * GIB,
            check_interval_frames: 100,
        }
    }
}

impl StorageThresholds {
    pub fn classify(&self, available_bytes: u64) -> StorageStatus {
        if available_bytes < self.floor_bytes {
            StorageStatus::Critical
        } else if available_bytes < self.warning_bytes {
            StorageStatus::Low
        } else {
            StorageStatus::Ok
        }
    }

    /// User-facing message for a status, `None` when storage is fine.
    pub fn message(&self, status: StorageStatus) -> Option<String> {
        match status {
            StorageStatus::Ok => None,
            StorageStatus::Low => Some(format!(
                "Warning: Less than {} storage remaining",
                gigabytes(self.warning_bytes)
            )),
            StorageStatus::Critical => Some(format!(
                "Critical: Less than {} storage remaining!",
                gigabytes(self.floor_bytes)
            )),
        }
    }
}

fn gigabytes(bytes: u64) -> String {
    if bytes % GIB == 0 {
        format!("{}GB", bytes / GIB)
    } else {
        format!("{:.1}GB", bytes as f64 / GIB as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Ok,
    Low,
    Critical,
}
