//! Append-only positioning log (`points.jsonl`).

use super::SessionError;
use crate::sensors::PositioningSample;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// One JSON object per line, flushed after every line.
#[derive(Debug)]
pub struct PositioningLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    lines: AtomicU64,
}

impl PositioningLog {
    /// Opens the log in append mode, creating it if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            lines: AtomicU64::new(0),
        })
    }

    pub fn append(&self, sample: &PositioningSample) -> Result<(), SessionError> {
        let mut line = serde_json::to_vec(sample)?;
        line.push(b'\n');

        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.flush()?;
        self.lines.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines appended through this handle.
    pub fn lines_written(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::fixtures::sample_fix;

    #[test]
    fn test_lines_are_appended_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.jsonl");

        let log = PositioningLog::open(&path).unwrap();
        log.append(&sample_fix()).unwrap();
        drop(log);

        let log = PositioningLog::open(&path).unwrap();
        log.append(&sample_fix()).unwrap();
        assert_eq!(log.lines_written(), 1);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["lat"], 37.774929);
        assert_eq!(value["timestamp"], 1_700_000_000_123i64);
        assert!(value.get("compass").is_some());
    }

    #[test]
    fn test_flushed_without_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.jsonl");
        let log = PositioningLog::open(&path).unwrap();
        log.append(&sample_fix()).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().ends_with('\n'));
    }
}
