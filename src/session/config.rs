//! Per-route `config.json`.

use super::SessionError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Native sensor rate the legacy `targetFPS` field was expressed against.
const LEGACY_NATIVE_FPS: f64 = 30.0;

fn default_skip() -> u32 {
    1
}

/// Settings fixed when a route is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Keep one of every `frame_skip` native frames.
    #[serde(rename = "frameSkip", default = "default_skip")]
    pub frame_skip: u32,
    /// Target rate written by older versions instead of a skip factor.
    #[serde(rename = "targetFPS", default, skip_serializing_if = "Option::is_none")]
    pub target_fps: Option<i32>,
    #[serde(rename = "sessionName", default)]
    pub session_name: String,
    /// Creation time in epoch milliseconds.
    #[serde(rename = "createdAt", default = "crate::session::now_ms")]
    pub created_at: i64,
}

impl SessionConfig {
    pub fn new(session_name: impl Into<String>, frame_skip: u32, created_at: i64) -> Self {
        Self {
            frame_skip: frame_skip.max(1),
            target_fps: None,
            session_name: session_name.into(),
            created_at,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Converts a legacy `targetFPS` into a skip factor.
    ///
    /// Only applies while `frame_skip` still holds its default; returns
    /// `None` when nothing changes.
    pub fn migrate_legacy(&self) -> Option<Self> {
        let target = self.target_fps?;
        if self.frame_skip != 1 {
            return None;
        }
        let frame_skip = skip_for_target_fps(target);
        if frame_skip == self.frame_skip {
            return None;
        }
        Some(Self {
            frame_skip,
            ..self.clone()
        })
    }
}

/// Maps a legacy target rate to the equivalent skip factor.
pub fn skip_for_target_fps(target_fps: i32) -> u32 {
    match target_fps {
        30 => 1,
        15 => 2,
        10 => 3,
        5 => 6,
        t if t <= 0 => 1,
        t => ((LEGACY_NATIVE_FPS / f64::from(t)).round() as u32).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_keys() {
        let config = SessionConfig::new("ridge", 2, 1_700_000_000_000);
        let json = config.to_json().unwrap();
        assert!(json.contains("\"frameSkip\": 2"));
        assert!(json.contains("\"sessionName\": \"ridge\""));
        assert!(json.contains("\"createdAt\": 1700000000000"));
        assert!(!json.contains("targetFPS"));
        assert_eq!(SessionConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_legacy_mapping() {
        assert_eq!(skip_for_target_fps(30), 1);
        assert_eq!(skip_for_target_fps(15), 2);
        assert_eq!(skip_for_target_fps(10), 3);
        assert_eq!(skip_for_target_fps(5), 6);
        assert_eq!(skip_for_target_fps(20), 2);
        assert_eq!(skip_for_target_fps(1), 30);
        assert_eq!(skip_for_target_fps(60), 1);
        assert_eq!(skip_for_target_fps(0), 1);
    }

    #[test]
    fn test_migration_only_with_default_skip() {
        let legacy = SessionConfig::from_json(r#"{"targetFPS": 15, "sessionName": "old"}"#).unwrap();
        assert_eq!(legacy.frame_skip, 1);
        assert_eq!(legacy.migrate_legacy().unwrap().frame_skip, 2);

        let explicit =
            SessionConfig::from_json(r#"{"frameSkip": 3, "targetFPS": 15, "sessionName": "x"}"#)
                .unwrap();
        assert!(explicit.migrate_legacy().is_none());

        let current = SessionConfig::new("new", 1, 0);
        assert!(current.migrate_legacy().is_none());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config =
            SessionConfig::from_json(r#"{"frameSkip": 4, "sessionName": "a", "createdAt": 5, "extra": true}"#)
                .unwrap();
        assert_eq!(config.frame_skip, 4);
    }
}
