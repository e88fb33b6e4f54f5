//! Route lifecycle: open/resume, capture, pause, close, delete.

use super::config::SessionConfig;
use super::log::PositioningLog;
use super::state::{estimate_duration_ms, LastSessionPointer, RouteState};
use super::storage::{StorageProbe, StorageStatus, StorageThresholds};
use super::{now_ms, SessionError};
use crate::scheduler::{CaptureCallbacks, CaptureSwitch, FpsCallback, FrameProcessor, FrameScheduler};
use crate::sensors::PositioningSample;
use parking_lot::{Mutex, RwLock};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.json";
pub const POINTS_FILE: &str = "points.jsonl";
pub const POINTER_FILE: &str = "lastSession.json";

const FRAME_EXTENSIONS: [&str; 2] = ["jpg", "webp"];
/// How long closing a route waits for its frames still being written.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

static TOMBSTONES: AtomicU64 = AtomicU64::new(0);

/// Receives storage warnings raised while recording.
pub type WarningHandler = Arc<dyn Fn(StorageStatus, &str) + Send + Sync>;

struct OpenRoute {
    name: String,
    dir: PathBuf,
    config: SessionConfig,
    log: PositioningLog,
    start_time: i64,
}

struct Inner {
    base_dir: PathBuf,
    probe: Arc<dyn StorageProbe>,
    thresholds: StorageThresholds,
    native_fps: u32,
    route: Mutex<Option<OpenRoute>>,
    frame_count: AtomicU64,
    /// Bumped whenever a route is closed; frames stored under an older
    /// generation are not counted.
    generation: AtomicU64,
    recording: AtomicBool,
    capture: Mutex<Option<CaptureSwitch>>,
    warning_handler: RwLock<Option<WarningHandler>>,
}

impl Inner {
    fn pointer_path(&self) -> PathBuf {
        self.base_dir.join(POINTER_FILE)
    }

    fn write_pointer(&self, route_name: &str, is_recording: bool, start_time: i64) {
        let pointer = LastSessionPointer {
            route_name: route_name.to_string(),
            is_recording,
            start_time,
        };
        if let Err(e) = pointer.save(&self.pointer_path()) {
            tracing::warn!(route = route_name, error = %e, "Failed to write session pointer");
        }
    }

    fn pause(&self) {
        // the switch is kept so closing can wait for in-flight frames
        if let Some(switch) = self.capture.lock().as_ref() {
            switch.stop();
        }
        self.recording.store(false, Ordering::Release);

        let pointer = self
            .route
            .lock()
            .as_ref()
            .map(|r| (r.name.clone(), r.start_time));
        if let Some((name, start_time)) = pointer {
            self.write_pointer(&name, false, start_time);
            tracing::info!(
                route = %name,
                frames = self.frame_count.load(Ordering::Acquire),
                "Route paused"
            );
        }
    }

    fn storage_status(&self) -> StorageStatus {
        match self.probe.available_bytes(&self.base_dir) {
            Some(bytes) => self.thresholds.classify(bytes),
            None => {
                tracing::debug!(path = %self.base_dir.display(), "Available storage unknown");
                StorageStatus::Ok
            }
        }
    }

    fn on_frame_stored(&self, generation: u64) {
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(generation, "Frame stored after its route was closed");
            return;
        }
        let frames = self.frame_count.fetch_add(1, Ordering::AcqRel) + 1;
        if frames % self.thresholds.check_interval_frames.max(1) != 0 {
            return;
        }

        let status = self.storage_status();
        let Some(message) = self.thresholds.message(status) else {
            return;
        };
        if status == StorageStatus::Critical {
            tracing::warn!(frames, "{message}");
            self.pause();
        } else {
            tracing::info!(frames, "{message}");
        }
        let handler = self.warning_handler.read().clone();
        if let Some(handler) = handler {
            handler(status, &message);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(switch) = self.capture.get_mut().take() {
            switch.stop();
        }
    }
}

/// Owns the route directories below a base directory and the state of the
/// one route currently open.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Creates the base directory if needed.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        probe: Arc<dyn StorageProbe>,
        thresholds: StorageThresholds,
    ) -> Result<Self, SessionError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            inner: Arc::new(Inner {
                base_dir,
                probe,
                thresholds,
                native_fps: 30,
                route: Mutex::new(None),
                frame_count: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                recording: AtomicBool::new(false),
                capture: Mutex::new(None),
                warning_handler: RwLock::new(None),
            }),
        })
    }

    /// Sets the sensor rate used for duration estimates.
    ///
    /// Only takes effect before the manager is cloned.
    pub fn with_native_fps(mut self, native_fps: u32) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.native_fps = native_fps.max(1);
        }
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.inner.base_dir
    }

    /// Directory a route lives in.
    pub fn route_dir(&self, route: &str) -> Result<PathBuf, SessionError> {
        validate_route_name(route)?;
        Ok(self.inner.base_dir.join(route))
    }

    /// Every route directory, sorted by name.
    pub fn list_routes(&self) -> Result<Vec<String>, SessionError> {
        let mut routes = Vec::new();
        for entry in std::fs::read_dir(&self.inner.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    routes.push(name.to_string());
                }
            }
        }
        routes.sort();
        Ok(routes)
    }

    /// Creates or resumes a route and makes it the open route.
    ///
    /// `frame_skip` only applies to new routes; a resumed route keeps the
    /// skip factor stored in its `config.json`.
    pub fn open(&self, route: &str, frame_skip: u32) -> Result<SessionConfig, SessionError> {
        let dir = self.route_dir(route)?;
        self.close();

        let start_time = now_ms();
        let (config, frames) = if dir.is_dir() {
            let frames = count_frames(&dir)?;
            let config = load_or_repair_config(&dir.join(CONFIG_FILE), route, start_time)?;
            tracing::info!(route, frames, skip = config.frame_skip, "Route resumed");
            (config, frames)
        } else {
            std::fs::create_dir_all(&dir)?;
            let config = SessionConfig::new(route, frame_skip, start_time);
            config.save(&dir.join(CONFIG_FILE))?;
            tracing::info!(route, skip = config.frame_skip, "Route created");
            (config, 0)
        };

        let log = PositioningLog::open(dir.join(POINTS_FILE))?;

        self.inner.frame_count.store(frames, Ordering::Release);
        self.inner.recording.store(false, Ordering::Release);
        self.inner.write_pointer(route, false, start_time);
        *self.inner.route.lock() = Some(OpenRoute {
            name: route.to_string(),
            dir,
            config: config.clone(),
            log,
            start_time,
        });

        Ok(config)
    }

    /// Starts recording the open route through `scheduler`.
    ///
    /// Every stored frame increments the route's frame counter; every
    /// `check_interval_frames` frames the available storage is checked.
    pub fn start_capture(
        &self,
        scheduler: &FrameScheduler,
        processor: Arc<dyn FrameProcessor>,
        on_fps: Option<FpsCallback>,
    ) -> Result<CaptureSwitch, SessionError> {
        let (name, skip, start_time) = {
            let route = self.inner.route.lock();
            let route = route.as_ref().ok_or(SessionError::NoOpenRoute)?;
            (route.name.clone(), route.config.frame_skip, route.start_time)
        };

        self.inner.recording.store(true, Ordering::Release);
        self.inner.write_pointer(&name, true, start_time);

        let generation = self.inner.generation.load(Ordering::Acquire);
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let callbacks = CaptureCallbacks {
            on_frame: Some(Arc::new(move |_timestamp: i64| {
                if let Some(inner) = inner.upgrade() {
                    inner.on_frame_stored(generation);
                }
            })),
            on_fps,
        };

        let switch = scheduler.start(processor, skip, callbacks);
        if let Some(previous) = self.inner.capture.lock().replace(switch.clone()) {
            previous.stop();
        }

        tracing::info!(
            route = %name,
            skip,
            description = %scheduler.frame_skip_description(),
            "Recording"
        );
        Ok(switch)
    }

    /// Stops capture and clears the recording flag. The route stays open
    /// and the positioning log keeps its handle.
    pub fn pause(&self) {
        self.inner.pause();
    }

    /// Pauses and releases the open route.
    ///
    /// Waits for frames already dispatched for the route to finish, so they
    /// land in the route they were captured for.
    pub fn close(&self) {
        if self.inner.route.lock().is_none() {
            return;
        }
        self.inner.pause();
        self.inner.generation.fetch_add(1, Ordering::AcqRel);

        let previous = self.inner.capture.lock().take();
        if let Some(switch) = previous {
            if !switch.wait_idle(DRAIN_TIMEOUT) {
                tracing::warn!(
                    timeout_s = DRAIN_TIMEOUT.as_secs(),
                    "Frames still in flight while closing route"
                );
            }
        }

        if let Some(route) = self.inner.route.lock().take() {
            tracing::info!(
                route = %route.name,
                points = route.log.lines_written(),
                "Route closed"
            );
        }
    }

    /// Appends a positioning sample to the open route's log while recording.
    pub fn log_position(&self, sample: &PositioningSample) -> Result<(), SessionError> {
        if !self.is_recording() {
            return Ok(());
        }
        match self.inner.route.lock().as_ref() {
            Some(route) => route.log.append(sample),
            None => Ok(()),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recording.load(Ordering::Acquire)
    }

    pub fn current_route(&self) -> Option<String> {
        self.inner.route.lock().as_ref().map(|r| r.name.clone())
    }

    /// Directory of the open route.
    pub fn current_dir(&self) -> Option<PathBuf> {
        self.inner.route.lock().as_ref().map(|r| r.dir.clone())
    }

    /// Progress of the open route, without touching the filesystem.
    pub fn state(&self) -> Option<RouteState> {
        let route = self.inner.route.lock();
        let route = route.as_ref()?;
        let frame_count = self.inner.frame_count.load(Ordering::Acquire);
        let is_recording = self.is_recording();
        Some(RouteState {
            route_name: route.name.clone(),
            is_recording,
            frame_count,
            start_time: route.start_time,
            duration_ms: estimate_duration_ms(
                frame_count,
                self.inner.native_fps,
                route.start_time,
                is_recording,
                now_ms(),
            ),
        })
    }

    pub fn last_session(&self) -> Option<LastSessionPointer> {
        LastSessionPointer::load(&self.inner.pointer_path())
    }

    /// Reads a route's stored configuration without opening it.
    pub fn route_config(&self, route: &str) -> Option<SessionConfig> {
        let path = self.route_dir(route).ok()?.join(CONFIG_FILE);
        SessionConfig::load(&path).ok()
    }

    pub fn storage_status(&self) -> StorageStatus {
        self.inner.storage_status()
    }

    /// Free bytes on the volume holding the base directory.
    pub fn available_bytes(&self) -> Option<u64> {
        self.inner.probe.available_bytes(&self.inner.base_dir)
    }

    /// Message for the current storage level, `None` when there is room.
    pub fn storage_warning(&self) -> Option<String> {
        self.inner.thresholds.message(self.storage_status())
    }

    pub fn set_warning_handler(&self, handler: impl Fn(StorageStatus, &str) + Send + Sync + 'static) {
        *self.inner.warning_handler.write() = Some(Arc::new(handler));
    }

    /// Removes a route and everything in it.
    ///
    /// The directory is first renamed to a hidden tombstone, so the route
    /// disappears at once even if the recursive removal is interrupted.
    pub fn delete_route(&self, route: &str) -> Result<(), SessionError> {
        let dir = self.route_dir(route)?;
        if self.current_route().as_deref() == Some(route) {
            self.close();
        }
        if !dir.is_dir() {
            return Err(SessionError::RouteNotFound(route.to_string()));
        }

        // the route name is left out so any valid name fits
        let tombstone = self.inner.base_dir.join(format!(
            ".deleted-{}-{}",
            now_ms(),
            TOMBSTONES.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::rename(&dir, &tombstone)?;
        std::fs::remove_dir_all(&tombstone)?;

        if self
            .last_session()
            .is_some_and(|pointer| pointer.route_name == route)
        {
            match std::fs::remove_file(self.inner.pointer_path()) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(route, "Route deleted");
        Ok(())
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_dir", &self.inner.base_dir)
            .field("route", &self.current_route())
            .field("recording", &self.is_recording())
            .finish()
    }
}

/// Route names become directory names directly below the base directory.
pub fn validate_route_name(route: &str) -> Result<(), SessionError> {
    let invalid = route.is_empty()
        || route.len() > 255
        || route.starts_with('.')
        || route.contains(['/', '\\', '\0']);
    if invalid {
        return Err(SessionError::InvalidRouteName(route.to_string()));
    }
    Ok(())
}

/// Counts stored frames in a route directory.
fn count_frames(dir: &Path) -> Result<u64, SessionError> {
    let mut frames = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext));
        if is_frame && path.is_file() {
            frames += 1;
        }
    }
    Ok(frames)
}

/// Loads a route's config, migrating legacy fields. A missing, unparsable
/// or invalid config is replaced by the default and persisted.
fn load_or_repair_config(
    path: &Path,
    route: &str,
    now: i64,
) -> Result<SessionConfig, SessionError> {
    let parsed = match std::fs::read_to_string(path) {
        Ok(text) => SessionConfig::from_json(&text)
            .map_err(|e| e.to_string())
            .and_then(|config| {
                if config.frame_skip >= 1 {
                    Ok(config)
                } else {
                    Err("frameSkip must be at least 1".to_string())
                }
            }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err("missing".to_string()),
        Err(e) => return Err(e.into()),
    };

    match parsed {
        Ok(config) => match config.migrate_legacy() {
            Some(migrated) => {
                tracing::info!(
                    route,
                    target_fps = ?config.target_fps,
                    skip = migrated.frame_skip,
                    "Converted legacy frame rate to skip factor"
                );
                migrated.save(path)?;
                Ok(migrated)
            }
            None => Ok(config),
        },
        Err(reason) => {
            tracing::warn!(route, reason = %reason, "Route config replaced with defaults");
            let config = SessionConfig::new(route, 1, now);
            config.save(path)?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ChromaLayout, PipelineConfig, RawFrame};
    use crate::metadata::{DeviceInfo, MetadataEmbedder};
    use crate::pipeline::{CapturePipeline, CapturedFrame, PipelineError};
    use crate::scheduler::FrameDecision;
    use crate::sensors::fixtures::sample_fix;
    use crate::sensors::SensorHub;
    use crate::session::storage::{StaticStorageProbe, GIB};
    use chrono::FixedOffset;
    use crossbeam_channel::{bounded, Receiver};

    struct Discard;

    impl FrameProcessor for Discard {
        fn process(&self, frame: RawFrame) -> Result<CapturedFrame, PipelineError> {
            Ok(CapturedFrame {
                timestamp_ms: frame.timestamp_ms(),
                path: PathBuf::new(),
                bytes: 0,
            })
        }
    }

    /// Holds every frame until the gate is signalled.
    struct Gated {
        gate: Receiver<()>,
    }

    impl FrameProcessor for Gated {
        fn process(&self, frame: RawFrame) -> Result<CapturedFrame, PipelineError> {
            let _ = self.gate.recv();
            Discard.process(frame)
        }
    }

    fn frame(timestamp_ms: i64) -> RawFrame {
        RawFrame::new(
            vec![100; 16 * 16],
            vec![128; 64],
            vec![128; 64],
            16,
            16,
            ChromaLayout::Planar,
            timestamp_ms,
        )
    }

    fn manager(base: &Path, available: u64) -> (SessionManager, Arc<StaticStorageProbe>) {
        let probe = Arc::new(StaticStorageProbe::new(available));
        let manager =
            SessionManager::new(base, probe.clone(), StorageThresholds::default()).unwrap();
        (manager, probe)
    }

    fn write_config(base: &Path, route: &str, json: &str) {
        let dir = base.join(route);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE), json).unwrap();
    }

    #[test]
    fn test_record_and_resume_route() {
        let base = tempfile::tempdir().unwrap();
        let (session, _) = manager(base.path(), 100 * GIB);

        let config = session.open("A", 1).unwrap();
        assert_eq!(config.frame_skip, 1);
        let stored = SessionConfig::load(&base.path().join("A").join(CONFIG_FILE)).unwrap();
        assert_eq!(stored.frame_skip, 1);

        let scheduler = FrameScheduler::new(6, 30).unwrap();
        let embedder = MetadataEmbedder::new(DeviceInfo::default(), FixedOffset::east_opt(0).unwrap());
        let pipeline = Arc::new(
            CapturePipeline::new(
                session.route_dir("A").unwrap(),
                &PipelineConfig::default(),
                embedder,
                Arc::new(SensorHub::new()),
            )
            .unwrap(),
        );
        session
            .start_capture(&scheduler, pipeline.clone(), None)
            .unwrap();

        for ts in [1_700_000_000_000, 1_700_000_000_033, 1_700_000_000_066] {
            scheduler.on_frame(frame(ts));
        }
        assert!(scheduler.wait_idle(Duration::from_secs(10)));
        pipeline.drain();

        let state = session.state().unwrap();
        assert_eq!(state.frame_count, 3);
        assert_eq!(state.duration_ms, 100);
        assert_eq!(count_frames(&base.path().join("A")).unwrap(), 3);

        session.close();
        assert!(session.state().is_none());

        session.open("A", 4).unwrap();
        assert_eq!(session.state().unwrap().frame_count, 3);
        session.open("A", 4).unwrap();
        assert_eq!(session.state().unwrap().frame_count, 3);
        assert_eq!(session.route_config("A").unwrap().frame_skip, 1);
    }

    #[test]
    fn test_legacy_configs_migrated_and_persisted() {
        let base = tempfile::tempdir().unwrap();
        write_config(base.path(), "fifteen", r#"{"frameSkip":1,"targetFPS":15,"sessionName":"fifteen","createdAt":1}"#);
        write_config(base.path(), "five", r#"{"targetFPS":5,"sessionName":"five","createdAt":1}"#);
        let (session, _) = manager(base.path(), 100 * GIB);

        assert_eq!(session.open("fifteen", 1).unwrap().frame_skip, 2);
        assert_eq!(session.route_config("fifteen").unwrap().frame_skip, 2);
        assert_eq!(session.open("five", 1).unwrap().frame_skip, 6);
    }

    #[test]
    fn test_corrupt_or_missing_config_repaired() {
        let base = tempfile::tempdir().unwrap();
        write_config(base.path(), "corrupt", "{ this is not json");
        write_config(base.path(), "zero", r#"{"frameSkip":0,"sessionName":"zero","createdAt":1}"#);
        std::fs::create_dir_all(base.path().join("bare")).unwrap();
        let (session, _) = manager(base.path(), 100 * GIB);

        for route in ["corrupt", "zero", "bare"] {
            assert_eq!(session.open(route, 3).unwrap().frame_skip, 1);
            assert_eq!(session.route_config(route).unwrap().frame_skip, 1);
        }
    }

    #[test]
    fn test_low_storage_pauses_at_check() {
        let base = tempfile::tempdir().unwrap();
        let (session, _) = manager(base.path(), GIB + GIB / 2);
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&warnings);
        session.set_warning_handler(move |status, message| {
            sink.lock().push((status, message.to_string()));
        });

        session.open("A", 1).unwrap();
        let scheduler = FrameScheduler::new(6, 30).unwrap();
        session
            .start_capture(&scheduler, Arc::new(Discard), None)
            .unwrap();
        assert!(session.last_session().unwrap().is_recording);

        for ts in 1..100 {
            scheduler.on_frame(frame(ts));
            assert!(scheduler.wait_idle(Duration::from_secs(5)));
        }
        assert!(session.is_recording());

        scheduler.on_frame(frame(100));
        assert!(scheduler.wait_idle(Duration::from_secs(5)));

        assert!(!session.is_recording());
        assert!(!scheduler.is_capturing());
        assert_eq!(session.state().unwrap().frame_count, 100);
        assert!(!session.last_session().unwrap().is_recording);
        assert_eq!(
            warnings.lock().as_slice(),
            &[(
                StorageStatus::Critical,
                "Critical: Less than 2GB storage remaining!".to_string()
            )]
        );
    }

    #[test]
    fn test_low_storage_warns_without_pausing() {
        let base = tempfile::tempdir().unwrap();
        let (session, _) = manager(base.path(), 5 * GIB);
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&warnings);
        session.set_warning_handler(move |status, message| {
            sink.lock().push((status, message.to_string()));
        });

        session.open("A", 1).unwrap();
        let scheduler = FrameScheduler::new(6, 30).unwrap();
        session
            .start_capture(&scheduler, Arc::new(Discard), None)
            .unwrap();

        for ts in 1..=100 {
            scheduler.on_frame(frame(ts));
            assert!(scheduler.wait_idle(Duration::from_secs(5)));
        }

        assert!(session.is_recording());
        assert!(scheduler.is_capturing());
        assert_eq!(session.state().unwrap().frame_count, 100);
        assert!(session.last_session().unwrap().is_recording);
        assert_eq!(
            warnings.lock().as_slice(),
            &[(
                StorageStatus::Low,
                "Warning: Less than 10GB storage remaining".to_string()
            )]
        );
    }

    #[test]
    fn test_late_frame_stays_with_its_route() {
        let base = tempfile::tempdir().unwrap();
        let (session, _) = manager(base.path(), 100 * GIB);
        session.open("A", 1).unwrap();

        let scheduler = FrameScheduler::new(2, 30).unwrap();
        let (gate_tx, gate_rx) = bounded::<()>(0);
        session
            .start_capture(&scheduler, Arc::new(Gated { gate: gate_rx }), None)
            .unwrap();
        assert_eq!(scheduler.on_frame(frame(1)), FrameDecision::Dispatched);

        let release = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            gate_tx.send(()).unwrap();
        });
        session.open("B", 1).unwrap();
        release.join().unwrap();
        assert!(scheduler.wait_idle(Duration::from_secs(5)));

        let state = session.state().unwrap();
        assert_eq!(state.route_name, "B");
        assert_eq!(state.frame_count, 0);
        assert_eq!(count_frames(&base.path().join("B")).unwrap(), 0);
    }

    #[test]
    fn test_storage_warning_levels() {
        let base = tempfile::tempdir().unwrap();
        let (session, probe) = manager(base.path(), 50 * GIB);
        assert_eq!(session.storage_warning(), None);

        probe.set(5 * GIB);
        assert_eq!(session.storage_status(), StorageStatus::Low);
        assert_eq!(
            session.storage_warning().as_deref(),
            Some("Warning: Less than 10GB storage remaining")
        );

        probe.set(GIB);
        assert_eq!(session.storage_status(), StorageStatus::Critical);
    }

    #[test]
    fn test_positions_logged_only_while_recording() {
        let base = tempfile::tempdir().unwrap();
        let (session, _) = manager(base.path(), 100 * GIB);
        session.open("A", 1).unwrap();
        let points = base.path().join("A").join(POINTS_FILE);

        session.log_position(&sample_fix()).unwrap();
        assert_eq!(std::fs::read_to_string(&points).unwrap(), "");

        let scheduler = FrameScheduler::new(2, 30).unwrap();
        session
            .start_capture(&scheduler, Arc::new(Discard), None)
            .unwrap();
        session.log_position(&sample_fix()).unwrap();
        session.pause();
        session.log_position(&sample_fix()).unwrap();

        assert_eq!(std::fs::read_to_string(&points).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_pointer_follows_lifecycle() {
        let base = tempfile::tempdir().unwrap();
        let (session, _) = manager(base.path(), 100 * GIB);
        assert!(session.last_session().is_none());

        session.open("A", 1).unwrap();
        let pointer = session.last_session().unwrap();
        assert_eq!(pointer.route_name, "A");
        assert!(!pointer.is_recording);

        let scheduler = FrameScheduler::new(2, 30).unwrap();
        session
            .start_capture(&scheduler, Arc::new(Discard), None)
            .unwrap();
        assert!(session.last_session().unwrap().is_recording);

        session.pause();
        assert!(!session.last_session().unwrap().is_recording);
        assert!(!scheduler.is_capturing());
    }

    #[test]
    fn test_start_capture_requires_open_route() {
        let base = tempfile::tempdir().unwrap();
        let (session, _) = manager(base.path(), 100 * GIB);
        let scheduler = FrameScheduler::new(2, 30).unwrap();
        assert!(matches!(
            session.start_capture(&scheduler, Arc::new(Discard), None),
            Err(SessionError::NoOpenRoute)
        ));
    }

    #[test]
    fn test_delete_route() {
        let base = tempfile::tempdir().unwrap();
        let (session, _) = manager(base.path(), 100 * GIB);
        session.open("A", 1).unwrap();
        session.open("B", 1).unwrap();
        assert_eq!(session.list_routes().unwrap(), vec!["A", "B"]);

        session.delete_route("B").unwrap();
        assert!(session.current_route().is_none());
        assert!(session.last_session().is_none());
        assert_eq!(session.list_routes().unwrap(), vec!["A"]);
        // no tombstone left behind
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 1);

        assert!(matches!(
            session.delete_route("B"),
            Err(SessionError::RouteNotFound(_))
        ));
    }

    #[test]
    fn test_delete_longest_route_names() {
        let base = tempfile::tempdir().unwrap();
        let (session, _) = manager(base.path(), 100 * GIB);
        let long = "r".repeat(240);
        session.open(&long, 1).unwrap();
        session.open("A", 1).unwrap();

        session.delete_route(&long).unwrap();
        assert_eq!(session.list_routes().unwrap(), vec!["A"]);
        assert!(!base.path().join(&long).exists());
        // only the route and the session pointer remain
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_route_names_validated() {
        let base = tempfile::tempdir().unwrap();
        let (session, _) = manager(base.path(), 100 * GIB);
        for name in ["", ".", "..", ".hidden", "a/b", "a\\b"] {
            assert!(matches!(
                session.open(name, 1),
                Err(SessionError::InvalidRouteName(_))
            ));
        }
    }
}
