//! Session lifecycle orchestration.
//!
//! [`SessionRecorder`] is the surface the browser bridge talks to. It owns
//! the session timeline and the screenshot scheduler, forwards every
//! recording call, and manages fake-replay mode. Exactly one session can be
//! open at a time; while none is, every recording entry point is a silent
//! no-op. Calls never block or queue against a missing writer.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::error;

use crate::archive;
use crate::capture::{ScreenSource, ScreenshotScheduler};
use crate::config::RecorderConfig;
use crate::device::{DeviceCategory, DeviceDescriptor};
use crate::error::RecorderError;
use crate::events::{
    BrainSample, Dimensions, ElementGeometryUpdate, ElementMetaUpdate, EventCodec, FunctionCall,
    GazeSample, GeometryUpdate, ListenerChange, LogMarker, MouseEvent, Point, PropertyScope,
    PropertyUpdate, Region, SessionEvent, ViewportUpdate,
};
use crate::fetch::{cached_image_target, FetchPool, ResourceFetcher};
use crate::session::{generate_session_dir, Session};
use crate::timeline::{LogHeader, SessionTimeline};

/// Descriptor for a deterministic fake-replay session: a synthetic screen
/// size and start date, plus the archive the session directory is exported
/// to on stop.
#[derive(Debug, Clone)]
pub struct FakeReplay {
    pub screen: Dimensions,
    pub start_date: i64,
    pub archive_path: PathBuf,
}

/// Out-of-band commands accepted by the recorder.
#[derive(Debug, Clone, Copy)]
pub enum SpecialCommand {
    /// Pin the timeline clock to the given date (epoch millis) so the
    /// following records carry deterministic elapsed times.
    FakeNextDate(i64),
}

struct ActiveSession {
    session: Session,
    timeline: Arc<SessionTimeline>,
}

/// Records everything that happens during a browsing session.
pub struct SessionRecorder {
    config: RecorderConfig,
    /// `None` when codec setup failed at construction; the recorder is
    /// then permanently inert.
    codec: Option<Arc<EventCodec>>,
    screen: Arc<dyn ScreenSource>,
    scheduler: ScreenshotScheduler,
    region: Arc<Mutex<Option<Region>>>,
    fetch: FetchPool,
    fake_replay: Option<FakeReplay>,
    active: Mutex<Option<ActiveSession>>,
    last_mouse: Mutex<Option<Point>>,
}

impl SessionRecorder {
    /// Create a recorder wired to the given screen and fetch collaborators.
    ///
    /// Pass a [`FakeReplay`] descriptor to run in fake-replay mode: screen
    /// size and start date come from the descriptor, screenshot capture is
    /// disabled, and `stop()` exports the session directory as an archive.
    pub fn new(
        config: RecorderConfig,
        screen: Arc<dyn ScreenSource>,
        fetcher: Arc<dyn ResourceFetcher>,
        fake_replay: Option<FakeReplay>,
    ) -> Self {
        let codec = match EventCodec::with_default_converters() {
            Ok(codec) => Some(Arc::new(codec)),
            Err(e) => {
                error!("error setting up the session codec, no recording available: {}", e);
                None
            }
        };

        let region = Arc::new(Mutex::new(None));
        let scheduler = ScreenshotScheduler::new(screen.clone(), region.clone());
        let fetch = FetchPool::new(fetcher, config.fetch.workers, config.fetch.queue_size);

        Self {
            config,
            codec,
            screen,
            scheduler,
            region,
            fetch,
            fake_replay,
            active: Mutex::new(None),
            last_mouse: Mutex::new(None),
        }
    }

    /// Whether a session is currently open.
    pub fn is_active(&self) -> bool {
        self.active.lock().expect("session lock poisoned").is_some()
    }

    /// Directory of the open session, if any.
    pub fn session_dir(&self) -> Option<PathBuf> {
        self.active
            .lock()
            .expect("session lock poisoned")
            .as_ref()
            .map(|active| active.session.dir.clone())
    }

    /// Open a new session.
    ///
    /// Resolves the session directory (configured, or a generated temp
    /// path), determines the effective screen size and start reference
    /// (from the fake-replay descriptor when present, else the live
    /// display and wall clock) and opens exactly one timeline writer at
    /// `<dir>/session.<startMillis>.ndjson`.
    ///
    /// # Errors
    ///
    /// Fails when codec setup failed at construction, when a session is
    /// already active, or when the directory or log file cannot be created.
    pub fn start(&self) -> Result<(), RecorderError> {
        let codec = self
            .codec
            .clone()
            .ok_or(RecorderError::SerializationSetup)?;

        let mut active = self.active.lock().expect("session lock poisoned");
        if active.is_some() {
            // The source silently replaced the writer here, orphaning the
            // previous one; we reject instead.
            return Err(RecorderError::SessionActive);
        }

        let dir = self
            .config
            .session
            .directory
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(generate_session_dir);
        fs::create_dir_all(&dir).map_err(|source| RecorderError::SessionDirectory {
            dir: dir.display().to_string(),
            source,
        })?;

        let (screen, start_reference) = match &self.fake_replay {
            Some(replay) => (replay.screen, replay.start_date),
            None => (
                self.screen.screen_size().unwrap_or_default(),
                Utc::now().timestamp_millis(),
            ),
        };

        let session = Session::new(dir.clone(), start_reference, self.fake_replay.is_some());
        let timeline = Arc::new(SessionTimeline::open(
            codec,
            &session.log_path(),
            LogHeader::new(screen, start_reference),
        )?);

        if session.fake_replay {
            // Replay starts at the synthetic date; elapsed times are
            // driven by fake-next-date commands from there on.
            timeline.override_clock(start_reference);
        } else {
            self.scheduler.attach(timeline.clone(), dir);
        }

        *active = Some(ActiveSession { session, timeline });
        Ok(())
    }

    /// Close the open session.
    ///
    /// Blocks until the timeline writer has flushed everything it accepted
    /// before this call and cancels pending screenshot work. In fake-replay
    /// mode the session directory is then archived to the replay
    /// descriptor's target path. A no-op when no session is open.
    pub fn stop(&self) -> Result<(), RecorderError> {
        let taken = self
            .active
            .lock()
            .expect("session lock poisoned")
            .take();
        let Some(active) = taken else {
            return Ok(());
        };

        self.scheduler.detach();
        active.timeline.close()?;

        if let Some(replay) = &self.fake_replay {
            archive::archive_dir(&active.session.dir, &replay.archive_path)
                .map_err(RecorderError::Archive)?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Recording entry points (no-ops while no session is active)
    // ------------------------------------------------------------------

    fn record(&self, observed: i64, event: SessionEvent) {
        if let Some(active) = self.active.lock().expect("session lock poisoned").as_ref() {
            active.timeline.append(observed, event);
        }
    }

    /// Insert a free-form marker into the log.
    pub fn mark_log(&self, tag: &str) {
        self.record(0, SessionEvent::Marker(LogMarker { tag: tag.into() }));
    }

    /// Record a mouse click.
    pub fn mouse_clicked(&self, kind: i32, button: i32) {
        self.record(0, SessionEvent::Mouse(MouseEvent::Click { kind, button }));
    }

    /// Record a mouse move. Consecutive identical positions are dropped.
    pub fn update_mouse_position(&self, x: i32, y: i32) {
        let position = Point::new(x, y);
        {
            let mut last = self.last_mouse.lock().expect("mouse lock poisoned");
            if *last == Some(position) {
                return;
            }
            *last = Some(position);
        }
        self.record(0, SessionEvent::Mouse(MouseEvent::Move { x, y }));
    }

    /// Record the document's position on screen and schedule a screenshot.
    pub fn update_geometry(&self, bounds: Region) {
        let guard = self.active.lock().expect("session lock poisoned");
        let Some(active) = guard.as_ref() else { return };

        *self.region.lock().expect("capture region lock poisoned") = Some(bounds);
        active
            .timeline
            .append(0, SessionEvent::Geometry(GeometryUpdate { bounds }));
        self.scheduler.signal(self.config.screenshot.debounce());
    }

    /// Record the viewport scroll position and schedule a screenshot.
    pub fn update_viewport(&self, x: i32, y: i32) {
        let guard = self.active.lock().expect("session lock poisoned");
        let Some(active) = guard.as_ref() else { return };

        active
            .timeline
            .append(0, SessionEvent::Viewport(ViewportUpdate { x, y }));
        self.scheduler.signal(self.config.screenshot.debounce());
    }

    /// Request a screenshot after the short fixed delay.
    pub fn take_screenshot(&self) {
        if self.is_active() {
            self.scheduler.signal(self.config.screenshot.quick());
        }
    }

    /// Record a bridge function invocation.
    pub fn call_function(&self, function: &str) {
        self.record(
            0,
            SessionEvent::FunctionCall(FunctionCall {
                name: function.into(),
                args: Vec::new(),
            }),
        );
    }

    /// Record a JavaScript function execution with stringified arguments.
    pub fn execute_js_function(&self, function: &str, args: &[String]) {
        self.record(
            0,
            SessionEvent::FunctionCall(FunctionCall {
                name: function.into(),
                args: args.to_vec(),
            }),
        );
    }

    /// Record a listener registration.
    pub fn register_listener(&self, kind: &str, listener: &str) {
        self.record(
            0,
            SessionEvent::Listener(ListenerChange::Registered {
                kind: kind.into(),
                listener: listener.into(),
            }),
        );
    }

    /// Record a listener removal.
    pub fn remove_listener(&self, listener: &str) {
        self.record(
            0,
            SessionEvent::Listener(ListenerChange::Removed {
                listener: listener.into(),
            }),
        );
    }

    /// Record a session parameter.
    pub fn set_parameter(&self, key: &str, value: &str) {
        self.record(
            0,
            SessionEvent::Property(PropertyUpdate {
                key: key.into(),
                value: value.into(),
                scope: PropertyScope::Parameter,
            }),
        );
    }

    /// Record a preference write.
    pub fn set_preference(&self, key: &str, value: &str) {
        self.record(
            0,
            SessionEvent::Property(PropertyUpdate {
                key: key.into(),
                value: value.into(),
                scope: PropertyScope::Preference,
            }),
        );
    }

    /// Record a preference read with the default the page would observe.
    pub fn get_preference(&self, key: &str, default: &str) {
        self.record(
            0,
            SessionEvent::Property(PropertyUpdate {
                key: key.into(),
                value: default.into(),
                scope: PropertyScope::Preference,
            }),
        );
    }

    /// Record metadata of a DOM element.
    pub fn update_element_meta_information(&self, id: &str, key: &str, value: &str) {
        self.record(
            0,
            SessionEvent::ElementMeta(ElementMetaUpdate {
                id: id.into(),
                key: key.into(),
                value: value.into(),
            }),
        );
    }

    /// Record a boolean flag of a DOM element.
    pub fn update_element_flag(&self, id: &str, flag: &str, value: bool) {
        self.record(
            0,
            SessionEvent::ElementMeta(ElementMetaUpdate {
                id: id.into(),
                key: flag.into(),
                value: value.to_string(),
            }),
        );
    }

    /// Record position/kind/content of a DOM element.
    ///
    /// Image elements additionally get their referenced content cached
    /// into the session directory, content-addressed by the hash of the
    /// reference string. The fetch runs in the background and never delays
    /// this call; the element update is recorded immediately either way.
    pub fn update_element_geometry(
        &self,
        id: &str,
        kind: &str,
        content: Option<&str>,
        bounds: Region,
    ) {
        let guard = self.active.lock().expect("session lock poisoned");
        let Some(active) = guard.as_ref() else { return };

        if kind == "image" {
            if let Some(reference) = content.filter(|c| !c.is_empty()) {
                let (target, hash) = cached_image_target(&active.session.dir, reference);
                self.fetch.enqueue(reference, &target, &hash);
            }
        }

        active.timeline.append(
            0,
            SessionEvent::ElementGeometry(ElementGeometryUpdate {
                id: id.into(),
                kind: kind.into(),
                content: content.map(Into::into),
                bounds,
            }),
        );
    }

    /// Record a gaze sample from the eye tracker.
    ///
    /// Stamps the local arrival time so samples without a hardware clock
    /// still resolve an observation time.
    pub fn eye_tracking_event(&self, mut sample: GazeSample) {
        if sample.arrival_time == 0 {
            sample.arrival_time = Utc::now().timestamp_millis();
        }
        let observed = sample.observation_time();
        self.record(observed, SessionEvent::Gaze(sample));
    }

    /// Record a brain-channel sample.
    pub fn brain_tracking_event(&self, sample: BrainSample) {
        let observed = sample.time;
        self.record(observed, SessionEvent::Brain(sample));
    }

    /// Record eye-tracker metadata as namespaced session properties.
    pub fn store_eye_device_info(&self, descriptor: &DeviceDescriptor) {
        self.store_device_info(DeviceCategory::EyeTracking, descriptor);
    }

    /// Record brain-tracker metadata as namespaced session properties.
    pub fn store_brain_device_info(&self, descriptor: &DeviceDescriptor) {
        self.store_device_info(DeviceCategory::BrainTracking, descriptor);
    }

    fn store_device_info(&self, category: DeviceCategory, descriptor: &DeviceDescriptor) {
        for key in descriptor.keys() {
            if let Some(value) = descriptor.info(key) {
                self.set_parameter(&format!("{}{}", category.property_prefix(), key), value);
            }
        }
    }

    /// Execute an out-of-band command.
    pub fn special_command(&self, command: SpecialCommand) {
        match command {
            SpecialCommand::FakeNextDate(date) => {
                if let Some(active) =
                    self.active.lock().expect("session lock poisoned").as_ref()
                {
                    active.timeline.override_clock(date);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, NullScreen};
    use crate::events::EventKind;
    use crate::timeline::TimelineFile;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedScreen;

    impl ScreenSource for FixedScreen {
        fn screen_size(&self) -> Option<Dimensions> {
            Some(Dimensions::new(1280, 1024))
        }

        fn grab(&self, _region: Region) -> Result<Vec<u8>, CaptureError> {
            Ok(vec![1, 2, 3])
        }
    }

    struct MemoryFetcher {
        calls: AtomicUsize,
    }

    impl MemoryFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ResourceFetcher for MemoryFetcher {
        fn fetch(&self, _reference: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(b"image".to_vec())
        }
    }

    fn recorder_in(dir: &std::path::Path) -> SessionRecorder {
        let mut config = RecorderConfig::default();
        config.session.directory = Some(dir.display().to_string());
        SessionRecorder::new(
            config,
            Arc::new(FixedScreen),
            MemoryFetcher::new(),
            None,
        )
    }

    fn decode(recorder: &SessionRecorder, path: &std::path::Path) -> TimelineFile {
        let codec = recorder.codec.as_ref().unwrap();
        TimelineFile::parse(codec, path).unwrap()
    }

    #[test]
    fn recording_calls_without_session_are_no_ops() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in(dir.path());

        recorder.mark_log("ignored");
        recorder.mouse_clicked(1, 0);
        recorder.update_viewport(0, 0);
        recorder.eye_tracking_event(GazeSample::new(Point::new(1, 1)));
        assert!(!recorder.is_active());

        // Nothing was written anywhere.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn start_records_and_stop_flushes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in(dir.path());

        recorder.start().unwrap();
        assert!(recorder.is_active());
        let log_path = {
            let guard = recorder.active.lock().unwrap();
            guard.as_ref().unwrap().session.log_path()
        };

        recorder.mark_log("begin");
        recorder.mouse_clicked(1, 0);
        recorder.update_mouse_position(5, 6);
        recorder.set_parameter("browser", "firefox");
        recorder.stop().unwrap();
        assert!(!recorder.is_active());

        let file = decode(&recorder, &log_path);
        assert_eq!(file.records.len(), 4);
        assert!(matches!(file.records[0].event, SessionEvent::Marker(_)));
        assert!(matches!(file.records[3].event, SessionEvent::Property(_)));
        assert_eq!(file.header.screen, Dimensions::new(1280, 1024));
    }

    #[test]
    fn start_while_active_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in(dir.path());

        recorder.start().unwrap();
        assert!(matches!(
            recorder.start(),
            Err(RecorderError::SessionActive)
        ));
        recorder.stop().unwrap();
    }

    #[test]
    fn stop_without_session_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in(dir.path());
        recorder.stop().unwrap();
    }

    #[test]
    fn repeated_mouse_positions_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in(dir.path());

        recorder.start().unwrap();
        let log_path = recorder.session_dir().unwrap();
        recorder.update_mouse_position(10, 10);
        recorder.update_mouse_position(10, 10);
        recorder.update_mouse_position(11, 10);
        recorder.stop().unwrap();

        let log = std::fs::read_dir(&log_path)
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().starts_with("session."))
            .unwrap();
        let file = decode(&recorder, &log.path());
        assert_eq!(file.records_of(EventKind::Mouse).len(), 2);
    }

    #[test]
    fn device_info_is_flattened_into_namespaced_properties() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in(dir.path());

        let mut descriptor = DeviceDescriptor::new();
        descriptor.insert("DEVICE_NAME", "EyeX");
        descriptor.insert("HARDWARE_ID", "0xBEEF");

        recorder.start().unwrap();
        let log_path = {
            let guard = recorder.active.lock().unwrap();
            guard.as_ref().unwrap().session.log_path()
        };
        recorder.store_eye_device_info(&descriptor);
        recorder.store_brain_device_info(&descriptor);
        recorder.stop().unwrap();

        let file = decode(&recorder, &log_path);
        let properties = file.records_of(EventKind::Property);
        // Two known keys per category; the absent manufacturer is skipped.
        assert_eq!(properties.len(), 4);

        let keys: Vec<String> = properties
            .iter()
            .filter_map(|r| match &r.event {
                SessionEvent::Property(p) => Some(p.key.clone()),
                _ => None,
            })
            .collect();
        assert!(keys.contains(&"#deviceinfo.DEVICE_NAME".to_string()));
        assert!(keys.contains(&"#braindeviceinfo.HARDWARE_ID".to_string()));
    }

    #[test]
    fn image_elements_enqueue_a_content_addressed_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RecorderConfig::default();
        config.session.directory = Some(dir.path().display().to_string());
        let fetcher = MemoryFetcher::new();
        let recorder = SessionRecorder::new(
            config,
            Arc::new(FixedScreen),
            fetcher.clone(),
            None,
        );

        recorder.start().unwrap();
        let session_dir = recorder.session_dir().unwrap();
        let reference = "http://example.org/banner.png";
        recorder.update_element_geometry("img1", "image", Some(reference), Region::new(0, 0, 10, 10));

        // The element update is recorded immediately, before the fetch lands.
        let (target, _) = cached_image_target(&session_dir, reference);
        for _ in 0..100 {
            if target.exists() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(target.exists());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        // A second reference to the same content is not refetched.
        recorder.update_element_geometry("img2", "image", Some(reference), Region::new(5, 5, 10, 10));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        recorder.stop().unwrap();
    }

    #[test]
    fn serialization_setup_failure_disables_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder_in(dir.path());
        recorder.codec = None;

        assert!(matches!(
            recorder.start(),
            Err(RecorderError::SerializationSetup)
        ));
    }

    #[test]
    fn fake_replay_uses_synthetic_screen_and_date() {
        let session_dir = tempfile::tempdir().unwrap();
        let export_dir = tempfile::tempdir().unwrap();
        let archive_path = export_dir.path().join("replay.zip");

        let mut config = RecorderConfig::default();
        config.session.directory = Some(session_dir.path().display().to_string());
        let replay = FakeReplay {
            screen: Dimensions::new(800, 600),
            start_date: 1_600_000_000_000,
            archive_path: archive_path.clone(),
        };
        let recorder = SessionRecorder::new(
            config,
            Arc::new(NullScreen),
            MemoryFetcher::new(),
            Some(replay),
        );

        recorder.start().unwrap();
        let log_path = {
            let guard = recorder.active.lock().unwrap();
            guard.as_ref().unwrap().session.log_path()
        };
        recorder.mark_log("replayed");
        recorder.special_command(SpecialCommand::FakeNextDate(1_600_000_000_500));
        recorder.mark_log("later");
        recorder.stop().unwrap();

        let file = decode(&recorder, &log_path);
        assert_eq!(file.header.screen, Dimensions::new(800, 600));
        assert_eq!(file.header.timestamp, 1_600_000_000_000);
        assert_eq!(file.records[0].elapsed, 0);
        assert_eq!(file.records[1].elapsed, 500);

        // stop() exported the whole session directory.
        assert!(archive_path.exists());
    }
}
