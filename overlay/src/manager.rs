//! Session orchestration: launch, locate, strip, place, synchronize, tear
//! down.
//!
//! One manager drives one external window. The lifecycle is a small state
//! machine; every transition is reported through an optional callback, and
//! failures additionally reach an error callback as a human-readable
//! message. Neither callback may take the session down: panics from caller
//! code are caught and logged.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::config::OverlaySettings;
use crate::decorations::DecorationRemover;
use crate::error::OverlayError;
use crate::geometry::{ChromeOffsets, ContainerBounds, CoordinateSystem};
use crate::platform::{create_backend, PlatformError, WindowBackend, WindowInfo};
use crate::process::ViewerProcess;
use crate::sync::{PerformanceMetrics, PositionSyncEngine};
use crate::tracker::WindowTracker;

/// Session lifecycle. `Error` is terminal until the next `load_document`,
/// which forces a stop first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayState {
    Idle,
    Launching,
    Positioning,
    Ready,
    Error,
    Stopping,
}

pub type StateCallback = Box<dyn Fn(OverlayState) + Send>;
pub type ErrorCallback = Box<dyn Fn(&str) + Send>;

/// Diagnostic snapshot for hosts and tests; never used for control flow.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: OverlayState,
    pub document: Option<PathBuf>,
    pub pid: Option<u32>,
    pub window: Option<WindowInfo>,
    pub container_bounds: Option<ContainerBounds>,
    pub window_position: Option<(i32, i32)>,
    pub chrome_offsets: ChromeOffsets,
    pub zoom: f64,
    pub metrics: Option<PerformanceMetrics>,
}

pub struct OverlayManager {
    backend: Arc<dyn WindowBackend>,
    settings: OverlaySettings,
    coords: CoordinateSystem,
    tracker: WindowTracker,
    decorations: DecorationRemover,
    engine: PositionSyncEngine,
    state: OverlayState,
    document: Option<PathBuf>,
    process: Option<ViewerProcess>,
    window: Option<WindowInfo>,
    state_cb: Option<StateCallback>,
    error_cb: Option<ErrorCallback>,
}

impl OverlayManager {
    /// Manager with the native backend for this platform.
    pub fn new(settings: OverlaySettings) -> Result<Self, OverlayError> {
        let backend = create_backend()?;
        Ok(Self::with_backend(backend, settings))
    }

    /// Manager over an explicit backend. Hosts use this for dependency
    /// injection; tests use it with a mock.
    pub fn with_backend(backend: Arc<dyn WindowBackend>, settings: OverlaySettings) -> Self {
        Self {
            tracker: WindowTracker::new(Arc::clone(&backend), settings.discovery_poll()),
            decorations: DecorationRemover::new(Arc::clone(&backend)),
            engine: PositionSyncEngine::new(Arc::clone(&backend), &settings),
            backend,
            settings,
            coords: CoordinateSystem::new(),
            state: OverlayState::Idle,
            document: None,
            process: None,
            window: None,
            state_cb: None,
            error_cb: None,
        }
    }

    pub fn set_callbacks(
        &mut self,
        state_cb: Option<StateCallback>,
        error_cb: Option<ErrorCallback>,
    ) {
        self.state_cb = state_cb;
        self.error_cb = error_cb;
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    fn set_state(&mut self, state: OverlayState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?state, "State transition");
        self.state = state;
        if let Some(cb) = &self.state_cb {
            if catch_unwind(AssertUnwindSafe(|| cb(state))).is_err() {
                tracing::error!("State callback panicked");
            }
        }
    }

    fn report_error(&mut self, message: &str) {
        tracing::error!("{message}");
        if let Some(cb) = &self.error_cb {
            if catch_unwind(AssertUnwindSafe(|| cb(message))).is_err() {
                tracing::error!("Error callback panicked");
            }
        }
    }

    fn fail(&mut self, err: OverlayError) -> OverlayError {
        self.report_error(&err.to_string());
        // release whatever the partial session acquired; the state itself
        // stays Error until the next load_document or stop
        self.engine.stop();
        if let Some(info) = self.window.take() {
            self.decorations.restore_decorations(info.id);
        }
        if let Some(mut process) = self.process.take() {
            process.terminate(self.settings.terminate_timeout());
        }
        self.document = None;
        self.set_state(OverlayState::Error);
        err
    }

    /// Launch the viewer for `path` and bring its window under the
    /// container. Returns `Ok` only once the session is `Ready`.
    pub fn load_document(
        &mut self,
        path: &Path,
        bounds: ContainerBounds,
    ) -> Result<(), OverlayError> {
        // Path validation precedes the state machine: nothing was spawned,
        // so a bad path leaves (or returns) the manager Idle.
        if !path.exists() {
            if self.state != OverlayState::Idle {
                self.stop();
            }
            let err = OverlayError::DocumentNotFound {
                path: path.to_path_buf(),
            };
            self.report_error(&err.to_string());
            return Err(err);
        }

        if self.state != OverlayState::Idle {
            self.stop();
        }

        self.coords.update_container_bounds(bounds);
        if self.coords.window_position().is_none() {
            // host never reported its position; assume origin until the
            // first update_window_position arrives
            tracing::debug!("Host window position unknown; assuming (0, 0)");
            self.coords.update_window_position(0, 0);
        }
        self.document = Some(path.to_path_buf());

        self.set_state(OverlayState::Launching);
        let process = match ViewerProcess::spawn(&self.settings.viewer_command, path) {
            Ok(p) => p,
            Err(e) => return Err(self.fail(e)),
        };
        let pid = process.pid();
        self.process = Some(process);

        let title_hint = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let info = match self
            .tracker
            .find_window(pid, &title_hint, self.settings.discovery_timeout())
        {
            Some(info) => info,
            None => {
                return Err(self.fail(OverlayError::WindowNotFound {
                    pid,
                    timeout_ms: self.settings.discovery_timeout_ms,
                }))
            }
        };

        self.set_state(OverlayState::Positioning);

        // cosmetic: an undecorated session is still a working session
        if let Err(e) = self.decorations.remove_decorations(info.id) {
            tracing::warn!(window = %info.id, error = %e, "Proceeding with decorations intact");
        }
        if self.settings.always_on_top {
            self.decorations.set_always_on_top(info.id, true);
        }

        let Some(pos) = self.coords.calculate_screen_position() else {
            // unreachable in practice: bounds and window position are
            // seeded before launch
            return Err(self.fail(OverlayError::PositioningFailure(
                PlatformError::CallFailed("geometry not seeded".into()),
            )));
        };
        if let Err(e) = self.backend.move_resize(info.id, &pos) {
            self.window = Some(info);
            return Err(self.fail(OverlayError::PositioningFailure(e)));
        }

        self.engine.start(info.id);
        self.engine.update_position(pos);
        self.window = Some(info);
        self.set_state(OverlayState::Ready);
        tracing::info!(document = %path.display(), pid, "Overlay session ready");
        Ok(())
    }

    /// Reactive entry point for host UI resize/scroll events.
    pub fn update_container_bounds(&mut self, bounds: ContainerBounds) {
        self.coords.update_container_bounds(bounds);
        self.push_position();
    }

    /// Reactive entry point for host window moves.
    pub fn update_window_position(&mut self, x: i32, y: i32) {
        self.coords.update_window_position(x, y);
        self.push_position();
    }

    pub fn update_zoom_level(&mut self, zoom: f64) {
        self.coords.update_zoom_level(zoom);
        self.push_position();
    }

    fn push_position(&mut self) {
        if self.state != OverlayState::Ready {
            return;
        }
        if let Some(pos) = self.coords.calculate_screen_position() {
            self.engine.update_position(pos);
        }
    }

    /// Tear the session down. Safe from any state; a no-op when Idle.
    pub fn stop(&mut self) {
        if self.state == OverlayState::Idle {
            return;
        }
        self.set_state(OverlayState::Stopping);

        self.engine.stop();
        if let Some(info) = self.window.take() {
            self.decorations.restore_decorations(info.id);
        }
        if let Some(mut process) = self.process.take() {
            process.terminate(self.settings.terminate_timeout());
        }
        self.document = None;
        self.set_state(OverlayState::Idle);
    }

    pub fn set_smoothing(&self, enabled: bool, factor: f64) {
        self.engine.set_smoothing(enabled, factor);
    }

    pub fn set_prediction(&self, enabled: bool) {
        self.engine.set_prediction(enabled);
    }

    pub fn get_status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            document: self.document.clone(),
            pid: self.process.as_ref().map(|p| p.pid()),
            window: self.window.clone(),
            container_bounds: self.coords.container_bounds(),
            window_position: self.coords.window_position(),
            chrome_offsets: self.coords.chrome_offsets(),
            zoom: self.coords.zoom_level(),
            metrics: (self.state == OverlayState::Ready).then(|| self.engine.get_metrics()),
        }
    }
}

impl Drop for OverlayManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockBackend;
    use crate::platform::WindowId;
    use std::sync::Mutex;
    use std::time::Duration;

    fn bounds() -> ContainerBounds {
        ContainerBounds {
            x: 100.0,
            y: 50.0,
            width: 800.0,
            height: 600.0,
        }
    }

    fn test_settings() -> OverlaySettings {
        OverlaySettings {
            viewer_command: vec!["sh".to_string(), "-c".to_string(), "sleep 30".to_string()],
            discovery_timeout_ms: 400,
            discovery_poll_ms: 50,
            smoothing: false,
            prediction: false,
            ..OverlaySettings::default()
        }
    }

    fn temp_document(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("perch-test-{}-{name}", std::process::id()));
        std::fs::write(&path, b"dummy").unwrap();
        path
    }

    #[test]
    fn missing_document_fails_immediately_and_stays_idle() {
        let backend = Arc::new(MockBackend::new());
        let mut manager = OverlayManager::with_backend(backend.clone(), test_settings());

        let err = manager
            .load_document(Path::new("/nonexistent/never/doc.pdf"), bounds())
            .unwrap_err();

        assert!(matches!(err, OverlayError::DocumentNotFound { .. }));
        assert_eq!(manager.state(), OverlayState::Idle);
        assert!(manager.get_status().pid.is_none());
        assert_eq!(backend.moves(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn discovery_timeout_lands_in_error_and_stop_recovers() {
        let backend = Arc::new(MockBackend::new());
        let mut manager = OverlayManager::with_backend(backend, test_settings());
        let doc = temp_document("timeout");

        let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        manager.set_callbacks(None, Some(Box::new(move |m| sink.lock().unwrap().push(m.to_string()))));

        let err = manager.load_document(&doc, bounds()).unwrap_err();
        assert!(matches!(err, OverlayError::WindowNotFound { .. }));
        assert_eq!(manager.state(), OverlayState::Error);
        // viewer was reaped on failure
        assert!(manager.get_status().pid.is_none());
        assert!(!errors.lock().unwrap().is_empty());

        manager.stop();
        assert_eq!(manager.state(), OverlayState::Idle);
        std::fs::remove_file(doc).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn full_session_reaches_ready_and_tears_down() {
        let backend = Arc::new(MockBackend::new());
        let mut manager = OverlayManager::with_backend(backend.clone(), test_settings());
        let doc = temp_document("session.pdf");

        // the viewer window appears under a forked pid; the title hint
        // strategy picks it up
        backend.add_window(WindowInfo {
            id: WindowId(7),
            pid: 999_999,
            title: doc.file_name().unwrap().to_string_lossy().to_string(),
            class_name: "viewer".to_string(),
        });

        let states: Arc<Mutex<Vec<OverlayState>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        manager.set_callbacks(
            Some(Box::new(move |s| sink.lock().unwrap().push(s))),
            None,
        );

        manager.load_document(&doc, bounds()).unwrap();
        assert_eq!(manager.state(), OverlayState::Ready);

        let status = manager.get_status();
        assert!(status.pid.is_some());
        assert_eq!(status.window.as_ref().unwrap().id, WindowId(7));
        assert!(status.metrics.is_some());

        // initial placement: chrome defaults + container at zoom 1
        let placed = backend.last_moved.lock().unwrap().unwrap();
        assert_eq!(placed.width, 800);
        assert_eq!(placed.height, 600);
        // decorations were stripped once
        assert_eq!(backend.applied().len(), 1);

        manager.stop();
        assert_eq!(manager.state(), OverlayState::Idle);
        assert_eq!(backend.restored().len(), 1);
        assert_eq!(
            *states.lock().unwrap(),
            vec![
                OverlayState::Launching,
                OverlayState::Positioning,
                OverlayState::Ready,
                OverlayState::Stopping,
                OverlayState::Idle,
            ]
        );
        std::fs::remove_file(doc).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn rapid_bounds_updates_settle_on_latest_value() {
        let backend = Arc::new(MockBackend::new());
        let mut manager = OverlayManager::with_backend(backend.clone(), test_settings());
        let doc = temp_document("rapid.pdf");
        backend.add_window(WindowInfo {
            id: WindowId(7),
            pid: 999_999,
            title: doc.file_name().unwrap().to_string_lossy().to_string(),
            class_name: "viewer".to_string(),
        });

        manager.load_document(&doc, bounds()).unwrap();

        manager.update_container_bounds(ContainerBounds {
            x: 0.0,
            y: 0.0,
            width: 300.0,
            height: 300.0,
        });
        std::thread::sleep(Duration::from_millis(10));
        manager.update_container_bounds(ContainerBounds {
            x: 400.0,
            y: 400.0,
            width: 500.0,
            height: 500.0,
        });
        std::thread::sleep(Duration::from_millis(150));

        let applied = backend.last_moved.lock().unwrap().unwrap();
        let offsets = manager.get_status().chrome_offsets;
        assert_eq!(applied.x, offsets.left + 400);
        assert_eq!(applied.y, offsets.top + 400);
        assert_eq!(applied.width, 500);

        manager.stop();
        std::fs::remove_file(doc).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn panicking_callbacks_are_contained() {
        let backend = Arc::new(MockBackend::new());
        let mut manager = OverlayManager::with_backend(backend, test_settings());
        manager.set_callbacks(
            Some(Box::new(|_| panic!("host bug"))),
            Some(Box::new(|_| panic!("host bug"))),
        );

        // the pre-launch path only fires the error callback; its panic
        // must not escape
        let _ = manager.load_document(Path::new("/nonexistent/doc.pdf"), bounds());
        assert_eq!(manager.state(), OverlayState::Idle);
    }

    #[cfg(unix)]
    #[test]
    fn state_callback_panic_does_not_derail_transitions() {
        let backend = Arc::new(MockBackend::new());
        let mut manager = OverlayManager::with_backend(backend, test_settings());
        manager.set_callbacks(Some(Box::new(|_| panic!("host bug"))), None);
        let doc = temp_document("panicky");

        // empty backend: Launching fires the callback, discovery times out,
        // and the failure still lands in Error with no panic escaping
        let err = manager.load_document(&doc, bounds()).unwrap_err();
        assert!(matches!(err, OverlayError::WindowNotFound { .. }));
        assert_eq!(manager.state(), OverlayState::Error);

        manager.stop();
        assert_eq!(manager.state(), OverlayState::Idle);
        std::fs::remove_file(doc).unwrap();
    }

    #[test]
    fn stop_from_idle_is_a_no_op() {
        let backend = Arc::new(MockBackend::new());
        let mut manager = OverlayManager::with_backend(backend.clone(), test_settings());
        manager.stop();
        assert_eq!(manager.state(), OverlayState::Idle);
        assert_eq!(backend.moves(), 0);
    }

    #[test]
    fn updates_before_ready_only_feed_geometry() {
        let backend = Arc::new(MockBackend::new());
        let mut manager = OverlayManager::with_backend(backend.clone(), test_settings());

        manager.update_window_position(50, 60);
        manager.update_container_bounds(bounds());
        assert_eq!(backend.moves(), 0);

        let status = manager.get_status();
        assert_eq!(status.window_position, Some((50, 60)));
        assert!(status.container_bounds.is_some());
        assert!(status.metrics.is_none());
    }
}
