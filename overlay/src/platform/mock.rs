//! Scriptable in-memory backend for unit tests.
//!
//! Counts every mutating call so tests can assert at the OS boundary
//! (idempotence, jitter suppression) without a display server.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{DecorationTechnique, PlatformError, Result, WindowBackend, WindowId, WindowInfo};
use crate::geometry::ScreenPosition;

#[derive(Default)]
pub struct MockBackend {
    windows: Mutex<Vec<WindowInfo>>,
    failing_techniques: Mutex<HashSet<DecorationTechnique>>,
    /// Simulated wall-clock cost of each move_resize call.
    move_latency: Mutex<Duration>,
    pub move_calls: AtomicUsize,
    pub apply_calls: Mutex<Vec<(WindowId, DecorationTechnique)>>,
    pub restore_calls: Mutex<Vec<(WindowId, DecorationTechnique)>>,
    pub on_top_calls: AtomicUsize,
    pub last_moved: Mutex<Option<ScreenPosition>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(&self, info: WindowInfo) {
        self.windows.lock().unwrap().push(info);
    }

    pub fn fail_technique(&self, technique: DecorationTechnique) {
        self.failing_techniques.lock().unwrap().insert(technique);
    }

    pub fn set_move_latency(&self, latency: Duration) {
        *self.move_latency.lock().unwrap() = latency;
    }

    pub fn moves(&self) -> usize {
        self.move_calls.load(Ordering::SeqCst)
    }

    pub fn applied(&self) -> Vec<(WindowId, DecorationTechnique)> {
        self.apply_calls.lock().unwrap().clone()
    }

    pub fn restored(&self) -> Vec<(WindowId, DecorationTechnique)> {
        self.restore_calls.lock().unwrap().clone()
    }
}

impl WindowBackend for MockBackend {
    fn windows_for_pid(&self, pid: u32) -> Result<Vec<WindowInfo>> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.pid == pid)
            .cloned()
            .collect())
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(self.windows.lock().unwrap().clone())
    }

    fn window_exists(&self, id: WindowId) -> Result<bool> {
        Ok(self.windows.lock().unwrap().iter().any(|w| w.id == id))
    }

    fn window_geometry(&self, id: WindowId) -> Result<ScreenPosition> {
        if !self.window_exists(id)? {
            return Err(PlatformError::WindowGone(id));
        }
        Ok(self.last_moved.lock().unwrap().unwrap_or(ScreenPosition {
            x: 0,
            y: 0,
            width: 640,
            height: 480,
        }))
    }

    fn move_resize(&self, _id: WindowId, pos: &ScreenPosition) -> Result<()> {
        let latency = *self.move_latency.lock().unwrap();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        self.move_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_moved.lock().unwrap() = Some(*pos);
        Ok(())
    }

    fn apply_decoration(&self, id: WindowId, technique: DecorationTechnique) -> Result<()> {
        self.apply_calls.lock().unwrap().push((id, technique));
        if self.failing_techniques.lock().unwrap().contains(&technique) {
            return Err(PlatformError::CallFailed(format!(
                "technique {technique:?} scripted to fail"
            )));
        }
        Ok(())
    }

    fn restore_decoration(&self, id: WindowId, technique: DecorationTechnique) -> Result<()> {
        self.restore_calls.lock().unwrap().push((id, technique));
        Ok(())
    }

    fn set_always_on_top(&self, _id: WindowId, _on_top: bool) -> Result<()> {
        self.on_top_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_opacity(&self, _id: WindowId, _opacity: f64) -> Result<()> {
        Ok(())
    }
}
