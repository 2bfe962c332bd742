//! Window discovery for a freshly launched viewer process.
//!
//! The viewer's window does not exist at spawn time, and different
//! platforms/window managers expose it through different queries at
//! different moments. The tracker polls at a fixed interval until a bounded
//! timeout, trying an ordered list of lookup strategies on each poll; the
//! first plausible hit wins and short-circuits both the remaining
//! strategies and the remaining time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::geometry::ScreenPosition;
use crate::platform::{is_plausible_app_window, WindowBackend, WindowId, WindowInfo};

/// Lookup strategies in preference order. Pid matching is authoritative;
/// title matching catches viewers that spawn their window from a forked
/// helper process; the tree scan catches windows the WM has not registered
/// yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupStrategy {
    ByPid,
    ByTitleHint,
    TreeScan,
}

const STRATEGY_ORDER: [LookupStrategy; 3] = [
    LookupStrategy::ByPid,
    LookupStrategy::ByTitleHint,
    LookupStrategy::TreeScan,
];

pub struct WindowTracker {
    backend: Arc<dyn WindowBackend>,
    poll_interval: Duration,
}

impl WindowTracker {
    pub fn new(backend: Arc<dyn WindowBackend>, poll_interval: Duration) -> Self {
        Self {
            backend,
            poll_interval,
        }
    }

    /// Block until a plausible window for `pid` appears or `timeout`
    /// elapses. `title_hint` is typically the document's file stem.
    ///
    /// Returns `None` on timeout; the caller treats that as fatal for the
    /// session.
    pub fn find_window(
        &self,
        pid: u32,
        title_hint: &str,
        timeout: Duration,
    ) -> Option<WindowInfo> {
        let deadline = Instant::now() + timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            for strategy in STRATEGY_ORDER {
                match self.try_strategy(strategy, pid, title_hint) {
                    Some(info) => {
                        tracing::info!(
                            window = %info.id,
                            pid = info.pid,
                            title = %info.title,
                            ?strategy,
                            attempt,
                            "Viewer window located"
                        );
                        return Some(info);
                    }
                    None => continue,
                }
            }

            if Instant::now() >= deadline {
                tracing::warn!(pid, attempt, "Window discovery timed out");
                return None;
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn try_strategy(&self, strategy: LookupStrategy, pid: u32, title_hint: &str) -> Option<WindowInfo> {
        let candidates = match strategy {
            LookupStrategy::ByPid => self.backend.windows_for_pid(pid),
            LookupStrategy::ByTitleHint => self.backend.list_windows(),
            LookupStrategy::TreeScan => self.backend.scan_window_tree(),
        };

        let candidates = match candidates {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(?strategy, error = %e, "Lookup strategy failed");
                return None;
            }
        };

        let hint = title_hint.to_lowercase();
        candidates.into_iter().find(|info| {
            if !is_plausible_app_window(info) {
                return false;
            }
            match strategy {
                LookupStrategy::ByPid => true,
                LookupStrategy::ByTitleHint => {
                    !hint.is_empty() && info.title.to_lowercase().contains(&hint)
                }
                LookupStrategy::TreeScan => {
                    info.pid == pid
                        || (!hint.is_empty() && info.title.to_lowercase().contains(&hint))
                }
            }
        })
    }

    pub fn verify_window_exists(&self, id: WindowId) -> bool {
        self.backend.window_exists(id).unwrap_or(false)
    }

    pub fn get_window_geometry(&self, id: WindowId) -> Option<ScreenPosition> {
        self.backend.window_geometry(id).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockBackend;

    fn window(id: u64, pid: u32, title: &str) -> WindowInfo {
        WindowInfo {
            id: WindowId(id),
            pid,
            title: title.to_string(),
            class_name: "viewer".to_string(),
        }
    }

    fn tracker(backend: Arc<MockBackend>) -> WindowTracker {
        WindowTracker::new(backend, Duration::from_millis(25))
    }

    #[test]
    fn finds_window_by_pid() {
        let backend = Arc::new(MockBackend::new());
        backend.add_window(window(7, 1234, "report.pdf - Viewer"));
        let t = tracker(backend);

        let info = t
            .find_window(1234, "report", Duration::from_millis(200))
            .unwrap();
        assert_eq!(info.id, WindowId(7));
    }

    #[test]
    fn skips_splash_windows() {
        let backend = Arc::new(MockBackend::new());
        backend.add_window(window(1, 1234, "Viewer Splash Screen"));
        backend.add_window(window(2, 1234, "report.pdf - Viewer"));
        let t = tracker(backend);

        let info = t
            .find_window(1234, "report", Duration::from_millis(200))
            .unwrap();
        assert_eq!(info.id, WindowId(2));
    }

    #[test]
    fn falls_back_to_title_match_when_pid_differs() {
        // Viewer forked: window is owned by a child pid we do not know
        let backend = Arc::new(MockBackend::new());
        backend.add_window(window(3, 9999, "quarterly-report.pdf"));
        let t = tracker(backend);

        let info = t
            .find_window(1234, "quarterly-report", Duration::from_millis(200))
            .unwrap();
        assert_eq!(info.id, WindowId(3));
    }

    #[test]
    fn times_out_when_nothing_matches() {
        let backend = Arc::new(MockBackend::new());
        let t = tracker(backend);

        let timeout = Duration::from_millis(150);
        let start = Instant::now();
        let result = t.find_window(1234, "report", timeout);
        let elapsed = start.elapsed();

        assert!(result.is_none());
        assert!(elapsed >= timeout, "returned early: {elapsed:?}");
        // one poll interval of slack, mirroring the documented granularity
        assert!(elapsed < timeout + Duration::from_millis(100), "overran: {elapsed:?}");
    }

    #[test]
    fn auxiliary_queries_reflect_backend() {
        let backend = Arc::new(MockBackend::new());
        backend.add_window(window(7, 1234, "doc"));
        let t = tracker(backend);

        assert!(t.verify_window_exists(WindowId(7)));
        assert!(!t.verify_window_exists(WindowId(8)));
        assert!(t.get_window_geometry(WindowId(7)).is_some());
    }
}
