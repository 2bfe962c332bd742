//! Tuning knobs for a session.
//!
//! Everything has a workable default; hosts override selectively. Durations
//! are plain millisecond fields so the struct stays trivially serializable.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Viewer executable plus fixed arguments; the document path is appended.
    pub viewer_command: Vec<String>,

    /// How long window discovery may poll before the session fails.
    pub discovery_timeout_ms: u64,
    /// Interval between discovery polls.
    pub discovery_poll_ms: u64,

    /// Adaptive frame-rate bounds for the sync engine.
    pub min_fps: u32,
    pub max_fps: u32,

    pub smoothing: bool,
    /// Exponential blend toward the previous position; 0 disables blending.
    pub smoothing_factor: f64,
    pub prediction: bool,

    /// Per-component pixel tolerance; deltas at or below it (inclusive)
    /// make no OS call.
    pub position_tolerance_px: u32,

    /// Keep the viewer above the host window.
    pub always_on_top: bool,

    /// Grace period for viewer termination before a forced kill.
    pub terminate_timeout_ms: u64,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            viewer_command: default_viewer_command(),
            discovery_timeout_ms: 10_000,
            discovery_poll_ms: 500,
            min_fps: 20,
            max_fps: 60,
            smoothing: true,
            smoothing_factor: 0.3,
            prediction: false,
            position_tolerance_px: 2,
            always_on_top: false,
            terminate_timeout_ms: 5_000,
        }
    }
}

impl OverlaySettings {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn discovery_poll(&self) -> Duration {
        Duration::from_millis(self.discovery_poll_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }
}

/// Best-guess document viewer per platform. Hosts shipping a bundled viewer
/// should always override this.
fn default_viewer_command() -> Vec<String> {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec!["evince".to_string()]
    }
    #[cfg(target_os = "macos")]
    {
        vec!["/System/Applications/Preview.app/Contents/MacOS/Preview".to_string()]
    }
    #[cfg(target_os = "windows")]
    {
        Vec::new()
    }
}
