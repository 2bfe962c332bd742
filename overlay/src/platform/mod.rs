//! Platform abstraction for controlling external application windows.
//!
//! This module defines the capability trait all platform backends implement,
//! so discovery, decoration stripping and the sync loop stay
//! platform-agnostic. Backends bind the native windowing API directly
//! (no shelling out to command-line utilities) to keep per-call latency out
//! of the hot synchronization path.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::geometry::ScreenPosition;

#[cfg(all(unix, not(target_os = "macos")))]
pub mod x11;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "macos")]
pub mod macos;

pub mod noop;

#[cfg(test)]
pub(crate) mod mock;

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Opaque native window handle (XID, HWND, CGWindowID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub u64);

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Identity of a discovered external window.
///
/// Immutable once captured; a re-discovery produces a fresh `WindowInfo`
/// rather than mutating an old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: WindowId,
    pub pid: u32,
    pub title: String,
    pub class_name: String,
}

/// One way of making a window appear undecorated. Tried in order; the
/// technique that succeeded is recorded so restore can reverse exactly it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecorationTechnique {
    /// Ask the window manager to omit decorations (Motif hints / style bits).
    HintRemoval,
    /// Reclassify the window as a type the WM draws without chrome.
    TypeReclassification,
    /// Toggle WM state flags (fullscreen-ish / undecorated states).
    StateFlags,
}

impl DecorationTechnique {
    /// Preference order. Hint removal is the least invasive and the most
    /// widely honored, so it goes first.
    pub const ORDERED: [DecorationTechnique; 3] = [
        DecorationTechnique::HintRemoval,
        DecorationTechnique::TypeReclassification,
        DecorationTechnique::StateFlags,
    ];
}

/// Errors from native windowing calls.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to connect to display server: {0}")]
    ConnectionFailed(String),

    #[error("window {0} no longer exists")]
    WindowGone(WindowId),

    #[error("{operation} not supported on this platform")]
    Unsupported { operation: &'static str },

    #[error("native call failed: {0}")]
    CallFailed(String),
}

/// Capability interface over the native windowing API.
///
/// All methods take `&self`; backends are internally synchronized where the
/// underlying API requires it. The sync worker thread holds a clone of the
/// backend, so implementations must be `Send + Sync`.
pub trait WindowBackend: Send + Sync {
    /// Top-level windows belonging to the given process.
    fn windows_for_pid(&self, pid: u32) -> Result<Vec<WindowInfo>>;

    /// Every top-level application window currently mapped.
    fn list_windows(&self) -> Result<Vec<WindowInfo>>;

    /// Deep enumeration of the native window tree. Slower than
    /// [`WindowBackend::list_windows`] but catches windows the window
    /// manager has not (yet) registered in its client list. Platforms
    /// without that distinction fall back to the normal listing.
    fn scan_window_tree(&self) -> Result<Vec<WindowInfo>> {
        self.list_windows()
    }

    fn window_exists(&self, id: WindowId) -> Result<bool>;

    fn window_geometry(&self, id: WindowId) -> Result<ScreenPosition>;

    /// Move and resize in one native call where the platform allows it.
    fn move_resize(&self, id: WindowId, pos: &ScreenPosition) -> Result<()>;

    /// Apply one decoration-removal technique. An `Ok` return means the
    /// backend believes the technique took effect; this is self-reported and
    /// best-effort on most platforms.
    fn apply_decoration(&self, id: WindowId, technique: DecorationTechnique) -> Result<()>;

    /// Reverse a previously applied technique.
    fn restore_decoration(&self, id: WindowId, technique: DecorationTechnique) -> Result<()>;

    fn set_always_on_top(&self, id: WindowId, on_top: bool) -> Result<()>;

    /// Opacity in `[0.0, 1.0]`.
    fn set_opacity(&self, id: WindowId, opacity: f64) -> Result<()>;
}

/// Create the backend for the current platform.
///
/// On Linux this detects the session type at runtime: X11 gets the real
/// backend, Wayland falls back to [`noop::NoopBackend`] since Wayland does
/// not let clients reposition foreign toplevels.
pub fn create_backend() -> Result<Arc<dyn WindowBackend>> {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        if std::env::var("WAYLAND_DISPLAY").is_ok() && std::env::var("DISPLAY").is_err() {
            tracing::warn!("Wayland session without XWayland; window control unavailable");
            return Ok(Arc::new(noop::NoopBackend));
        }
        Ok(Arc::new(x11::X11Backend::connect()?))
    }
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::Win32Backend::new()))
    }
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(macos::MacOsBackend::new()))
    }
}

/// Title fragments that mark splash/startup windows we must not latch onto
/// while the real application window is still coming up.
pub(crate) const SPLASH_TITLE_MARKERS: [&str; 4] = ["splash", "loading", "starting", "launcher"];

/// Heuristic filter for plausible application windows: non-empty title that
/// does not look like a splash screen.
pub(crate) fn is_plausible_app_window(info: &WindowInfo) -> bool {
    if info.title.trim().is_empty() {
        return false;
    }
    let lower = info.title.to_lowercase();
    !SPLASH_TITLE_MARKERS.iter().any(|m| lower.contains(m))
}
