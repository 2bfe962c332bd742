//! Fallback backend for platforms without foreign-window control.
//!
//! Wayland sessions land here: the protocol does not let clients move or
//! restyle toplevels they do not own. Discovery returns nothing, so a
//! session fails fast with a window-not-found error instead of silently
//! doing nothing, and mutations report `Unsupported`.

use super::{DecorationTechnique, PlatformError, Result, WindowBackend, WindowId, WindowInfo};
use crate::geometry::ScreenPosition;

pub struct NoopBackend;

impl WindowBackend for NoopBackend {
    fn windows_for_pid(&self, _pid: u32) -> Result<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn window_exists(&self, _id: WindowId) -> Result<bool> {
        Ok(false)
    }

    fn window_geometry(&self, id: WindowId) -> Result<ScreenPosition> {
        Err(PlatformError::WindowGone(id))
    }

    fn move_resize(&self, _id: WindowId, _pos: &ScreenPosition) -> Result<()> {
        Err(PlatformError::Unsupported {
            operation: "move_resize",
        })
    }

    fn apply_decoration(&self, _id: WindowId, _technique: DecorationTechnique) -> Result<()> {
        Err(PlatformError::Unsupported {
            operation: "apply_decoration",
        })
    }

    fn restore_decoration(&self, _id: WindowId, _technique: DecorationTechnique) -> Result<()> {
        Err(PlatformError::Unsupported {
            operation: "restore_decoration",
        })
    }

    fn set_always_on_top(&self, _id: WindowId, _on_top: bool) -> Result<()> {
        Err(PlatformError::Unsupported {
            operation: "set_always_on_top",
        })
    }

    fn set_opacity(&self, _id: WindowId, _opacity: f64) -> Result<()> {
        Err(PlatformError::Unsupported {
            operation: "set_opacity",
        })
    }
}
