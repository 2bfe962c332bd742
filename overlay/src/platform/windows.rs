//! Win32 backend for foreign-window control.
//!
//! Discovery enumerates top-level windows and matches the owning process;
//! decoration stripping rewrites style bits. Original styles are remembered
//! per window so restore puts back exactly what was there.
//!
//! Unlike windows we create ourselves, foreign HWNDs can be manipulated from
//! any thread; there is no message-queue affinity to worry about here.

use std::collections::HashMap;
use std::sync::Mutex;

use windows::Win32::Foundation::{COLORREF, HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetWindow, GetWindowLongPtrW, GetWindowRect, GetWindowTextW,
    GetWindowThreadProcessId, IsWindow, IsWindowVisible, SetLayeredWindowAttributes,
    SetWindowLongPtrW, SetWindowPos, GWL_EXSTYLE, GWL_STYLE, GW_OWNER, HWND_NOTOPMOST,
    HWND_TOPMOST, LWA_ALPHA, SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE,
    SWP_NOZORDER, WS_CAPTION, WS_EX_APPWINDOW, WS_EX_LAYERED, WS_EX_TOOLWINDOW, WS_MAXIMIZEBOX,
    WS_MINIMIZEBOX, WS_POPUP, WS_SYSMENU, WS_THICKFRAME, WS_VISIBLE,
};

use super::{DecorationTechnique, PlatformError, Result, WindowId, WindowInfo};
use crate::geometry::ScreenPosition;

fn hwnd(id: WindowId) -> HWND {
    HWND(id.0 as isize as *mut core::ffi::c_void)
}

/// Collects top-level HWNDs during enumeration.
unsafe extern "system" fn enum_windows_callback(
    handle: HWND,
    lparam: LPARAM,
) -> windows::Win32::Foundation::BOOL {
    unsafe {
        let handles = &mut *(lparam.0 as *mut Vec<HWND>);
        handles.push(handle);
        windows::Win32::Foundation::BOOL::from(true)
    }
}

fn wide_to_string(buf: &[u16], len: i32) -> String {
    String::from_utf16_lossy(&buf[..len.max(0) as usize])
}

/// Styles saved before a technique mutated them, keyed by window and
/// technique so restore reverses exactly the applied mutation.
type SavedStyles = Mutex<HashMap<(u64, DecorationTechnique), isize>>;

pub struct Win32Backend {
    saved_styles: SavedStyles,
}

impl Win32Backend {
    pub fn new() -> Self {
        Self {
            saved_styles: Mutex::new(HashMap::new()),
        }
    }

    fn enumerate(&self) -> Result<Vec<HWND>> {
        let mut handles: Vec<HWND> = Vec::new();
        unsafe {
            EnumWindows(
                Some(enum_windows_callback),
                LPARAM(&mut handles as *mut Vec<HWND> as isize),
            )
            .map_err(|e| PlatformError::CallFailed(format!("EnumWindows: {e}")))?;
        }
        Ok(handles)
    }

    fn window_info(&self, handle: HWND) -> WindowInfo {
        let mut pid = 0u32;
        let mut title_buf = [0u16; 512];
        let mut class_buf = [0u16; 256];

        unsafe {
            GetWindowThreadProcessId(handle, Some(&mut pid));
            let title_len = GetWindowTextW(handle, &mut title_buf);
            let class_len = GetClassNameW(handle, &mut class_buf);

            WindowInfo {
                id: WindowId(handle.0 as isize as u64),
                pid,
                title: wide_to_string(&title_buf, title_len),
                class_name: wide_to_string(&class_buf, class_len),
            }
        }
    }

    /// Visible, unowned top-level windows only; owned windows are dialogs
    /// and tooltips we must never latch onto.
    fn is_candidate(&self, handle: HWND) -> bool {
        unsafe {
            IsWindowVisible(handle).as_bool() && GetWindow(handle, GW_OWNER).is_err()
        }
    }

    fn save_style(&self, id: WindowId, technique: DecorationTechnique, value: isize) {
        if let Ok(mut map) = self.saved_styles.lock() {
            map.entry((id.0, technique)).or_insert(value);
        }
    }

    fn take_saved_style(&self, id: WindowId, technique: DecorationTechnique) -> Option<isize> {
        self.saved_styles
            .lock()
            .ok()
            .and_then(|mut map| map.remove(&(id.0, technique)))
    }

    fn apply_frame_change(&self, handle: HWND) -> Result<()> {
        unsafe {
            SetWindowPos(
                handle,
                None,
                0,
                0,
                0,
                0,
                SWP_FRAMECHANGED | SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE,
            )
            .map_err(|e| PlatformError::CallFailed(format!("SetWindowPos: {e}")))
        }
    }
}

impl Default for Win32Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl super::WindowBackend for Win32Backend {
    fn windows_for_pid(&self, pid: u32) -> Result<Vec<WindowInfo>> {
        Ok(self
            .enumerate()?
            .into_iter()
            .filter(|&h| self.is_candidate(h))
            .map(|h| self.window_info(h))
            .filter(|info| info.pid == pid)
            .collect())
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(self
            .enumerate()?
            .into_iter()
            .filter(|&h| self.is_candidate(h))
            .map(|h| self.window_info(h))
            .collect())
    }

    fn window_exists(&self, id: WindowId) -> Result<bool> {
        Ok(unsafe { IsWindow(hwnd(id)).as_bool() })
    }

    fn window_geometry(&self, id: WindowId) -> Result<ScreenPosition> {
        let mut rect = windows::Win32::Foundation::RECT::default();
        unsafe {
            GetWindowRect(hwnd(id), &mut rect).map_err(|_| PlatformError::WindowGone(id))?;
        }
        Ok(ScreenPosition {
            x: rect.left,
            y: rect.top,
            width: (rect.right - rect.left).max(0) as u32,
            height: (rect.bottom - rect.top).max(0) as u32,
        })
    }

    fn move_resize(&self, id: WindowId, pos: &ScreenPosition) -> Result<()> {
        unsafe {
            SetWindowPos(
                hwnd(id),
                None,
                pos.x,
                pos.y,
                pos.width as i32,
                pos.height as i32,
                SWP_NOZORDER | SWP_NOACTIVATE,
            )
            .map_err(|e| PlatformError::CallFailed(format!("SetWindowPos: {e}")))
        }
    }

    fn apply_decoration(&self, id: WindowId, technique: DecorationTechnique) -> Result<()> {
        let handle = hwnd(id);
        match technique {
            DecorationTechnique::HintRemoval => {
                let style = unsafe { GetWindowLongPtrW(handle, GWL_STYLE) };
                self.save_style(id, technique, style);
                let stripped = style
                    & !(WS_CAPTION.0
                        | WS_THICKFRAME.0
                        | WS_MINIMIZEBOX.0
                        | WS_MAXIMIZEBOX.0
                        | WS_SYSMENU.0) as isize;
                unsafe { SetWindowLongPtrW(handle, GWL_STYLE, stripped) };
                self.apply_frame_change(handle)
            }
            DecorationTechnique::TypeReclassification => {
                let exstyle = unsafe { GetWindowLongPtrW(handle, GWL_EXSTYLE) };
                self.save_style(id, technique, exstyle);
                let reclassed =
                    (exstyle | WS_EX_TOOLWINDOW.0 as isize) & !(WS_EX_APPWINDOW.0 as isize);
                unsafe { SetWindowLongPtrW(handle, GWL_EXSTYLE, reclassed) };
                self.apply_frame_change(handle)
            }
            DecorationTechnique::StateFlags => {
                // Last resort: replace the style wholesale with a bare popup
                let style = unsafe { GetWindowLongPtrW(handle, GWL_STYLE) };
                self.save_style(id, technique, style);
                unsafe {
                    SetWindowLongPtrW(handle, GWL_STYLE, (WS_POPUP.0 | WS_VISIBLE.0) as isize)
                };
                self.apply_frame_change(handle)
            }
        }
    }

    fn restore_decoration(&self, id: WindowId, technique: DecorationTechnique) -> Result<()> {
        let Some(saved) = self.take_saved_style(id, technique) else {
            return Ok(());
        };
        let handle = hwnd(id);
        let index = match technique {
            DecorationTechnique::TypeReclassification => GWL_EXSTYLE,
            _ => GWL_STYLE,
        };
        unsafe { SetWindowLongPtrW(handle, index, saved) };
        self.apply_frame_change(handle)
    }

    fn set_always_on_top(&self, id: WindowId, on_top: bool) -> Result<()> {
        let insert_after = if on_top { HWND_TOPMOST } else { HWND_NOTOPMOST };
        unsafe {
            SetWindowPos(
                hwnd(id),
                insert_after,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )
            .map_err(|e| PlatformError::CallFailed(format!("SetWindowPos: {e}")))
        }
    }

    fn set_opacity(&self, id: WindowId, opacity: f64) -> Result<()> {
        let handle = hwnd(id);
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0) as u8;
        unsafe {
            let exstyle = GetWindowLongPtrW(handle, GWL_EXSTYLE);
            SetWindowLongPtrW(handle, GWL_EXSTYLE, exstyle | WS_EX_LAYERED.0 as isize);
            SetLayeredWindowAttributes(handle, COLORREF(0), alpha, LWA_ALPHA)
                .map_err(|e| PlatformError::CallFailed(format!("SetLayeredWindowAttributes: {e}")))
        }
    }
}
