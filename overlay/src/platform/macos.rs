//! macOS backend for foreign-window control.
//!
//! Discovery goes through `CGWindowListCopyWindowInfo`; moving and resizing
//! go through the Accessibility API (AXUIElement), which requires the host
//! process to be granted accessibility permission. Decoration stripping and
//! z-order/opacity changes are not available for windows of other processes
//! on macOS, so those operations report `Unsupported` and the session runs
//! with the viewer's native chrome.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Mutex;

use core_foundation::array::CFArray;
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::display::{CGPoint, CGSize};
use core_graphics::window::{
    copy_window_info, kCGNullWindowID, kCGWindowListExcludeDesktopElements,
    kCGWindowListOptionOnScreenOnly,
};

use super::{DecorationTechnique, PlatformError, Result, WindowId, WindowInfo};
use crate::geometry::ScreenPosition;

// Accessibility API surface. Not covered by the objc2 ecosystem, so the
// handful of functions used here are declared directly.
type AXUIElementRef = *const c_void;
type AXValueRef = *const c_void;
type AXError = i32;
type CFTypeRef = *const c_void;

const K_AX_ERROR_SUCCESS: AXError = 0;
const K_AX_VALUE_CGPOINT_TYPE: u32 = 1;
const K_AX_VALUE_CGSIZE_TYPE: u32 = 2;

#[link(name = "ApplicationServices", kind = "framework")]
unsafe extern "C" {
    fn AXUIElementCreateApplication(pid: i32) -> AXUIElementRef;
    fn AXUIElementCopyAttributeValue(
        element: AXUIElementRef,
        attribute: CFStringRef,
        value: *mut CFTypeRef,
    ) -> AXError;
    fn AXUIElementSetAttributeValue(
        element: AXUIElementRef,
        attribute: CFStringRef,
        value: CFTypeRef,
    ) -> AXError;
    fn AXValueCreate(the_type: u32, value_ptr: *const c_void) -> AXValueRef;
    fn AXIsProcessTrusted() -> bool;
    fn CFRetain(cf: CFTypeRef) -> CFTypeRef;
    fn CFRelease(cf: CFTypeRef);
}

fn dict_number(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<i64> {
    dict.find(CFString::new(key))
        .and_then(|v| v.downcast::<CFNumber>())
        .and_then(|n| n.to_i64())
}

fn dict_string(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<String> {
    dict.find(CFString::new(key))
        .and_then(|v| v.downcast::<CFString>())
        .map(|s| s.to_string())
}

fn dict_bounds(dict: &CFDictionary<CFString, CFType>) -> Option<ScreenPosition> {
    let bounds = dict
        .find(CFString::new("kCGWindowBounds"))?
        .downcast::<CFDictionary>()?;
    let bounds: CFDictionary<CFString, CFType> = unsafe {
        CFDictionary::wrap_under_get_rule(bounds.as_concrete_TypeRef() as *const _)
    };
    Some(ScreenPosition {
        x: dict_number(&bounds, "X")? as i32,
        y: dict_number(&bounds, "Y")? as i32,
        width: dict_number(&bounds, "Width")?.max(0) as u32,
        height: dict_number(&bounds, "Height")?.max(0) as u32,
    })
}

pub struct MacOsBackend {
    /// CGWindowID → owning pid, captured at discovery time so AX calls can
    /// find the right application element later.
    window_pids: Mutex<HashMap<u64, i32>>,
}

impl MacOsBackend {
    pub fn new() -> Self {
        if !unsafe { AXIsProcessTrusted() } {
            tracing::warn!("Accessibility permission not granted; window moves will fail");
        }
        Self {
            window_pids: Mutex::new(HashMap::new()),
        }
    }

    fn snapshot(&self) -> Result<Vec<(WindowInfo, ScreenPosition, i32)>> {
        let info_array = copy_window_info(
            kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
            kCGNullWindowID,
        )
        .ok_or_else(|| {
            PlatformError::ConnectionFailed("CGWindowListCopyWindowInfo returned null".into())
        })?;

        let mut out = Vec::new();
        for item in info_array.iter() {
            // the list is an array of CFDictionary entries, one per window
            let dict: CFDictionary<CFString, CFType> =
                unsafe { CFDictionary::wrap_under_get_rule(*item as *const _) };
            // Layer 0 is the normal application window layer
            if dict_number(&dict, "kCGWindowLayer").unwrap_or(-1) != 0 {
                continue;
            }
            let Some(number) = dict_number(&dict, "kCGWindowNumber") else {
                continue;
            };
            let Some(pid) = dict_number(&dict, "kCGWindowOwnerPID") else {
                continue;
            };
            let Some(bounds) = dict_bounds(&dict) else {
                continue;
            };
            let info = WindowInfo {
                id: WindowId(number as u64),
                pid: pid as u32,
                title: dict_string(&dict, "kCGWindowName").unwrap_or_default(),
                class_name: dict_string(&dict, "kCGWindowOwnerName").unwrap_or_default(),
            };
            out.push((info, bounds, pid as i32));
        }

        if let Ok(mut map) = self.window_pids.lock() {
            for (info, _, pid) in &out {
                map.insert(info.id.0, *pid);
            }
        }
        Ok(out)
    }

    fn pid_for(&self, id: WindowId) -> Result<i32> {
        self.window_pids
            .lock()
            .ok()
            .and_then(|map| map.get(&id.0).copied())
            .ok_or(PlatformError::WindowGone(id))
    }

    /// First AX window of the owning application. The viewer is launched
    /// with a single document window, so index 0 is the tracked one.
    fn ax_window(&self, id: WindowId) -> Result<AXUIElementRef> {
        let pid = self.pid_for(id)?;
        unsafe {
            let app = AXUIElementCreateApplication(pid);
            if app.is_null() {
                return Err(PlatformError::WindowGone(id));
            }
            let attr = CFString::new("AXWindows");
            let mut value: CFTypeRef = std::ptr::null();
            let err =
                AXUIElementCopyAttributeValue(app, attr.as_concrete_TypeRef(), &mut value);
            CFRelease(app);
            if err != K_AX_ERROR_SUCCESS || value.is_null() {
                return Err(PlatformError::CallFailed(format!(
                    "AXUIElementCopyAttributeValue(AXWindows) -> {err}"
                )));
            }
            let windows: CFArray<*const c_void> =
                CFArray::wrap_under_create_rule(value as *const _);
            // retain past the array's release; callers CFRelease the element
            windows
                .get(0)
                .map(|w| CFRetain(*w) as AXUIElementRef)
                .ok_or(PlatformError::WindowGone(id))
        }
    }

    fn ax_set(&self, window: AXUIElementRef, attr: &str, value: AXValueRef) -> Result<()> {
        let attr = CFString::new(attr);
        let err = unsafe {
            AXUIElementSetAttributeValue(window, attr.as_concrete_TypeRef(), value as CFTypeRef)
        };
        if err != K_AX_ERROR_SUCCESS {
            return Err(PlatformError::CallFailed(format!(
                "AXUIElementSetAttributeValue -> {err}"
            )));
        }
        Ok(())
    }
}

impl Default for MacOsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl super::WindowBackend for MacOsBackend {
    fn windows_for_pid(&self, pid: u32) -> Result<Vec<WindowInfo>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .map(|(info, _, _)| info)
            .filter(|info| info.pid == pid)
            .collect())
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(self.snapshot()?.into_iter().map(|(info, _, _)| info).collect())
    }

    fn window_exists(&self, id: WindowId) -> Result<bool> {
        Ok(self.snapshot()?.iter().any(|(info, _, _)| info.id == id))
    }

    fn window_geometry(&self, id: WindowId) -> Result<ScreenPosition> {
        self.snapshot()?
            .into_iter()
            .find(|(info, _, _)| info.id == id)
            .map(|(_, bounds, _)| bounds)
            .ok_or(PlatformError::WindowGone(id))
    }

    fn move_resize(&self, id: WindowId, pos: &ScreenPosition) -> Result<()> {
        let window = self.ax_window(id)?;

        let point = CGPoint::new(pos.x as f64, pos.y as f64);
        let size = CGSize::new(pos.width as f64, pos.height as f64);
        unsafe {
            let point_value =
                AXValueCreate(K_AX_VALUE_CGPOINT_TYPE, &point as *const CGPoint as *const _);
            let size_value =
                AXValueCreate(K_AX_VALUE_CGSIZE_TYPE, &size as *const CGSize as *const _);

            let result = self
                .ax_set(window, "AXPosition", point_value)
                .and_then(|()| self.ax_set(window, "AXSize", size_value));

            CFRelease(point_value);
            CFRelease(size_value);
            CFRelease(window);
            result
        }
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
