//! X11 backend for foreign-window control.
//!
//! Uses XCB via x11rb. Discovery walks the EWMH client list; decoration
//! stripping goes through Motif hints first, then EWMH window-type
//! reclassification, then an override-redirect remap as a last resort.

use x11rb::atom_manager;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use super::{DecorationTechnique, PlatformError, Result, WindowId, WindowInfo};
use crate::geometry::ScreenPosition;

atom_manager! {
    pub AtomCollection: AtomCollectionCookie {
        _NET_CLIENT_LIST,
        _NET_WM_NAME,
        _NET_WM_PID,
        _NET_WM_STATE,
        _NET_WM_STATE_ABOVE,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_NORMAL,
        _NET_WM_WINDOW_TYPE_SPLASH,
        _NET_WM_WINDOW_OPACITY,
        _MOTIF_WM_HINTS,
        UTF8_STRING,
        ATOM,
    }
}

/// _NET_WM_STATE client message actions
const NET_WM_STATE_REMOVE: u32 = 0;
const NET_WM_STATE_ADD: u32 = 1;

/// Motif hints: flags word selects the decorations field, decorations = 0
/// means "none".
const MWM_HINTS_DECORATIONS: u32 = 1 << 1;

pub struct X11Backend {
    conn: RustConnection,
    root: Window,
    atoms: AtomCollection,
}

impl X11Backend {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) =
            x11rb::connect(None).map_err(|e| PlatformError::ConnectionFailed(e.to_string()))?;

        let atoms = AtomCollection::new(&conn)
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?
            .reply()
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;

        let root = conn.setup().roots[screen_num].root;

        Ok(Self { conn, root, atoms })
    }

    fn read_title(&self, window: Window) -> String {
        // Prefer the UTF-8 EWMH name, fall back to ICCCM WM_NAME
        let utf8 = self
            .conn
            .get_property(
                false,
                window,
                self.atoms._NET_WM_NAME,
                self.atoms.UTF8_STRING,
                0,
                u32::MAX,
            )
            .ok()
            .and_then(|c| c.reply().ok())
            .filter(|r| !r.value.is_empty())
            .map(|r| String::from_utf8_lossy(&r.value).to_string());

        utf8.unwrap_or_else(|| {
            self.conn
                .get_property(
                    false,
                    window,
                    AtomEnum::WM_NAME,
                    AtomEnum::STRING,
                    0,
                    u32::MAX,
                )
                .ok()
                .and_then(|c| c.reply().ok())
                .map(|r| String::from_utf8_lossy(&r.value).to_string())
                .unwrap_or_default()
        })
    }

    fn read_class(&self, window: Window) -> String {
        // WM_CLASS is two NUL-terminated strings: instance, then class
        self.conn
            .get_property(
                false,
                window,
                AtomEnum::WM_CLASS,
                AtomEnum::STRING,
                0,
                u32::MAX,
            )
            .ok()
            .and_then(|c| c.reply().ok())
            .map(|r| {
                let parts: Vec<&[u8]> = r.value.split(|&b| b == 0).collect();
                parts
                    .get(1)
                    .map(|c| String::from_utf8_lossy(c).to_string())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn read_pid(&self, window: Window) -> Option<u32> {
        self.conn
            .get_property(
                false,
                window,
                self.atoms._NET_WM_PID,
                AtomEnum::CARDINAL,
                0,
                1,
            )
            .ok()
            .and_then(|c| c.reply().ok())
            .and_then(|r| r.value32().and_then(|mut v| v.next()))
    }

    fn window_info(&self, window: Window) -> WindowInfo {
        WindowInfo {
            id: WindowId(window as u64),
            pid: self.read_pid(window).unwrap_or(0),
            title: self.read_title(window),
            class_name: self.read_class(window),
        }
    }

    fn client_list(&self) -> Result<Vec<Window>> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms._NET_CLIENT_LIST,
                AtomEnum::WINDOW,
                0,
                u32::MAX,
            )
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?
            .reply()
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;

        Ok(reply.value32().map(|v| v.collect()).unwrap_or_default())
    }

    /// Send an EWMH state change request through the root window so the
    /// window manager applies it to a window we do not own.
    fn send_wm_state(&self, window: Window, action: u32, state: Atom) -> Result<()> {
        let event = ClientMessageEvent::new(
            32,
            window,
            self.atoms._NET_WM_STATE,
            [action, state, 0, 1, 0],
        );
        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
                event,
            )
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        Ok(())
    }

    /// Toggle override-redirect. Takes effect for decorations only across an
    /// unmap/map cycle, since the WM reparents on map.
    fn set_override_redirect(&self, window: Window, enabled: bool) -> Result<()> {
        self.conn
            .unmap_window(window)
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        self.conn
            .change_window_attributes(
                window,
                &ChangeWindowAttributesAux::new().override_redirect(u32::from(enabled)),
            )
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?
            .check()
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        self.conn
            .map_window(window)
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        Ok(())
    }

    fn set_window_type(&self, window: Window, type_atom: Atom) -> Result<()> {
        self.conn
            .change_property32(
                PropMode::REPLACE,
                window,
                self.atoms._NET_WM_WINDOW_TYPE,
                self.atoms.ATOM,
                &[type_atom],
            )
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?
            // check() surfaces a BadWindow instead of self-reporting success
            .check()
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        Ok(())
    }
}

impl super::WindowBackend for X11Backend {
    fn windows_for_pid(&self, pid: u32) -> Result<Vec<WindowInfo>> {
        Ok(self
            .client_list()?
            .into_iter()
            .map(|w| self.window_info(w))
            .filter(|info| info.pid == pid)
            .collect())
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(self
            .client_list()?
            .into_iter()
            .map(|w| self.window_info(w))
            .collect())
    }

    fn scan_window_tree(&self) -> Result<Vec<WindowInfo>> {
        // Walk the root's children and one reparenting level below; newly
        // mapped windows can be missing from _NET_CLIENT_LIST for a moment.
        let tree = self
            .conn
            .query_tree(self.root)
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?
            .reply()
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;

        let mut out = Vec::new();
        for &child in &tree.children {
            let viewable = self
                .conn
                .get_window_attributes(child)
                .ok()
                .and_then(|c| c.reply().ok())
                .is_some_and(|a| a.map_state == MapState::VIEWABLE);
            if !viewable {
                continue;
            }

            let info = self.window_info(child);
            if info.pid != 0 || !info.title.is_empty() {
                out.push(info);
                continue;
            }

            // WM frame windows carry no properties of their own; look one
            // level down for the reparented client.
            if let Ok(cookie) = self.conn.query_tree(child) {
                if let Ok(sub) = cookie.reply() {
                    for &grandchild in &sub.children {
                        let info = self.window_info(grandchild);
                        if info.pid != 0 || !info.title.is_empty() {
                            out.push(info);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn window_exists(&self, id: WindowId) -> Result<bool> {
        let window = id.0 as Window;
        Ok(self
            .conn
            .get_geometry(window)
            .ok()
            .and_then(|c| c.reply().ok())
            .is_some())
    }

    fn window_geometry(&self, id: WindowId) -> Result<ScreenPosition> {
        let window = id.0 as Window;
        let geom = self
            .conn
            .get_geometry(window)
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?
            .reply()
            .map_err(|_| PlatformError::WindowGone(id))?;

        // Geometry is frame-relative for reparented windows; translate the
        // origin into root coordinates for the absolute position.
        let translated = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?
            .reply()
            .map_err(|_| PlatformError::WindowGone(id))?;

        Ok(ScreenPosition {
            x: translated.dst_x as i32,
            y: translated.dst_y as i32,
            width: geom.width as u32,
            height: geom.height as u32,
        })
    }

    fn move_resize(&self, id: WindowId, pos: &ScreenPosition) -> Result<()> {
        let window = id.0 as Window;
        self.conn
            .configure_window(
                window,
                &ConfigureWindowAux::new()
                    .x(pos.x)
                    .y(pos.y)
                    .width(pos.width)
                    .height(pos.height),
            )
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        Ok(())
    }

    fn apply_decoration(&self, id: WindowId, technique: DecorationTechnique) -> Result<()> {
        let window = id.0 as Window;
        match technique {
            DecorationTechnique::HintRemoval => {
                let hints: [u32; 5] = [MWM_HINTS_DECORATIONS, 0, 0, 0, 0];
                self.conn
                    .change_property32(
                        PropMode::REPLACE,
                        window,
                        self.atoms._MOTIF_WM_HINTS,
                        self.atoms._MOTIF_WM_HINTS,
                        &hints,
                    )
                    .map_err(|e| PlatformError::CallFailed(e.to_string()))?
                    .check()
                    .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
                self.conn
                    .flush()
                    .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
                Ok(())
            }
            DecorationTechnique::TypeReclassification => {
                self.set_window_type(window, self.atoms._NET_WM_WINDOW_TYPE_SPLASH)
            }
            DecorationTechnique::StateFlags => self.set_override_redirect(window, true),
        }
    }

    fn restore_decoration(&self, id: WindowId, technique: DecorationTechnique) -> Result<()> {
        let window = id.0 as Window;
        match technique {
            DecorationTechnique::HintRemoval => {
                self.conn
                    .delete_property(window, self.atoms._MOTIF_WM_HINTS)
                    .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
                self.conn
                    .flush()
                    .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
                Ok(())
            }
            DecorationTechnique::TypeReclassification => {
                self.set_window_type(window, self.atoms._NET_WM_WINDOW_TYPE_NORMAL)
            }
            DecorationTechnique::StateFlags => self.set_override_redirect(window, false),
        }
    }

    fn set_always_on_top(&self, id: WindowId, on_top: bool) -> Result<()> {
        let action = if on_top {
            NET_WM_STATE_ADD
        } else {
            NET_WM_STATE_REMOVE
        };
        self.send_wm_state(id.0 as Window, action, self.atoms._NET_WM_STATE_ABOVE)
    }

    fn set_opacity(&self, id: WindowId, opacity: f64) -> Result<()> {
        let value = (opacity.clamp(0.0, 1.0) * u32::MAX as f64) as u32;
        self.conn
            .change_property32(
                PropMode::REPLACE,
                id.0 as Window,
                self.atoms._NET_WM_WINDOW_OPACITY,
                AtomEnum::CARDINAL,
                &[value],
            )
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| PlatformError::CallFailed(e.to_string()))?;
        Ok(())
    }
}
