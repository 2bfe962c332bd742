//! Coordinate translation between the host container and absolute screen space.
//!
//! The host UI reports where the embed container sits inside its viewport and
//! where the host window sits on screen. Combining those with the host's
//! chrome thickness and zoom level yields the absolute rectangle the external
//! window must occupy.

use serde::{Deserialize, Serialize};

/// Container region inside the host viewport (CSS-pixel space, pre-zoom).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Absolute screen-space rectangle for the external window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenPosition {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenPosition {
    /// Largest per-component distance to another position, in pixels.
    /// Used for tolerance gating and change logging.
    pub fn max_delta(&self, other: &ScreenPosition) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        let dw = self.width.abs_diff(other.width);
        let dh = self.height.abs_diff(other.height);
        dx.max(dy).max(dw).max(dh)
    }
}

/// Pixel distance between the host window's outer edge and its content
/// viewport (title bar, toolbars, borders).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromeOffsets {
    pub top: i32,
    pub left: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Conservative per-OS chrome defaults. These are heuristics, not
/// measurements; hosts with unusual toolbars should calibrate or override.
pub fn platform_default_offsets() -> ChromeOffsets {
    #[cfg(target_os = "windows")]
    {
        ChromeOffsets {
            top: 32,
            left: 8,
            right: 8,
            bottom: 8,
        }
    }
    #[cfg(target_os = "macos")]
    {
        ChromeOffsets {
            top: 28,
            left: 0,
            right: 0,
            bottom: 0,
        }
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        ChromeOffsets {
            top: 30,
            left: 4,
            right: 4,
            bottom: 4,
        }
    }
}

/// Change threshold below which bounds updates are not worth logging.
const LOG_DELTA_PX: f64 = 5.0;

/// Translates container-relative bounds into absolute screen rectangles.
///
/// Pure state machine: the only side effects are internal field updates and
/// diagnostic logging. `calculate_screen_position` returns `None` until both
/// the container bounds and the host window position have been seeded.
#[derive(Debug, Clone)]
pub struct CoordinateSystem {
    container: Option<ContainerBounds>,
    window_position: Option<(i32, i32)>,
    offsets: ChromeOffsets,
    zoom: f64,
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinateSystem {
    pub fn new() -> Self {
        Self {
            container: None,
            window_position: None,
            offsets: platform_default_offsets(),
            zoom: 1.0,
        }
    }

    /// Last-write-wins; logs only when any component moved more than 5 px.
    pub fn update_container_bounds(&mut self, bounds: ContainerBounds) {
        if let Some(prev) = self.container {
            let delta = (bounds.x - prev.x)
                .abs()
                .max((bounds.y - prev.y).abs())
                .max((bounds.width - prev.width).abs())
                .max((bounds.height - prev.height).abs());
            if delta > LOG_DELTA_PX {
                tracing::debug!(
                    x = bounds.x,
                    y = bounds.y,
                    width = bounds.width,
                    height = bounds.height,
                    "Container bounds changed"
                );
            }
        } else {
            tracing::debug!(
                x = bounds.x,
                y = bounds.y,
                width = bounds.width,
                height = bounds.height,
                "Container bounds seeded"
            );
        }
        self.container = Some(bounds);
    }

    pub fn update_window_position(&mut self, x: i32, y: i32) {
        self.window_position = Some((x, y));
    }

    pub fn update_chrome_offsets(&mut self, offsets: ChromeOffsets) {
        self.offsets = offsets;
    }

    /// Zoom factor of the host viewport. 1.0 = no scaling.
    pub fn update_zoom_level(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    pub fn zoom_level(&self) -> f64 {
        self.zoom
    }

    pub fn chrome_offsets(&self) -> ChromeOffsets {
        self.offsets
    }

    pub fn container_bounds(&self) -> Option<ContainerBounds> {
        self.container
    }

    pub fn window_position(&self) -> Option<(i32, i32)> {
        self.window_position
    }

    /// Compute the absolute screen rectangle, or `None` if either the
    /// container bounds or the host window position are not yet known.
    ///
    /// `screen.x = window.x + chrome.left + container.x * zoom`, y analogous
    /// with the top offset; width/height scale by zoom.
    pub fn calculate_screen_position(&self) -> Option<ScreenPosition> {
        let container = self.container?;
        let (win_x, win_y) = self.window_position?;

        let x = win_x + self.offsets.left + (container.x * self.zoom).round() as i32;
        let y = win_y + self.offsets.top + (container.y * self.zoom).round() as i32;
        let width = (container.width * self.zoom).round().max(1.0) as u32;
        let height = (container.height * self.zoom).round().max(1.0) as u32;

        Some(ScreenPosition {
            x,
            y,
            width,
            height,
        })
    }

    /// Calibration hook against a known host element.
    ///
    /// Not implemented: returns the current (heuristic) offsets unchanged.
    /// Kept as an explicit seam so a host that can render a probe element at
    /// a known viewport position can refine the chrome table later.
    pub fn calibrate(&mut self) -> ChromeOffsets {
        tracing::debug!("Chrome calibration requested; using static defaults");
        self.offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> CoordinateSystem {
        let mut cs = CoordinateSystem::new();
        cs.update_container_bounds(ContainerBounds {
            x: 100.0,
            y: 50.0,
            width: 800.0,
            height: 600.0,
        });
        cs.update_window_position(0, 0);
        cs.update_chrome_offsets(ChromeOffsets {
            top: 30,
            left: 5,
            right: 0,
            bottom: 0,
        });
        cs
    }

    #[test]
    fn insufficient_data_before_seeding() {
        let cs = CoordinateSystem::new();
        assert!(cs.calculate_screen_position().is_none());

        let mut cs = CoordinateSystem::new();
        cs.update_window_position(10, 10);
        assert!(cs.calculate_screen_position().is_none());
    }

    #[test]
    fn basic_translation() {
        let cs = seeded();
        assert_eq!(
            cs.calculate_screen_position(),
            Some(ScreenPosition {
                x: 105,
                y: 80,
                width: 800,
                height: 600,
            })
        );
    }

    #[test]
    fn pure_for_identical_inputs() {
        let cs = seeded();
        let a = cs.calculate_screen_position();
        let b = cs.calculate_screen_position();
        assert_eq!(a, b);
    }

    #[test]
    fn zoom_scales_container_terms_only() {
        let mut cs = seeded();
        cs.update_zoom_level(1.5);
        let pos = cs.calculate_screen_position().unwrap();
        // window position and chrome are physical pixels, only the
        // container contribution scales
        assert_eq!(pos.x, 5 + 150);
        assert_eq!(pos.y, 30 + 75);
        assert_eq!(pos.width, 1200);
        assert_eq!(pos.height, 900);
    }

    #[test]
    fn window_move_shifts_result() {
        let mut cs = seeded();
        cs.update_window_position(200, 300);
        let pos = cs.calculate_screen_position().unwrap();
        assert_eq!(pos.x, 305);
        assert_eq!(pos.y, 380);
    }

    #[test]
    fn last_write_wins_on_bounds() {
        let mut cs = seeded();
        cs.update_container_bounds(ContainerBounds {
            x: 0.0,
            y: 0.0,
            width: 640.0,
            height: 480.0,
        });
        let pos = cs.calculate_screen_position().unwrap();
        assert_eq!(pos.width, 640);
        assert_eq!(pos.height, 480);
    }

    #[test]
    fn max_delta_across_components() {
        let a = ScreenPosition {
            x: 0,
            y: 0,
            width: 100,
            height: 100,
        };
        let b = ScreenPosition {
            x: 1,
            y: -3,
            width: 100,
            height: 107,
        };
        assert_eq!(a.max_delta(&b), 7);
    }

    #[test]
    fn calibration_is_a_stub() {
        let mut cs = seeded();
        let before = cs.chrome_offsets();
        assert_eq!(cs.calibrate(), before);
    }
}
