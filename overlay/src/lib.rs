//! Perch Overlay Library
//!
//! Pins an external viewer's native window over a host container region by
//! continuous repositioning, giving the appearance of embedding without
//! reparenting the window.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    manager                          │
//! │                 OverlayManager                      │
//! │      (session state machine + orchestration)        │
//! ├──────────────┬───────────────┬──────────────────────┤
//! │   tracker    │  decorations  │        sync          │
//! │ WindowTracker│ Decoration-   │  PositionSyncEngine  │
//! │  (discovery) │   Remover     │   (worker thread)    │
//! ├──────────────┴───────────────┴──────────────────────┤
//! │                    geometry                         │
//! │       CoordinateSystem, ScreenPosition              │
//! │        (container → screen translation)             │
//! ├─────────────────────────────────────────────────────┤
//! │                    platform/                        │
//! │            x11, windows, macos, noop                │
//! │           (native window control APIs)              │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod decorations;
pub mod error;
pub mod geometry;
pub mod manager;
pub mod platform;
pub mod process;
pub mod sync;
pub mod tracker;

// Re-export commonly used types
pub use config::OverlaySettings;
pub use decorations::DecorationRemover;
pub use error::OverlayError;
pub use geometry::{ChromeOffsets, ContainerBounds, CoordinateSystem, ScreenPosition};
pub use manager::{OverlayManager, OverlayState, StatusSnapshot};
pub use platform::{
    create_backend, DecorationTechnique, PlatformError, WindowBackend, WindowId, WindowInfo,
};
pub use sync::{PerformanceMetrics, PositionSyncEngine};
pub use tracker::WindowTracker;
