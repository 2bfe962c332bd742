//! Session-level error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

use crate::platform::PlatformError;

/// Failures surfaced by [`crate::manager::OverlayManager`].
///
/// Only the first four kinds abort `load_document`; decoration problems are
/// logged and the session continues undecorated, and runtime sync hiccups
/// never surface here at all (they show up in the engine metrics).
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("document not found: {path}")]
    DocumentNotFound { path: PathBuf },

    #[error("failed to launch viewer: {reason}")]
    LaunchFailure { reason: String },

    #[error("no window appeared for pid {pid} within {timeout_ms} ms")]
    WindowNotFound { pid: u32, timeout_ms: u64 },

    #[error("initial placement failed")]
    PositioningFailure(#[source] PlatformError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}
