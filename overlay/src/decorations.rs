//! Decoration stripping with exact-reverse restore.
//!
//! Techniques are tried in a fixed preference order until one reports
//! success; the winner is recorded per window so restore undoes precisely
//! the mutation that was applied, not a guess. Cosmetic extras (always on
//! top, transparency) are best-effort and never propagate errors.

use std::collections::HashMap;
use std::sync::Arc;

use crate::platform::{DecorationTechnique, PlatformError, WindowBackend, WindowId};

pub struct DecorationRemover {
    backend: Arc<dyn WindowBackend>,
    /// Technique that succeeded per window. Presence means the window is
    /// currently modified; a second removal call is a no-op.
    applied: HashMap<WindowId, DecorationTechnique>,
}

impl DecorationRemover {
    pub fn new(backend: Arc<dyn WindowBackend>) -> Self {
        Self {
            backend,
            applied: HashMap::new(),
        }
    }

    /// Strip decorations from `id`. Idempotent: if this window was already
    /// modified, returns the recorded technique without touching the OS.
    pub fn remove_decorations(
        &mut self,
        id: WindowId,
    ) -> Result<DecorationTechnique, PlatformError> {
        if let Some(&technique) = self.applied.get(&id) {
            tracing::debug!(window = %id, ?technique, "Decorations already removed");
            return Ok(technique);
        }

        let mut last_err = None;
        for technique in DecorationTechnique::ORDERED {
            match self.backend.apply_decoration(id, technique) {
                Ok(()) => {
                    tracing::info!(window = %id, ?technique, "Decorations removed");
                    self.applied.insert(id, technique);
                    return Ok(technique);
                }
                Err(e) => {
                    tracing::debug!(window = %id, ?technique, error = %e, "Technique failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(PlatformError::Unsupported {
            operation: "apply_decoration",
        }))
    }

    /// Reverse whatever technique was applied to `id`, if any.
    pub fn restore_decorations(&mut self, id: WindowId) {
        let Some(technique) = self.applied.remove(&id) else {
            return;
        };
        if let Err(e) = self.backend.restore_decoration(id, technique) {
            tracing::warn!(window = %id, ?technique, error = %e, "Decoration restore failed");
        }
    }

    /// Best-effort; failures are logged and swallowed.
    pub fn set_always_on_top(&self, id: WindowId, on_top: bool) {
        if let Err(e) = self.backend.set_always_on_top(id, on_top) {
            tracing::debug!(window = %id, error = %e, "set_always_on_top ignored");
        }
    }

    /// Best-effort; failures are logged and swallowed.
    pub fn make_window_transparent(&self, id: WindowId, opacity: f64) {
        if let Err(e) = self.backend.set_opacity(id, opacity) {
            tracing::debug!(window = %id, error = %e, "set_opacity ignored");
        }
    }

    #[cfg(test)]
    fn applied_technique(&self, id: WindowId) -> Option<DecorationTechnique> {
        self.applied.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockBackend;

    #[test]
    fn second_removal_is_a_no_op() {
        let backend = Arc::new(MockBackend::new());
        let mut remover = DecorationRemover::new(backend.clone());

        remover.remove_decorations(WindowId(1)).unwrap();
        remover.remove_decorations(WindowId(1)).unwrap();

        // underlying mutation happened exactly once
        assert_eq!(backend.applied().len(), 1);
    }

    #[test]
    fn falls_through_to_next_technique() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_technique(DecorationTechnique::HintRemoval);
        let mut remover = DecorationRemover::new(backend.clone());

        let technique = remover.remove_decorations(WindowId(1)).unwrap();
        assert_eq!(technique, DecorationTechnique::TypeReclassification);
        assert_eq!(backend.applied().len(), 2);
    }

    #[test]
    fn all_techniques_failing_is_an_error() {
        let backend = Arc::new(MockBackend::new());
        for t in DecorationTechnique::ORDERED {
            backend.fail_technique(t);
        }
        let mut remover = DecorationRemover::new(backend.clone());

        assert!(remover.remove_decorations(WindowId(1)).is_err());
        assert!(remover.applied_technique(WindowId(1)).is_none());
    }

    #[test]
    fn restore_reverses_exactly_the_winner() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_technique(DecorationTechnique::HintRemoval);
        let mut remover = DecorationRemover::new(backend.clone());

        remover.remove_decorations(WindowId(1)).unwrap();
        remover.restore_decorations(WindowId(1));

        assert_eq!(
            backend.restored(),
            vec![(WindowId(1), DecorationTechnique::TypeReclassification)]
        );
        // restored window can be modified again; the failing technique is
        // retried first each time
        remover.remove_decorations(WindowId(1)).unwrap();
        assert_eq!(
            backend.applied(),
            vec![
                (WindowId(1), DecorationTechnique::HintRemoval),
                (WindowId(1), DecorationTechnique::TypeReclassification),
                (WindowId(1), DecorationTechnique::HintRemoval),
                (WindowId(1), DecorationTechnique::TypeReclassification),
            ]
        );
    }

    #[test]
    fn restore_without_removal_does_nothing() {
        let backend = Arc::new(MockBackend::new());
        let mut remover = DecorationRemover::new(backend.clone());
        remover.restore_decorations(WindowId(9));
        assert!(backend.restored().is_empty());
    }

    #[test]
    fn cosmetics_never_error() {
        // NoopBackend fails every cosmetic call; the remover swallows them
        let backend = Arc::new(crate::platform::noop::NoopBackend);
        let remover = DecorationRemover::new(backend);
        remover.set_always_on_top(WindowId(1), true);
        remover.make_window_transparent(WindowId(1), 0.9);
    }
}
