//! External viewer process lifecycle.
//!
//! The viewer is spawned detached from our stdio and torn down gracefully:
//! SIGTERM (unix) with a bounded grace period, then a forced kill. Windows
//! has no equivalent of SIGTERM for console-less children, so termination
//! is forced there.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::OverlayError;

/// How long after spawn we check for an immediate exit (crash on startup,
/// missing shared library, unsupported document type).
const EARLY_EXIT_WINDOW: Duration = Duration::from_millis(150);

const KILL_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct ViewerProcess {
    child: Child,
    pid: u32,
}

impl ViewerProcess {
    /// Spawn `command` with the document path appended.
    pub fn spawn(command: &[String], document: &Path) -> Result<Self, OverlayError> {
        let Some((program, args)) = command.split_first() else {
            return Err(OverlayError::LaunchFailure {
                reason: "no viewer command configured".to_string(),
            });
        };

        let mut child = Command::new(program)
            .args(args)
            .arg(document)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| OverlayError::LaunchFailure {
                reason: format!("{program}: {e}"),
            })?;

        let pid = child.id();
        tracing::info!(pid, program = %program, "Viewer spawned");

        std::thread::sleep(EARLY_EXIT_WINDOW);
        if let Ok(Some(status)) = child.try_wait() {
            return Err(OverlayError::LaunchFailure {
                reason: format!("viewer exited immediately with {status}"),
            });
        }

        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the viewer to exit, escalating to a forced kill after `timeout`.
    pub fn terminate(&mut self, timeout: Duration) {
        if !self.is_alive() {
            return;
        }

        #[cfg(unix)]
        {
            unsafe {
                libc::kill(self.pid as libc::pid_t, libc::SIGTERM);
            }
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                if !self.is_alive() {
                    tracing::info!(pid = self.pid, "Viewer exited gracefully");
                    return;
                }
                std::thread::sleep(KILL_POLL_INTERVAL);
            }
            tracing::warn!(pid = self.pid, "Viewer ignored SIGTERM; killing");
        }
        #[cfg(not(unix))]
        {
            let _ = timeout;
        }

        if let Err(e) = self.child.kill() {
            tracing::warn!(pid = self.pid, error = %e, "Kill failed");
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_command_is_a_launch_failure() {
        let err = ViewerProcess::spawn(&[], &PathBuf::from("/tmp/doc.pdf")).unwrap_err();
        assert!(matches!(err, OverlayError::LaunchFailure { .. }));
    }

    #[test]
    fn missing_binary_is_a_launch_failure() {
        let err = ViewerProcess::spawn(
            &["perch-no-such-viewer-binary".to_string()],
            &PathBuf::from("/tmp/doc.pdf"),
        )
        .unwrap_err();
        assert!(matches!(err, OverlayError::LaunchFailure { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn spawn_and_terminate_round_trip() {
        // the trailing document argument lands in $0 and is ignored
        let mut proc = ViewerProcess::spawn(
            &["sh".to_string(), "-c".to_string(), "sleep 30".to_string()],
            Path::new("/dev/null"),
        )
        .unwrap();
        assert!(proc.is_alive());
        proc.terminate(Duration::from_secs(2));
        assert!(!proc.is_alive());
    }

    #[cfg(unix)]
    #[test]
    fn immediate_exit_is_detected() {
        let err = ViewerProcess::spawn(&["true".to_string()], Path::new("/dev/null")).unwrap_err();
        assert!(matches!(err, OverlayError::LaunchFailure { .. }));
    }
}
