// Process Probe Port
// Local liveness check of a supervised process: pidfile + signal-zero

use std::path::Path;
use thiserror::Error;

/// OS-level probe failures (distinct from "not alive")
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid pidfile {path}: {reason}")]
    InvalidPidfile { path: String, reason: String },

    #[error("Signal probe of pid {pid} failed: {reason}")]
    Signal { pid: i32, reason: String },

    #[error("Cannot read pidfile {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Process probe port
///
/// Implementations:
/// - PidfileProbe: reads the pidfile and sends signal 0 (unix)
pub trait ProcessProbe: Send + Sync {
    /// Read the pid recorded in `pidfile`
    ///
    /// # Returns
    /// `Ok(None)` when the pidfile does not exist (a valid "not running" signal)
    ///
    /// # Errors
    /// - ProbeError::InvalidPidfile if the contents are not a process id
    /// - ProbeError::Io if the file exists but cannot be read
    fn read_pid(&self, pidfile: &Path) -> Result<Option<i32>, ProbeError>;

    /// Send signal 0 to `pid`
    ///
    /// # Returns
    /// `Ok(false)` if there is no such process
    ///
    /// # Errors
    /// - ProbeError::Signal for any other OS error (e.g. permission denied)
    fn signal_alive(&self, pid: i32) -> Result<bool, ProbeError>;

    /// True if the pidfile exists and its pid responds to signals
    fn is_alive(&self, pidfile: &Path) -> Result<bool, ProbeError> {
        match self.read_pid(pidfile)? {
            Some(pid) if pid > 0 => self.signal_alive(pid),
            _ => Ok(false),
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock process table: pidfiles and live pids are set by the test
    #[derive(Default)]
    pub struct MockProcessProbe {
        pidfiles: Mutex<HashMap<PathBuf, i32>>,
        live_pids: Mutex<Vec<i32>>,
        denied_pids: Mutex<Vec<i32>>,
        signal_calls: AtomicUsize,
    }

    impl MockProcessProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn write_pidfile(&self, pidfile: impl Into<PathBuf>, pid: i32) {
            self.pidfiles.lock().unwrap().insert(pidfile.into(), pid);
        }

        pub fn remove_pidfile(&self, pidfile: &Path) {
            self.pidfiles.lock().unwrap().remove(pidfile);
        }

        pub fn set_alive(&self, pid: i32) {
            self.live_pids.lock().unwrap().push(pid);
        }

        pub fn kill(&self, pid: i32) {
            self.live_pids.lock().unwrap().retain(|p| *p != pid);
        }

        /// Probing `pid` fails with a permission error
        pub fn deny(&self, pid: i32) {
            self.denied_pids.lock().unwrap().push(pid);
        }

        pub fn signal_calls(&self) -> usize {
            self.signal_calls.load(Ordering::SeqCst)
        }
    }

    impl ProcessProbe for MockProcessProbe {
        fn read_pid(&self, pidfile: &Path) -> Result<Option<i32>, ProbeError> {
            Ok(self.pidfiles.lock().unwrap().get(pidfile).copied())
        }

        fn signal_alive(&self, pid: i32) -> Result<bool, ProbeError> {
            self.signal_calls.fetch_add(1, Ordering::SeqCst);
            if self.denied_pids.lock().unwrap().contains(&pid) {
                return Err(ProbeError::Signal {
                    pid,
                    reason: "EPERM: Operation not permitted".to_string(),
                });
            }
            Ok(self.live_pids.lock().unwrap().contains(&pid))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::MockProcessProbe;
    use super::*;

    #[test]
    fn test_missing_pidfile_skips_signal() {
        let probe = MockProcessProbe::new();
        assert!(!probe.is_alive(Path::new("/run/none.pid")).unwrap());
        assert_eq!(probe.signal_calls(), 0);
    }

    #[test]
    fn test_non_positive_pid_is_not_running() {
        let probe = MockProcessProbe::new();
        probe.write_pidfile("/run/zero.pid", 0);
        assert!(!probe.is_alive(Path::new("/run/zero.pid")).unwrap());
        assert_eq!(probe.signal_calls(), 0);
    }

    #[test]
    fn test_signal_error_propagates() {
        let probe = MockProcessProbe::new();
        probe.write_pidfile("/run/w.pid", 42);
        probe.deny(42);
        assert!(matches!(
            probe.is_alive(Path::new("/run/w.pid")),
            Err(ProbeError::Signal { pid: 42, .. })
        ));
    }
}
