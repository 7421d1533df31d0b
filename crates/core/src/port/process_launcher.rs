// Process Launcher Port
// Executes start/stop/restart of the OS-level worker process from a built argv

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Lifecycle subcommand passed as the first launcher argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchAction {
    Start,
    Stop,
    Restart,
}

impl LaunchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchAction::Start => "start",
            LaunchAction::Stop => "stop",
            LaunchAction::Restart => "restart",
        }
    }
}

impl fmt::Display for LaunchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed launcher invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: i64,
}

/// Launcher failures (fatal for the call, propagated unmodified)
#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Launcher exited with {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("IO error: {0}")]
    Io(String),
}

/// Process launcher trait
///
/// Implementations:
/// - MultiLauncher: runs the multi-node management program as a subprocess
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Execute the launcher with an ordered argument vector
    ///
    /// `argv[0]` is the subcommand (`start`, `stop`, `restart`); the program
    /// itself is chosen by the implementation.
    ///
    /// # Errors
    /// - LauncherError::SpawnFailed if the program cannot be started
    /// - LauncherError::NonZeroExit if it reports failure
    async fn execute(&self, argv: &[String]) -> Result<LaunchOutcome, LauncherError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Instrumented launcher: records every argv and detects overlapping calls
    #[derive(Default)]
    pub struct RecordingLauncher {
        calls: Mutex<Vec<Vec<String>>>,
        in_flight: AtomicUsize,
        overlaps: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
        fail: AtomicBool,
    }

    impl RecordingLauncher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Each invocation sleeps for `delay` before completing
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Number of invocations that began while another was running
        pub fn overlap_count(&self) -> usize {
            self.overlaps.load(Ordering::SeqCst)
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProcessLauncher for RecordingLauncher {
        async fn execute(&self, argv: &[String]) -> Result<LaunchOutcome, LauncherError> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            if running > 1 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            self.calls.lock().unwrap().push(argv.to_vec());

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                return Err(LauncherError::NonZeroExit {
                    code: Some(1),
                    stderr: "mock launcher failure".to_string(),
                });
            }

            Ok(LaunchOutcome {
                exit_code: Some(0),
                stdout: format!("> {}: OK", argv.first().cloned().unwrap_or_default()),
                stderr: String::new(),
                duration_ms: self.delay.as_millis() as i64,
            })
        }
    }
}
