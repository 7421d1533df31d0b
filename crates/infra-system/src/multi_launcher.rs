// Subprocess launcher for the multi-node management program
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

use scs_core::application::constants::LAUNCHER_SCRUBBED_ENV;
use scs_core::port::{LaunchOutcome, LauncherError, ProcessLauncher, TimeProvider};

/// Runs `<program> <prefix args...> <argv...>` and waits for it to exit
///
/// # Example
/// ```ignore
/// let launcher = MultiLauncher::new("celeryd-multi", vec![], Arc::new(SystemTimeProvider));
/// launcher.execute(&["start".into(), "--no-color".into(), "w1".into()]).await?;
/// ```
pub struct MultiLauncher {
    program: String,
    prefix_args: Vec<String>,
    time_provider: Arc<dyn TimeProvider>,
}

impl MultiLauncher {
    pub fn new(
        program: impl Into<String>,
        prefix_args: Vec<String>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            program: program.into(),
            prefix_args,
            time_provider,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl ProcessLauncher for MultiLauncher {
    async fn execute(&self, argv: &[String]) -> Result<LaunchOutcome, LauncherError> {
        let start_time = self.time_provider.now_millis();

        info!(
            program = %self.program,
            args = ?argv,
            "Starting launcher"
        );

        let output = Command::new(&self.program)
            .args(&self.prefix_args)
            .args(argv)
            .env_remove(LAUNCHER_SCRUBBED_ENV)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LauncherError::SpawnFailed(format!("{}: {}", self.program, e)))?
            .wait_with_output()
            .await
            .map_err(|e| LauncherError::Io(e.to_string()))?;

        let duration_ms = self.time_provider.now_millis() - start_time;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            warn!(
                program = %self.program,
                exit_code = ?output.status.code(),
                duration_ms = %duration_ms,
                stderr = %stderr.trim(),
                "Launcher failed"
            );
            return Err(LauncherError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }

        info!(
            program = %self.program,
            duration_ms = %duration_ms,
            "Launcher completed"
        );

        Ok(LaunchOutcome {
            exit_code: output.status.code(),
            stdout,
            stderr,
            duration_ms,
        })
    }
}
