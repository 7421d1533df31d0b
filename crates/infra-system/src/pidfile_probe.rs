// Pidfile + signal-zero process probe

use scs_core::port::{ProbeError, ProcessProbe};
use std::io::ErrorKind;
use std::path::Path;

/// Probes a process through its pidfile and `kill(pid, 0)`
#[derive(Debug, Default, Clone, Copy)]
pub struct PidfileProbe;

impl PidfileProbe {
    pub fn new() -> Self {
        Self
    }
}

/// Parse pidfile contents
///
/// Only the first line counts and it must be newline-terminated; a missing
/// newline means the writer has not finished.
fn parse_pid(path: &Path, contents: &str) -> Result<i32, ProbeError> {
    let invalid = |reason: &str| ProbeError::InvalidPidfile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    let Some((line, _)) = contents.split_once('\n') else {
        return Err(invalid("partially written"));
    };
    line.trim()
        .parse::<i32>()
        .map_err(|_| invalid(&format!("contents invalid: {:?}", line.trim())))
}

impl ProcessProbe for PidfileProbe {
    fn read_pid(&self, pidfile: &Path) -> Result<Option<i32>, ProbeError> {
        match std::fs::read_to_string(pidfile) {
            Ok(contents) => parse_pid(pidfile, &contents).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProbeError::Io {
                path: pidfile.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    #[cfg(unix)]
    fn signal_alive(&self, pid: i32) -> Result<bool, ProbeError> {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // No signal is sent: only existence and permission are checked
        match kill(Pid::from_raw(pid), None) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(ProbeError::Signal {
                pid,
                reason: e.to_string(),
            }),
        }
    }

    #[cfg(not(unix))]
    fn signal_alive(&self, pid: i32) -> Result<bool, ProbeError> {
        Err(ProbeError::Signal {
            pid,
            reason: "signal probing requires a unix platform".to_string(),
        })
    }
}
