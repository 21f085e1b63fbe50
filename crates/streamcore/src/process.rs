//! Child-process wrapper for one pipeline role process.
//!
//! Each role process (input / transcoder / output) is placed in its own
//! process group on unix so a graceful-stop/terminate/kill escalation can
//! signal the whole group rather than a single PID, matching spec.md §4.3.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::time::timeout;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to signal process group: {0}")]
    Signal(#[source] std::io::Error),
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Escalation stages for stopping a process group, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Ask the pipeline to wind down cleanly (`SIGINT` on unix).
    Graceful,
    /// Ask it to stop now (`SIGTERM`).
    Terminate,
    /// No more waiting (`SIGKILL`).
    Kill,
}

#[cfg(unix)]
impl StopSignal {
    fn as_raw(self) -> libc::c_int {
        match self {
            Self::Graceful => libc::SIGINT,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

/// A spawned pipeline role process, placed in its own process group.
pub struct RoleProcess {
    child: Child,
    pid: u32,
}

impl RoleProcess {
    /// Spawns `program` with `args`, in a clean environment augmented with
    /// `env_overrides` (debug-dump directory, per-process log path, ...),
    /// in its own process group on unix.
    pub fn spawn(
        program: &str,
        args: &[String],
        env_overrides: &HashMap<String, String>,
        log_dir: &Path,
    ) -> Result<Self, ProcessError> {
        let mut cmd = Command::new(program);
        cmd.args(args).env_clear().envs(env_overrides).current_dir(log_dir);

        // SAFETY: pre_exec runs in the forked child before exec; setsid() is
        // async-signal-safe and takes no arguments referencing parent state.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let child = cmd.kill_on_drop(false).spawn().map_err(ProcessError::Spawn)?;
        let pid = child.id().expect("spawned child always has a pid before it's awaited");
        Ok(Self { child, pid })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns `true` if the process is still alive, without blocking.
    pub fn is_alive(&mut self) -> Result<bool, ProcessError> {
        match self.child.try_wait() {
            Ok(Some(_)) => Ok(false),
            Ok(None) => Ok(true),
            Err(e) => Err(ProcessError::Wait(e)),
        }
    }

    /// Sends `signal` to this process's entire group.
    #[cfg(unix)]
    pub fn signal_group(&self, signal: StopSignal) -> Result<(), ProcessError> {
        // Negative pid targets the whole process group whose id equals this
        // pid, since setsid() made it its own group leader.
        let rc = unsafe { libc::kill(-(self.pid as i32), signal.as_raw()) };
        if rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH) {
            Ok(())
        } else {
            Err(ProcessError::Signal(std::io::Error::last_os_error()))
        }
    }

    #[cfg(not(unix))]
    pub fn signal_group(&self, _signal: StopSignal) -> Result<(), ProcessError> {
        Ok(())
    }

    /// Waits up to `duration` for the process to exit.
    pub async fn wait_timeout(&mut self, duration: Duration) -> Result<bool, ProcessError> {
        match timeout(duration, self.child.wait()).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => Err(ProcessError::Wait(e)),
            Err(_) => Ok(false),
        }
    }

    /// Runs the full graceful → terminate → kill escalation, blocking until
    /// the process exits or the kill signal is sent.
    pub async fn stop_with_escalation(
        &mut self,
        graceful_timeout: Duration,
        terminate_timeout: Duration,
    ) -> Result<(), ProcessError> {
        self.signal_group(StopSignal::Graceful)?;
        if self.wait_timeout(graceful_timeout).await? {
            return Ok(());
        }

        self.signal_group(StopSignal::Terminate)?;
        if self.wait_timeout(terminate_timeout).await? {
            return Ok(());
        }

        self.signal_group(StopSignal::Kill)?;
        let _ = self.child.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_stop_short_lived_process() {
        let mut proc = RoleProcess::spawn("/bin/sleep", &["5".to_string()], &HashMap::new(), Path::new("/tmp"))
            .expect("spawn sleep");
        assert!(proc.is_alive().unwrap());
        proc.stop_with_escalation(Duration::from_millis(200), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(!proc.is_alive().unwrap());
    }

    #[tokio::test]
    async fn is_alive_reflects_natural_exit() {
        let mut proc = RoleProcess::spawn("/bin/true", &[], &HashMap::new(), Path::new("/tmp")).expect("spawn true");
        // allow the process a moment to exit on its own
        let _ = proc.wait_timeout(Duration::from_millis(500)).await;
        assert!(!proc.is_alive().unwrap());
    }
}
