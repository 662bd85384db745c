//! Child process handle with graceful-then-forced termination

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::command::AgentCommand;
use super::model::duration_millis;
use crate::error::SupervisorError;
use crate::stream::StreamSource;

/// Send a signal to the whole process group.
///
/// Children are spawned with `process_group(0)`, so the group id equals the
/// pid and helpers the agent started are signalled too.
#[cfg(unix)]
fn signal_process_group(pid: u32, signal: libc::c_int) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // ESRCH just means the group is already gone
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc != 0 {
        debug!(pid, signal, error = %io::Error::last_os_error(), "signal not delivered");
    }
}

/// A spawned agent process
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    exit: Option<ExitStatus>,
}

impl ProcessHandle {
    /// Spawn with piped stdout/stderr and a closed stdin
    pub fn spawn(command: &AgentCommand) -> Result<(Self, ChildStdout, ChildStderr), SupervisorError> {
        let program = command.resolve_executable()?;

        let mut cmd = Command::new(&program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            executable: command.executable.clone(),
            source,
        })?;
        let pid = child.id();

        let stdout = child.stdout.take().ok_or(SupervisorError::MissingPipe {
            stream: StreamSource::Stdout,
        })?;
        let stderr = child.stderr.take().ok_or(SupervisorError::MissingPipe {
            stream: StreamSource::Stderr,
        })?;

        info!(pid = ?pid, command = %command.display(), "agent process started");
        Ok((
            Self {
                child,
                pid,
                exit: None,
            },
            stdout,
            stderr,
        ))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Wait for exit; cancel-safe and cached once known
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit = Some(status);
        Ok(status)
    }

    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.exit.is_none() {
            self.exit = self.child.try_wait()?;
        }
        Ok(self.exit)
    }

    fn has_exited(&mut self) -> bool {
        matches!(self.try_wait(), Ok(Some(_)))
    }

    /// Ask the process to stop; a no-op once it has exited
    pub fn interrupt(&mut self) {
        if self.has_exited() {
            return;
        }
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            signal_process_group(pid, libc::SIGINT);
            return;
        }
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "interrupt failed");
        }
    }

    /// Kill the process and its group without waiting for cooperation
    pub async fn force_kill(&mut self) {
        if self.has_exited() {
            return;
        }
        warn!(pid = ?self.pid, "forcing agent process to stop");
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            signal_process_group(pid, libc::SIGKILL);
        }
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "kill after group signal failed");
        }
    }

    /// Interrupt, wait up to `grace`, then force-kill.
    ///
    /// Calling this on an exited process only returns the recorded status.
    pub async fn terminate(&mut self, grace: Duration) -> Option<ExitStatus> {
        if self.has_exited() {
            return self.exit;
        }
        self.interrupt();
        match tokio::time::timeout(grace, self.wait()).await {
            Ok(Ok(status)) => return Some(status),
            Ok(Err(e)) => debug!(error = %e, "wait after interrupt failed"),
            Err(_) => debug!(grace_ms = duration_millis(grace), "process ignored interrupt"),
        }
        self.force_kill().await;
        match self.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "could not reap agent process");
                None
            }
        }
    }
}
