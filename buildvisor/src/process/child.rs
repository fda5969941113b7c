//! A spawned child process and its termination controls.

use super::TaskSpec;
use crate::core::{TaskId, TaskOutcome, TaskStatus};
use crate::errors::{SpawnError, SupervisorError};
use std::process::ExitStatus;
use std::time::Instant;
use tokio::process::Child;
use tracing::{debug, warn};

/// A running (or finished) child process owned by the supervisor.
///
/// On unix every task leads its own process group, and termination signals
/// go to the whole group so that tools started by a runner (`bun run ...`)
/// stop with it. The group is killed if the handle is dropped while the task
/// is still running. The pid is captured at spawn and doubles as the process
/// group id.
#[derive(Debug)]
pub struct ChildTask {
    id: TaskId,
    spec: TaskSpec,
    child: Child,
    pid: Option<u32>,
    status: TaskStatus,
    termination_requested: bool,
    force_killed: bool,
    started: Instant,
    finished: Option<Instant>,
}

impl ChildTask {
    /// Starts the process described by `spec`.
    pub fn spawn(id: TaskId, spec: TaskSpec) -> Result<Self, SpawnError> {
        let child = spec
            .to_command()
            .spawn()
            .map_err(|source| SpawnError::new(&spec.label, spec.command_line(), source))?;
        let pid = child.id();

        debug!(task = %id, label = %spec.label, pid, "Spawned task");

        Ok(Self {
            id,
            spec,
            child,
            pid,
            status: TaskStatus::Running,
            termination_requested: false,
            force_killed: false,
            started: Instant::now(),
            finished: None,
        })
    }

    /// Returns the task id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.spec.label
    }

    /// Returns the spec the task was started from.
    #[must_use]
    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    /// Returns the OS process id captured at spawn.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns the last known status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns whether the supervisor asked this task to stop.
    #[must_use]
    pub fn termination_requested(&self) -> bool {
        self.termination_requested
    }

    /// Returns whether the task was force-killed.
    #[must_use]
    pub fn force_killed(&self) -> bool {
        self.force_killed
    }

    /// Waits for the process to exit and reaps it.
    ///
    /// Cancel-safe. Once the task has exited, the recorded status is returned
    /// without touching the OS again.
    pub async fn wait(&mut self) -> Result<TaskStatus, SupervisorError> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }

        let status = self.child.wait().await.map_err(|source| SupervisorError::Wait {
            label: self.spec.label.clone(),
            source,
        })?;
        Ok(self.record_exit(status))
    }

    /// Asks the process to stop gracefully (SIGTERM on unix).
    ///
    /// Returns true if a signal was sent. Returns false without signalling if
    /// the task has already exited or a termination was already requested.
    pub fn terminate(&mut self) -> bool {
        if self.termination_requested || self.refresh_exited() {
            return false;
        }

        self.termination_requested = true;
        match self.send_terminate() {
            Ok(()) => {
                debug!(task = %self.id, label = %self.spec.label, pid = self.pid, "Sent terminate");
                true
            }
            Err(e) => {
                warn!(task = %self.id, label = %self.spec.label, error = %e, "Failed to terminate task");
                false
            }
        }
    }

    /// Kills the process immediately (SIGKILL to its group on unix).
    ///
    /// Returns true if a kill was issued.
    pub fn force_kill(&mut self) -> bool {
        if self.refresh_exited() {
            return false;
        }

        self.termination_requested = true;
        match self.send_kill() {
            Ok(()) => {
                self.force_killed = true;
                warn!(task = %self.id, label = %self.spec.label, pid = self.pid, "Force-killed task");
                true
            }
            Err(e) => {
                warn!(task = %self.id, label = %self.spec.label, error = %e, "Failed to kill task");
                false
            }
        }
    }

    /// Kills whatever is left of the task's process group after it exited.
    ///
    /// Only acts on tasks the supervisor asked to stop, so a task that exited
    /// on its own is never signalled. Returns true if any process was left.
    pub fn kill_stragglers(&mut self) -> bool {
        if !self.termination_requested || !self.refresh_exited() {
            return false;
        }

        match self.signal_group_after_exit() {
            Ok(true) => {
                warn!(task = %self.id, label = %self.spec.label, pid = self.pid, "Killed leftover processes");
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(task = %self.id, label = %self.spec.label, error = %e, "Failed to kill leftover processes");
                false
            }
        }
    }

    /// Builds the outcome record for this task.
    #[must_use]
    pub fn outcome(&self) -> TaskOutcome {
        let end = self.finished.unwrap_or_else(Instant::now);
        TaskOutcome {
            id: self.id,
            label: self.spec.label.clone(),
            command: self.spec.command_line(),
            status: self.status,
            termination_requested: self.termination_requested,
            force_killed: self.force_killed,
            duration_ms: end.duration_since(self.started).as_secs_f64() * 1000.0,
        }
    }

    /// Polls the OS without blocking. Returns true if the task has exited.
    fn refresh_exited(&mut self) -> bool {
        if self.status.is_terminal() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.record_exit(status);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(task = %self.id, label = %self.spec.label, error = %e, "Failed to poll task");
                false
            }
        }
    }

    fn record_exit(&mut self, status: ExitStatus) -> TaskStatus {
        self.status = TaskStatus::from(status);
        self.finished = Some(Instant::now());
        debug!(task = %self.id, label = %self.spec.label, status = %self.status, "Task exited");
        self.status
    }

    #[cfg(unix)]
    fn send_terminate(&mut self) -> std::io::Result<()> {
        match self.group() {
            Some(group) => signal_group(group, nix::sys::signal::Signal::SIGTERM),
            None => self.child.start_kill(),
        }
    }

    #[cfg(not(unix))]
    fn send_terminate(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    #[cfg(unix)]
    fn send_kill(&mut self) -> std::io::Result<()> {
        match self.group() {
            Some(group) => signal_group(group, nix::sys::signal::Signal::SIGKILL),
            None => self.child.start_kill(),
        }
    }

    #[cfg(not(unix))]
    fn send_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    /// Returns Ok(false) when the group is already empty.
    #[cfg(unix)]
    fn signal_group_after_exit(&self) -> std::io::Result<bool> {
        let Some(group) = self.group() else {
            return Ok(false);
        };
        match nix::sys::signal::killpg(group, nix::sys::signal::Signal::SIGKILL) {
            Ok(()) => Ok(true),
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(not(unix))]
    fn signal_group_after_exit(&self) -> std::io::Result<bool> {
        Ok(false)
    }

    #[cfg(unix)]
    fn kill_group_on_drop(&self) {
        if let Some(group) = self.group() {
            let _ = signal_group(group, nix::sys::signal::Signal::SIGKILL);
        }
    }

    #[cfg(not(unix))]
    fn kill_group_on_drop(&self) {}

    #[cfg(unix)]
    fn group(&self) -> Option<nix::unistd::Pid> {
        self.pid
            .and_then(|pid| i32::try_from(pid).ok())
            .map(nix::unistd::Pid::from_raw)
    }
}

#[cfg(unix)]
fn signal_group(group: nix::unistd::Pid, signal: nix::sys::signal::Signal) -> std::io::Result<()> {
    nix::sys::signal::killpg(group, signal).map_err(std::io::Error::from)
}

impl Drop for ChildTask {
    fn drop(&mut self) {
        if !self.status.is_terminal() {
            self.kill_group_on_drop();
        }
    }
}
