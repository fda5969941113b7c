//! Task status and stage state enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::ExitStatus;

/// The lifecycle status of a single child task.
///
/// A task starts `Running` and moves exactly once to a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    /// The process is alive (or has exited but not been reaped yet).
    Running,
    /// The process exited on its own with a status code.
    Exited {
        /// The exit code.
        code: i32,
    },
    /// The process was ended by a signal.
    Terminated {
        /// The signal number, when the platform reports one.
        signal: Option<i32>,
    },
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited { code } => write!(f, "exited with code {code}"),
            Self::Terminated { signal: Some(signal) } => {
                write!(f, "terminated by signal {signal}")
            }
            Self::Terminated { signal: None } => write!(f, "terminated"),
        }
    }
}

impl From<ExitStatus> for TaskStatus {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Self::Exited { code },
            None => Self::Terminated {
                signal: exit_signal(status),
            },
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

impl TaskStatus {
    /// Returns true once the task has stopped running.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns true if the task exited with code 0.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }

    /// Returns true if the task stopped without succeeding.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.is_terminal() && !self.is_success()
    }

    /// Returns the exit code, if the task exited on its own.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited { code } => Some(*code),
            _ => None,
        }
    }
}

/// The aggregate state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Stage tasks are spawned and at least one is still running.
    Running,
    /// Every task in the stage has a terminal status.
    Completed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl StageState {
    /// Derives the stage state from its task statuses.
    ///
    /// A stage with no tasks is completed as soon as it starts.
    #[must_use]
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a TaskStatus>) -> Self {
        if statuses.into_iter().all(TaskStatus::is_terminal) {
            Self::Completed
        } else {
            Self::Running
        }
    }

    /// Returns true if the stage has completed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}
