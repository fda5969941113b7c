//! Outcomes of tasks, stages and whole pipeline runs.

use super::{StageState, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process exit code when every stage succeeded.
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit code when a stage failed.
pub const EXIT_FAILURE: u8 = 1;
/// Process exit code after an interrupt (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

/// Final record of one child task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// The task id.
    pub id: TaskId,
    /// The task label (e.g. "sql-codegen").
    pub label: String,
    /// The command line that was run.
    pub command: String,
    /// The final status.
    pub status: TaskStatus,
    /// Whether the supervisor asked the task to terminate.
    pub termination_requested: bool,
    /// Whether the task had to be force-killed after the grace period.
    pub force_killed: bool,
    /// Wall time from spawn to exit, in milliseconds.
    pub duration_ms: f64,
}

/// Final record of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// The stage name.
    pub name: String,
    /// 1-based position of the stage in its pipeline.
    pub position: usize,
    /// The aggregate stage state.
    pub state: StageState,
    /// Task outcomes, in spawn order.
    pub tasks: Vec<TaskOutcome>,
    /// Whether the stage was cut short by an interrupt.
    pub interrupted: bool,
    /// Wall time of the whole stage, in milliseconds.
    pub duration_ms: f64,
}

impl StageOutcome {
    /// Creates the outcome of a stage that had no tasks.
    #[must_use]
    pub fn empty(name: impl Into<String>, position: usize) -> Self {
        Self {
            name: name.into(),
            position,
            state: StageState::Completed,
            tasks: Vec::new(),
            interrupted: false,
            duration_ms: 0.0,
        }
    }

    /// Returns true if the stage was not interrupted and every task exited 0.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.interrupted && self.tasks.iter().all(|task| task.status.is_success())
    }

    /// Returns the tasks that did not exit 0.
    pub fn failed_tasks(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.tasks.iter().filter(|task| !task.status.is_success())
    }

    /// Looks up a task by label.
    #[must_use]
    pub fn task(&self, label: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|task| task.label == label)
    }

    /// Returns the exit code of every task, in spawn order.
    #[must_use]
    pub fn exit_codes(&self) -> Vec<Option<i32>> {
        self.tasks.iter().map(|task| task.status.code()).collect()
    }
}

/// A task that caused its stage to fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
    /// The task label.
    pub label: String,
    /// The command line.
    pub command: String,
    /// The final status.
    pub status: TaskStatus,
}

/// Why a pipeline stopped before its last stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// The stage name.
    pub stage: String,
    /// 1-based position of the stage.
    pub position: usize,
    /// The tasks that failed.
    pub tasks: Vec<FailedTask>,
}

impl StageFailure {
    /// Builds a failure record from a stage outcome.
    ///
    /// Returns `None` if the stage succeeded.
    #[must_use]
    pub fn from_outcome(outcome: &StageOutcome) -> Option<Self> {
        if outcome.succeeded() {
            return None;
        }

        Some(Self {
            stage: outcome.name.clone(),
            position: outcome.position,
            tasks: outcome
                .failed_tasks()
                .map(|task| FailedTask {
                    label: task.label.clone(),
                    command: task.command.clone(),
                    status: task.status,
                })
                .collect(),
        })
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pipeline failed at stage {} '{}'",
            self.position, self.stage
        )?;
        for (i, task) in self.tasks.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{} (`{}`) {}", task.label, task.command, task.status)?;
        }
        Ok(())
    }
}

/// The overall result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Every stage ran and every task exited 0.
    Succeeded {
        /// Completed stages, in order.
        stages: Vec<StageOutcome>,
    },
    /// A stage had a failing task; later stages were not started.
    Failed {
        /// The failing stage and tasks.
        failure: StageFailure,
        /// Stages that ran, including the failing one.
        stages: Vec<StageOutcome>,
    },
    /// An interrupt stopped the run; every child was awaited first.
    Interrupted {
        /// What triggered the interrupt.
        reason: String,
        /// The stage that was running, if any.
        stage: Option<String>,
        /// Stages that ran, including the interrupted one.
        stages: Vec<StageOutcome>,
    },
}

impl PipelineOutcome {
    /// Returns the stage outcomes that were recorded.
    #[must_use]
    pub fn stages(&self) -> &[StageOutcome] {
        match self {
            Self::Succeeded { stages }
            | Self::Failed { stages, .. }
            | Self::Interrupted { stages, .. } => stages,
        }
    }

    /// Returns true if the pipeline succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Returns true if the pipeline was interrupted.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// Returns the failure, if the pipeline failed.
    #[must_use]
    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            Self::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// Returns the process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Succeeded { .. } => EXIT_SUCCESS,
            Self::Failed { .. } => EXIT_FAILURE,
            Self::Interrupted { .. } => EXIT_INTERRUPTED,
        }
    }
}
