//! Testing utilities for buildvisor pipelines.
//!
//! This module provides:
//! - `sh -c` task fixtures with silenced output
//! - A supervisor wired to a manual interrupt and a collecting event sink
//! - Assertions over pipeline and stage outcomes
//!
//! The fixtures spawn POSIX shell commands and are meant for unix hosts.

mod assertions;
mod fixtures;

pub use assertions::{
    assert_all_tasks_terminal, assert_pipeline_failed_at, assert_pipeline_interrupted,
    assert_pipeline_succeeded, assert_task_status,
};
pub use fixtures::{
    exit_task, grandchild_task, marker_task, read_pid_file, requires_file_task, sh_task,
    sleep_task, stubborn_task, TestSupervisor,
};
#[cfg(target_os = "linux")]
pub use fixtures::wait_until_gone;
