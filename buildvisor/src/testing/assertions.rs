//! Assertions over pipeline and stage outcomes.

use crate::core::{PipelineOutcome, StageOutcome, TaskStatus};

/// Asserts that the pipeline succeeded.
pub fn assert_pipeline_succeeded(outcome: &PipelineOutcome) {
    assert!(outcome.is_success(), "Expected success, got: {outcome:?}");
}

/// Asserts that the pipeline failed at the named stage.
pub fn assert_pipeline_failed_at(outcome: &PipelineOutcome, stage: &str) {
    match outcome.failure() {
        Some(failure) => assert_eq!(
            failure.stage, stage,
            "Expected failure at stage '{stage}', got '{}'",
            failure.stage
        ),
        None => panic!("Expected failure at stage '{stage}', got: {outcome:?}"),
    }
}

/// Asserts that the pipeline was interrupted.
pub fn assert_pipeline_interrupted(outcome: &PipelineOutcome) {
    assert!(
        outcome.is_interrupted(),
        "Expected interrupt, got: {outcome:?}"
    );
}

/// Asserts that every task of the stage has a terminal status.
pub fn assert_all_tasks_terminal(stage: &StageOutcome) {
    for task in &stage.tasks {
        assert!(
            task.status.is_terminal(),
            "Task '{}' in stage '{}' is still {}",
            task.label,
            stage.name,
            task.status
        );
    }
}

/// Asserts the final status of the task labelled `label`.
pub fn assert_task_status(stage: &StageOutcome, label: &str, expected: TaskStatus) {
    let task = stage
        .task(label)
        .unwrap_or_else(|| panic!("No task labelled '{label}' in stage '{}'", stage.name));
    assert_eq!(
        task.status, expected,
        "Task '{label}': expected {expected}, got {}",
        task.status
    );
}
