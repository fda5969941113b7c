//! Pipeline and stage specifications.

use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::process::TaskSpec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A group of tasks spawned together and awaited together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// The stage name, unique within its pipeline.
    pub name: String,
    /// Tasks in spawn order.
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl StageSpec {
    /// Creates a stage with no tasks.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    /// Appends a task.
    #[must_use]
    pub fn task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    /// Appends several tasks.
    #[must_use]
    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = TaskSpec>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    /// Returns true if the stage has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or two tasks share a label.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Stage name cannot be empty or whitespace-only",
            )
            .with_error_info(ContractErrorInfo::new(
                "STAGE-EMPTY-NAME",
                "Stage name is blank",
            )));
        }

        let mut labels = HashSet::new();
        for task in &self.tasks {
            if !labels.insert(task.label.as_str()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' has more than one task labelled '{}'",
                    self.name, task.label
                ))
                .with_stages(vec![self.name.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "STAGE-DUPLICATE-TASK",
                        format!("Task label '{}' is not unique", task.label),
                    )
                    .with_fix_hint("Give every task in a stage a distinct label.")
                    .with_context_entry("stage", &self.name),
                ));
            }
        }
        Ok(())
    }
}

/// An ordered sequence of stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// The pipeline name.
    pub name: String,
    /// Stages in execution order.
    #[serde(default)]
    pub stages: Vec<StageSpec>,
    /// Additional metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PipelineSpec {
    /// Creates a new pipeline specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or whitespace-only.
    pub fn new(name: impl Into<String>) -> Result<Self, PipelineValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(empty_name_error());
        }

        Ok(Self {
            name,
            stages: Vec::new(),
            metadata: HashMap::new(),
        })
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    /// Replaces the stages.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<StageSpec>) -> Self {
        self.stages = stages;
        self
    }

    /// Adds metadata.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the stage names in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the total number of tasks across all stages.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.stages.iter().map(|s| s.tasks.len()).sum()
    }

    /// Validates the whole pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error for a blank pipeline name, an invalid stage, or two
    /// stages with the same name.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(empty_name_error());
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            stage.validate()?;
            if !seen.insert(stage.name.as_str()) {
                return Err(duplicate_stage_error(&stage.name));
            }
        }
        Ok(())
    }
}

fn empty_name_error() -> PipelineValidationError {
    PipelineValidationError::new("Pipeline name cannot be empty or whitespace-only")
        .with_error_info(ContractErrorInfo::new(
            "PIPELINE-EMPTY-NAME",
            "Pipeline name is blank",
        ))
}

pub(crate) fn duplicate_stage_error(name: &str) -> PipelineValidationError {
    PipelineValidationError::new(format!("Duplicate stage name '{name}'"))
        .with_stages(vec![name.to_string()])
        .with_error_info(
            ContractErrorInfo::new(
                "PIPELINE-DUPLICATE-STAGE",
                format!("Stage '{name}' appears more than once"),
            )
            .with_fix_hint("Rename one of the stages; stage names identify failures."),
        )
}
