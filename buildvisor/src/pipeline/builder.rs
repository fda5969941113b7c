//! Pipeline builder with validation.

use super::spec::duplicate_stage_error;
use super::{PipelineSpec, StageSpec};
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::process::TaskSpec;

/// Builder for creating validated pipelines.
///
/// Stages run in the order they are added. Every stage is validated as it is
/// added, so `build` only has to check that the pipeline is not empty.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Adds a stage made of `tasks`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is taken.
    pub fn stage(
        mut self,
        name: impl Into<String>,
        tasks: impl IntoIterator<Item = TaskSpec>,
    ) -> Result<Self, PipelineValidationError> {
        self.add_stage_spec(StageSpec::new(name).with_tasks(tasks))?;
        Ok(self)
    }

    /// Adds a stage with a specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is taken.
    pub fn add_stage_spec(&mut self, spec: StageSpec) -> Result<(), PipelineValidationError> {
        spec.validate()?;
        if self.stages.iter().any(|s| s.name == spec.name) {
            return Err(duplicate_stage_error(&spec.name));
        }
        self.stages.push(spec);
        Ok(())
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the builder has no stages.
    pub fn build(self) -> Result<PipelineSpec, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages").with_error_info(
                ContractErrorInfo::new("PIPELINE-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one stage to the pipeline before building."),
            ));
        }

        Ok(PipelineSpec::new(self.name)?.with_stages(self.stages))
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}
