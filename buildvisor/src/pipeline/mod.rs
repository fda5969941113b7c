//! Pipeline definition and execution.
//!
//! This module provides:
//! - Pipeline and stage specifications
//! - Pipeline builder with validation
//! - Stage execution (fan-out spawn, fan-in wait)
//! - The supervisor that runs stages in order
//! - The stock build, generate and watch pipelines

mod builder;
#[cfg(unix)]
mod integration_tests;
pub mod presets;
mod spec;
mod stage;
mod supervisor;

pub use builder::PipelineBuilder;
pub use presets::{pipeline_for, PipelineKind};
pub use spec::{PipelineSpec, StageSpec};
pub use stage::{run_stage, StageContext, StageRun};
pub use supervisor::{Supervisor, DEFAULT_GRACE_PERIOD};
