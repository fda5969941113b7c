//! Core domain model types for buildvisor.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Task identifiers
//! - Task status and stage state enums
//! - Task, stage and pipeline outcomes

mod id;
mod outcome;
mod status;

pub use id::TaskId;
pub use outcome::{
    FailedTask, PipelineOutcome, StageFailure, StageOutcome, TaskOutcome, EXIT_FAILURE,
    EXIT_INTERRUPTED, EXIT_SUCCESS,
};
pub use status::{StageState, TaskStatus};
