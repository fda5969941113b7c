//! # Buildvisor
//!
//! A process supervisor for staged build pipelines.
//!
//! Buildvisor launches external code-generation and compilation tools as
//! child processes, grouped into stages:
//!
//! - **Fan-out**: every task of a stage is spawned at once
//! - **Fan-in**: the next stage starts only after every task has exited 0
//! - **Clean interrupts**: on SIGINT or SIGTERM every live child is asked to
//!   terminate, killed after a grace period if needed, and reaped before the
//!   supervisor returns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use buildvisor::prelude::*;
//!
//! # async fn example() -> Result<(), SupervisorError> {
//! let pipeline = PipelineBuilder::new("build")
//!     .stage("generate", [
//!         TaskSpec::new("sql-codegen", "sqlc").arg("generate"),
//!         TaskSpec::new("template-compile", "templ").arg("generate"),
//!     ])?
//!     .stage("compile", [TaskSpec::new("native-compile", "go").args(["build", "./..."])])?
//!     .build()?;
//!
//! let mut supervisor = Supervisor::with_signals()?;
//! let outcome = supervisor.run(&pipeline).await?;
//! std::process::exit(i32::from(outcome.exit_code()));
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod process;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{
        InterruptGuard, InterruptHandle, InterruptListener, InterruptReason, TaskRegistry,
    };
    pub use crate::config::{LogFormat, SupervisorConfig};
    pub use crate::core::{
        PipelineOutcome, StageFailure, StageOutcome, StageState, TaskId, TaskOutcome, TaskStatus,
    };
    pub use crate::errors::{
        ConfigError, ContractErrorInfo, PipelineValidationError, SpawnError, SupervisorError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        pipeline_for, PipelineBuilder, PipelineKind, PipelineSpec, StageSpec, Supervisor,
    };
    pub use crate::process::{ChildTask, StreamPolicy, TaskSpec};
}
