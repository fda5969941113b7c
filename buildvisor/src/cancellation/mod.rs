//! Interrupt handling for running stages.
//!
//! This module provides:
//! - Interrupt sources (OS signals or a programmatic handle)
//! - The latching InterruptListener owned by the supervisor
//! - TaskRegistry for the live tasks of the active stage
//! - InterruptGuard, the scoped handler that terminates and reaps children

mod guard;
mod interrupt;
mod registry;

pub use guard::{Guarded, InterruptGuard, TerminationReport};
pub use interrupt::{
    InterruptHandle, InterruptListener, InterruptReason, InterruptSource, ManualInterrupt,
    SignalInterrupt,
};
pub use registry::{LiveTask, TaskRegistry};
