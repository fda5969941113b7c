//! Child process tasks.
//!
//! A [`TaskSpec`] describes a command; [`ChildTask::spawn`] turns it into a
//! live process that the supervisor can wait on, terminate, or kill.

mod child;
mod spec;

pub use child::ChildTask;
pub use spec::{StreamPolicy, TaskSpec};
