//! Event sinks for observing a pipeline run.
//!
//! The supervisor reports its lifecycle (stages, task spawns and exits,
//! terminations) through an [`EventEmitter`] bound to one run.

mod emitter;
mod sink;

pub use emitter::{EventEmitter, EventKind};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
