//! Typed supervisor events and the emitter that enriches them.

use super::{EventSink, NoOpEventSink};
use crate::utils::iso_timestamp;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Every event the supervisor emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A pipeline run began.
    PipelineStarted,
    /// A stage began spawning its tasks.
    StageStarted,
    /// A task process was started.
    TaskSpawned,
    /// A task process exited and was reaped.
    TaskExited,
    /// A task was asked to terminate.
    TaskTerminateRequested,
    /// A task outlived the grace period and was killed.
    TaskForceKilled,
    /// Every task of a stage reached a terminal status.
    StageCompleted,
    /// The run stopped because of an interrupt.
    PipelineInterrupted,
    /// The run stopped because a stage failed.
    PipelineFailed,
    /// Every stage succeeded.
    PipelineCompleted,
}

impl EventKind {
    /// Returns the dotted event type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline.started",
            Self::StageStarted => "stage.started",
            Self::TaskSpawned => "task.spawned",
            Self::TaskExited => "task.exited",
            Self::TaskTerminateRequested => "task.terminate_requested",
            Self::TaskForceKilled => "task.force_killed",
            Self::StageCompleted => "stage.completed",
            Self::PipelineInterrupted => "pipeline.interrupted",
            Self::PipelineFailed => "pipeline.failed",
            Self::PipelineCompleted => "pipeline.completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends events for one pipeline run to a sink.
///
/// Every payload is stamped with the run id, the pipeline name and an ISO
/// timestamp.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
    run_id: Uuid,
    pipeline: String,
}

impl EventEmitter {
    /// Creates an emitter for a run.
    pub fn new(sink: Arc<dyn EventSink>, run_id: Uuid, pipeline: impl Into<String>) -> Self {
        Self {
            sink,
            run_id,
            pipeline: pipeline.into(),
        }
    }

    /// Creates an emitter that drops everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Arc::new(NoOpEventSink), Uuid::nil(), "")
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Emits an event. `data` should be a JSON object; anything else is
    /// wrapped under a `data` key.
    pub fn emit(&self, kind: EventKind, data: Value) {
        let mut payload = match data {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        payload.insert("run_id".to_string(), json!(self.run_id.to_string()));
        payload.insert("pipeline".to_string(), json!(self.pipeline));
        payload.insert("timestamp".to_string(), json!(iso_timestamp()));

        self.sink.try_emit(kind.as_str(), Some(Value::Object(payload)));
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("run_id", &self.run_id)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
