//! Sequential stage execution with interrupt handling.

use super::stage::{run_stage, StageContext};
use super::PipelineSpec;
use crate::cancellation::{InterruptListener, InterruptReason, TaskRegistry};
use crate::config::SupervisorConfig;
use crate::core::{PipelineOutcome, StageFailure, StageOutcome};
use crate::errors::SupervisorError;
use crate::events::{EventEmitter, EventKind, EventSink, LoggingEventSink};
use crate::observability::SpanTimer;
use crate::utils::generate_uuid_v7;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default time tasks get to exit after a termination request.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Runs pipelines stage by stage.
///
/// The supervisor owns the single interrupt listener and the live-task
/// registry. Stage `i + 1` is spawned only after every task of stage `i` has
/// exited, and only if all of them exited 0.
pub struct Supervisor {
    listener: InterruptListener,
    registry: TaskRegistry,
    grace_period: Duration,
    sink: Arc<dyn EventSink>,
}

impl Supervisor {
    /// Creates a supervisor that listens on `listener`.
    #[must_use]
    pub fn new(listener: InterruptListener) -> Self {
        Self {
            listener,
            registry: TaskRegistry::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
            sink: Arc::new(LoggingEventSink::debug()),
        }
    }

    /// Creates a supervisor that stops on SIGINT or SIGTERM.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn with_signals() -> Result<Self, SupervisorError> {
        Ok(Self::new(InterruptListener::signals()?))
    }

    /// Creates a supervisor using the grace period from `config`.
    #[must_use]
    pub fn from_config(config: &SupervisorConfig, listener: InterruptListener) -> Self {
        Self::new(listener).with_grace_period(config.grace_period())
    }

    /// Sets the grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the grace period.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Returns the live-task registry. Empty whenever no stage is running.
    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Runs `pipeline` to completion, failure or interrupt.
    ///
    /// A task exiting non-zero and an interrupt are both reported through
    /// the returned [`PipelineOutcome`]. Errors are reserved for an invalid
    /// pipeline, a task that could not be spawned, or a failed wait.
    pub async fn run(&mut self, pipeline: &PipelineSpec) -> Result<PipelineOutcome, SupervisorError> {
        pipeline.validate()?;

        let events = EventEmitter::new(self.sink.clone(), generate_uuid_v7(), &pipeline.name);
        let timer = SpanTimer::start(&pipeline.name);

        info!(
            pipeline = %pipeline.name,
            run_id = %events.run_id(),
            stages = pipeline.stages.len(),
            "Starting pipeline"
        );
        events.emit(
            EventKind::PipelineStarted,
            json!({"stages": pipeline.stage_names(), "tasks": pipeline.task_count()}),
        );

        let mut stages: Vec<StageOutcome> = Vec::with_capacity(pipeline.stages.len());
        for (index, stage) in pipeline.stages.iter().enumerate() {
            if let Some(reason) = self.listener.check() {
                return Ok(interrupted(&events, reason, None, stages));
            }

            let ctx = StageContext {
                listener: &mut self.listener,
                registry: &mut self.registry,
                grace_period: self.grace_period,
                events: &events,
            };
            let run = match run_stage(stage, index + 1, ctx).await {
                Ok(run) => run,
                Err(err) => {
                    error!(pipeline = %pipeline.name, stage = %stage.name, error = %err, "Pipeline aborted");
                    events.emit(
                        EventKind::PipelineFailed,
                        json!({"stage": stage.name, "error": err.to_string()}),
                    );
                    return Err(err);
                }
            };

            let outcome = run.outcome;
            if let Some(reason) = run.interrupted {
                stages.push(outcome);
                return Ok(interrupted(&events, reason, Some(stage.name.clone()), stages));
            }

            if let Some(failure) = StageFailure::from_outcome(&outcome) {
                error!("{failure}");
                events.emit(
                    EventKind::PipelineFailed,
                    json!({"stage": failure.stage, "position": failure.position, "tasks": failure.tasks}),
                );
                stages.push(outcome);
                return Ok(PipelineOutcome::Failed { failure, stages });
            }

            stages.push(outcome);
        }

        let duration_ms = timer.finish();
        info!(pipeline = %pipeline.name, duration_ms, "Pipeline completed");
        events.emit(EventKind::PipelineCompleted, json!({"duration_ms": duration_ms}));
        Ok(PipelineOutcome::Succeeded { stages })
    }
}

fn interrupted(
    events: &EventEmitter,
    reason: InterruptReason,
    stage: Option<String>,
    stages: Vec<StageOutcome>,
) -> PipelineOutcome {
    warn!(reason = %reason, stage = ?stage, "Pipeline interrupted, all tasks stopped");
    events.emit(
        EventKind::PipelineInterrupted,
        json!({"reason": reason.to_string(), "stage": stage}),
    );
    PipelineOutcome::Interrupted {
        reason: reason.to_string(),
        stage,
        stages,
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("listener", &self.listener)
            .field("registry", &self.registry)
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}
