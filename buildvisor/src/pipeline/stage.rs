//! Running a single stage: fan-out spawn, fan-in wait.

use super::StageSpec;
use crate::cancellation::{Guarded, InterruptGuard, InterruptListener, InterruptReason, TaskRegistry};
use crate::core::{StageOutcome, StageState, TaskOutcome};
use crate::errors::SupervisorError;
use crate::events::{EventEmitter, EventKind};
use crate::observability::SpanTimer;
use crate::process::ChildTask;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

/// What running a stage produced.
#[derive(Debug)]
pub struct StageRun {
    /// Per-task results.
    pub outcome: StageOutcome,
    /// Set if an interrupt cut the stage short.
    pub interrupted: Option<InterruptReason>,
}

/// Everything a stage needs from its supervisor.
#[derive(Debug)]
pub struct StageContext<'a> {
    /// The supervisor's interrupt listener.
    pub listener: &'a mut InterruptListener,
    /// The live-task registry.
    pub registry: &'a mut TaskRegistry,
    /// How long tasks get to exit after a termination request.
    pub grace_period: Duration,
    /// Event emitter for the current run.
    pub events: &'a EventEmitter,
}

/// Spawns every task of `stage` and waits until all of them have exited.
///
/// Tasks run concurrently and a failing task does not cancel its siblings;
/// the caller decides pass or fail from the returned statuses. An empty
/// stage completes at once. If a task cannot be spawned, the siblings that
/// did start are terminated and reaped before the error is returned.
pub async fn run_stage(
    stage: &StageSpec,
    position: usize,
    ctx: StageContext<'_>,
) -> Result<StageRun, SupervisorError> {
    let timer = SpanTimer::start(&stage.name);
    let events = ctx.events;

    info!(stage = %stage.name, position, tasks = stage.tasks.len(), "Starting stage");
    events.emit(
        EventKind::StageStarted,
        json!({"stage": stage.name, "position": position, "tasks": stage.tasks.len()}),
    );

    if stage.is_empty() {
        let outcome = StageOutcome::empty(&stage.name, position);
        emit_completed(events, &outcome);
        return Ok(StageRun {
            outcome,
            interrupted: None,
        });
    }

    let mut guard = InterruptGuard::new(ctx.listener, ctx.registry, ctx.grace_period, events);

    let mut tasks = Vec::with_capacity(stage.tasks.len());
    for spec in &stage.tasks {
        match guard.spawn(spec.clone()) {
            Ok(task) => tasks.push(task),
            Err(err) => {
                error!(stage = %stage.name, error = %err, "Spawn failed, stopping started tasks");
                guard.shutdown(&mut tasks).await?;
                return Err(err.into());
            }
        }
    }

    let emitter = events.clone();
    let result = guard
        .run(&mut tasks, move |tasks, registry| {
            wait_all(tasks, registry, emitter).boxed()
        })
        .await?;
    drop(guard);

    let interrupted = match result {
        Guarded::Completed(fan_in) => {
            fan_in?;
            None
        }
        Guarded::Interrupted { reason, report } => {
            warn!(
                stage = %stage.name,
                reason = %reason,
                signalled = report.signalled.len(),
                force_killed = report.force_killed.len(),
                "Stage interrupted"
            );
            Some(reason)
        }
    };

    let outcomes: Vec<TaskOutcome> = tasks.iter().map(ChildTask::outcome).collect();
    let outcome = StageOutcome {
        name: stage.name.clone(),
        position,
        state: StageState::from_statuses(outcomes.iter().map(|t| &t.status)),
        tasks: outcomes,
        interrupted: interrupted.is_some(),
        duration_ms: timer.finish(),
    };
    emit_completed(events, &outcome);

    Ok(StageRun {
        outcome,
        interrupted,
    })
}

/// Fan-in: resolves once every task has exited, in whatever order they
/// finish. Each task is deregistered as soon as it is reaped.
async fn wait_all(
    tasks: &mut [ChildTask],
    registry: &mut TaskRegistry,
    events: EventEmitter,
) -> Result<(), SupervisorError> {
    let mut pending: FuturesUnordered<_> = tasks
        .iter_mut()
        .map(|task| async move {
            let status = task.wait().await;
            (task, status)
        })
        .collect();

    while let Some((task, status)) = pending.next().await {
        let status = status?;
        registry.deregister(task.id());

        let outcome = task.outcome();
        if status.is_success() {
            info!(label = %task.label(), duration_ms = outcome.duration_ms, "Task finished");
        } else {
            warn!(label = %task.label(), status = %status, "Task failed");
        }
        events.emit(
            EventKind::TaskExited,
            json!({
                "task_id": task.id(),
                "label": task.label(),
                "status": status,
                "exit_code": status.code(),
                "duration_ms": outcome.duration_ms,
            }),
        );
    }
    Ok(())
}

fn emit_completed(events: &EventEmitter, outcome: &StageOutcome) {
    info!(
        stage = %outcome.name,
        succeeded = outcome.succeeded(),
        duration_ms = outcome.duration_ms,
        "Stage completed"
    );
    events.emit(
        EventKind::StageCompleted,
        json!({
            "stage": outcome.name,
            "position": outcome.position,
            "state": outcome.state,
            "succeeded": outcome.succeeded(),
            "interrupted": outcome.interrupted,
            "exit_codes": outcome.exit_codes(),
            "duration_ms": outcome.duration_ms,
        }),
    );
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::TaskStatus;
    use crate::testing::{exit_task, sh_task};
    use std::time::Instant;

    #[tokio::test]
    async fn test_empty_stage_completes_immediately() {
        let (mut listener, _handle) = InterruptListener::manual();
        let mut registry = TaskRegistry::new();
        let events = EventEmitter::noop();

        let run = run_stage(
            &StageSpec::new("noop"),
            1,
            StageContext {
                listener: &mut listener,
                registry: &mut registry,
                grace_period: Duration::from_secs(1),
                events: &events,
            },
        )
        .await
        .unwrap();

        assert!(run.outcome.succeeded());
        assert!(run.interrupted.is_none());
        assert_eq!(run.outcome.state, StageState::Completed);
    }

    #[tokio::test]
    async fn test_fan_in_waits_for_slowest() {
        let (mut listener, _handle) = InterruptListener::manual();
        let mut registry = TaskRegistry::new();
        let events = EventEmitter::noop();
        let stage = StageSpec::new("generate").with_tasks([
            sh_task("slow", "sleep 0.4"),
            exit_task("fast", 0),
            sh_task("medium", "sleep 0.1"),
        ]);

        let started = Instant::now();
        let run = run_stage(
            &stage,
            1,
            StageContext {
                listener: &mut listener,
                registry: &mut registry,
                grace_period: Duration::from_secs(1),
                events: &events,
            },
        )
        .await
        .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(400));
        assert!(run.outcome.succeeded());
        assert!(run
            .outcome
            .tasks
            .iter()
            .all(|t| t.status == TaskStatus::Exited { code: 0 }));
        assert_eq!(
            run.outcome.tasks.iter().map(|t| t.label.as_str()).collect::<Vec<_>>(),
            vec!["slow", "fast", "medium"]
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let (mut listener, _handle) = InterruptListener::manual();
        let mut registry = TaskRegistry::new();
        let events = EventEmitter::noop();
        let stage = StageSpec::new("generate")
            .with_tasks([exit_task("broken", 2), sh_task("slow", "sleep 0.2; exit 0")]);

        let run = run_stage(
            &stage,
            1,
            StageContext {
                listener: &mut listener,
                registry: &mut registry,
                grace_period: Duration::from_secs(1),
                events: &events,
            },
        )
        .await
        .unwrap();

        assert!(!run.outcome.succeeded());
        assert_eq!(run.outcome.exit_codes(), vec![Some(2), Some(0)]);
        assert!(!run.outcome.tasks[1].termination_requested);
    }
}
