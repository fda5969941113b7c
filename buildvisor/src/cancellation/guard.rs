//! Scoped interrupt handling for a running stage.

use super::{InterruptListener, InterruptReason, TaskRegistry};
use crate::core::TaskId;
use crate::errors::{SpawnError, SupervisorError};
use crate::events::{EventEmitter, EventKind};
use crate::process::{ChildTask, TaskSpec};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happened to the tasks during a shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminationReport {
    /// Tasks that were sent a termination request.
    pub signalled: Vec<TaskId>,
    /// Tasks that were still alive after the grace period and were killed.
    pub force_killed: Vec<TaskId>,
    /// Tasks that exited but left processes behind in their group.
    pub stragglers: Vec<TaskId>,
}

/// Result of running a stage body under a guard.
#[derive(Debug)]
pub enum Guarded<R> {
    /// The body finished before any interrupt.
    Completed(R),
    /// An interrupt arrived; every task has been terminated and reaped.
    Interrupted {
        /// Why the run was interrupted.
        reason: InterruptReason,
        /// Which tasks were signalled or killed.
        report: TerminationReport,
    },
}

/// The interrupt handler for one stage.
///
/// A guard mutably borrows the supervisor's only [`InterruptListener`], so
/// at most one guard exists at a time. Tasks spawned through the guard are
/// tracked in the [`TaskRegistry`]; dropping the guard clears the registry.
pub struct InterruptGuard<'a> {
    listener: &'a mut InterruptListener,
    registry: &'a mut TaskRegistry,
    grace_period: Duration,
    events: &'a EventEmitter,
}

impl<'a> InterruptGuard<'a> {
    /// Activates the guard for a stage.
    pub fn new(
        listener: &'a mut InterruptListener,
        registry: &'a mut TaskRegistry,
        grace_period: Duration,
        events: &'a EventEmitter,
    ) -> Self {
        debug!(grace_period = ?grace_period, "Interrupt guard active");
        Self {
            listener,
            registry,
            grace_period,
            events,
        }
    }

    /// Returns the live-task registry.
    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        self.registry
    }

    /// Spawns a task and registers it as live.
    pub fn spawn(&mut self, spec: TaskSpec) -> Result<ChildTask, SpawnError> {
        let id = self.registry.allocate_id();
        let task = ChildTask::spawn(id, spec)?;
        self.registry.register(&task);

        info!(task = %id, label = %task.label(), pid = task.pid(), "Started task");
        self.events.emit(
            EventKind::TaskSpawned,
            json!({
                "task_id": id,
                "label": task.label(),
                "command": task.spec().command_line(),
                "pid": task.pid(),
            }),
        );
        Ok(task)
    }

    /// Runs `body` while listening for an interrupt.
    ///
    /// If the body finishes first its result is returned. If an interrupt
    /// arrives first the body is dropped, every registered task that is still
    /// running is asked to terminate, and this returns only after all of them
    /// have been reaped.
    pub async fn run<R, F>(
        &mut self,
        tasks: &mut [ChildTask],
        body: F,
    ) -> Result<Guarded<R>, SupervisorError>
    where
        F: for<'t> FnOnce(&'t mut [ChildTask], &'t mut TaskRegistry) -> BoxFuture<'t, R>,
    {
        let reason = {
            let fan_in = body(&mut *tasks, &mut *self.registry);
            tokio::select! {
                biased;
                result = fan_in => return Ok(Guarded::Completed(result)),
                reason = self.listener.wait() => reason,
            }
        };

        warn!(
            reason = %reason,
            live = self.registry.len(),
            "Interrupt received, graceful shutdown in progress"
        );
        let report = self.shutdown(tasks).await?;
        Ok(Guarded::Interrupted { reason, report })
    }

    /// Terminates every registered task and waits for all of them.
    ///
    /// Tasks get the grace period to exit after the termination request;
    /// survivors are force-killed and then awaited.
    pub async fn shutdown(
        &mut self,
        tasks: &mut [ChildTask],
    ) -> Result<TerminationReport, SupervisorError> {
        let mut report = TerminationReport::default();

        for task in tasks.iter_mut() {
            if !self.registry.contains(task.id()) {
                continue;
            }
            if task.terminate() {
                report.signalled.push(task.id());
                self.events.emit(
                    EventKind::TaskTerminateRequested,
                    json!({"task_id": task.id(), "label": task.label()}),
                );
            }
        }

        let graceful =
            tokio::time::timeout(self.grace_period, reap_all(tasks, self.registry)).await;
        match graceful {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    grace_period = ?self.grace_period,
                    remaining = self.registry.len(),
                    "Grace period elapsed, killing remaining tasks"
                );
                for task in tasks.iter_mut() {
                    if self.registry.contains(task.id()) && task.force_kill() {
                        report.force_killed.push(task.id());
                        self.events.emit(
                            EventKind::TaskForceKilled,
                            json!({"task_id": task.id(), "label": task.label()}),
                        );
                    }
                }
                reap_all(tasks, self.registry).await?;
            }
        }

        for task in tasks.iter_mut() {
            if task.kill_stragglers() {
                report.stragglers.push(task.id());
            }
        }

        debug!(
            signalled = report.signalled.len(),
            force_killed = report.force_killed.len(),
            stragglers = report.stragglers.len(),
            "All tasks reaped"
        );
        Ok(report)
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            debug!(remaining = self.registry.len(), "Clearing task registry");
        }
        self.registry.clear();
        debug!("Interrupt guard released");
    }
}

/// Waits for every registered task and deregisters each as it is reaped.
async fn reap_all(
    tasks: &mut [ChildTask],
    registry: &mut TaskRegistry,
) -> Result<(), SupervisorError> {
    let mut pending: FuturesUnordered<_> = tasks
        .iter_mut()
        .filter(|task| registry.contains(task.id()))
        .map(|task| async move {
            let status = task.wait().await;
            (task.id(), status)
        })
        .collect();

    while let Some((id, status)) = pending.next().await {
        status?;
        registry.deregister(id);
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::TaskStatus;
    use crate::events::CollectingEventSink;
    use crate::testing::{sh_task, sleep_task, stubborn_task};
    #[cfg(target_os = "linux")]
    use crate::testing::{grandchild_task, read_pid_file, wait_until_gone};
    use futures::FutureExt;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_body_completes_without_interrupt() {
        let (mut listener, _handle) = InterruptListener::manual();
        let mut registry = TaskRegistry::new();
        let events = EventEmitter::noop();

        let mut guard =
            InterruptGuard::new(&mut listener, &mut registry, Duration::from_secs(1), &events);
        let mut tasks = vec![guard.spawn(sh_task("ok", "exit 0")).unwrap()];
        assert_eq!(guard.registry().len(), 1);

        let result = guard
            .run(&mut tasks, |tasks, _registry| {
                async move {
                    let mut codes = Vec::new();
                    for task in tasks.iter_mut() {
                        codes.push(task.wait().await.unwrap());
                    }
                    codes
                }
                .boxed()
            })
            .await
            .unwrap();

        assert!(matches!(
            result,
            Guarded::Completed(ref codes) if codes == &[TaskStatus::Exited { code: 0 }]
        ));
        drop(guard);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_terminates_and_reaps() {
        let (mut listener, handle) = InterruptListener::manual();
        let mut registry = TaskRegistry::new();
        let sink = Arc::new(CollectingEventSink::new());
        let events = EventEmitter::new(sink.clone(), Uuid::nil(), "test");

        let mut guard =
            InterruptGuard::new(&mut listener, &mut registry, Duration::from_secs(5), &events);
        let mut tasks = vec![
            guard.spawn(sleep_task("a", 30)).unwrap(),
            guard.spawn(sleep_task("b", 30)).unwrap(),
        ];

        handle.trigger("stop");
        let result = guard
            .run(&mut tasks, |_tasks, _registry| {
                std::future::pending::<()>().boxed()
            })
            .await
            .unwrap();

        match result {
            Guarded::Interrupted { reason, report } => {
                assert_eq!(reason, InterruptReason::Requested("stop".to_string()));
                assert_eq!(report.signalled.len(), 2);
                assert!(report.force_killed.is_empty());
            }
            Guarded::Completed(()) => panic!("expected interrupt"),
        }
        assert!(guard.registry().is_empty());
        assert!(tasks.iter().all(|t| t.status().is_terminal()));
        assert_eq!(sink.payloads("task.terminate_requested").len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_escalates_after_grace_period() {
        let (mut listener, _handle) = InterruptListener::manual();
        let mut registry = TaskRegistry::new();
        let events = EventEmitter::noop();

        let mut guard = InterruptGuard::new(
            &mut listener,
            &mut registry,
            Duration::from_millis(300),
            &events,
        );
        let mut tasks = vec![guard.spawn(stubborn_task("stubborn", 30)).unwrap()];
        tokio::time::sleep(Duration::from_millis(200)).await;

        let report = guard.shutdown(&mut tasks).await.unwrap();
        assert_eq!(report.signalled, vec![tasks[0].id()]);
        assert_eq!(report.force_killed, vec![tasks[0].id()]);
        assert_eq!(tasks[0].status(), TaskStatus::Terminated { signal: Some(9) });
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_shutdown_stops_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("tool.pid");
        let (mut listener, _handle) = InterruptListener::manual();
        let mut registry = TaskRegistry::new();
        let events = EventEmitter::noop();

        let mut guard =
            InterruptGuard::new(&mut listener, &mut registry, Duration::from_secs(5), &events);
        let mut tasks = vec![guard
            .spawn(grandchild_task("runner", &pid_file, 30, false))
            .unwrap()];
        let tool = read_pid_file(&pid_file).await;

        let report = guard.shutdown(&mut tasks).await.unwrap();
        assert_eq!(report.signalled, vec![tasks[0].id()]);
        assert!(report.force_killed.is_empty());
        assert!(wait_until_gone(tool, Duration::from_secs(5)).await);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_shutdown_kills_grandchild_ignoring_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("tool.pid");
        let (mut listener, _handle) = InterruptListener::manual();
        let mut registry = TaskRegistry::new();
        let events = EventEmitter::noop();

        let mut guard =
            InterruptGuard::new(&mut listener, &mut registry, Duration::from_secs(5), &events);
        let mut tasks = vec![guard
            .spawn(grandchild_task("runner", &pid_file, 30, true))
            .unwrap()];
        let tool = read_pid_file(&pid_file).await;
        // give the subshell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        // the runner dies on SIGTERM, its child does not
        let report = guard.shutdown(&mut tasks).await.unwrap();
        assert_eq!(tasks[0].status(), TaskStatus::Terminated { signal: Some(15) });
        assert_eq!(report.stragglers, vec![tasks[0].id()]);
        assert!(wait_until_gone(tool, Duration::from_secs(5)).await);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_escalation_kills_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("tool.pid");
        let (mut listener, _handle) = InterruptListener::manual();
        let mut registry = TaskRegistry::new();
        let events = EventEmitter::noop();

        let mut guard = InterruptGuard::new(
            &mut listener,
            &mut registry,
            Duration::from_millis(300),
            &events,
        );
        let mut tasks = vec![guard
            .spawn(sh_task(
                "stubborn-runner",
                &format!(
                    "trap '' TERM; sleep 30 & echo $! > '{}'; wait",
                    pid_file.display()
                ),
            ))
            .unwrap()];
        let tool = read_pid_file(&pid_file).await;

        let report = guard.shutdown(&mut tasks).await.unwrap();
        assert_eq!(report.force_killed, vec![tasks[0].id()]);
        assert!(wait_until_gone(tool, Duration::from_secs(5)).await);
    }
}
