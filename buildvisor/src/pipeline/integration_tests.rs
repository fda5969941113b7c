//! End-to-end tests running real child processes through the supervisor.

#[cfg(test)]
mod tests {
    use crate::core::{PipelineOutcome, TaskStatus, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_SUCCESS};
    use crate::errors::SupervisorError;
    use crate::pipeline::{PipelineBuilder, PipelineSpec, StageSpec};
    use crate::process::TaskSpec;
    use crate::testing::{
        assert_all_tasks_terminal, assert_pipeline_failed_at, assert_pipeline_interrupted,
        assert_pipeline_succeeded, assert_task_status, exit_task, marker_task,
        requires_file_task, sh_task, sleep_task, stubborn_task, TestSupervisor,
    };
    #[cfg(target_os = "linux")]
    use crate::testing::{grandchild_task, read_pid_file, wait_until_gone};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    const SIGTERM: i32 = 15;
    const SIGKILL: i32 = 9;

    fn labels_of(events: &[(String, Option<serde_json::Value>)], event_type: &str) -> Vec<String> {
        events
            .iter()
            .filter(|(t, _)| t == event_type)
            .filter_map(|(_, data)| data.as_ref()?["label"].as_str().map(String::from))
            .collect()
    }

    fn position_of(
        events: &[(String, Option<serde_json::Value>)],
        event_type: &str,
        label: &str,
    ) -> usize {
        events
            .iter()
            .position(|(t, data)| {
                t == event_type
                    && data.as_ref().and_then(|d| d["label"].as_str()) == Some(label)
            })
            .unwrap_or_else(|| panic!("no {event_type} event for {label}"))
    }

    #[tokio::test]
    async fn test_generate_shaped_pipeline_succeeds() {
        let mut harness = TestSupervisor::default();
        let spec = PipelineBuilder::new("generate")
            .stage(
                "generate",
                [
                    sh_task("template-compile", "sleep 0.1"),
                    exit_task("css-build", 0),
                    sh_task("sql-codegen", "sleep 0.05"),
                ],
            )
            .unwrap()
            .build()
            .unwrap();

        let outcome = harness.supervisor.run(&spec).await.unwrap();

        assert_pipeline_succeeded(&outcome);
        assert_eq!(outcome.exit_code(), EXIT_SUCCESS);
        assert_eq!(outcome.stages().len(), 1);
        assert_eq!(outcome.stages()[0].exit_codes(), vec![Some(0), Some(0), Some(0)]);
        assert_all_tasks_terminal(&outcome.stages()[0]);
        assert!(harness.supervisor.registry().is_empty());

        let types = harness.events.event_types();
        assert_eq!(types.first().map(String::as_str), Some("pipeline.started"));
        assert_eq!(types.last().map(String::as_str), Some("pipeline.completed"));
        assert_eq!(harness.events.payloads("task.exited").len(), 3);
    }

    #[tokio::test]
    async fn test_build_shaped_pipeline_stops_at_failed_stage() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("compiled");
        let mut harness = TestSupervisor::default();

        let spec = PipelineBuilder::new("build")
            .stage(
                "generate",
                [
                    exit_task("template-compile", 0),
                    sh_task("css-build", "sleep 0.2"),
                    exit_task("sql-codegen", 1),
                ],
            )
            .unwrap()
            .stage("compile", [marker_task("native-compile", &marker)])
            .unwrap()
            .build()
            .unwrap();

        let outcome = harness.supervisor.run(&spec).await.unwrap();

        assert_pipeline_failed_at(&outcome, "generate");
        assert_eq!(outcome.exit_code(), EXIT_FAILURE);
        assert_eq!(outcome.stages().len(), 1);

        // fan-in still waited for the slow sibling
        let stage = &outcome.stages()[0];
        assert_task_status(stage, "css-build", TaskStatus::Exited { code: 0 });
        assert!(!stage.task("css-build").unwrap().termination_requested);

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.position, 1);
        assert_eq!(failure.tasks.len(), 1);
        assert_eq!(failure.tasks[0].label, "sql-codegen");
        assert!(failure.to_string().contains("sql-codegen"));
        assert!(failure.to_string().contains("exited with code 1"));

        assert!(!marker.exists());
        assert!(!labels_of(&harness.events.events(), "task.spawned")
            .contains(&"native-compile".to_string()));
        assert_eq!(harness.events.payloads("pipeline.failed").len(), 1);
    }

    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_stage_failure_is_logged_once() {
        let errors = Arc::new(AtomicUsize::new(0));
        let _subscriber = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(ErrorCounter(errors.clone())),
        );
        let mut harness = TestSupervisor::default();
        let spec = PipelineBuilder::new("build")
            .stage("generate", [exit_task("sql-codegen", 1)])
            .unwrap()
            .stage("compile", [exit_task("native-compile", 0)])
            .unwrap()
            .build()
            .unwrap();

        let outcome = harness.supervisor.run(&spec).await.unwrap();

        assert_pipeline_failed_at(&outcome, "generate");
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stages_run_strictly_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("generated");
        let mut harness = TestSupervisor::default();

        let spec = PipelineSpec::new("build")
            .unwrap()
            .with_stage(
                StageSpec::new("generate")
                    .task(sh_task(
                        "slow-generator",
                        &format!("sleep 0.3; touch '{}'", marker.display()),
                    ))
                    .task(exit_task("fast-generator", 0)),
            )
            .with_stage(StageSpec::new("compile").task(requires_file_task("compile", &marker)));

        let outcome = harness.supervisor.run(&spec).await.unwrap();
        assert_pipeline_succeeded(&outcome);

        let events = harness.events.events();
        let compile_spawned = position_of(&events, "task.spawned", "compile");
        for label in ["slow-generator", "fast-generator"] {
            assert!(position_of(&events, "task.exited", label) < compile_spawned);
        }
    }

    #[tokio::test]
    async fn test_empty_stage_is_a_successful_stage() {
        let mut harness = TestSupervisor::default();
        let spec = PipelineSpec::new("sparse")
            .unwrap()
            .with_stage(StageSpec::new("nothing"))
            .with_stage(StageSpec::new("something").task(exit_task("ok", 0)));

        let outcome = harness.supervisor.run(&spec).await.unwrap();

        assert_pipeline_succeeded(&outcome);
        assert_eq!(outcome.stages().len(), 2);
        assert!(outcome.stages()[0].tasks.is_empty());
        assert!(outcome.stages()[0].succeeded());
    }

    #[tokio::test]
    async fn test_watch_shaped_pipeline_interrupt_stops_every_task() {
        let mut harness = TestSupervisor::default();
        let spec = PipelineBuilder::new("watch")
            .stage(
                "watch",
                [
                    sleep_task("native-build-watch", 30),
                    sleep_task("template-watch", 30),
                    sleep_task("css-watch", 30),
                    sleep_task("sql-watch", 30),
                ],
            )
            .unwrap()
            .build()
            .unwrap();

        let trigger = harness.interrupt_after(Duration::from_millis(200));
        let started = Instant::now();
        let outcome = harness.supervisor.run(&spec).await.unwrap();
        trigger.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_pipeline_interrupted(&outcome);
        assert_eq!(outcome.exit_code(), EXIT_INTERRUPTED);
        match &outcome {
            PipelineOutcome::Interrupted { stage, reason, .. } => {
                assert_eq!(stage.as_deref(), Some("watch"));
                assert_eq!(reason, "test interrupt");
            }
            other => panic!("expected interrupt, got {other:?}"),
        }

        let stage = &outcome.stages()[0];
        assert!(stage.interrupted);
        assert_eq!(stage.tasks.len(), 4);
        for task in &stage.tasks {
            assert!(task.termination_requested);
            assert!(!task.force_killed);
            assert_eq!(task.status, TaskStatus::Terminated { signal: Some(SIGTERM) });
        }
        assert!(harness.supervisor.registry().is_empty());
        assert_eq!(harness.events.payloads("task.terminate_requested").len(), 4);
        assert_eq!(harness.events.payloads("pipeline.interrupted").len(), 1);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_interrupt_stops_tools_started_by_runner() {
        let dir = tempfile::tempdir().unwrap();
        let labels = ["native-build-watch", "template-watch", "css-watch", "sql-watch"];
        let pid_files: Vec<_> = labels
            .iter()
            .map(|label| dir.path().join(format!("{label}.pid")))
            .collect();
        let mut harness = TestSupervisor::default();
        let spec = PipelineBuilder::new("watch")
            .stage(
                "watch",
                labels
                    .iter()
                    .zip(&pid_files)
                    .map(|(label, path)| grandchild_task(label, path, 31, false))
                    .collect::<Vec<_>>(),
            )
            .unwrap()
            .build()
            .unwrap();

        let trigger = harness.interrupt_after(Duration::from_millis(500));
        let outcome = harness.supervisor.run(&spec).await.unwrap();
        trigger.await.unwrap();

        assert_pipeline_interrupted(&outcome);
        for path in &pid_files {
            let tool = read_pid_file(path).await;
            assert!(
                wait_until_gone(tool, Duration::from_secs(5)).await,
                "tool {tool} outlived the supervisor"
            );
        }
    }

    #[tokio::test]
    async fn test_interrupt_skips_already_exited_tasks() {
        let mut harness = TestSupervisor::default();
        let spec = PipelineSpec::new("mixed").unwrap().with_stage(
            StageSpec::new("mixed")
                .task(exit_task("quick", 0))
                .task(sleep_task("long-a", 30))
                .task(sleep_task("long-b", 30)),
        );

        let trigger = harness.interrupt_after(Duration::from_millis(300));
        let outcome = harness.supervisor.run(&spec).await.unwrap();
        trigger.await.unwrap();

        assert_pipeline_interrupted(&outcome);
        let stage = &outcome.stages()[0];
        assert_all_tasks_terminal(stage);
        assert_task_status(stage, "quick", TaskStatus::Exited { code: 0 });
        assert!(!stage.task("quick").unwrap().termination_requested);
        assert!(stage.task("long-a").unwrap().termination_requested);
        assert!(stage.task("long-b").unwrap().termination_requested);

        let signalled = labels_of(&harness.events.events(), "task.terminate_requested");
        assert_eq!(signalled, vec!["long-a".to_string(), "long-b".to_string()]);
    }

    #[tokio::test]
    async fn test_task_ignoring_sigterm_is_killed_after_grace_period() {
        let mut harness = TestSupervisor::new(Duration::from_millis(300));
        let spec = PipelineSpec::new("stubborn").unwrap().with_stage(
            StageSpec::new("watch")
                .task(stubborn_task("stubborn", 30))
                .task(sleep_task("polite", 30)),
        );

        let trigger = harness.interrupt_after(Duration::from_millis(300));
        let started = Instant::now();
        let outcome = harness.supervisor.run(&spec).await.unwrap();
        trigger.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        let stage = &outcome.stages()[0];
        assert_task_status(stage, "stubborn", TaskStatus::Terminated { signal: Some(SIGKILL) });
        assert_task_status(stage, "polite", TaskStatus::Terminated { signal: Some(SIGTERM) });
        assert!(stage.task("stubborn").unwrap().force_killed);
        assert!(!stage.task("polite").unwrap().force_killed);
        assert_eq!(
            labels_of(&harness.events.events(), "task.force_killed"),
            vec!["stubborn".to_string()]
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_aborts_and_reaps_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("never");
        let mut harness = TestSupervisor::default();

        let spec = PipelineSpec::new("broken")
            .unwrap()
            .with_stage(
                StageSpec::new("generate")
                    .task(sleep_task("started", 30))
                    .task(TaskSpec::new("missing", "buildvisor-test-no-such-binary"))
                    .task(exit_task("never-spawned", 0)),
            )
            .with_stage(StageSpec::new("compile").task(marker_task("compile", &marker)));

        let started = Instant::now();
        let err = harness.supervisor.run(&spec).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            SupervisorError::Spawn(ref spawn) => {
                assert_eq!(spawn.label, "missing");
                assert!(spawn.is_not_found());
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
        assert!(harness.supervisor.registry().is_empty());
        assert!(!marker.exists());

        let events = harness.events.events();
        assert_eq!(labels_of(&events, "task.spawned"), vec!["started".to_string()]);
        assert_eq!(
            labels_of(&events, "task.terminate_requested"),
            vec!["started".to_string()]
        );
        assert_eq!(harness.events.payloads("pipeline.failed").len(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_before_run_starts_nothing() {
        let mut harness = TestSupervisor::default();
        harness.interrupt.trigger("early");

        let spec = PipelineSpec::new("build")
            .unwrap()
            .with_stage(StageSpec::new("generate").task(exit_task("a", 0)));
        let outcome = harness.supervisor.run(&spec).await.unwrap();

        match outcome {
            PipelineOutcome::Interrupted { stage, stages, .. } => {
                assert!(stage.is_none());
                assert!(stages.is_empty());
            }
            other => panic!("expected interrupt, got {other:?}"),
        }
        assert!(harness.events.payloads("task.spawned").is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_in_first_stage_prevents_next_stage() {
        let mut harness = TestSupervisor::default();
        let spec = PipelineSpec::new("build")
            .unwrap()
            .with_stage(StageSpec::new("generate").task(sh_task("gen", "sleep 5")))
            .with_stage(StageSpec::new("compile").task(exit_task("compile", 0)));

        let trigger = harness.interrupt_after(Duration::from_millis(100));
        let outcome = harness.supervisor.run(&spec).await.unwrap();
        trigger.await.unwrap();

        assert_pipeline_interrupted(&outcome);
        match &outcome {
            PipelineOutcome::Interrupted { stage, stages, .. } => {
                assert_eq!(stage.as_deref(), Some("generate"));
                assert_eq!(stages.len(), 1);
            }
            other => panic!("expected interrupt, got {other:?}"),
        }
        assert!(!labels_of(&harness.events.events(), "task.spawned")
            .contains(&"compile".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_pipeline_is_rejected() {
        let mut harness = TestSupervisor::default();
        let spec = PipelineSpec::new("dup")
            .unwrap()
            .with_stage(StageSpec::new("same"))
            .with_stage(StageSpec::new("same"));

        let err = harness.supervisor.run(&spec).await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Validation(ref e) if e.code() == Some("PIPELINE-DUPLICATE-STAGE")
        ));
        assert!(harness.events.is_empty());
    }
}
