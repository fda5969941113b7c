//! Task and supervisor fixtures for tests.
//!
//! Every task built here silences its streams so test output stays readable.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::{InterruptHandle, InterruptListener};
use crate::events::CollectingEventSink;
use crate::pipeline::Supervisor;
use crate::process::{StreamPolicy, TaskSpec};

/// A task running `script` through `sh -c`.
#[must_use]
pub fn sh_task(label: &str, script: &str) -> TaskSpec {
    TaskSpec::new(label, "sh")
        .args(["-c", script])
        .with_streams(StreamPolicy::Null)
}

/// A task that exits immediately with `code`.
#[must_use]
pub fn exit_task(label: &str, code: i32) -> TaskSpec {
    sh_task(label, &format!("exit {code}"))
}

/// A task that sleeps for `seconds`.
#[must_use]
pub fn sleep_task(label: &str, seconds: u64) -> TaskSpec {
    TaskSpec::new(label, "sleep")
        .arg(seconds.to_string())
        .with_streams(StreamPolicy::Null)
}

/// A task that ignores SIGTERM and sleeps for `seconds`.
#[must_use]
pub fn stubborn_task(label: &str, seconds: u64) -> TaskSpec {
    sh_task(label, &format!("trap '' TERM; sleep {seconds}"))
}

/// A shell that starts `sleep seconds` in the background, writes its pid to
/// `pid_path` and waits for it, like a runner wrapping a long-lived tool.
///
/// With `ignore_term` the background process ignores SIGTERM while the shell
/// itself still exits on it.
#[must_use]
pub fn grandchild_task(label: &str, pid_path: &Path, seconds: u64, ignore_term: bool) -> TaskSpec {
    let tool = if ignore_term {
        format!("(trap '' TERM; exec sleep {seconds})")
    } else {
        format!("sleep {seconds}")
    };
    sh_task(
        label,
        &format!("{tool} & echo $! > '{}'; wait", pid_path.display()),
    )
}

/// Waits until a task has written a pid to `path` and returns it.
///
/// # Panics
///
/// Panics if no pid shows up within five seconds.
pub async fn read_pid_file(path: &Path) -> i32 {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(pid) = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
        {
            return pid;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no pid written to {}",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Waits up to `timeout` for `pid` to stop running. Zombies count as gone.
#[cfg(target_os = "linux")]
pub async fn wait_until_gone(pid: i32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !process_running(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(target_os = "linux")]
fn process_running(pid: i32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // state follows the parenthesised command name
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next())
        .is_some_and(|state| state != 'Z' && state != 'X')
}

/// A task that appends `label` to the file at `path` and exits 0.
#[must_use]
pub fn marker_task(label: &str, path: &Path) -> TaskSpec {
    sh_task(label, &format!("echo {label} >> '{}'", path.display()))
}

/// A task that succeeds only if the file at `path` exists.
#[must_use]
pub fn requires_file_task(label: &str, path: &Path) -> TaskSpec {
    sh_task(label, &format!("test -e '{}'", path.display()))
}

/// A supervisor wired to a manual interrupt and a collecting sink.
pub struct TestSupervisor {
    /// The supervisor under test.
    pub supervisor: Supervisor,
    /// Triggers an interrupt.
    pub interrupt: InterruptHandle,
    /// Every event the supervisor emitted.
    pub events: Arc<CollectingEventSink>,
}

impl TestSupervisor {
    /// Creates a test supervisor with the given grace period.
    #[must_use]
    pub fn new(grace_period: Duration) -> Self {
        let (listener, interrupt) = InterruptListener::manual();
        let events = Arc::new(CollectingEventSink::new());
        let supervisor = Supervisor::new(listener)
            .with_grace_period(grace_period)
            .with_event_sink(events.clone());
        Self {
            supervisor,
            interrupt,
            events,
        }
    }

    /// Triggers an interrupt after `delay`, from a background task.
    pub fn interrupt_after(&self, delay: Duration) -> tokio::task::JoinHandle<()> {
        let handle = self.interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handle.trigger("test interrupt");
        })
    }
}

impl Default for TestSupervisor {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
