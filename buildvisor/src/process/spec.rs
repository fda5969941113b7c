//! Declarative description of a child task.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

/// What a child task does with its standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPolicy {
    /// Share the supervisor's stdin, stdout and stderr.
    #[default]
    Inherit,
    /// Connect every stream to the null device.
    Null,
}

impl StreamPolicy {
    pub(crate) fn apply(self, command: &mut Command) {
        match self {
            Self::Inherit => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            Self::Null => {
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
            }
        }
    }
}

/// A command to run as one task of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Human-readable label used in logs and failure reports.
    pub label: String,
    /// The executable name or path.
    pub program: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Stream handling.
    #[serde(default)]
    pub streams: StreamPolicy,
}

impl TaskSpec {
    /// Creates a task with no arguments and inherited streams.
    #[must_use]
    pub fn new(label: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            streams: StreamPolicy::default(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the stream policy.
    #[must_use]
    pub fn with_streams(mut self, streams: StreamPolicy) -> Self {
        self.streams = streams;
        self
    }

    /// Returns the command line as a single display string.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        // own group, so signals reach the runner's children too
        #[cfg(unix)]
        command.process_group(0);
        self.streams.apply(&mut command);
        command
    }
}
