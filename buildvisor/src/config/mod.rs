//! Supervisor configuration.
//!
//! Configuration is read from an optional JSON file, then environment
//! overrides are applied:
//!
//! - `BUILDVISOR_RUNNER`: task runner program (default `bun`)
//! - `BUILDVISOR_GRACE_PERIOD_SECS`: seconds a task gets to exit after a
//!   termination request before it is killed (default 10)
//! - `BUILDVISOR_LOG_FORMAT`: `pretty` or `json`

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding the runner program.
pub const ENV_RUNNER: &str = "BUILDVISOR_RUNNER";
/// Environment variable overriding the grace period.
pub const ENV_GRACE_PERIOD: &str = "BUILDVISOR_GRACE_PERIOD_SECS";
/// Environment variable overriding the log format.
pub const ENV_LOG_FORMAT: &str = "BUILDVISOR_LOG_FORMAT";

/// How diagnostics are written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::invalid(
                "log_format",
                format!("expected 'pretty' or 'json', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Script names passed to the runner, one per tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Template compilation.
    #[serde(default = "default_build_templates")]
    pub build_templates: String,
    /// CSS build.
    #[serde(default = "default_build_css")]
    pub build_css: String,
    /// SQL code generation.
    #[serde(default = "default_build_sql")]
    pub build_sql: String,
    /// Native compilation.
    #[serde(default = "default_build_native")]
    pub build_native: String,
    /// Native build-and-restart watcher.
    #[serde(default = "default_watch_native")]
    pub watch_native: String,
    /// Template watcher.
    #[serde(default = "default_watch_templates")]
    pub watch_templates: String,
    /// CSS watcher.
    #[serde(default = "default_watch_css")]
    pub watch_css: String,
    /// SQL watcher.
    #[serde(default = "default_watch_sql")]
    pub watch_sql: String,
}

fn default_build_templates() -> String {
    "build:templ".to_string()
}

fn default_build_css() -> String {
    "build:tailwindcss".to_string()
}

fn default_build_sql() -> String {
    "build:sqlc".to_string()
}

fn default_build_native() -> String {
    "build:go".to_string()
}

fn default_watch_native() -> String {
    "watch:go".to_string()
}

fn default_watch_templates() -> String {
    "watch:templ".to_string()
}

fn default_watch_css() -> String {
    "watch:tailwindcss".to_string()
}

fn default_watch_sql() -> String {
    "watch:sqlc".to_string()
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            build_templates: default_build_templates(),
            build_css: default_build_css(),
            build_sql: default_build_sql(),
            build_native: default_build_native(),
            watch_native: default_watch_native(),
            watch_templates: default_watch_templates(),
            watch_css: default_watch_css(),
            watch_sql: default_watch_sql(),
        }
    }
}

/// The task runner every preset task goes through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Runner program.
    #[serde(default = "default_runner")]
    pub runner: String,
    /// Arguments placed before the script name.
    #[serde(default = "default_runner_args")]
    pub runner_args: Vec<String>,
    /// Script names.
    #[serde(default)]
    pub scripts: ScriptConfig,
}

fn default_runner() -> String {
    "bun".to_string()
}

fn default_runner_args() -> Vec<String> {
    vec!["run".to_string()]
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            runner: default_runner(),
            runner_args: default_runner_args(),
            scripts: ScriptConfig::default(),
        }
    }
}

/// Top-level supervisor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Runner and scripts.
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Seconds between the termination request and the kill.
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: f64,
    /// Diagnostic output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_grace_period() -> f64 {
    10.0
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            toolchain: ToolchainConfig::default(),
            grace_period_seconds: default_grace_period(),
            log_format: LogFormat::default(),
        }
    }
}

impl SupervisorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Loads the file (if any), applies process environment overrides and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        debug!(
            runner = %config.toolchain.runner,
            grace_period_seconds = config.grace_period_seconds,
            log_format = %config.log_format,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Applies overrides looked up through `lookup` (normally the process
    /// environment). Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(runner) = get(ENV_RUNNER) {
            self.toolchain.runner = runner.trim().to_string();
        }
        if let Some(grace) = get(ENV_GRACE_PERIOD) {
            self.grace_period_seconds = grace.trim().parse().map_err(|_| {
                ConfigError::invalid(ENV_GRACE_PERIOD, format!("'{grace}' is not a number"))
            })?;
        }
        if let Some(format) = get(ENV_LOG_FORMAT) {
            self.log_format = format.parse()?;
        }
        Ok(())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.toolchain.runner.trim().is_empty() {
            return Err(ConfigError::invalid("toolchain.runner", "must not be empty"));
        }
        if !self.grace_period_seconds.is_finite() || self.grace_period_seconds < 0.0 {
            return Err(ConfigError::invalid(
                "grace_period_seconds",
                "must be a finite, non-negative number",
            ));
        }
        Ok(())
    }

    /// Sets the runner program.
    #[must_use]
    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.toolchain.runner = runner.into();
        self
    }

    /// Sets the arguments placed before each script name.
    #[must_use]
    pub fn with_runner_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.toolchain.runner_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the grace period.
    #[must_use]
    pub fn with_grace_period(mut self, seconds: f64) -> Self {
        self.grace_period_seconds = seconds;
        self
    }

    /// Sets the log format.
    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Gets the grace period as a Duration.
    ///
    /// Invalid values (rejected by [`validate`](Self::validate)) fall back to
    /// the default.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.grace_period_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_grace_period()))
    }
}
