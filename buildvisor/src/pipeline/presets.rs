//! The three stock pipelines: build, generate and watch.

use super::{PipelineSpec, StageSpec};
use crate::config::ToolchainConfig;
use crate::errors::ConfigError;
use crate::process::TaskSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which stock pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// Code generation, then native compilation.
    Build,
    /// Code generation only.
    Generate,
    /// Every watcher at once, until interrupted.
    Watch,
}

impl PipelineKind {
    /// All kinds, in CLI order.
    pub const ALL: [Self; 3] = [Self::Build, Self::Generate, Self::Watch];

    /// Returns the pipeline name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Generate => "generate",
            Self::Watch => "watch",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| {
                ConfigError::invalid(
                    "pipeline",
                    format!("unknown pipeline '{s}', expected build, generate or watch"),
                )
            })
    }
}

/// Builds the stock pipeline of `kind` for `toolchain`.
///
/// Every task runs `<runner> <runner_args...> <script>`.
#[must_use]
pub fn pipeline_for(kind: PipelineKind, toolchain: &ToolchainConfig) -> PipelineSpec {
    let stages = match kind {
        PipelineKind::Build => vec![
            generate_stage(toolchain),
            StageSpec::new("compile").task(runner_task(
                toolchain,
                "native-compile",
                &toolchain.scripts.build_native,
            )),
        ],
        PipelineKind::Generate => vec![generate_stage(toolchain)],
        PipelineKind::Watch => {
            let scripts = &toolchain.scripts;
            vec![StageSpec::new("watch").with_tasks([
                runner_task(toolchain, "native-build-watch", &scripts.watch_native),
                runner_task(toolchain, "template-watch", &scripts.watch_templates),
                runner_task(toolchain, "css-watch", &scripts.watch_css),
                runner_task(toolchain, "sql-watch", &scripts.watch_sql),
            ])]
        }
    };

    PipelineSpec {
        name: kind.as_str().to_string(),
        stages,
        metadata: [("kind".to_string(), serde_json::json!(kind))]
            .into_iter()
            .collect(),
    }
}

fn generate_stage(toolchain: &ToolchainConfig) -> StageSpec {
    let scripts = &toolchain.scripts;
    StageSpec::new("generate").with_tasks([
        runner_task(toolchain, "template-compile", &scripts.build_templates),
        runner_task(toolchain, "css-build", &scripts.build_css),
        runner_task(toolchain, "sql-codegen", &scripts.build_sql),
    ])
}

fn runner_task(toolchain: &ToolchainConfig, label: &str, script: &str) -> TaskSpec {
    TaskSpec::new(label, &toolchain.runner)
        .args(toolchain.runner_args.iter().cloned())
        .arg(script)
}
