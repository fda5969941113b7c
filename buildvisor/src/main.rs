//! buildvisor - staged build pipeline supervisor

use anyhow::{Context, Result};
use buildvisor::cancellation::InterruptListener;
use buildvisor::config::{LogFormat, SupervisorConfig};
use buildvisor::core::PipelineOutcome;
use buildvisor::observability::init_tracing;
use buildvisor::pipeline::{pipeline_for, PipelineKind, PipelineSpec, Supervisor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "buildvisor",
    version,
    about = "Run staged build, generate and watch pipelines"
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log format: pretty or json
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate code, then compile the native binary
    Build,
    /// Run the code generators only
    Generate,
    /// Run every watcher until interrupted
    Watch,
    /// Print a pipeline's stages and commands without running anything
    Plan {
        /// build, generate or watch
        kind: PipelineKind,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config =
        SupervisorConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    init_tracing(config.log_format).context("Failed to initialize logging")?;

    let kind = match cli.command {
        Commands::Build => PipelineKind::Build,
        Commands::Generate => PipelineKind::Generate,
        Commands::Watch => PipelineKind::Watch,
        Commands::Plan { kind } => {
            print_plan(&pipeline_for(kind, &config.toolchain));
            return Ok(ExitCode::SUCCESS);
        }
    };

    let pipeline = pipeline_for(kind, &config.toolchain);
    let listener = InterruptListener::signals().context("Failed to install signal handlers")?;
    let mut supervisor = Supervisor::from_config(&config, listener);

    let outcome = supervisor
        .run(&pipeline)
        .await
        .with_context(|| format!("{kind} pipeline aborted"))?;

    match &outcome {
        PipelineOutcome::Succeeded { stages } => {
            info!(pipeline = %kind, stages = stages.len(), "All stages succeeded");
        }
        // the supervisor already logged the failing stage and tasks
        PipelineOutcome::Failed { .. } => {}
        PipelineOutcome::Interrupted { reason, .. } => {
            info!(pipeline = %kind, reason = %reason, "Stopped after interrupt");
        }
    }
    Ok(ExitCode::from(outcome.exit_code()))
}

fn print_plan(pipeline: &PipelineSpec) {
    println!("{}", pipeline.name);
    for (index, stage) in pipeline.stages.iter().enumerate() {
        println!("  stage {}: {}", index + 1, stage.name);
        let width = stage.tasks.iter().map(|t| t.label.len()).max().unwrap_or(0);
        for task in &stage.tasks {
            println!("    {:width$}  {}", task.label, task.command_line());
        }
    }
}
