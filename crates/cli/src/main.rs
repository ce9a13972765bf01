//! `workflow-orchestrator` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — check a workflow JSON file and print its execution batches.
//! - `run`      — execute a workflow JSON file against the built-in services.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{build_batches, ExecutionStatus, ExecutorConfig, Orchestrator, WorkflowDefinition};

#[derive(Parser)]
#[command(
    name = "workflow-orchestrator",
    about = "Dependency-ordered workflow execution engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Execute a workflow definition with the built-in `echo` and `delay` services.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Workflow input as a JSON document.
        #[arg(long, default_value = "{}")]
        input: String,
        /// Timeout for tasks that do not set their own.
        #[arg(long, env = "ORCHESTRATOR_TASK_TIMEOUT_MS", default_value_t = 60_000)]
        task_timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let definition = load(&path)?;
            let orchestrator = Orchestrator::default();
            orchestrator
                .register(definition.clone())
                .context("workflow definition is invalid")?;
            let batches = build_batches(&definition.tasks).context("workflow cannot be scheduled")?;

            println!("Workflow '{}' is valid.", definition.id);
            for (index, batch) in batches.iter().enumerate() {
                let ids: Vec<&str> = batch.iter().map(|t| t.id.as_str()).collect();
                println!("  batch {index}: {}", ids.join(", "));
            }
        }
        Command::Run { path, input, task_timeout_ms } => {
            let definition = load(&path)?;
            let input: Value = serde_json::from_str(&input).context("--input is not valid JSON")?;

            let orchestrator = Orchestrator::new(ExecutorConfig {
                default_task_timeout: Duration::from_millis(task_timeout_ms),
            });
            orchestrator.register_service("echo", Arc::new(services::builtin::echo()));
            orchestrator.register_service("delay", Arc::new(services::builtin::delay()));

            let workflow_id = definition.id.clone();
            orchestrator.register(definition)?;
            info!("running workflow '{workflow_id}'");
            let execution = orchestrator.execute_workflow(&workflow_id, input).await?;

            println!("{}", serde_json::to_string_pretty(&execution)?);
            if execution.status != ExecutionStatus::Completed {
                bail!("execution {} ended as {}", execution.id, execution.status);
            }
        }
    }

    Ok(())
}

fn load(path: &Path) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not a workflow definition", path.display()))
}
