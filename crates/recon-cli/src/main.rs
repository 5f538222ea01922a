//! `reconctl` — loads tool definitions and workflow files from disk, queues
//! every workflow against one target, runs them to completion, and exits
//! non-zero if any workflow failed.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use recon_concurrency::{ConcurrencyManager, ResourceMonitor};
use recon_execution::ToolExecutionEngine;
use recon_orchestration::{TracingStatusCallback, WorkflowExecutor, WorkflowFileLoader, WorkflowOrchestrator};
use recon_template::{TemplateResolver, VariableRegistry};
use recon_tools::{CombinerRegistry, ParserRegistry, StaticToolConfigSource, ToolConfigStore, ToolFileLoader};
use recon_types::WorkflowStatus;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reconctl", about = "Reconnaissance workflow orchestration engine")]
struct Cli {
    /// Root directory holding `configs/`, `tools/` and `workflows/`.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load every workflow under `workflows/`, queue them against `target`,
    /// run them to completion, and report the outcome.
    Run { target: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { target } => run(cli.root, target).await,
    }
}

async fn run(root: PathBuf, target: String) -> Result<()> {
    let settings = Arc::new(config::load_settings(&root.join("configs")).await);

    let tool_configs = ToolFileLoader::new(root.join("tools")).load_all();
    let config_store = Arc::new(ToolConfigStore::new(Arc::new(StaticToolConfigSource::new(tool_configs))));

    let registry_path = root.join("variables.json");
    let variable_registry = VariableRegistry::load_or_create(registry_path, true)
        .await
        .map_err(|err| anyhow::anyhow!("variable registry unreadable: {err}"))?;
    let resolver = Arc::new(TemplateResolver::new(Some(Arc::new(variable_registry))));

    let concurrency = Arc::new(ConcurrencyManager::new(settings.max_concurrent_executions));
    let parsers = Arc::new(ParserRegistry::new());
    let combiners = Arc::new(CombinerRegistry::new());

    let engine = Arc::new(ToolExecutionEngine::new(
        config_store,
        resolver.clone(),
        concurrency,
        parsers,
        settings.clone(),
        root.join("workspace"),
    ));
    let executor = Arc::new(WorkflowExecutor::new(engine, resolver, combiners));

    let resource_monitor = Arc::new(ResourceMonitor::new(settings.resource_limits.clone()));
    let orchestrator = WorkflowOrchestrator::new(
        executor,
        resource_monitor,
        settings.priority_weights.clone(),
        settings.max_concurrent_workflows,
    );

    let workflows = WorkflowFileLoader::new(root.join("workflows")).load_all().await;
    if workflows.is_empty() {
        bail!("no workflow definitions found under {}", root.join("workflows").display());
    }

    for workflow in workflows.into_values() {
        orchestrator.queue(workflow, target.clone(), Vec::new()).await;
    }

    let callback = Arc::new(TracingStatusCallback);
    let cancellation = CancellationToken::new();
    loop {
        orchestrator.execute_queued(callback.clone(), cancellation.clone()).await;
        if cancellation.is_cancelled() || orchestrator.snapshot().await.queued_count == 0 {
            break;
        }
    }

    let snapshot = orchestrator.active_workflows();
    let failed: Vec<&str> = snapshot
        .values()
        .filter(|exec| exec.status != WorkflowStatus::Completed)
        .map(|exec| exec.workflow.as_str())
        .collect();

    if failed.is_empty() {
        println!("all workflows completed for {target}");
        Ok(())
    } else {
        bail!("workflows did not complete: {}", failed.join(", "));
    }
}
