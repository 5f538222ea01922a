//! Workflow Executor: runs one workflow's step DAG against one target.
//!
//! A step becomes eligible once its single `depends_on` predecessor has
//! finished (successfully or not — a failed step's siblings, and anything
//! depending on it, still run; nothing here cancels the rest of the DAG on
//! a single step failure). Steps with no dependency relationship to each
//! other run concurrently.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use recon_execution::{priority_weight, ExecutionOptions, ToolExecutionEngine};
use recon_template::TemplateResolver;
use recon_tools::CombinerRegistry;
use recon_types::{ExecutionResult, Step, UsageLocation, Workflow, WorkflowExecution, WorkflowStatus};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::status::StatusCallback;

/// Runs the steps of a single [`Workflow`] invocation to completion.
pub struct WorkflowExecutor {
    engine: Arc<ToolExecutionEngine>,
    resolver: Arc<TemplateResolver>,
    combiners: Arc<CombinerRegistry>,
}

impl WorkflowExecutor {
    pub fn new(
        engine: Arc<ToolExecutionEngine>,
        resolver: Arc<TemplateResolver>,
        combiners: Arc<CombinerRegistry>,
    ) -> Self {
        Self { engine, resolver, combiners }
    }

    /// Execute every step of `workflow` against `target`, reporting
    /// progress through `callback`. Always returns a terminal
    /// [`WorkflowExecution`] — step failures are recorded on it, never
    /// propagated as an `Err`.
    pub async fn run(
        &self,
        workflow: &Workflow,
        target: &str,
        callback: &dyn StatusCallback,
        cancellation: CancellationToken,
    ) -> WorkflowExecution {
        let mut execution = WorkflowExecution::new(workflow.name.clone(), target.to_string(), workflow.steps.len());
        execution.status = WorkflowStatus::Running;
        callback.on_workflow_started(&workflow.name, target);

        let mut completion_txs: HashMap<&str, watch::Sender<bool>> = HashMap::new();
        let mut completion_rxs: HashMap<&str, watch::Receiver<bool>> = HashMap::new();
        for step in &workflow.steps {
            let (tx, rx) = watch::channel(false);
            completion_txs.insert(step.name.as_str(), tx);
            completion_rxs.insert(step.name.as_str(), rx);
        }

        let results: Mutex<HashMap<String, ExecutionResult>> = Mutex::new(HashMap::new());

        let step_futures = workflow.steps.iter().map(|step| {
            let mut dep_rx = step
                .depends_on
                .as_deref()
                .and_then(|dep| completion_rxs.get(dep).cloned());
            let tx = completion_txs.get(step.name.as_str()).expect("every step has a sender").clone();
            let results = &results;

            async move {
                if let Some(rx) = dep_rx.as_mut() {
                    let _ = rx.changed().await;
                }

                callback.on_step_started(&workflow.name, target, &step.name);
                let result = self.run_step(workflow, step, target, cancellation.clone()).await;

                if result.success {
                    callback.on_step_completed(&workflow.name, target, &step.name, &result);
                } else {
                    callback.on_step_failed(&workflow.name, target, &step.name, &result);
                }

                results.lock().await.insert(step.name.clone(), result);
                let _ = tx.send(true);
            }
        });

        join_all(step_futures).await;

        let step_results = results.into_inner();
        let failed: Vec<&str> = step_results
            .iter()
            .filter(|(_, r)| !r.success)
            .map(|(name, _)| name.as_str())
            .collect();

        execution.completed_steps = step_results.len();
        execution.step_results = step_results;
        execution.end = Some(chrono::Utc::now());

        if failed.is_empty() {
            execution.status = WorkflowStatus::Completed;
            callback.on_workflow_completed(&execution);
        } else {
            execution.status = WorkflowStatus::Failed;
            execution.error = Some(format!("steps failed: {}", failed.join(", ")));
            callback.on_workflow_failed(&execution);
        }

        execution
    }

    /// Apply a step's `variable_map`, fan out across its modes, and fold
    /// the results into one [`ExecutionResult`] for the step.
    async fn run_step(
        &self,
        workflow: &Workflow,
        step: &Step,
        target: &str,
        cancellation: CancellationToken,
    ) -> ExecutionResult {
        for (source, mapped) in &step.variable_map {
            let location = UsageLocation {
                file: format!("{}.yaml", workflow.name),
                line: 0,
                context: step.name.clone(),
            };
            self.resolver.map_workflow_variable(source, mapped, location).await;
        }

        let priority = priority_weight(step.step_priority);
        let semaphore = (step.concurrent && step.max_concurrent_tools > 0)
            .then(|| Arc::new(Semaphore::new(step.max_concurrent_tools)));

        let mode_futures = step.modes.iter().map(|mode| {
            let semaphore = semaphore.clone();
            let cancellation = cancellation.clone();
            async move {
                let _permit = match &semaphore {
                    Some(s) => Some(s.acquire().await.expect("semaphore never closed")),
                    None => None,
                };
                let options = ExecutionOptions {
                    priority: Some(priority),
                    capture_output: true,
                    ..Default::default()
                };
                let result = self
                    .engine
                    .execute(
                        &step.tool,
                        mode,
                        target,
                        Some(&workflow.name),
                        Some(&step.name),
                        options,
                        cancellation,
                    )
                    .await;
                (mode.clone(), result)
            }
        });

        let mode_results: Vec<(String, ExecutionResult)> = if step.concurrent {
            join_all(mode_futures).await
        } else {
            let mut sequential = Vec::with_capacity(step.modes.len());
            for fut in mode_futures {
                sequential.push(fut.await);
            }
            sequential
        };

        debug!(step = %step.name, modes = mode_results.len(), "step modes finished");

        if step.combine_results && mode_results.iter().all(|(_, r)| r.success) {
            self.publish_combined(workflow, step, &mode_results).await;
        }

        combine_mode_results(mode_results, step.concurrent)
    }

    /// Reduce a successful multi-mode step's output files with its
    /// registered combiner and publish the result into the resolver, under
    /// `map_workflow_variable`'s `Workflow`-origin bookkeeping.
    async fn publish_combined(&self, workflow: &Workflow, step: &Step, mode_results: &[(String, ExecutionResult)]) {
        let output_paths: Vec<&Path> = mode_results
            .iter()
            .filter_map(|(_, r)| r.output_path.as_deref())
            .collect();
        if output_paths.is_empty() {
            return;
        }

        let combined = self.combiners.combine_namespaced(&step.tool, &output_paths);
        if combined.is_empty() {
            return;
        }

        let location = UsageLocation {
            file: format!("{}.yaml", workflow.name),
            line: 0,
            context: step.name.clone(),
        };
        for (key, value) in combined {
            self.resolver.set(&key, value, location.clone()).await;
        }
    }
}

/// Fold one step's per-mode results into the single `ExecutionResult` the
/// workflow's step map records. `step.name`/`step.tool` aren't threaded
/// through here — the caller already knows them — so this only combines
/// the run-time data: success, argv, captured output, timing.
fn combine_mode_results(mode_results: Vec<(String, ExecutionResult)>, concurrent: bool) -> ExecutionResult {
    let mut combined = mode_results
        .first()
        .map(|(_, r)| r.clone())
        .expect("a step always has at least one mode");

    if mode_results.len() == 1 {
        return combined;
    }

    let success = mode_results.iter().all(|(_, r)| r.success);
    let exit_code = mode_results
        .iter()
        .find(|(_, r)| !r.success)
        .map(|(_, r)| r.exit_code)
        .unwrap_or(Some(0));

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut resolved_argv = Vec::new();
    let mut output_path = None;
    let mut errors = Vec::new();
    let duration = if concurrent {
        mode_results.iter().map(|(_, r)| r.duration).max().unwrap_or_default()
    } else {
        mode_results.iter().map(|(_, r)| r.duration).sum()
    };

    for (mode, result) in &mode_results {
        stdout.push_str(&format!("--- {mode} ---\n{}\n", result.stdout));
        stderr.push_str(&format!("--- {mode} ---\n{}\n", result.stderr));
        resolved_argv.push(format!("[{mode}] {}", result.resolved_argv.join(" ")));
        if result.output_path.is_some() {
            output_path = result.output_path.clone();
        }
        if let Some(err) = &result.error_message {
            errors.push(format!("{mode}: {err}"));
        }
    }

    combined.success = success;
    combined.exit_code = exit_code;
    combined.stdout = stdout;
    combined.stderr = stderr;
    combined.resolved_argv = resolved_argv;
    combined.output_path = output_path;
    combined.duration = duration;
    combined.error_message = if errors.is_empty() { None } else { Some(errors.join("; ")) };
    combined
}
