//! Status-callback interface: the one seam external callers hook into for
//! progress reporting, without the scheduler core knowing anything about
//! where that reporting goes (stdout, a websocket, a metrics sink).

use recon_types::{ExecutionResult, WorkflowExecution};

/// Observes workflow and step lifecycle transitions. Every method has a
/// no-op default, so a caller interested in only one transition can
/// override a single method.
pub trait StatusCallback: Send + Sync {
    fn on_workflow_started(&self, _workflow: &str, _target: &str) {}
    fn on_step_started(&self, _workflow: &str, _target: &str, _step: &str) {}
    fn on_step_completed(&self, _workflow: &str, _target: &str, _step: &str, _result: &ExecutionResult) {}
    fn on_step_failed(&self, _workflow: &str, _target: &str, _step: &str, _result: &ExecutionResult) {}
    fn on_workflow_completed(&self, _execution: &WorkflowExecution) {}
    fn on_workflow_failed(&self, _execution: &WorkflowExecution) {}
}

/// A callback that observes nothing. The orchestrator's default when the
/// caller supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatusCallback;

impl StatusCallback for NoopStatusCallback {}

/// Forwards every transition to `tracing`, at a level matched to severity.
/// Useful on its own, or as a template for a caller's own callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusCallback;

impl StatusCallback for TracingStatusCallback {
    fn on_workflow_started(&self, workflow: &str, target: &str) {
        tracing::info!(workflow, target, "workflow started");
    }

    fn on_step_started(&self, workflow: &str, target: &str, step: &str) {
        tracing::debug!(workflow, target, step, "step started");
    }

    fn on_step_completed(&self, workflow: &str, target: &str, step: &str, result: &ExecutionResult) {
        tracing::debug!(workflow, target, step, duration_ms = result.duration.as_millis() as u64, "step completed");
    }

    fn on_step_failed(&self, workflow: &str, target: &str, step: &str, result: &ExecutionResult) {
        tracing::warn!(workflow, target, step, error = ?result.error_message, "step failed");
    }

    fn on_workflow_completed(&self, execution: &WorkflowExecution) {
        tracing::info!(workflow = %execution.workflow, target = %execution.target, "workflow completed");
    }

    fn on_workflow_failed(&self, execution: &WorkflowExecution) {
        tracing::warn!(workflow = %execution.workflow, target = %execution.target, error = ?execution.error, "workflow failed");
    }
}
