//! Failure taxonomy for loading workflow files and for orchestration-level
//! rejections (as opposed to `recon_execution::ExecutionError`, which covers
//! one tool invocation).

use thiserror::Error;

/// Failures raised while loading a single workflow definition file.
#[derive(Debug, Error)]
pub enum WorkflowFileError {
    #[error("failed to read workflow file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("workflow '{name}' declares no steps")]
    NoSteps { name: String },

    #[error("workflow '{workflow}' step '{step}' declares no modes")]
    NoModes { workflow: String, step: String },
}

/// Failures raised by the orchestrator when a workflow cannot be admitted
/// or run at all (distinct from any one step failing, which is recorded on
/// the `WorkflowExecution` instead of surfaced as an error here).
#[derive(Debug, Error, Clone)]
pub enum OrchestrationError {
    #[error("no workflow registered with name '{name}'")]
    WorkflowNotFound { name: String },

    #[error("orchestrator is shutting down")]
    Cancelled,
}
