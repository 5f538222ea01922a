//! Failure taxonomy for one tool invocation. Every variant
//! carries exactly what a caller needs to report the failure; the engine
//! never surfaces these directly — they are folded into an
//! [`recon_types::ExecutionResult`] with `success = false`.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ExecutionError {
    #[error("tool config unavailable: {0}")]
    ConfigLoad(#[from] recon_tools::ConfigStoreError),

    #[error("unknown mode '{mode}' for tool '{tool}'; known modes: {known_modes:?}")]
    ModeUnknown {
        tool: String,
        mode: String,
        known_modes: Vec<String>,
    },

    #[error("template resolution failed: {reason}")]
    TemplateResolution { reason: String },

    #[error("security violation: {0}")]
    SecurityViolation(#[from] recon_tools::SecurityError),

    #[error("no executable found for tool '{tool}'")]
    ExecutableMissing { tool: String },

    #[error("executable forbidden: {0}")]
    ExecutableForbidden(recon_tools::SecurityError),

    #[error("failed to spawn process: {reason}")]
    SpawnFailed { reason: String },

    #[error("execution timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("process exited with non-zero status {code:?}")]
    NonZeroExit { code: Option<i32> },

    #[error("expected output file is missing: {path}")]
    OutputMissing { path: String },

    #[error("invocation cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Stable short name used in logs and in `ExecutionResult::error_message`.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::ConfigLoad(_) => "ConfigLoad",
            ExecutionError::ModeUnknown { .. } => "ModeUnknown",
            ExecutionError::TemplateResolution { .. } => "TemplateResolution",
            ExecutionError::SecurityViolation(_) => "SecurityViolation",
            ExecutionError::ExecutableMissing { .. } => "ExecutableMissing",
            ExecutionError::ExecutableForbidden(_) => "ExecutableForbidden",
            ExecutionError::SpawnFailed { .. } => "SpawnFailed",
            ExecutionError::Timeout { .. } => "Timeout",
            ExecutionError::NonZeroExit { .. } => "NonZeroExit",
            ExecutionError::OutputMissing { .. } => "OutputMissing",
            ExecutionError::Cancelled => "Cancelled",
        }
    }

    /// Whether the engine should retry (steps 9-10) after this failure.
    /// Timeouts are deliberately excluded: retrying the same wall-clock
    /// deadline cannot help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::SpawnFailed { .. } | ExecutionError::NonZeroExit { .. }
        )
    }
}
