//! Loads a [`Settings`] value from a `configs/` directory, tolerating a
//! missing or partial file the same way the workflow and tool file loaders
//! tolerate missing or partial definitions: defaults fill every gap.

use std::path::Path;

use recon_types::{ArgvPolicy, PriorityWeights, ResourceLimits, ScanOutputMode, Settings};
use serde::Deserialize;
use tracing::{info, warn};

/// Mirrors the nested `tools.*` / `output.*` schema external deployments
/// write, so users don't have to flatten their YAML to match our internal
/// [`Settings`] layout. Every field is optional; anything absent keeps its
/// `Settings::default()` value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFile {
    tools: RawTools,
    output: RawOutput,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTools {
    tool_execution: RawToolExecution,
    default_timeout_seconds: Option<u64>,
    retry_attempts: Option<u32>,
    argv_policy: Option<ArgvPolicy>,
    execution: RawExecution,
    workflow_orchestration: RawWorkflowOrchestration,
    cli_mode: RawCliMode,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawToolExecution {
    max_concurrent_executions: Option<usize>,
    max_parallel_executions: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawExecution {
    tools_path: Option<String>,
    args_validation: Option<bool>,
    exec_validation: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWorkflowOrchestration {
    max_concurrent_workflows: Option<usize>,
    priority_weights: Option<PriorityWeights>,
    resource_limits: Option<ResourceLimits>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCliMode {
    execution_timeout_seconds: Option<u64>,
    validate_output: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOutput {
    scan_output_mode: Option<ScanOutputMode>,
    create_latest_links: Option<bool>,
}

/// Read `dir/settings.yaml` into a [`Settings`]. Any read or parse failure,
/// or a missing file, yields `Settings::default()` rather than aborting —
/// the core always sees a valid configuration, just possibly the defaults.
pub async fn load_settings(dir: &Path) -> Settings {
    let path = dir.join("settings.yaml");
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(err) => {
            warn!(path = %path.display(), %err, "settings file unreadable, using defaults");
            return Settings::default();
        }
    };

    let raw: RawFile = match serde_yaml::from_str(&contents) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %path.display(), %err, "settings file malformed, using defaults");
            return Settings::default();
        }
    };

    info!(path = %path.display(), "loaded settings");
    merge(raw)
}

fn merge(raw: RawFile) -> Settings {
    let defaults = Settings::default();
    Settings {
        max_concurrent_executions: raw.tools.tool_execution.max_concurrent_executions.unwrap_or(defaults.max_concurrent_executions),
        max_parallel_executions: raw.tools.tool_execution.max_parallel_executions.or(defaults.max_parallel_executions),
        default_timeout_seconds: raw.tools.default_timeout_seconds.unwrap_or(defaults.default_timeout_seconds),
        retry_attempts: raw.tools.retry_attempts.unwrap_or(defaults.retry_attempts),
        argv_policy: raw.tools.argv_policy.unwrap_or(defaults.argv_policy),
        tools_path: raw.tools.execution.tools_path.unwrap_or(defaults.tools_path),
        args_validation: raw.tools.execution.args_validation.unwrap_or(defaults.args_validation),
        exec_validation: raw.tools.execution.exec_validation.unwrap_or(defaults.exec_validation),
        max_concurrent_workflows: raw.tools.workflow_orchestration.max_concurrent_workflows.unwrap_or(defaults.max_concurrent_workflows),
        priority_weights: raw.tools.workflow_orchestration.priority_weights.unwrap_or(defaults.priority_weights),
        resource_limits: raw.tools.workflow_orchestration.resource_limits.unwrap_or(defaults.resource_limits),
        cli_execution_timeout_seconds: raw.tools.cli_mode.execution_timeout_seconds.unwrap_or(defaults.cli_execution_timeout_seconds),
        cli_validate_output: raw.tools.cli_mode.validate_output.unwrap_or(defaults.cli_validate_output),
        scan_output_mode: raw.output.scan_output_mode.unwrap_or(defaults.scan_output_mode),
        create_latest_links: raw.output.create_latest_links.unwrap_or(defaults.create_latest_links),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = load_settings(dir.path()).await;
        assert_eq!(settings.max_concurrent_executions, Settings::default().max_concurrent_executions);
    }

    #[tokio::test]
    async fn partial_file_overrides_only_what_it_sets() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(
            dir.path().join("settings.yaml"),
            "tools:\n  workflow_orchestration:\n    max_concurrent_workflows: 9\n",
        )
        .await
        .unwrap();

        let settings = load_settings(dir.path()).await;
        assert_eq!(settings.max_concurrent_workflows, 9);
        assert_eq!(settings.retry_attempts, Settings::default().retry_attempts);
    }
}
