use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse priority attached to workflows and steps.
///
/// Ordering is `Low < Medium < High`; this is what the concurrency manager's
/// heap and the orchestrator's queue sort on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Capacity pool a tool invocation draws from.
///
/// A tool with no performance history is classified `Medium`; see
/// `recon-concurrency` for the learning rule that moves it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolClass {
    Fast,
    Medium,
    Heavy,
}

impl Default for ToolClass {
    fn default() -> Self {
        ToolClass::Medium
    }
}

/// Terminal and non-terminal states of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Whether the status can still transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// One step of a workflow: a single tool invoked across one or more modes.
///
/// `variable_map` is `source -> target`: before the step launches, the
/// current value of each `source` variable is copied to `target` in the
/// template resolver's magic store, so the step's argv template can
/// reference `target` under whatever alias it wants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub tool: String,
    pub modes: Vec<String>,
    #[serde(default)]
    pub concurrent: bool,
    #[serde(default)]
    pub combine_results: bool,
    #[serde(default)]
    pub depends_on: Option<String>,
    #[serde(default)]
    pub step_priority: Priority,
    /// 0 = unbounded fan-out across modes.
    #[serde(default)]
    pub max_concurrent_tools: usize,
    #[serde(default, rename = "variables")]
    pub variable_map: HashMap<String, String>,
}

/// A named, ordered collection of steps operating on one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, rename = "parallel_workflow")]
    pub parallel_capable: bool,
    #[serde(default, rename = "independent_execution")]
    pub independent: bool,
    #[serde(default)]
    pub max_concurrent_workflows: Option<usize>,
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Everything a single tool invocation needs in order to resolve its argv
/// and land its output in the right place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub target: String,
    pub tool: String,
    pub mode: String,
    pub workflow_name: Option<String>,
    pub step_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub workspace: PathBuf,
    pub logs_dir: PathBuf,
    pub scans_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub output_file: String,
    pub output_path: PathBuf,
    pub output_file_latest: Option<String>,
    pub output_path_latest: Option<PathBuf>,
    /// Per-invocation custom variables supplied by the caller (distinct from
    /// the template resolver's magic store, but merged with it at
    /// resolution time).
    #[serde(default)]
    pub custom_vars: HashMap<String, String>,
    /// A snapshot of the parent resolver's magic store taken at spawn time,
    /// kept for observability/debugging; resolution itself always takes a
    /// fresh snapshot.
    #[serde(default)]
    pub variable_snapshot: HashMap<String, String>,
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub tool: String,
    pub mode: String,
    pub target: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: Duration,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub resolved_argv: Vec<String>,
}

/// Rolling performance record the concurrency manager uses to reclassify a
/// tool after each completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPerformanceHistory {
    pub tool: String,
    pub total_executions: u64,
    pub total_time_seconds: f64,
    pub rolling_average_seconds: f64,
    pub last_assigned_class: ToolClass,
    pub last_update: DateTime<Utc>,
}

impl ToolPerformanceHistory {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            total_executions: 0,
            total_time_seconds: 0.0,
            rolling_average_seconds: 0.0,
            last_assigned_class: ToolClass::Medium,
            last_update: Utc::now(),
        }
    }
}

/// Snapshot of one workflow's run, from admission to terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub workflow: String,
    pub target: String,
    pub status: WorkflowStatus,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// Keyed by step name, in the order steps completed.
    pub step_results: HashMap<String, ExecutionResult>,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub error: Option<String>,
}

impl WorkflowExecution {
    pub fn new(workflow: impl Into<String>, target: impl Into<String>, total_steps: usize) -> Self {
        Self {
            workflow: workflow.into(),
            target: target.into(),
            status: WorkflowStatus::Queued,
            start: Utc::now(),
            end: None,
            step_results: HashMap::new(),
            completed_steps: 0,
            total_steps,
            error: None,
        }
    }

    pub fn key(&self) -> String {
        format!("{}_{}", self.workflow, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_low_to_high() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
    }

    #[test]
    fn workflow_execution_key_combines_name_and_target() {
        let exec = WorkflowExecution::new("port_scan", "10.0.0.1", 3);
        assert_eq!(exec.key(), "port_scan_10.0.0.1");
        assert_eq!(exec.status, WorkflowStatus::Queued);
        assert!(!exec.status.is_terminal());
    }

    #[test]
    fn workflow_status_terminal_states() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
    }

    #[test]
    fn workflow_step_lookup() {
        let wf = Workflow {
            name: "w".into(),
            description: String::new(),
            category: String::new(),
            priority: Priority::Medium,
            parallel_capable: false,
            independent: false,
            max_concurrent_workflows: None,
            steps: vec![Step {
                name: "p".into(),
                tool: "naabu".into(),
                modes: vec!["fast_scan".into()],
                concurrent: false,
                combine_results: false,
                depends_on: None,
                step_priority: Priority::Medium,
                max_concurrent_tools: 0,
                variable_map: HashMap::new(),
            }],
        };
        assert!(wf.step("p").is_some());
        assert!(wf.step("missing").is_none());
    }
}
