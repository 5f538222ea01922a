use serde::{Deserialize, Serialize};

/// argv gate thresholds and character-class policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgvPolicy {
    pub max_args: usize,
    pub max_arg_bytes: usize,
    pub max_argv_bytes: usize,
    pub deny_shell_metachars: bool,
    pub allowed_char_classes: Vec<String>,
}

impl Default for ArgvPolicy {
    fn default() -> Self {
        Self {
            max_args: 64,
            max_arg_bytes: 1024,
            max_argv_bytes: 8192,
            deny_shell_metachars: true,
            allowed_char_classes: vec!["alnum".to_string(), "-_.:/@,".to_string()],
        }
    }
}

/// Priority-queue scoring weights for workflow admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub high: i32,
    pub medium: i32,
    pub low: i32,
    pub independent_bonus: i32,
    pub parallel_bonus: i32,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            high: 30,
            medium: 10,
            low: -10,
            independent_bonus: 20,
            parallel_bonus: 5,
        }
    }
}

/// System-resource admission gates consulted by the Resource Monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_cpu_usage: f64,
    pub max_memory_usage: f64,
    pub max_active_tools: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_cpu_usage: 90.0,
            max_memory_usage: 90.0,
            max_active_tools: 32,
        }
    }
}

/// The full configuration schema the core depends on. Populated by an
/// external loader from whatever file tree a deployment uses; the core only
/// ever sees this typed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_concurrent_executions: usize,
    pub max_parallel_executions: Option<usize>,
    pub default_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub argv_policy: ArgvPolicy,
    pub tools_path: String,
    pub args_validation: bool,
    pub exec_validation: bool,
    pub max_concurrent_workflows: usize,
    pub priority_weights: PriorityWeights,
    pub resource_limits: ResourceLimits,
    pub cli_execution_timeout_seconds: u64,
    pub cli_validate_output: bool,
    pub scan_output_mode: ScanOutputMode,
    pub create_latest_links: bool,
}

/// Governs whether resolved output filenames embed a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOutputMode {
    Overwrite,
    Timestamp,
    Both,
}

impl Default for ScanOutputMode {
    fn default() -> Self {
        ScanOutputMode::Overwrite
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 8,
            max_parallel_executions: None,
            default_timeout_seconds: 5,
            retry_attempts: 2,
            argv_policy: ArgvPolicy::default(),
            tools_path: String::new(),
            args_validation: true,
            exec_validation: true,
            max_concurrent_workflows: 4,
            priority_weights: PriorityWeights::default(),
            resource_limits: ResourceLimits::default(),
            cli_execution_timeout_seconds: 0,
            cli_validate_output: true,
            scan_output_mode: ScanOutputMode::default(),
            create_latest_links: false,
        }
    }
}
