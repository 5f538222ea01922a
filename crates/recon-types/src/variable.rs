use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a variable's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// Populated by parsing a completed tool's output.
    Magic,
    /// Produced by aggregating multiple invocations of the same tool
    /// within a step (`combine_results`).
    Combined,
    /// Comes from the static tool/workflow configuration.
    Config,
    /// Comes from a workflow's `variable_map` remapping.
    Workflow,
    /// Derived execution-context value (target, timestamp, ...).
    Template,
}

/// Coarse subject-matter bucket, inferred from the variable's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableCategory {
    Port,
    Service,
    Host,
    Directory,
    File,
    Metadata,
    Analysis,
    Core,
}

/// Coarse value shape, inferred from the variable's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableDataType {
    String,
    Integer,
    Boolean,
    List,
    Unknown,
}

/// One place a variable was referenced, for the registry's usage tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageLocation {
    pub file: String,
    pub line: u32,
    pub context: String,
}

/// A catalogued variable: name, provenance, and usage history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableRecord {
    /// Canonical form, e.g. `{{naabu_ports}}`.
    pub name: String,
    pub var_type: VariableType,
    pub category: VariableCategory,
    pub data_type: VariableDataType,
    /// Free-form provenance string, e.g. the producing tool's name or
    /// `"core"` for template-derived variables.
    pub source: String,
    pub owning_tool: Option<String>,
    pub description: String,
    pub first_detected: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub usage_count: u64,
    pub usage_locations: Vec<UsageLocation>,
    pub deprecated: bool,
    pub replacement: Option<String>,
    pub example_values: Vec<String>,
    pub tags: Vec<String>,
    pub required_by: Vec<String>,
    pub depends_on: Vec<String>,
}

/// Recomputed snapshot over the registry's current variable set. Never
/// stored incrementally — always derived fresh under the registry's write
/// lock so it can never drift from the underlying data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total_variables: usize,
    pub by_type: HashMap<String, usize>,
    pub by_category: HashMap<String, usize>,
    pub by_source: HashMap<String, usize>,
    pub auto_registered: usize,
    pub manual: usize,
    pub deprecated_count: usize,
    pub top_used: Vec<(String, u64)>,
    pub unused: Vec<String>,
}
