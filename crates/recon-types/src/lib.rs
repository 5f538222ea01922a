//! Shared data model for the reconnaissance workflow orchestration engine.
//!
//! This crate holds only plain data and the small set of traits that more
//! than one component needs to agree on (`OutputParser`). Behaviour lives in
//! the crates that own each component: `recon-tools` (config store, security,
//! parsers), `recon-template` (template resolver, variable registry),
//! `recon-concurrency` (class scheduler, resource gate), `recon-execution`
//! (the per-invocation engine) and `recon-orchestration` (workflow + fleet
//! scheduling).

mod model;
mod parser;
mod settings;
mod tool_config;
mod variable;

pub use model::{
    ExecutionContext, ExecutionResult, Priority, Step, ToolClass, ToolPerformanceHistory,
    Workflow, WorkflowExecution, WorkflowStatus,
};
pub use parser::{Combiner, OutputParser, ParserError};
pub use settings::{ArgvPolicy, PriorityWeights, ResourceLimits, ScanOutputMode, Settings};
pub use tool_config::ToolConfig;
pub use variable::{
    RegistryStatistics, UsageLocation, VariableCategory, VariableDataType, VariableRecord,
    VariableType,
};
