//! Tool Execution Engine: resolve, validate, spawn, capture and
//! post-process one tool invocation end to end.
//!
//! Everything upstream of a `Command::spawn` — config lookup, templating,
//! security gates, concurrency admission — is owned by other crates; this
//! one wires them together around the process boundary and produces the
//! single [`recon_types::ExecutionResult`] that is the contract every other
//! component (parsers, the workflow executor, CLI output) consumes.

mod engine;
mod errors;
mod locate;
mod output_naming;

pub use engine::{priority_weight, ExecutionOptions, ToolExecutionEngine};
pub use errors::ExecutionError;
pub use locate::locate_executable;
pub use output_naming::resolve_output_names;
