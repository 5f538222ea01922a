//! Workflow Executor and Workflow Orchestrator: the two levels of the
//! scheduler that sit above one tool invocation (`recon_execution`).
//!
//! The executor drives one workflow's step DAG to completion; the
//! orchestrator admits many workflows against a shared resource gate and
//! concurrency cap, then waits for everything it admitted to finish.

pub mod config;
pub mod errors;
pub mod executor;
pub mod orchestrator;
pub mod status;

pub use config::WorkflowFileLoader;
pub use errors::{OrchestrationError, WorkflowFileError};
pub use executor::WorkflowExecutor;
pub use orchestrator::{OrchestratorSnapshot, WorkflowOrchestrator};
pub use status::{NoopStatusCallback, StatusCallback, TracingStatusCallback};
