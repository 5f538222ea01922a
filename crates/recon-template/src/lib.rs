//! Template Resolver and Variable Registry: the typed producer/consumer
//! dataflow that lets one tool's output feed another tool's argv.

pub mod errors;
pub mod registry;
pub mod resolver;

pub use errors::RegistryError;
pub use registry::{RegisterContext, ValidationIssue, VariableRegistry};
pub use resolver::{sanitize_filename, TemplateResolver, VariableMap};
