use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// Failure of a tool-specific output parser.
#[derive(Debug, Error, Clone)]
pub enum ParserError {
    #[error("output path does not exist: {path}")]
    MissingOutput { path: String },

    #[error("failed to parse output for tool '{tool}': {reason}")]
    Malformed { tool: String, reason: String },

    #[error("io error reading '{path}': {reason}")]
    Io { path: String, reason: String },
}

/// A plug-in that turns a completed tool's output file into name/value
/// pairs, which the engine then publishes into the template resolver under
/// `{tool}_{key}`.
///
/// Implementations are capability objects, not a class hierarchy: each one
/// just needs a name and a `parse` function. The registry that owns them is
/// populated once at process start (see `recon_tools::parsers::ParserRegistry`).
pub trait OutputParser: Send + Sync {
    /// The tool name this parser is registered under.
    fn tool_name(&self) -> &str;

    /// Parse the tool's output file into key/value pairs. An empty map is a
    /// valid result (nothing worth promoting to a variable); parse errors
    /// are non-fatal to the invocation that produced the output.
    fn parse(&self, output_path: &Path) -> Result<HashMap<String, String>, ParserError>;
}

/// A plug-in that reduces a multi-mode step's several output files into one
/// combined set of name/value pairs (e.g. the union of open ports across
/// scan modes), published into the template resolver for downstream steps.
///
/// Only consulted for a step whose `combine_results` is set, and only after
/// every mode in that step has finished successfully.
pub trait Combiner: Send + Sync {
    /// The tool name this combiner is registered under.
    fn tool_name(&self) -> &str;

    /// Combine every mode's output file into one key/value map. An empty
    /// map means nothing worth publishing; a combiner error is non-fatal to
    /// the step that produced the outputs.
    fn combine(&self, output_paths: &[&Path]) -> Result<HashMap<String, String>, ParserError>;
}
