//! Output-Parser Registry: routes a completed tool's output to its
//! registered parser and namespaces the resulting keys. Also holds the
//! combiner registry, the analogous plug-in surface for multi-mode steps.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use recon_types::{Combiner, OutputParser};
use tracing::{debug, warn};

/// `tool_name -> Parser` map, populated once at process init. Tool-agnostic:
/// a completed tool with no registered parser simply yields no variables.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn OutputParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, parser: Arc<dyn OutputParser>) {
        self.parsers.insert(parser.tool_name().to_string(), parser);
    }

    /// Parse `output_path` with `tool`'s registered parser and namespace
    /// every resulting key as `{tool}_{key}`. Absence of a parser, or a
    /// parser error, both yield an empty map — a malformed or unparsed
    /// output must never fail the invocation that produced it.
    pub fn parse_namespaced(&self, tool: &str, output_path: &Path) -> HashMap<String, String> {
        let Some(parser) = self.parsers.get(tool) else {
            debug!(tool, "no output parser registered");
            return HashMap::new();
        };

        match parser.parse(output_path) {
            Ok(values) => values
                .into_iter()
                .map(|(key, value)| (format!("{tool}_{key}"), value))
                .collect(),
            Err(err) => {
                warn!(tool, %err, "output parser failed, publishing no variables");
                HashMap::new()
            }
        }
    }

    pub fn has_parser(&self, tool: &str) -> bool {
        self.parsers.contains_key(tool)
    }
}

/// `tool_name -> Combiner` map for steps with `combine_results = true`.
#[derive(Default)]
pub struct CombinerRegistry {
    combiners: HashMap<String, Arc<dyn Combiner>>,
}

impl CombinerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, combiner: Arc<dyn Combiner>) {
        self.combiners.insert(combiner.tool_name().to_string(), combiner);
    }

    /// Combine `output_paths` with `tool`'s registered combiner and
    /// namespace every resulting key as `{tool}_{key}`. Absence of a
    /// combiner, or a combiner error, both yield an empty map.
    pub fn combine_namespaced(&self, tool: &str, output_paths: &[&Path]) -> HashMap<String, String> {
        let Some(combiner) = self.combiners.get(tool) else {
            debug!(tool, "no combiner registered");
            return HashMap::new();
        };

        match combiner.combine(output_paths) {
            Ok(values) => values
                .into_iter()
                .map(|(key, value)| (format!("{tool}_{key}"), value))
                .collect(),
            Err(err) => {
                warn!(tool, %err, "combiner failed, publishing no variables");
                HashMap::new()
            }
        }
    }
}
