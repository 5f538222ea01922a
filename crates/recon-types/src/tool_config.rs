use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Immutable argv-template description for one tool, loaded once and cached
/// forever by the tool config store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(rename = "tool")]
    pub name: String,
    #[serde(default, rename = "file")]
    pub output_filename: Option<String>,
    #[serde(rename = "args")]
    pub modes: HashMap<String, Vec<String>>,
}

impl ToolConfig {
    /// A config is well-formed iff it declares at least one mode.
    pub fn has_modes(&self) -> bool {
        !self.modes.is_empty()
    }

    pub fn mode_names(&self) -> Vec<&str> {
        self.modes.keys().map(String::as_str).collect()
    }
}
