//! Ambient loader that turns a directory of YAML tool files into
//! [`ToolConfig`] values for the config store. This is the file-format
//! adapter the core depends on but does not itself implement.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use recon_types::ToolConfig;
use tracing::{debug, warn};

use crate::config_store::ToolConfigSource;
use crate::errors::ToolFileError;

/// Scans `base_dir` for `*.yaml`/`*.yml` tool files and loads them into an
/// in-memory map, keyed by the config's own `name` field (not the
/// filename). A malformed individual file is logged and skipped rather than
/// aborting the whole load, matching how the orchestration layer tolerates
/// bad workflow files.
pub struct ToolFileLoader {
    base_dir: PathBuf,
}

impl ToolFileLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Eagerly load every tool file under `base_dir` into a map suitable
    /// for `StaticToolConfigSource`, or for a long-lived source that is
    /// asked for configs lazily from an already-loaded map.
    pub fn load_all(&self) -> HashMap<String, ToolConfig> {
        let mut configs = HashMap::new();

        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %self.base_dir.display(), %err, "tool directory unreadable");
                return configs;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if !is_yaml {
                continue;
            }

            match self.load_file(&path) {
                Ok(cfg) => {
                    debug!(tool = %cfg.name, path = %path.display(), "loaded tool file");
                    configs.insert(cfg.name.clone(), cfg);
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable tool file");
                }
            }
        }

        configs
    }

    fn load_file(&self, path: &Path) -> Result<ToolConfig, ToolFileError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ToolFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ToolFileError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// A [`ToolConfigSource`] backed by a pre-loaded map, typically produced by
/// [`ToolFileLoader::load_all`] once at process start.
pub struct LoadedToolConfigSource {
    configs: HashMap<String, ToolConfig>,
}

impl LoadedToolConfigSource {
    pub fn from_directory(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            configs: ToolFileLoader::new(base_dir).load_all(),
        }
    }
}

impl ToolConfigSource for LoadedToolConfigSource {
    fn load(&self, name: &str) -> Option<ToolConfig> {
        self.configs.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_well_formed_tool_files_and_skips_broken_ones() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("naabu.yaml"),
            "tool: naabu\nargs:\n  fast_scan: [\"{{target}}\"]\n",
        )
        .unwrap();
        fs::write(dir.path().join("broken.yaml"), "not: [valid yaml structure for a tool").unwrap();
        fs::write(dir.path().join("README.md"), "ignored, not yaml").unwrap();

        let loaded = ToolFileLoader::new(dir.path()).load_all();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("naabu"));
    }

    #[test]
    fn missing_directory_yields_empty_map() {
        let loaded = ToolFileLoader::new("/nonexistent/path/for/tools").load_all();
        assert!(loaded.is_empty());
    }
}
