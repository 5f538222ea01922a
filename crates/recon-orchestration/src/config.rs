//! Workflow file loading (ambient config layer, not itself part of the
//! scheduling core): scans a directory of YAML files into a typed,
//! name-keyed catalogue, the same way tool definitions are loaded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use recon_types::Workflow;
use tracing::{debug, info, warn};

use crate::errors::WorkflowFileError;

/// Loads every `*.yaml`/`*.yml` file under a directory as a [`Workflow`].
///
/// Malformed or empty-step files are logged and skipped rather than
/// aborting the whole load — one broken workflow definition should never
/// prevent every other workflow from being available.
pub struct WorkflowFileLoader {
    base_dir: PathBuf,
}

impl WorkflowFileLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub async fn load_all(&self) -> HashMap<String, Workflow> {
        let mut workflows = HashMap::new();

        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %self.base_dir.display(), %err, "workflow directory unreadable");
                return workflows;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "failed to read workflow directory entry");
                    continue;
                }
            };

            let path = entry.path();
            let is_yaml = path
                .extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }

            match self.load_file(&path).await {
                Ok(workflow) => {
                    debug!(workflow = %workflow.name, path = %path.display(), "loaded workflow");
                    workflows.insert(workflow.name.clone(), workflow);
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unloadable workflow file");
                }
            }
        }

        if workflows.is_empty() {
            warn!(dir = %self.base_dir.display(), "no valid workflow definitions found");
        } else {
            info!(count = workflows.len(), "loaded workflow definitions");
        }

        workflows
    }

    pub async fn load_file(&self, path: &Path) -> Result<Workflow, WorkflowFileError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WorkflowFileError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let workflow: Workflow =
            serde_yaml::from_str(&contents).map_err(|source| WorkflowFileError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        if workflow.steps.is_empty() {
            return Err(WorkflowFileError::NoSteps { name: workflow.name });
        }

        if let Some(step) = workflow.steps.iter().find(|step| step.modes.is_empty()) {
            return Err(WorkflowFileError::NoModes {
                workflow: workflow.name,
                step: step.name.clone(),
            });
        }

        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tolerates_malformed_files_and_loads_the_rest() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(
            dir.path().join("good.yaml"),
            "name: recon\nsteps:\n  - name: p\n    tool: naabu\n    modes: [fast_scan]\n",
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("bad.yaml"), "not: [valid, yaml: broken")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("empty_steps.yaml"), "name: nothing\nsteps: []\n")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("ignored.txt"), "irrelevant").await.unwrap();

        let loader = WorkflowFileLoader::new(dir.path());
        let loaded = loader.load_all().await;

        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("recon"));
    }

    #[tokio::test]
    async fn missing_directory_yields_empty_map() {
        let loader = WorkflowFileLoader::new("/no/such/directory/at/all");
        assert!(loader.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn rejects_step_with_no_modes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("no_modes.yaml");
        tokio::fs::write(&path, "name: recon\nsteps:\n  - name: p\n    tool: naabu\n    modes: []\n")
            .await
            .unwrap();

        let loader = WorkflowFileLoader::new(dir.path());
        let err = loader.load_file(&path).await.unwrap_err();
        assert!(matches!(err, WorkflowFileError::NoModes { .. }));
    }
}
