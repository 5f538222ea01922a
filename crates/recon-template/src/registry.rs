//! Variable Registry: a persistent, JSON-backed catalogue of every
//! variable the system has ever seen, with usage statistics and
//! validation. Every mutation is serialised behind one write lock and
//! statistics are always a pure recomputation over the current variable set
//! — there is no incremental counter that could drift from the data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use recon_types::{
    RegistryStatistics, UsageLocation, VariableCategory, VariableDataType, VariableRecord,
    VariableType,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::RegistryError;

/// Context describing why a variable is being seen, used to classify it on
/// first registration.
#[derive(Debug, Clone)]
pub struct RegisterContext {
    pub location: UsageLocation,
    pub var_type: VariableType,
    pub source: String,
    pub owning_tool: Option<String>,
}

/// One issue surfaced by [`VariableRegistry::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyDescription(String),
    EmptyType(String),
    EmptyCategory(String),
    DeprecatedWithoutReplacement(String),
    MagicWithoutExamples(String),
}

#[derive(Serialize, Deserialize)]
struct PersistedDocument {
    version: u32,
    last_updated: chrono::DateTime<Utc>,
    variables: HashMap<String, VariableRecord>,
    statistics: RegistryStatistics,
}

const DOCUMENT_VERSION: u32 = 1;

/// Thread-safe, optionally self-saving catalogue of [`VariableRecord`]s.
pub struct VariableRegistry {
    path: PathBuf,
    auto_save: bool,
    variables: RwLock<HashMap<String, VariableRecord>>,
}

impl VariableRegistry {
    /// Start an empty, in-memory registry backed by `path` for future
    /// `save`/`load` calls.
    pub fn new(path: impl Into<PathBuf>, auto_save: bool) -> Self {
        Self {
            path: path.into(),
            auto_save,
            variables: RwLock::new(HashMap::new()),
        }
    }

    /// Load an existing `variables.json`, or start empty if the file does
    /// not exist yet.
    pub async fn load_or_create(
        path: impl Into<PathBuf>,
        auto_save: bool,
    ) -> Result<Self, RegistryError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::new(path, auto_save));
        }
        let registry = Self::new(path, auto_save);
        registry.load().await?;
        Ok(registry)
    }

    /// Insert a brand-new record. Fails if `name` is empty. `first_detected`
    /// is set if not already populated (zero time); `last_seen` is always
    /// bumped to now.
    pub async fn add(&self, mut record: VariableRecord) -> Result<(), RegistryError> {
        if record.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let now = Utc::now();
        if record.first_detected.timestamp() == 0 {
            record.first_detected = now;
        }
        record.last_seen = now;

        let mut guard = self.variables.write().await;
        guard.insert(record.name.clone(), record);
        drop(guard);
        self.maybe_save().await;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<VariableRecord> {
        self.variables.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<VariableRecord> {
        self.variables.read().await.values().cloned().collect()
    }

    pub async fn by_type(&self, var_type: VariableType) -> Vec<VariableRecord> {
        self.list_filtered(|r| r.var_type == var_type).await
    }

    pub async fn by_category(&self, category: VariableCategory) -> Vec<VariableRecord> {
        self.list_filtered(|r| r.category == category).await
    }

    pub async fn by_tool(&self, tool: &str) -> Vec<VariableRecord> {
        self.list_filtered(|r| r.owning_tool.as_deref() == Some(tool))
            .await
    }

    async fn list_filtered(&self, pred: impl Fn(&VariableRecord) -> bool) -> Vec<VariableRecord> {
        self.variables
            .read()
            .await
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect()
    }

    /// Case-insensitive substring search over name, description, tags and
    /// owning tool.
    pub async fn search(&self, query: &str) -> Vec<VariableRecord> {
        let needle = query.to_ascii_lowercase();
        self.list_filtered(|r| {
            r.name.to_ascii_lowercase().contains(&needle)
                || r.description.to_ascii_lowercase().contains(&needle)
                || r.tags.iter().any(|t| t.to_ascii_lowercase().contains(&needle))
                || r.owning_tool
                    .as_ref()
                    .is_some_and(|t| t.to_ascii_lowercase().contains(&needle))
        })
        .await
    }

    /// Idempotent: if `name` is already known, append a deduplicated usage
    /// location and bump `usage_count`; otherwise synthesise a new record
    /// from `ctx` and register it with one initial usage.
    pub async fn auto_register(&self, name: &str, ctx: RegisterContext) -> VariableRecord {
        let mut guard = self.variables.write().await;
        let now = Utc::now();

        let record = guard.entry(name.to_string()).or_insert_with(|| {
            debug!(name, "auto-registering new variable");
            VariableRecord {
                name: name.to_string(),
                var_type: ctx.var_type,
                category: classify_category(name),
                data_type: classify_data_type(name),
                source: ctx.source.clone(),
                owning_tool: ctx.owning_tool.clone(),
                description: format!("Auto-registered variable '{name}' from {}", ctx.source),
                first_detected: now,
                last_seen: now,
                usage_count: 0,
                usage_locations: Vec::new(),
                deprecated: false,
                replacement: None,
                example_values: Vec::new(),
                tags: Vec::new(),
                required_by: Vec::new(),
                depends_on: Vec::new(),
            }
        });

        record.last_seen = now;
        record.usage_count += 1;
        if !record.usage_locations.contains(&ctx.location) {
            record.usage_locations.push(ctx.location);
        }
        let result = record.clone();
        drop(guard);
        self.maybe_save().await;
        result
    }

    /// Bump `usage_count` and add `location` if it has not been recorded
    /// before. No-op (besides the count) if the variable is unknown —
    /// callers are expected to `auto_register` first.
    pub async fn update_usage(&self, name: &str, location: UsageLocation) {
        let mut guard = self.variables.write().await;
        if let Some(record) = guard.get_mut(name) {
            record.usage_count += 1;
            record.last_seen = Utc::now();
            if !record.usage_locations.contains(&location) {
                record.usage_locations.push(location);
            }
        }
        drop(guard);
        self.maybe_save().await;
    }

    /// Validate every record: flags empty descriptions and deprecated
    /// entries with no replacement set.
    pub async fn validate(&self) -> Vec<ValidationIssue> {
        let guard = self.variables.read().await;
        let mut issues = Vec::new();
        for record in guard.values() {
            if record.description.trim().is_empty() {
                issues.push(ValidationIssue::EmptyDescription(record.name.clone()));
            }
            if record.deprecated && record.replacement.is_none() {
                issues.push(ValidationIssue::DeprecatedWithoutReplacement(
                    record.name.clone(),
                ));
            }
            if record.var_type == VariableType::Magic && record.example_values.is_empty() {
                issues.push(ValidationIssue::MagicWithoutExamples(record.name.clone()));
            }
        }
        issues
    }

    /// Recompute statistics fresh over the current variable set. Never
    /// incremental — a caller that mutates twice then calls this once sees
    /// exactly the same answer as two calls interleaved with the mutations.
    pub async fn statistics(&self) -> RegistryStatistics {
        let guard = self.variables.read().await;
        compute_statistics(guard.values())
    }

    /// Serialize the registry to the requested format. Only `"json"` is
    /// supported.
    pub async fn export(&self, format: &str) -> Result<String, RegistryError> {
        if format != "json" {
            return Err(RegistryError::UnsupportedFormat {
                format: format.to_string(),
            });
        }
        let guard = self.variables.read().await;
        let doc = PersistedDocument {
            version: DOCUMENT_VERSION,
            last_updated: Utc::now(),
            variables: guard.clone(),
            statistics: compute_statistics(guard.values()),
        };
        serde_json::to_string_pretty(&doc).map_err(|source| RegistryError::Serde { source })
    }

    pub async fn save(&self) -> Result<(), RegistryError> {
        let json = self.export("json").await?;
        if let Some(parent) = self.path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| RegistryError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        info!(path = %self.path.display(), "saved variable registry");
        Ok(())
    }

    pub async fn load(&self) -> Result<(), RegistryError> {
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| RegistryError::Io {
                    path: self.path.display().to_string(),
                    source,
                })?;
        let doc: PersistedDocument =
            serde_json::from_str(&contents).map_err(|source| RegistryError::Serde { source })?;
        *self.variables.write().await = doc.variables;
        Ok(())
    }

    async fn maybe_save(&self) {
        if self.auto_save {
            if let Err(err) = self.save().await {
                tracing::warn!(%err, "auto-save of variable registry failed");
            }
        }
    }
}

fn classify_category(name: &str) -> VariableCategory {
    let lower = name.to_ascii_lowercase();
    if lower.contains("port") {
        VariableCategory::Port
    } else if lower.contains("service") || lower.contains("svc") {
        VariableCategory::Service
    } else if lower.contains("host") || lower.contains("ip") || lower.contains("domain") {
        VariableCategory::Host
    } else if lower.contains("dir") {
        VariableCategory::Directory
    } else if lower.contains("file") {
        VariableCategory::File
    } else if lower.contains("meta") {
        VariableCategory::Metadata
    } else if lower.contains("analysis") || lower.contains("result") {
        VariableCategory::Analysis
    } else {
        VariableCategory::Core
    }
}

fn classify_data_type(name: &str) -> VariableDataType {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with("ports") || lower.ends_with("hosts") || lower.contains("list") {
        VariableDataType::List
    } else if lower.starts_with("is_") || lower.contains("enabled") || lower.contains("flag") {
        VariableDataType::Boolean
    } else if lower.contains("port") || lower.contains("count") || lower.contains("num") {
        VariableDataType::Integer
    } else {
        VariableDataType::String
    }
}

fn compute_statistics<'a>(records: impl Iterator<Item = &'a VariableRecord>) -> RegistryStatistics {
    let records: Vec<&VariableRecord> = records.collect();
    let mut stats = RegistryStatistics {
        total_variables: records.len(),
        ..Default::default()
    };

    for record in &records {
        *stats
            .by_type
            .entry(format!("{:?}", record.var_type))
            .or_insert(0) += 1;
        *stats
            .by_category
            .entry(format!("{:?}", record.category))
            .or_insert(0) += 1;
        *stats.by_source.entry(record.source.clone()).or_insert(0) += 1;

        if record.source == "auto" || record.var_type == VariableType::Magic {
            stats.auto_registered += 1;
        } else {
            stats.manual += 1;
        }
        if record.deprecated {
            stats.deprecated_count += 1;
        }
        if record.usage_count == 0 {
            stats.unused.push(record.name.clone());
        }
    }

    let mut by_usage: Vec<(String, u64)> = records
        .iter()
        .map(|r| (r.name.clone(), r.usage_count))
        .collect();
    by_usage.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    by_usage.truncate(10);
    stats.top_used = by_usage;

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(file: &str, line: u32, var_type: VariableType, source: &str) -> RegisterContext {
        RegisterContext {
            location: UsageLocation {
                file: file.to_string(),
                line,
                context: "argv".to_string(),
            },
            var_type,
            source: source.to_string(),
            owning_tool: Some(source.to_string()),
        }
    }

    #[tokio::test]
    async fn auto_register_is_idempotent_for_the_same_location() {
        let registry = VariableRegistry::new("/tmp/does-not-matter.json", false);
        registry
            .auto_register("naabu_ports", ctx("workflow.yaml", 10, VariableType::Magic, "naabu"))
            .await;
        registry
            .auto_register("naabu_ports", ctx("workflow.yaml", 10, VariableType::Magic, "naabu"))
            .await;

        let record = registry.get("naabu_ports").await.unwrap();
        assert_eq!(record.usage_count, 2);
        assert_eq!(record.usage_locations.len(), 1);
    }

    #[tokio::test]
    async fn auto_register_dedupes_locations_but_counts_every_call() {
        let registry = VariableRegistry::new("/tmp/does-not-matter.json", false);
        registry
            .auto_register("naabu_ports", ctx("a.yaml", 1, VariableType::Magic, "naabu"))
            .await;
        registry
            .auto_register("naabu_ports", ctx("b.yaml", 2, VariableType::Magic, "naabu"))
            .await;

        let record = registry.get("naabu_ports").await.unwrap();
        assert_eq!(record.usage_count, 2);
        assert_eq!(record.usage_locations.len(), 2);
    }

    #[tokio::test]
    async fn classification_infers_category_and_data_type_from_name() {
        let registry = VariableRegistry::new("/tmp/does-not-matter.json", false);
        let rec = registry
            .auto_register("naabu_ports", ctx("w.yaml", 1, VariableType::Magic, "naabu"))
            .await;
        assert_eq!(rec.category, VariableCategory::Port);
        assert_eq!(rec.data_type, VariableDataType::List);
    }

    #[tokio::test]
    async fn statistics_are_a_pure_recomputation() {
        let registry = VariableRegistry::new("/tmp/does-not-matter.json", false);
        registry
            .auto_register("naabu_ports", ctx("w.yaml", 1, VariableType::Magic, "naabu"))
            .await;
        registry
            .add(VariableRecord {
                name: "target".to_string(),
                var_type: VariableType::Template,
                category: VariableCategory::Host,
                data_type: VariableDataType::String,
                source: "core".to_string(),
                owning_tool: None,
                description: "scan target".to_string(),
                first_detected: Utc::now(),
                last_seen: Utc::now(),
                usage_count: 0,
                usage_locations: vec![],
                deprecated: false,
                replacement: None,
                example_values: vec![],
                tags: vec![],
                required_by: vec![],
                depends_on: vec![],
            })
            .await
            .unwrap();

        let first = registry.statistics().await;
        let second = registry.statistics().await;
        assert_eq!(first.total_variables, second.total_variables);
        assert_eq!(first.unused, second.unused);
        assert_eq!(first.total_variables, 2);
        assert_eq!(first.unused, vec!["target".to_string()]);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let registry = VariableRegistry::new("/tmp/does-not-matter.json", false);
        let record = VariableRecord {
            name: String::new(),
            var_type: VariableType::Template,
            category: VariableCategory::Core,
            data_type: VariableDataType::String,
            source: "core".to_string(),
            owning_tool: None,
            description: String::new(),
            first_detected: Utc::now(),
            last_seen: Utc::now(),
            usage_count: 0,
            usage_locations: vec![],
            deprecated: false,
            replacement: None,
            example_values: vec![],
            tags: vec![],
            required_by: vec![],
            depends_on: vec![],
        };
        assert!(matches!(
            registry.add(record).await,
            Err(RegistryError::EmptyName)
        ));
    }

    #[tokio::test]
    async fn json_round_trip_preserves_variables() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("variables.json");

        let registry = VariableRegistry::new(&path, false);
        registry
            .auto_register("naabu_ports", ctx("w.yaml", 1, VariableType::Magic, "naabu"))
            .await;
        registry.save().await.unwrap();

        let reloaded = VariableRegistry::load_or_create(&path, false).await.unwrap();
        let record = reloaded.get("naabu_ports").await.unwrap();
        assert_eq!(record.usage_count, 1);
    }

    #[tokio::test]
    async fn export_rejects_unsupported_formats() {
        let registry = VariableRegistry::new("/tmp/does-not-matter.json", false);
        assert!(matches!(
            registry.export("yaml").await,
            Err(RegistryError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn registry_is_constructed_with_the_configured_path() {
        let registry = VariableRegistry::new("/tmp/variables.json", false);
        assert_eq!(registry.path, Path::new("/tmp/variables.json"));
    }
}
