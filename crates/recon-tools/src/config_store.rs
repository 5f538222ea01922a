//! Tool Config Store: load-once, cache-forever lookup of a tool's argv
//! templates by mode.

use std::collections::HashMap;
use std::sync::Arc;

use recon_types::ToolConfig;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::ConfigStoreError;

/// Supplies a tool's config the first time the store needs it. The ambient
/// file-based loader (`crate::tool_file_loader`) is the production
/// implementation; tests can supply an in-memory map instead.
pub trait ToolConfigSource: Send + Sync {
    fn load(&self, name: &str) -> Option<ToolConfig>;
}

/// A fixed map of configs, useful for tests and for pre-parsed deployments.
pub struct StaticToolConfigSource {
    configs: HashMap<String, ToolConfig>,
}

impl StaticToolConfigSource {
    pub fn new(configs: HashMap<String, ToolConfig>) -> Self {
        Self { configs }
    }
}

impl ToolConfigSource for StaticToolConfigSource {
    fn load(&self, name: &str) -> Option<ToolConfig> {
        self.configs.get(name).cloned()
    }
}

/// Thread-safe, cache-forever store of tool configs.
///
/// A config is fetched from the source at most once per tool name; every
/// subsequent call to [`ToolConfigStore::get`] is served from the cache.
/// Callers receive an owned clone, never a shared reference, so the cached
/// copy can never be mutated out from under other callers.
pub struct ToolConfigStore {
    source: Arc<dyn ToolConfigSource>,
    cache: RwLock<HashMap<String, ToolConfig>>,
}

impl ToolConfigStore {
    pub fn new(source: Arc<dyn ToolConfigSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the config for `name`, loading and validating it on first
    /// request.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::ToolConfigNotFound`] if the source has no
    /// config for `name`, or [`ConfigStoreError::ToolConfigInvalid`] if the
    /// config declares no modes.
    pub async fn get(&self, name: &str) -> Result<ToolConfig, ConfigStoreError> {
        if let Some(cfg) = self.cache.read().await.get(name) {
            return Ok(cfg.clone());
        }

        let cfg = self
            .source
            .load(name)
            .ok_or_else(|| ConfigStoreError::ToolConfigNotFound {
                name: name.to_string(),
            })?;

        if !cfg.has_modes() {
            return Err(ConfigStoreError::ToolConfigInvalid {
                name: name.to_string(),
            });
        }

        let mut cache = self.cache.write().await;
        // Another caller may have raced us; last write wins, contents are
        // identical either way since the source is immutable per name.
        cache.insert(name.to_string(), cfg.clone());
        debug!(tool = %name, modes = cfg.mode_names().len(), "cached tool config");
        info!(tool = %name, "loaded tool config");
        Ok(cfg)
    }

    /// Number of distinct tool configs currently cached. Observability-only.
    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, modes: &[&str]) -> ToolConfig {
        ToolConfig {
            name: name.to_string(),
            output_filename: None,
            modes: modes
                .iter()
                .map(|m| (m.to_string(), vec!["{{target}}".to_string()]))
                .collect(),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let store = ToolConfigStore::new(Arc::new(StaticToolConfigSource::new(HashMap::new())));
        let err = store.get("nmap").await.unwrap_err();
        assert!(matches!(err, ConfigStoreError::ToolConfigNotFound { .. }));
    }

    #[tokio::test]
    async fn config_with_no_modes_is_invalid() {
        let mut map = HashMap::new();
        map.insert(
            "broken".to_string(),
            ToolConfig {
                name: "broken".to_string(),
                output_filename: None,
                modes: HashMap::new(),
            },
        );
        let store = ToolConfigStore::new(Arc::new(StaticToolConfigSource::new(map)));
        let err = store.get("broken").await.unwrap_err();
        assert!(matches!(err, ConfigStoreError::ToolConfigInvalid { .. }));
    }

    #[tokio::test]
    async fn second_get_is_served_from_cache() {
        let mut map = HashMap::new();
        map.insert("naabu".to_string(), config("naabu", &["fast_scan"]));
        let store = ToolConfigStore::new(Arc::new(StaticToolConfigSource::new(map)));

        let first = store.get("naabu").await.unwrap();
        assert_eq!(store.cached_len().await, 1);
        let second = store.get("naabu").await.unwrap();
        assert_eq!(first.name, second.name);
        assert_eq!(store.cached_len().await, 1);
    }

    #[tokio::test]
    async fn returned_config_is_a_defensive_copy() {
        let mut map = HashMap::new();
        map.insert("naabu".to_string(), config("naabu", &["fast_scan"]));
        let store = ToolConfigStore::new(Arc::new(StaticToolConfigSource::new(map)));

        let mut cfg = store.get("naabu").await.unwrap();
        cfg.modes.get_mut("fast_scan").unwrap().push("mutated".to_string());

        let fresh = store.get("naabu").await.unwrap();
        assert_eq!(fresh.modes["fast_scan"].len(), 1);
    }
}
