//! Template Resolver: the context-independent "magic store" plus the
//! per-invocation overlay that turns an argv template into concrete
//! arguments.

use std::collections::HashMap;
use std::sync::Arc;

use recon_types::{ExecutionContext, UsageLocation, VariableType};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::debug;

use crate::registry::{RegisterContext, VariableRegistry};

static TOKEN_PATTERN: &str = r"\{\{([A-Za-z0-9_]+)\}\}";

/// `source -> target` variable name, used by `map_workflow_variable` and
/// stored on a [`Step`](recon_types::Step).
pub type VariableMap = HashMap<String, String>;

/// Thread-safe template resolver.
///
/// Holds one context-independent map of published values (the "magic
/// store"). Writes take the write lock just long enough to update one
/// entry; reads never hold the lock during substitution — they clone a
/// snapshot first, so a writer can never be blocked by a slow resolve call.
pub struct TemplateResolver {
    magic_store: RwLock<HashMap<String, String>>,
    registry: Option<Arc<VariableRegistry>>,
    token_re: Regex,
}

impl TemplateResolver {
    pub fn new(registry: Option<Arc<VariableRegistry>>) -> Self {
        Self {
            magic_store: RwLock::new(HashMap::new()),
            registry,
            token_re: Regex::new(TOKEN_PATTERN).expect("static token pattern is valid"),
        }
    }

    /// Publish `name -> value` atomically, then notify the variable
    /// registry (if configured) that the variable was observed here.
    pub async fn set(&self, name: &str, value: impl Into<String>, location: UsageLocation) {
        let value = value.into();
        {
            let mut store = self.magic_store.write().await;
            store.insert(name.to_string(), value);
        }
        debug!(name, "published template variable");

        if let Some(registry) = &self.registry {
            registry
                .auto_register(
                    name,
                    RegisterContext {
                        location,
                        var_type: VariableType::Magic,
                        source: "producer".to_string(),
                        owning_tool: None,
                    },
                )
                .await;
        }
    }

    /// Copy the current value of `source` into `target`. No-op if `source`
    /// is not currently published. Notifies the registry with a
    /// workflow-mapping context, distinct from a direct producer `set`.
    pub async fn map_workflow_variable(&self, source: &str, target: &str, location: UsageLocation) {
        let value = {
            let store = self.magic_store.read().await;
            store.get(source).cloned()
        };
        let Some(value) = value else {
            debug!(source, target, "map_workflow_variable: source not set, no-op");
            return;
        };

        {
            let mut store = self.magic_store.write().await;
            store.insert(target.to_string(), value);
        }

        if let Some(registry) = &self.registry {
            registry
                .auto_register(
                    target,
                    RegisterContext {
                        location,
                        var_type: VariableType::Workflow,
                        source: format!("map:{source}"),
                        owning_tool: None,
                    },
                )
                .await;
        }
    }

    /// Take a consistent snapshot of the magic store.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.magic_store.read().await.clone()
    }

    /// Resolve an argv template against an execution context. Pure with
    /// respect to the snapshot taken at entry: overlays derived context,
    /// then the context's custom vars, then the magic store snapshot (later
    /// layers win on key collision), then substitutes every `{{name}}`
    /// token in one pass. Unknown tokens are left literal.
    pub async fn resolve_arguments(&self, template: &[String], ctx: &ExecutionContext) -> Vec<String> {
        let mut vars = derived_context_vars(ctx);
        vars.extend(ctx.custom_vars.clone());
        vars.extend(self.snapshot().await);

        template.iter().map(|arg| substitute(&self.token_re, arg, &vars)).collect()
    }
}

fn derived_context_vars(ctx: &ExecutionContext) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("target".to_string(), ctx.target.clone());
    vars.insert("tool_name".to_string(), ctx.tool.clone());
    vars.insert("mode".to_string(), ctx.mode.clone());
    vars.insert("timestamp".to_string(), ctx.timestamp.to_rfc3339());
    vars.insert("session_id".to_string(), ctx.session_id.clone());
    vars.insert("workspace".to_string(), path_str(&ctx.workspace));
    vars.insert("logs_dir".to_string(), path_str(&ctx.logs_dir));
    vars.insert("scans_dir".to_string(), path_str(&ctx.scans_dir));
    vars.insert("reports_dir".to_string(), path_str(&ctx.reports_dir));
    vars.insert("raw_dir".to_string(), path_str(&ctx.raw_dir));
    vars.insert("output_file".to_string(), ctx.output_file.clone());
    vars.insert("output_path".to_string(), path_str(&ctx.output_path));
    if let Some(latest) = &ctx.output_file_latest {
        vars.insert("output_file_latest".to_string(), latest.clone());
    }
    if let Some(latest) = &ctx.output_path_latest {
        vars.insert("output_path_latest".to_string(), path_str(latest));
    }
    vars
}

fn path_str(path: &std::path::Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn substitute(token_re: &Regex, arg: &str, vars: &HashMap<String, String>) -> String {
    token_re
        .replace_all(arg, |caps: &regex::Captures| {
            let name = &caps[1];
            vars.get(name).cloned().unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Replace filesystem-unsafe characters with `_` and truncate to 50 chars.
pub fn sanitize_filename(input: &str) -> String {
    let mut sanitized: String = input
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' | '.' => '_',
            other => other,
        })
        .collect();
    sanitized.truncate(50);
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn loc() -> UsageLocation {
        UsageLocation {
            file: "workflow.yaml".to_string(),
            line: 1,
            context: "test".to_string(),
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            target: "scanme.example.com".to_string(),
            tool: "naabu".to_string(),
            mode: "fast_scan".to_string(),
            workflow_name: Some("recon".to_string()),
            step_name: Some("p".to_string()),
            timestamp: Utc::now(),
            session_id: "sess-1".to_string(),
            workspace: PathBuf::from("/work"),
            logs_dir: PathBuf::from("/work/logs"),
            scans_dir: PathBuf::from("/work/scans"),
            reports_dir: PathBuf::from("/work/reports"),
            raw_dir: PathBuf::from("/work/raw"),
            output_file: "naabu_scanme_example_com.json".to_string(),
            output_path: PathBuf::from("/work/scans/naabu_scanme_example_com.json"),
            output_file_latest: None,
            output_path_latest: None,
            custom_vars: HashMap::new(),
            variable_snapshot: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn resolves_derived_context_tokens() {
        let resolver = TemplateResolver::new(None);
        let template = vec!["-target".to_string(), "{{target}}".to_string()];
        let resolved = resolver.resolve_arguments(&template, &ctx()).await;
        assert_eq!(resolved, vec!["-target", "scanme.example.com"]);
    }

    #[tokio::test]
    async fn unknown_tokens_are_left_literal() {
        let resolver = TemplateResolver::new(None);
        let template = vec!["{{totally_unknown}}".to_string()];
        let resolved = resolver.resolve_arguments(&template, &ctx()).await;
        assert_eq!(resolved, vec!["{{totally_unknown}}"]);
    }

    #[tokio::test]
    async fn published_variable_is_visible_to_later_resolves() {
        let resolver = TemplateResolver::new(None);
        resolver.set("naabu_ports", "22,80,443", loc()).await;

        let template = vec!["-p".to_string(), "{{naabu_ports}}".to_string()];
        let resolved = resolver.resolve_arguments(&template, &ctx()).await;
        assert_eq!(resolved, vec!["-p", "22,80,443"]);
    }

    #[tokio::test]
    async fn map_workflow_variable_copies_current_value() {
        let resolver = TemplateResolver::new(None);
        resolver.set("naabu_ports", "22,80,443", loc()).await;
        resolver.map_workflow_variable("naabu_ports", "ports", loc()).await;

        let template = vec!["{{ports}}".to_string()];
        let resolved = resolver.resolve_arguments(&template, &ctx()).await;
        assert_eq!(resolved, vec!["22,80,443"]);
    }

    #[tokio::test]
    async fn map_workflow_variable_is_a_no_op_when_source_absent() {
        let resolver = TemplateResolver::new(None);
        resolver.map_workflow_variable("missing", "ports", loc()).await;

        let template = vec!["{{ports}}".to_string()];
        let resolved = resolver.resolve_arguments(&template, &ctx()).await;
        assert_eq!(resolved, vec!["{{ports}}"]);
    }

    #[tokio::test]
    async fn resolving_an_already_resolved_argv_is_idempotent() {
        let resolver = TemplateResolver::new(None);
        let template = vec!["-target".to_string(), "{{target}}".to_string()];
        let once = resolver.resolve_arguments(&template, &ctx()).await;
        let twice = resolver.resolve_arguments(&once, &ctx()).await;
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn magic_store_overlay_wins_over_custom_vars() {
        let resolver = TemplateResolver::new(None);
        resolver.set("target", "overridden.example.com", loc()).await;

        let template = vec!["{{target}}".to_string()];
        let resolved = resolver.resolve_arguments(&template, &ctx()).await;
        assert_eq!(resolved, vec!["overridden.example.com"]);
    }

    #[test]
    fn sanitize_filename_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("scan me: a/b\\c"), "scan_me__a_b_c");
    }

    #[test]
    fn sanitize_filename_truncates_to_50_chars() {
        let long = "x".repeat(100);
        assert_eq!(sanitize_filename(&long).len(), 50);
    }
}
