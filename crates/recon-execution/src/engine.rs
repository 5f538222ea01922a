//! Tool Execution Engine: one invocation, start to finish.
//!
//! ```text
//! queued -> running -> (succeeded | failed | timed_out -> [override?] -> succeeded/failed)
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use recon_concurrency::ConcurrencyManager;
use recon_template::TemplateResolver;
use recon_tools::{security, ParserRegistry, ToolConfigStore};
use recon_types::{ExecutionContext, ExecutionResult, Settings, UsageLocation};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ExecutionError;
use crate::locate::locate_executable;
use crate::output_naming::resolve_output_names;

/// Per-invocation overrides. Anything left `None`/default falls back to
/// the engine's [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub priority: Option<i32>,
    pub capture_output: bool,
    pub validate_output: Option<bool>,
    pub retry_attempts: Option<u32>,
    pub timeout: Option<Duration>,
    pub custom_vars: HashMap<String, String>,
    pub env_overlay: HashMap<String, String>,
}

impl ExecutionOptions {
    fn priority_or_default(&self) -> i32 {
        self.priority.unwrap_or(100)
    }
}

/// Resolves a step priority into the integer the concurrency manager
/// orders its queue by.
pub fn priority_weight(priority: recon_types::Priority) -> i32 {
    match priority {
        recon_types::Priority::High => 200,
        recon_types::Priority::Medium => 100,
        recon_types::Priority::Low => 50,
    }
}

/// Coordinates config lookup, security validation, template resolution,
/// concurrency admission and output parsing around one `Command::spawn`.
pub struct ToolExecutionEngine {
    config_store: Arc<ToolConfigStore>,
    resolver: Arc<TemplateResolver>,
    concurrency: Arc<ConcurrencyManager>,
    parsers: Arc<ParserRegistry>,
    settings: Arc<Settings>,
    workspace_root: PathBuf,
    tools_root: PathBuf,
}

impl ToolExecutionEngine {
    pub fn new(
        config_store: Arc<ToolConfigStore>,
        resolver: Arc<TemplateResolver>,
        concurrency: Arc<ConcurrencyManager>,
        parsers: Arc<ParserRegistry>,
        settings: Arc<Settings>,
        workspace_root: PathBuf,
    ) -> Self {
        let tools_root = PathBuf::from(&settings.tools_path);
        Self {
            config_store,
            resolver,
            concurrency,
            parsers,
            settings,
            workspace_root,
            tools_root,
        }
    }

    /// Execute one tool invocation. Never returns `Err` — every failure
    /// mode in the taxonomy is folded into `ExecutionResult::success =
    /// false` plus `error_message`, because the result type itself is the
    /// observability contract: resolved argv, exit code, stderr and
    /// duration must always be present.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        tool: &str,
        mode: &str,
        target: &str,
        workflow_name: Option<&str>,
        step_name: Option<&str>,
        options: ExecutionOptions,
        cancellation: CancellationToken,
    ) -> ExecutionResult {
        let start = Utc::now();
        let session_id = Uuid::new_v4().to_string();

        match self
            .execute_inner(tool, mode, target, workflow_name, step_name, &options, &cancellation, &session_id)
            .await
        {
            Ok(result) => result,
            Err((err, resolved_argv)) => {
                let end = Utc::now();
                warn!(tool, mode, target, kind = err.kind(), "invocation failed");
                ExecutionResult {
                    tool: tool.to_string(),
                    mode: mode.to_string(),
                    target: target.to_string(),
                    start,
                    end,
                    duration: (end - start).to_std().unwrap_or_default(),
                    exit_code: None,
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    output_path: None,
                    error_message: Some(format!("{}: {}", err.kind(), err)),
                    resolved_argv,
                }
            }
        }
    }

    /// The happy-path pipeline. Returns `Err((error, resolved_argv))` for
    /// any failure that aborts the invocation before a result can be built
    /// normally; `resolved_argv` is whatever we got to before failing, for
    /// observability.
    async fn execute_inner(
        &self,
        tool: &str,
        mode: &str,
        target: &str,
        workflow_name: Option<&str>,
        step_name: Option<&str>,
        options: &ExecutionOptions,
        cancellation: &CancellationToken,
        session_id: &str,
    ) -> Result<ExecutionResult, (ExecutionError, Vec<String>)> {
        let priority = options.priority_or_default();

        // 1. Concurrency slot.
        let slot = self
            .concurrency
            .acquire(tool, priority, cancellation.cancelled())
            .await
            .map_err(|_| (ExecutionError::Cancelled, Vec::new()))?;

        let result = self
            .run_with_slot(tool, mode, target, workflow_name, step_name, options, cancellation, session_id)
            .await;

        // 16. Always release the slot and report the observed duration.
        let duration_seconds = result
            .as_ref()
            .map(|r: &ExecutionResult| r.duration.as_secs_f64())
            .unwrap_or(0.0);
        self.concurrency.release(slot).await;
        self.concurrency.record_duration(tool, duration_seconds).await;

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_with_slot(
        &self,
        tool: &str,
        mode: &str,
        target: &str,
        workflow_name: Option<&str>,
        step_name: Option<&str>,
        options: &ExecutionOptions,
        cancellation: &CancellationToken,
        session_id: &str,
    ) -> Result<ExecutionResult, (ExecutionError, Vec<String>)> {
        let start = Utc::now();

        // 2. Tool config.
        let config = self
            .config_store
            .get(tool)
            .await
            .map_err(|e| (ExecutionError::from(e), Vec::new()))?;

        // 3. Mode lookup.
        let template = config.modes.get(mode).cloned().ok_or_else(|| {
            (
                ExecutionError::ModeUnknown {
                    tool: tool.to_string(),
                    mode: mode.to_string(),
                    known_modes: config.mode_names().into_iter().map(String::from).collect(),
                },
                Vec::new(),
            )
        })?;

        // 4. Execution context + workspace layout.
        let ctx = self
            .build_context(tool, mode, target, workflow_name, step_name, &config, options, session_id)
            .await;
        self.ensure_workspace(&ctx).await;

        // 5. Resolve argv.
        let resolved_argv = self.resolver.resolve_arguments(&template, &ctx).await;

        // 6. argv gate.
        if self.settings.args_validation {
            security::validate_argv(&resolved_argv, &self.settings.argv_policy)
                .map_err(|e| (ExecutionError::from(e), resolved_argv.clone()))?;
        }

        // 7. Locate executable.
        let exec_path = locate_executable(tool, &self.tools_root).ok_or_else(|| {
            (
                ExecutionError::ExecutableMissing { tool: tool.to_string() },
                resolved_argv.clone(),
            )
        })?;

        // 8. executable gate.
        if self.settings.exec_validation {
            security::validate_executable(&exec_path, &self.tools_root)
                .map_err(|e| (ExecutionError::ExecutableForbidden(e), resolved_argv.clone()))?;
        }

        // 9-11. Spawn, capture, retry.
        let retry_attempts = options.retry_attempts.unwrap_or(self.settings.retry_attempts);
        let timeout = options
            .timeout
            .unwrap_or(Duration::from_secs(self.settings.default_timeout_seconds));

        let mut attempt = 0u32;
        let outcome = loop {
            let attempt_outcome = self
                .spawn_and_capture(&exec_path, &resolved_argv, &options.env_overlay, timeout, cancellation)
                .await;

            match &attempt_outcome {
                Ok(run) if run.exit_code == Some(0) => break attempt_outcome,
                Ok(run) if run.timed_out => break attempt_outcome,
                Err(ExecutionError::Cancelled) => break attempt_outcome,
                _ => {
                    if attempt >= retry_attempts {
                        break attempt_outcome;
                    }
                    attempt += 1;
                    debug!(tool, attempt, "retrying after non-timeout failure");
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                }
            }
        };

        let run = outcome.map_err(|e| (e, resolved_argv.clone()))?;

        // 12. Timeout override policy.
        let output_exists = ctx.output_path.is_file();
        let structured = looks_like_structured_output(&run.stdout);
        let timeout_override = run.timed_out && (output_exists || structured);

        let mut success = match run.exit_code {
            Some(0) => true,
            _ if timeout_override => true,
            _ => false,
        };

        // 13. Fall back to stdout capture if nothing landed on disk.
        let mut output_path_final: Option<PathBuf> = None;
        if options.capture_output && !run.stdout.is_empty() && !ctx.output_path.is_file() {
            if tokio::fs::write(&ctx.output_path, &run.stdout).await.is_ok() {
                output_path_final = Some(ctx.output_path.clone());
            }
        } else if ctx.output_path.is_file() {
            output_path_final = Some(ctx.output_path.clone());
        }

        // 14. Output validation.
        let validate_output = options.validate_output.unwrap_or(self.settings.cli_validate_output);
        if success && validate_output && output_path_final.is_none() {
            success = false;
        }

        let end = Utc::now();
        let duration = run.duration;

        let error_message = if success {
            None
        } else if run.timed_out {
            Some(format!("Timeout: {}", ExecutionError::Timeout { seconds: timeout.as_secs() }))
        } else if output_path_final.is_none() && validate_output {
            Some(format!(
                "OutputMissing: {}",
                ExecutionError::OutputMissing {
                    path: ctx.output_path.display().to_string()
                }
            ))
        } else {
            Some(format!(
                "NonZeroExit: {}",
                ExecutionError::NonZeroExit { code: run.exit_code }
            ))
        };

        // 15. Publish parsed output into the template resolver.
        if success {
            if let Some(path) = &output_path_final {
                let namespaced = self.parsers.parse_namespaced(tool, path);
                if !namespaced.is_empty() {
                    let location = UsageLocation {
                        file: ctx.output_file.clone(),
                        line: 0,
                        context: format!("{tool}:{mode}"),
                    };
                    for (key, value) in namespaced {
                        self.resolver.set(&key, value, location.clone()).await;
                    }
                }
            }
        }

        Ok(ExecutionResult {
            tool: tool.to_string(),
            mode: mode.to_string(),
            target: target.to_string(),
            start,
            end,
            duration,
            exit_code: run.exit_code,
            success,
            stdout: run.stdout,
            stderr: run.stderr,
            output_path: output_path_final,
            error_message,
            resolved_argv,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn build_context(
        &self,
        tool: &str,
        mode: &str,
        target: &str,
        workflow_name: Option<&str>,
        step_name: Option<&str>,
        config: &recon_types::ToolConfig,
        options: &ExecutionOptions,
        session_id: &str,
    ) -> ExecutionContext {
        let timestamp = Utc::now();
        let logs_dir = self.workspace_root.join("logs");
        let scans_dir = self.workspace_root.join("scans");
        let reports_dir = self.workspace_root.join("reports");
        let raw_dir = self.workspace_root.join("raw");

        let (output_file, output_file_latest) = resolve_output_names(
            config.output_filename.as_deref(),
            tool,
            target,
            workflow_name,
            step_name,
            timestamp,
            self.settings.scan_output_mode,
        );
        let output_path = scans_dir.join(&output_file);
        let output_path_latest = output_file_latest.as_ref().map(|f| scans_dir.join(f));

        ExecutionContext {
            target: target.to_string(),
            tool: tool.to_string(),
            mode: mode.to_string(),
            workflow_name: workflow_name.map(String::from),
            step_name: step_name.map(String::from),
            timestamp,
            session_id: session_id.to_string(),
            workspace: self.workspace_root.clone(),
            logs_dir,
            scans_dir,
            reports_dir,
            raw_dir,
            output_file,
            output_path,
            output_file_latest,
            output_path_latest,
            custom_vars: options.custom_vars.clone(),
            variable_snapshot: self.resolver.snapshot().await,
        }
    }

    async fn ensure_workspace(&self, ctx: &ExecutionContext) {
        for dir in [&ctx.logs_dir, &ctx.scans_dir, &ctx.reports_dir, &ctx.raw_dir] {
            if let Err(err) = tokio::fs::create_dir_all(dir).await {
                warn!(dir = %dir.display(), %err, "failed to create workspace directory");
            }
        }
    }

    /// Spawns the process with stdout/stderr redirected to temporary files
    /// (rather than piped in memory), so a killed or timed-out process still
    /// leaves behind whatever it had flushed — the timeout-override policy
    /// needs to inspect that partial output.
    async fn spawn_and_capture(
        &self,
        exec_path: &Path,
        argv: &[String],
        env_overlay: &HashMap<String, String>,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<RunOutcome, ExecutionError> {
        let start = std::time::Instant::now();

        let stdout_file = tempfile::tempfile()
            .map_err(|e| ExecutionError::SpawnFailed { reason: format!("stdout capture file: {e}") })?;
        let stderr_file = tempfile::tempfile()
            .map_err(|e| ExecutionError::SpawnFailed { reason: format!("stderr capture file: {e}") })?;
        let stdout_for_child = stdout_file
            .try_clone()
            .map_err(|e| ExecutionError::SpawnFailed { reason: format!("clone stdout handle: {e}") })?;
        let stderr_for_child = stderr_file
            .try_clone()
            .map_err(|e| ExecutionError::SpawnFailed { reason: format!("clone stderr handle: {e}") })?;

        let mut command = Command::new(exec_path);
        command
            .args(argv)
            .stdout(Stdio::from(stdout_for_child))
            .stderr(Stdio::from(stderr_for_child))
            .kill_on_drop(true);
        for (key, value) in env_overlay {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed { reason: e.to_string() })?;

        let (exit_code, timed_out) = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(ExecutionError::Cancelled);
            }
            result = tokio::time::timeout(timeout, child.wait()) => {
                match result {
                    Ok(status) => (status.ok().and_then(|s| s.code()), false),
                    Err(_elapsed) => {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        (None, true)
                    }
                }
            }
        };

        let (stdout, stderr) = tokio::join!(
            tokio::task::spawn_blocking(move || read_captured(stdout_file)),
            tokio::task::spawn_blocking(move || read_captured(stderr_file)),
        );

        Ok(RunOutcome {
            exit_code,
            timed_out,
            stdout: stdout.unwrap_or_default(),
            stderr: stderr.unwrap_or_default(),
            duration: start.elapsed(),
        })
    }
}

/// Rewinds a capture file and reads it back to a string. Run off the async
/// executor via `spawn_blocking` since it's plain synchronous file I/O.
fn read_captured(mut file: std::fs::File) -> String {
    use std::io::{Read, Seek, SeekFrom};
    if file.seek(SeekFrom::Start(0)).is_err() {
        return String::new();
    }
    let mut buf = String::new();
    let _ = file.read_to_string(&mut buf);
    buf
}

struct RunOutcome {
    exit_code: Option<i32>,
    timed_out: bool,
    stdout: String,
    stderr: String,
    duration: Duration,
}

/// Used only to decide the timeout-override policy: does stdout contain
/// what looks like a structured host/port record?
fn looks_like_structured_output(stdout: &str) -> bool {
    stdout.contains("\"host\"") && stdout.contains("\"port\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_weights_match_the_contract() {
        assert_eq!(priority_weight(recon_types::Priority::High), 200);
        assert_eq!(priority_weight(recon_types::Priority::Medium), 100);
        assert_eq!(priority_weight(recon_types::Priority::Low), 50);
    }

    #[test]
    fn structured_output_heuristic() {
        assert!(looks_like_structured_output(
            "{\"host\":\"t\",\"port\":22,\"protocol\":\"tcp\"}"
        ));
        assert!(!looks_like_structured_output("plain text, nothing structured"));
    }

    #[tokio::test]
    async fn executes_a_real_process_and_captures_stdout() {
        use std::collections::HashMap;
        use std::io::Write as _;
        use std::os::unix::fs::PermissionsExt;

        use recon_concurrency::ConcurrencyManager;
        use recon_template::TemplateResolver;
        use recon_tools::{ParserRegistry, StaticToolConfigSource, ToolConfigStore};
        use recon_types::{Settings, ToolConfig};
        use tokio_util::sync::CancellationToken;

        let workspace = tempfile::TempDir::new().unwrap();
        let tools_root = tempfile::TempDir::new().unwrap();

        let tool_dir = tools_root.path().join("echotool");
        std::fs::create_dir_all(&tool_dir).unwrap();
        let script_path = tool_dir.join("echotool");
        {
            let mut file = std::fs::File::create(&script_path).unwrap();
            writeln!(file, "#!/bin/sh").unwrap();
            writeln!(file, "echo '{{\"host\":\"scanme\",\"port\":22}}'").unwrap();
        }
        let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms).unwrap();

        let mut modes = HashMap::new();
        modes.insert("default".to_string(), vec!["hello".to_string()]);
        let config = ToolConfig {
            name: "echotool".to_string(),
            output_filename: None,
            modes,
        };
        let mut configs = HashMap::new();
        configs.insert("echotool".to_string(), config);
        let config_store = Arc::new(ToolConfigStore::new(Arc::new(StaticToolConfigSource::new(
            configs,
        ))));

        let mut settings = Settings::default();
        settings.tools_path = tools_root.path().to_string_lossy().to_string();

        let engine = ToolExecutionEngine::new(
            config_store,
            Arc::new(TemplateResolver::new(None)),
            Arc::new(ConcurrencyManager::new(2)),
            Arc::new(ParserRegistry::new()),
            Arc::new(settings),
            workspace.path().to_path_buf(),
        );

        let options = ExecutionOptions {
            capture_output: true,
            ..Default::default()
        };

        let result = engine
            .execute(
                "echotool",
                "default",
                "scanme.example.com",
                None,
                None,
                options,
                CancellationToken::new(),
            )
            .await;

        assert!(result.success, "expected success, got {:?}", result.error_message);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("port"));
        assert!(result.output_path.is_some());
    }

    #[tokio::test]
    async fn unknown_mode_fails_without_spawning() {
        use std::collections::HashMap;

        use recon_concurrency::ConcurrencyManager;
        use recon_template::TemplateResolver;
        use recon_tools::{ParserRegistry, StaticToolConfigSource, ToolConfigStore};
        use recon_types::{Settings, ToolConfig};
        use tokio_util::sync::CancellationToken;

        let workspace = tempfile::TempDir::new().unwrap();

        let mut modes = HashMap::new();
        modes.insert("fast_scan".to_string(), vec!["{{target}}".to_string()]);
        let config = ToolConfig {
            name: "naabu".to_string(),
            output_filename: None,
            modes,
        };
        let mut configs = HashMap::new();
        configs.insert("naabu".to_string(), config);
        let config_store = Arc::new(ToolConfigStore::new(Arc::new(StaticToolConfigSource::new(
            configs,
        ))));

        let engine = ToolExecutionEngine::new(
            config_store,
            Arc::new(TemplateResolver::new(None)),
            Arc::new(ConcurrencyManager::new(2)),
            Arc::new(ParserRegistry::new()),
            Arc::new(Settings::default()),
            workspace.path().to_path_buf(),
        );

        let result = engine
            .execute(
                "naabu",
                "does_not_exist",
                "scanme.example.com",
                None,
                None,
                ExecutionOptions::default(),
                CancellationToken::new(),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, None);
        assert!(result.error_message.unwrap().contains("ModeUnknown"));
    }
}
