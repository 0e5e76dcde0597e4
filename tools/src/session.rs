//! Session context: owns every piece of shared state a tool call can touch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mender_edit::{
    ContentCache, EditConfig, EditOrchestrator, NeverRetry, RetryCoordinator, RetryPolicy,
    validate_files_structure,
};
use mender_types::{EditStatus, ProcessId, ToolResult};
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::config::{ExecConfig, ScanConfig, ShellConfig};
use crate::exec::ExecutionHost;
use crate::files::{create_files, create_folders, list_files, read_multiple_files, resolve_path};
use crate::shell::{DetectedShell, detect_shell, run_shell_command};
use crate::{EnvSanitizer, ToolCall, ToolError, ToolName, scan, search};

/// Everything a [`Session`] needs besides its working directory.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub edit: EditConfig,
    pub exec: ExecConfig,
    pub shell: ShellConfig,
    pub scan: ScanConfig,
}

pub struct Session {
    working_dir: PathBuf,
    cache: Mutex<ContentCache>,
    host: ExecutionHost,
    orchestrator: EditOrchestrator,
    retry: RetryCoordinator,
    policy: Box<dyn RetryPolicy>,
    shell: DetectedShell,
    shell_timeout: Duration,
    max_output_bytes: usize,
    scan: ScanConfig,
    sanitizer: EnvSanitizer,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("working_dir", &self.working_dir)
            .field("shell", &self.shell.name)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(working_dir: impl Into<PathBuf>, settings: SessionSettings) -> Result<Self, ToolError> {
        let working_dir = working_dir.into();
        let sanitizer = match &settings.exec.env_denylist {
            Some(patterns) => EnvSanitizer::new(patterns)?,
            None => EnvSanitizer::secrets()?,
        };
        let shell = detect_shell(Some(&settings.shell));
        info!(working_dir = %working_dir.display(), shell = %shell, "Session started");

        Ok(Self {
            cache: Mutex::new(ContentCache::new()),
            host: ExecutionHost::new(settings.exec.clone(), &working_dir, sanitizer.clone()),
            orchestrator: EditOrchestrator::new(&working_dir, settings.edit.matching),
            retry: RetryCoordinator::new(settings.edit.max_attempts),
            policy: Box::new(NeverRetry),
            shell,
            shell_timeout: Duration::from_secs(settings.shell.timeout_secs),
            max_output_bytes: settings.exec.max_output_bytes,
            scan: settings.scan,
            sanitizer,
            working_dir,
        })
    }

    /// Replace the retry policy used by `edit_and_apply_multiple`.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[must_use]
    pub fn host(&self) -> &ExecutionHost {
        &self.host
    }

    pub async fn cache(&self) -> MutexGuard<'_, ContentCache> {
        self.cache.lock().await
    }

    /// Parse and run one tool call. Every failure comes back as an error result.
    pub async fn dispatch(&self, name: &str, input: &Value) -> ToolResult {
        let call = match ToolCall::parse(name, input) {
            Ok(call) => call,
            Err(e) => {
                warn!(tool = name, "Rejected tool call: {e}");
                return ToolResult::error(e.dispatch_message(name));
            }
        };
        info!(tool = name, "Dispatching tool");
        match self.execute(call).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = name, "Tool failed: {e}");
                ToolResult::error(e.dispatch_message(name))
            }
        }
    }

    pub async fn execute(&self, call: ToolCall) -> Result<ToolResult, ToolError> {
        match call {
            ToolCall::CreateFiles(args) => {
                let mut cache = self.cache.lock().await;
                Ok(ToolResult::ok(create_files(&self.working_dir, &args.files, &mut cache)?))
            }
            ToolCall::CreateFolders(args) => Ok(ToolResult::ok(create_folders(
                &self.working_dir,
                &args.paths.into_vec(),
            ))),
            ToolCall::ListFiles(args) => {
                Ok(ToolResult::ok(list_files(&self.working_dir, &args.path)?))
            }
            ToolCall::ReadMultipleFiles(args) => {
                let mut cache = self.cache.lock().await;
                Ok(ToolResult::ok(read_multiple_files(
                    &self.working_dir,
                    &args.paths.into_vec(),
                    args.recursive,
                    &mut cache,
                )))
            }
            ToolCall::EditAndApplyMultiple(args) => {
                let specs = validate_files_structure(&args.files)?;
                let mut cache = self.cache.lock().await;
                let report = self
                    .retry
                    .run(&self.orchestrator, &specs, &mut cache, self.policy.as_ref())
                    .await?;
                let is_error = report
                    .outcomes
                    .iter()
                    .any(|o| o.status == EditStatus::Error);
                let content = serde_json::to_value(&report.outcomes).map_err(|e| {
                    ToolError::ExecutionFailed {
                        tool: ToolName::EditAndApplyMultiple,
                        message: e.to_string(),
                    }
                })?;
                Ok(ToolResult {
                    content,
                    is_error,
                    console_output: None,
                }
                .with_console_output(Some(report.console_output)))
            }
            ToolCall::RunShellCommand(args) => {
                let output = run_shell_command(
                    &self.shell,
                    &args.command,
                    &self.working_dir,
                    &self.sanitizer,
                    self.shell_timeout,
                    self.max_output_bytes,
                )
                .await?;
                let content = serde_json::to_value(&output).map_err(|e| {
                    ToolError::ExecutionFailed {
                        tool: ToolName::RunShellCommand,
                        message: e.to_string(),
                    }
                })?;
                Ok(ToolResult::ok(content))
            }
            ToolCall::Search(args) => {
                let working_dir = self.working_dir.clone();
                let text = blocking(ToolName::Search, move || search::search(&working_dir, &args))
                    .await?;
                Ok(ToolResult::ok(text))
            }
            ToolCall::ExecuteCode(args) => {
                let timeout = args
                    .timeout_secs
                    .map(|secs| {
                        Duration::try_from_secs_f64(secs).map_err(|e| ToolError::BadArgs {
                            message: format!("invalid timeout_secs {secs}: {e}"),
                        })
                    })
                    .transpose()?;
                let execution = self.host.execute(&args.code, timeout).await?;
                Ok(ToolResult::ok(execution.report()))
            }
            ToolCall::StopProcess(args) => {
                let outcome = self.host.stop(&ProcessId::from(args.process_id));
                Ok(ToolResult::ok(outcome.to_string()))
            }
            ToolCall::ScanFolder(args) => {
                let folder = resolve_path(&self.working_dir, &args.folder_path);
                let output = resolve_path(&self.working_dir, &args.output_file);
                let config = self.scan.clone();
                let text = blocking(ToolName::ScanFolder, move || {
                    scan::scan_folder(&folder, &output, &config)
                })
                .await?;
                Ok(ToolResult::ok(text))
            }
        }
    }
}

async fn blocking<T, F>(tool: ToolName, f: F) -> Result<T, ToolError>
where
    F: FnOnce() -> Result<T, ToolError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool,
            message: e.to_string(),
        })?
}
