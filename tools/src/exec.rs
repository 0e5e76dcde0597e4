//! Sandboxed code execution with background detachment.
//!
//! Each `execute` call writes the code to a temporary script, spawns the
//! interpreter in its own process group, and waits up to a timeout. A run that
//! outlives its timeout is not killed: it stays in the registry as `Detached`
//! until it exits on its own or `stop` signals its group.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use mender_types::ProcessId;
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::{OnceCell, oneshot};
use tracing::{debug, info, warn};

use crate::config::ExecConfig;
use crate::process::{
    KillOutcome, apply_sanitized_env, exit_code_of, read_stream, terminate_process_group,
};
use crate::{EnvSanitizer, ToolError, ToolName};

// ============================================================================
// Registry types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    /// Spawned, and the caller is still waiting on it.
    Running,
    /// The wait timed out; the process keeps running in the background.
    Detached,
    /// Exited after detaching. The OS process has been reaped.
    Completed { exit_code: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    pub id: ProcessId,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: ProcessState,
}

/// Result of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Completed {
        id: ProcessId,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    Detached {
        id: ProcessId,
    },
}

impl Execution {
    #[must_use]
    pub fn id(&self) -> &ProcessId {
        match self {
            Execution::Completed { id, .. } | Execution::Detached { id } => id,
        }
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        matches!(self, Execution::Detached { .. })
    }

    /// Text report handed back to the caller of `execute_code`.
    #[must_use]
    pub fn report(&self) -> String {
        match self {
            Execution::Completed {
                id,
                exit_code,
                stdout,
                stderr,
            } => format!(
                "Process ID: {id}\n\nStdout:\n{stdout}\n\nStderr:\n{stderr}\n\nReturn Code: {exit_code}"
            ),
            Execution::Detached { id } => format!(
                "Process ID: {id}\n\nStdout:\nProcess started and running in the background.\n\nStderr:\n\n\nReturn Code: Running\n\nNote: The process is still running in the background."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped(ProcessId),
    NotFound(ProcessId),
}

impl std::fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopOutcome::Stopped(id) => write!(f, "Process {id} has been stopped."),
            StopOutcome::NotFound(id) => write!(f, "No running process found with ID {id}."),
        }
    }
}

struct Finished {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

type Registry = Arc<Mutex<HashMap<ProcessId, ProcessRecord>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<ProcessId, ProcessRecord>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Host
// ============================================================================

pub struct ExecutionHost {
    config: ExecConfig,
    working_dir: PathBuf,
    sanitizer: EnvSanitizer,
    registry: Registry,
    next_id: AtomicU64,
    venv_python: OnceCell<PathBuf>,
}

impl std::fmt::Debug for ExecutionHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHost")
            .field("working_dir", &self.working_dir)
            .field("interpreter", &self.config.interpreter)
            .field("tracked", &lock(&self.registry).len())
            .finish_non_exhaustive()
    }
}

impl ExecutionHost {
    #[must_use]
    pub fn new(config: ExecConfig, working_dir: impl Into<PathBuf>, sanitizer: EnvSanitizer) -> Self {
        Self {
            config,
            working_dir: working_dir.into(),
            sanitizer,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            venv_python: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Run `code` and wait up to `timeout` (the configured default when `None`).
    pub async fn execute(
        &self,
        code: &str,
        timeout: Option<Duration>,
    ) -> Result<Execution, ToolError> {
        if self.config.reap_completed {
            self.prune_completed();
        }

        let scratch = self
            .config
            .scratch_dir
            .clone()
            .unwrap_or_else(|| self.working_dir.clone());
        let script = write_script(&scratch, &self.config.extension, code)?;
        let interpreter = self.interpreter().await?;

        let id = ProcessId::from_sequence(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut cmd = Command::new(&interpreter);
        cmd.arg(&*script)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Detached runs must survive the host exiting.
        #[cfg(unix)]
        crate::process::set_new_session(&mut cmd, crate::process::ParentDeath::Survive);
        apply_sanitized_env(&mut cmd, &self.sanitizer);

        let mut child = cmd.spawn().map_err(|e| ToolError::ExecutionFailed {
            tool: ToolName::ExecuteCode,
            message: format!("failed to spawn {}: {e}", interpreter.display()),
        })?;
        let pid = child.id();
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.start_kill();
            return Err(ToolError::ExecutionFailed {
                tool: ToolName::ExecuteCode,
                message: "child output was not captured".to_string(),
            });
        };

        lock(&self.registry).insert(
            id.clone(),
            ProcessRecord {
                id: id.clone(),
                pid,
                started_at: Utc::now(),
                state: ProcessState::Running,
            },
        );
        info!(process_id = %id, pid, script = %script.display(), "Spawned code execution");

        let (tx, rx) = oneshot::channel::<Finished>();
        let registry = Arc::clone(&self.registry);
        let waiter_id = id.clone();
        let max_output = self.config.max_output_bytes;
        tokio::spawn(async move {
            // The script lives exactly as long as the child.
            let _script = script;
            let (stdout, stderr, status) = tokio::join!(
                read_stream(stdout, max_output),
                read_stream(stderr, max_output),
                child.wait()
            );
            let exit_code = match status {
                Ok(status) => exit_code_of(status),
                Err(e) => {
                    warn!(process_id = %waiter_id, "Failed to wait on child: {e}");
                    -1
                }
            };
            let finished = Finished {
                exit_code,
                stdout,
                stderr,
            };
            if tx.send(finished).is_err() {
                // Nobody is waiting: the run had detached.
                if let Some(record) = lock(&registry).get_mut(&waiter_id) {
                    record.state = ProcessState::Completed { exit_code };
                }
                debug!(process_id = %waiter_id, exit_code, "Detached process exited");
            }
        });

        let limit = timeout.unwrap_or_else(|| self.default_timeout());
        match tokio::time::timeout(limit, rx).await {
            Ok(Ok(finished)) => {
                lock(&self.registry).remove(&id);
                info!(process_id = %id, exit_code = finished.exit_code, "Code execution finished");
                Ok(Execution::Completed {
                    id,
                    exit_code: finished.exit_code,
                    stdout: finished.stdout,
                    stderr: finished.stderr,
                })
            }
            Ok(Err(_)) => {
                lock(&self.registry).remove(&id);
                Err(ToolError::ExecutionFailed {
                    tool: ToolName::ExecuteCode,
                    message: format!("waiter for {id} ended without a result"),
                })
            }
            Err(_) => {
                if let Some(record) = lock(&self.registry).get_mut(&id)
                    && record.state == ProcessState::Running
                {
                    record.state = ProcessState::Detached;
                }
                info!(process_id = %id, timeout_ms = limit.as_millis() as u64, "Code execution detached");
                Ok(Execution::Detached { id })
            }
        }
    }

    /// Terminate a tracked process group and forget the record.
    pub fn stop(&self, id: &ProcessId) -> StopOutcome {
        let Some(record) = lock(&self.registry).remove(id) else {
            return StopOutcome::NotFound(id.clone());
        };

        // A completed record's pid may already belong to someone else.
        if let (Some(pid), ProcessState::Running | ProcessState::Detached) =
            (record.pid, record.state)
        {
            match terminate_process_group(pid) {
                Ok(KillOutcome::Signalled) => info!(process_id = %id, pid, "Stopped process"),
                Ok(KillOutcome::NotRunning) => {
                    debug!(process_id = %id, pid, "Process group already gone");
                }
                Err(e) => warn!(process_id = %id, pid, "Failed to signal process group: {e}"),
            }
        }
        StopOutcome::Stopped(id.clone())
    }

    /// Snapshot of every tracked process, oldest first.
    #[must_use]
    pub fn processes(&self) -> Vec<ProcessRecord> {
        let mut records: Vec<ProcessRecord> = lock(&self.registry).values().cloned().collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    #[must_use]
    pub fn get(&self, id: &ProcessId) -> Option<ProcessRecord> {
        lock(&self.registry).get(id).cloned()
    }

    fn prune_completed(&self) {
        let mut registry = lock(&self.registry);
        let before = registry.len();
        registry.retain(|_, record| !matches!(record.state, ProcessState::Completed { .. }));
        let pruned = before - registry.len();
        if pruned > 0 {
            debug!(pruned, "Pruned completed process records");
        }
    }

    async fn interpreter(&self) -> Result<PathBuf, ToolError> {
        let Some(venv) = &self.config.venv else {
            return Ok(PathBuf::from(&self.config.interpreter));
        };
        self.venv_python
            .get_or_try_init(|| ensure_venv(&self.config.interpreter, venv))
            .await
            .cloned()
    }
}

fn write_script(
    scratch: &Path,
    extension: &str,
    code: &str,
) -> Result<tempfile::TempPath, ToolError> {
    use std::io::Write;

    std::fs::create_dir_all(scratch).map_err(|e| ToolError::io(scratch, e))?;
    let suffix = format!(".{}", extension.trim_start_matches('.'));
    let mut file = tempfile::Builder::new()
        .prefix("process_")
        .suffix(&suffix)
        .tempfile_in(scratch)
        .map_err(|e| ToolError::io(scratch, e))?;
    file.write_all(code.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| ToolError::io(file.path(), e))?;
    Ok(file.into_temp_path())
}

fn venv_python(dir: &Path) -> PathBuf {
    if cfg!(windows) {
        dir.join("Scripts").join("python.exe")
    } else {
        dir.join("bin").join("python")
    }
}

async fn ensure_venv(interpreter: &str, dir: &Path) -> Result<PathBuf, ToolError> {
    let python = venv_python(dir);
    if python.exists() {
        return Ok(python);
    }

    info!(venv = %dir.display(), "Creating code execution environment");
    let output = Command::new(interpreter)
        .args(["-m", "venv"])
        .arg(dir)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool: ToolName::ExecuteCode,
            message: format!("failed to run {interpreter} -m venv: {e}"),
        })?;
    if !output.status.success() {
        return Err(ToolError::ExecutionFailed {
            tool: ToolName::ExecuteCode,
            message: format!(
                "creating virtual environment at {} failed: {}",
                dir.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(python)
}
