//! Shell detection and the `run_shell_command` runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ShellConfig;
use crate::process::{ChildGuard, apply_sanitized_env, exit_code_of, read_stream};
use crate::{EnvSanitizer, ToolError, ToolName};

/// Detected shell for command execution.
#[derive(Debug, Clone)]
pub struct DetectedShell {
    /// Path or name of the shell binary.
    pub binary: PathBuf,
    /// Arguments to pass before the command (e.g., `["-c"]` or `["/C"]`).
    pub args: Vec<String>,
    /// Human-readable name for logging.
    pub name: String,
}

impl std::fmt::Display for DetectedShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Detect the best available shell based on config and platform.
///
/// Priority:
/// - Config override (if set)
/// - Platform-specific detection
#[must_use]
pub fn detect_shell(config: Option<&ShellConfig>) -> DetectedShell {
    // 1. Check config override
    if let Some(cfg) = config
        && let Some(binary) = &cfg.binary
    {
        let args = cfg.args.clone().unwrap_or_else(|| default_args_for(binary));
        return DetectedShell {
            binary: PathBuf::from(binary),
            args,
            name: "configured".into(),
        };
    }

    // 2. Platform-specific detection
    detect_platform_shell()
}

/// Infer default args for a shell binary name.
fn default_args_for(binary: &str) -> Vec<String> {
    let name = std::path::Path::new(binary)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(binary)
        .to_lowercase();

    match name.as_str() {
        "cmd" | "cmd.exe" => vec!["/C".to_string()],
        "pwsh" | "pwsh.exe" | "powershell" | "powershell.exe" => {
            vec!["-NoProfile".to_string(), "-Command".to_string()]
        }
        // Most Unix shells use -c
        _ => vec!["-c".to_string()],
    }
}

#[cfg(windows)]
fn detect_platform_shell() -> DetectedShell {
    if let Ok(path) = which::which("pwsh") {
        return DetectedShell {
            binary: path,
            args: vec!["-NoProfile".to_string(), "-Command".to_string()],
            name: "pwsh".into(),
        };
    }

    if let Ok(path) = which::which("powershell") {
        return DetectedShell {
            binary: path,
            args: vec!["-NoProfile".to_string(), "-Command".to_string()],
            name: "powershell".into(),
        };
    }

    let comspec = std::env::var("ComSpec")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(r"C:\Windows\System32\cmd.exe"));
    DetectedShell {
        binary: comspec,
        args: vec!["/C".to_string()],
        name: "cmd".into(),
    }
}

#[cfg(not(windows))]
fn detect_platform_shell() -> DetectedShell {
    // Try $SHELL first (user's preferred shell)
    if let Ok(shell) = std::env::var("SHELL") {
        let path = std::path::Path::new(&shell);
        if path.exists() {
            // Extract shell name for logging
            let name = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("user-shell")
                .to_string();
            return DetectedShell {
                binary: PathBuf::from(&shell),
                args: vec!["-c".to_string()],
                name,
            };
        }
    }

    if let Ok(path) = which::which("bash") {
        return DetectedShell {
            binary: path,
            args: vec!["-c".to_string()],
            name: "bash".into(),
        };
    }

    DetectedShell {
        binary: PathBuf::from("/bin/sh"),
        args: vec!["-c".to_string()],
        name: "sh".into(),
    }
}

/// Captured result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run `command` through `shell` and wait for it, killing its group at `timeout`.
pub async fn run_shell_command(
    shell: &DetectedShell,
    command: &str,
    working_dir: &Path,
    sanitizer: &EnvSanitizer,
    timeout: Duration,
    max_output_bytes: usize,
) -> Result<ShellOutput, ToolError> {
    let failed = |message: String| ToolError::ExecutionFailed {
        tool: ToolName::RunShellCommand,
        message,
    };

    let mut cmd = Command::new(&shell.binary);
    cmd.args(&shell.args)
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .current_dir(working_dir);
    apply_sanitized_env(&mut cmd, sanitizer);
    #[cfg(unix)]
    crate::process::set_new_session(&mut cmd, crate::process::ParentDeath::Kill);

    let child = cmd
        .spawn()
        .map_err(|e| failed(format!("failed to spawn {shell}: {e}")))?;
    let mut guard = ChildGuard::new(child);
    debug!(shell = %shell, command, "Running shell command");

    let child = guard
        .child_mut()
        .ok_or_else(|| failed("child exited before it was polled".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| failed("Failed to capture stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| failed("Failed to capture stderr".to_string()))?;

    let run = async {
        tokio::join!(
            read_stream(stdout, max_output_bytes),
            read_stream(stderr, max_output_bytes),
            child.wait()
        )
    };
    let Ok((stdout, stderr, status)) = tokio::time::timeout(timeout, run).await else {
        info!(command, timeout_secs = timeout.as_secs(), "Shell command timed out");
        // Dropping the guard kills the whole group.
        return Err(ToolError::Timeout {
            tool: ToolName::RunShellCommand,
            elapsed: timeout,
        });
    };
    let status = status.map_err(|e| failed(e.to_string()))?;
    guard.disarm();

    let return_code = exit_code_of(status);
    let error = (return_code != 0)
        .then(|| format!("Command '{command}' returned non-zero exit status {return_code}."));
    Ok(ShellOutput {
        stdout,
        stderr,
        return_code,
        error,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{PathBuf, ShellConfig, default_args_for, detect_shell, run_shell_command};
    use crate::{EnvSanitizer, ToolError};

    #[test]
    fn configured_binary_gets_dash_c() {
        assert_eq!(default_args_for("/bin/sh"), vec!["-c"]);
        let shell = detect_shell(Some(&ShellConfig {
            binary: Some("/bin/sh".into()),
            ..ShellConfig::default()
        }));
        assert_eq!(shell.binary, PathBuf::from("/bin/sh"));
        assert_eq!(shell.args, vec!["-c"]);
        assert_eq!(shell.name, "configured");
    }

    #[test]
    fn configured_args_are_kept() {
        let shell = detect_shell(Some(&ShellConfig {
            binary: Some("bash".into()),
            args: Some(vec!["-lc".into()]),
            ..ShellConfig::default()
        }));
        assert_eq!(shell.args, vec!["-lc"]);
    }

    #[cfg(unix)]
    #[test]
    fn unconfigured_unix_shell_takes_dash_c() {
        let shell = detect_shell(None);
        assert!(!shell.binary.as_os_str().is_empty());
        assert_eq!(shell.args, vec!["-c"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let shell = detect_shell(Some(&ShellConfig {
            binary: Some("/bin/sh".into()),
            ..ShellConfig::default()
        }));
        let out = run_shell_command(
            &shell,
            "echo hi; echo oops >&2; exit 2",
            dir.path(),
            &EnvSanitizer::secrets().unwrap(),
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap();
        assert_eq!(out.stdout, "hi\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.return_code, 2);
        assert_eq!(
            out.error.as_deref(),
            Some("Command 'echo hi; echo oops >&2; exit 2' returned non-zero exit status 2.")
        );
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["return_code"], 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_omits_error_and_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let shell = detect_shell(Some(&ShellConfig {
            binary: Some("/bin/sh".into()),
            ..ShellConfig::default()
        }));
        let out = run_shell_command(
            &shell,
            "ls",
            dir.path(),
            &EnvSanitizer::secrets().unwrap(),
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap();
        assert!(out.stdout.contains("marker.txt"));
        assert!(out.error.is_none());
        assert!(serde_json::to_value(&out).unwrap().get("error").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let shell = detect_shell(Some(&ShellConfig {
            binary: Some("/bin/sh".into()),
            ..ShellConfig::default()
        }));
        let err = run_shell_command(
            &shell,
            "sleep 1; touch late.txt",
            dir.path(),
            &EnvSanitizer::secrets().unwrap(),
            Duration::from_millis(100),
            1024,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("late.txt").exists());
    }
}
