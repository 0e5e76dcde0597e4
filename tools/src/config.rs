//! Configuration types used by the tool handlers.
//!
//! `mender-config` embeds these directly in its TOML sections, so the
//! defaults here are also the file defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Serde helper for fields that default to `true`.
#[must_use]
pub const fn default_true() -> bool {
    true
}

const fn default_exec_timeout_secs() -> u64 {
    10
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_extension() -> String {
    "py".to_string()
}

const fn default_max_output_bytes() -> usize {
    1024 * 1024
}

const fn default_shell_timeout_secs() -> u64 {
    120
}

fn default_ignored_folders() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "target",
        "__pycache__",
        ".venv",
        "venv",
        ".idea",
        ".vscode",
        "dist",
        "build",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

const fn default_max_chars() -> usize {
    600_000
}

/// Code execution settings.
///
/// ```toml
/// [exec]
/// timeout_secs = 10
/// interpreter = "python3"
/// extension = "py"
/// venv = "${HOME}/.mender/code_execution_env"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ExecConfig {
    /// How long `execute_code` waits before detaching.
    #[serde(default = "default_exec_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Script file extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Virtual environment to create on first use and run scripts with.
    pub venv: Option<PathBuf>,
    /// Where temporary scripts are written. Defaults to the working directory.
    pub scratch_dir: Option<PathBuf>,
    /// Cap on captured bytes per stream.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Prune finished detached records before each new execution.
    #[serde(default = "default_true")]
    pub reap_completed: bool,
    /// Environment variable globs withheld from child processes.
    pub env_denylist: Option<Vec<String>>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_exec_timeout_secs(),
            interpreter: default_interpreter(),
            extension: default_extension(),
            venv: None,
            scratch_dir: None,
            max_output_bytes: default_max_output_bytes(),
            reap_completed: true,
            env_denylist: None,
        }
    }
}

/// Shell configuration for command execution.
///
/// ```toml
/// [shell]
/// binary = "pwsh"
/// args = ["-NoProfile", "-Command"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    /// Override shell binary (e.g., "pwsh", "bash", "/usr/local/bin/fish").
    pub binary: Option<String>,
    /// Override shell args (e.g., `["-c"]` or `["/C"]`).
    pub args: Option<Vec<String>>,
    #[serde(default = "default_shell_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            binary: None,
            args: None,
            timeout_secs: default_shell_timeout_secs(),
        }
    }
}

/// Folder scan settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Directory names skipped at any depth.
    #[serde(default = "default_ignored_folders")]
    pub ignored_folders: Vec<String>,
    /// Character budget for the generated document.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ignored_folders: default_ignored_folders(),
            max_chars: default_max_chars(),
        }
    }
}
