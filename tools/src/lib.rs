//! Tool dispatcher - typed tool calls, error mapping, and the built-in handlers.

pub mod config;
pub mod exec;
pub mod files;
pub mod process;
pub mod scan;
pub mod search;
mod session;
pub mod shell;

use std::path::PathBuf;
use std::time::Duration;

use mender_edit::EditError;
use serde::Deserialize;
use serde_json::Value;

pub use config::{ExecConfig, ScanConfig, ShellConfig};
pub use exec::{Execution, ExecutionHost, ProcessRecord, ProcessState, StopOutcome};
pub use session::{Session, SessionSettings};
pub use shell::{DetectedShell, ShellOutput};

// ============================================================================
// Tool names and calls
// ============================================================================

/// Every tool the dispatcher knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    CreateFiles,
    CreateFolders,
    ListFiles,
    ReadMultipleFiles,
    EditAndApplyMultiple,
    RunShellCommand,
    Search,
    ExecuteCode,
    StopProcess,
    ScanFolder,
}

impl ToolName {
    pub const ALL: [ToolName; 10] = [
        ToolName::CreateFiles,
        ToolName::CreateFolders,
        ToolName::ListFiles,
        ToolName::ReadMultipleFiles,
        ToolName::EditAndApplyMultiple,
        ToolName::RunShellCommand,
        ToolName::Search,
        ToolName::ExecuteCode,
        ToolName::StopProcess,
        ToolName::ScanFolder,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ToolName::CreateFiles => "create_files",
            ToolName::CreateFolders => "create_folders",
            ToolName::ListFiles => "list_files",
            ToolName::ReadMultipleFiles => "read_multiple_files",
            ToolName::EditAndApplyMultiple => "edit_and_apply_multiple",
            ToolName::RunShellCommand => "run_shell_command",
            ToolName::Search => "search",
            ToolName::ExecuteCode => "execute_code",
            ToolName::StopProcess => "stop_process",
            ToolName::ScanFolder => "scan_folder",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    /// Keys that must be present (and non-null) in the input object.
    #[must_use]
    pub const fn required_params(self) -> &'static [&'static str] {
        match self {
            ToolName::CreateFiles | ToolName::EditAndApplyMultiple => &["files"],
            ToolName::CreateFolders | ToolName::ReadMultipleFiles => &["paths"],
            ToolName::ListFiles => &[],
            ToolName::RunShellCommand => &["command"],
            ToolName::Search => &["query"],
            ToolName::ExecuteCode => &["code"],
            ToolName::StopProcess => &["process_id"],
            ToolName::ScanFolder => &["folder_path", "output_file"],
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(one) => vec![one],
            OneOrMany::Many(many) => many,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFilesArgs {
    pub files: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFoldersArgs {
    pub paths: OneOrMany,
}

fn default_dot() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListFilesArgs {
    #[serde(default = "default_dot")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadFilesArgs {
    pub paths: OneOrMany,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditFilesArgs {
    pub files: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShellArgs {
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteCodeArgs {
    pub code: String,
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopProcessArgs {
    pub process_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanFolderArgs {
    pub folder_path: String,
    pub output_file: String,
}

/// A validated tool invocation.
#[derive(Debug, Clone)]
pub enum ToolCall {
    CreateFiles(CreateFilesArgs),
    CreateFolders(CreateFoldersArgs),
    ListFiles(ListFilesArgs),
    ReadMultipleFiles(ReadFilesArgs),
    EditAndApplyMultiple(EditFilesArgs),
    RunShellCommand(ShellArgs),
    Search(search::SearchArgs),
    ExecuteCode(ExecuteCodeArgs),
    StopProcess(StopProcessArgs),
    ScanFolder(ScanFolderArgs),
}

impl ToolCall {
    /// Resolve the tool name, check required keys, then deserialize.
    pub fn parse(name: &str, input: &Value) -> Result<Self, ToolError> {
        let tool = ToolName::parse(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;

        for &parameter in tool.required_params() {
            if input.get(parameter).is_none_or(Value::is_null) {
                return Err(ToolError::MissingParameter { parameter, tool });
            }
        }

        let empty = Value::Object(serde_json::Map::new());
        let input = if input.is_object() { input } else { &empty };
        Ok(match tool {
            ToolName::CreateFiles => ToolCall::CreateFiles(parse_args(input)?),
            ToolName::CreateFolders => ToolCall::CreateFolders(parse_args(input)?),
            ToolName::ListFiles => ToolCall::ListFiles(parse_args(input)?),
            ToolName::ReadMultipleFiles => ToolCall::ReadMultipleFiles(parse_args(input)?),
            ToolName::EditAndApplyMultiple => ToolCall::EditAndApplyMultiple(parse_args(input)?),
            ToolName::RunShellCommand => ToolCall::RunShellCommand(parse_args(input)?),
            ToolName::Search => ToolCall::Search(parse_args(input)?),
            ToolName::ExecuteCode => ToolCall::ExecuteCode(parse_args(input)?),
            ToolName::StopProcess => ToolCall::StopProcess(parse_args(input)?),
            ToolName::ScanFolder => ToolCall::ScanFolder(parse_args(input)?),
        })
    }

    #[must_use]
    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::CreateFiles(_) => ToolName::CreateFiles,
            ToolCall::CreateFolders(_) => ToolName::CreateFolders,
            ToolCall::ListFiles(_) => ToolName::ListFiles,
            ToolCall::ReadMultipleFiles(_) => ToolName::ReadMultipleFiles,
            ToolCall::EditAndApplyMultiple(_) => ToolName::EditAndApplyMultiple,
            ToolCall::RunShellCommand(_) => ToolName::RunShellCommand,
            ToolCall::Search(_) => ToolName::Search,
            ToolCall::ExecuteCode(_) => ToolName::ExecuteCode,
            ToolCall::StopProcess(_) => ToolName::StopProcess,
            ToolCall::ScanFolder(_) => ToolName::ScanFolder,
        }
    }
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::BadArgs {
        message: e.to_string(),
    })
}

// ============================================================================
// Errors
// ============================================================================

/// Error types for tool execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("Missing required parameter '{parameter}' for tool {tool}")]
    MissingParameter {
        parameter: &'static str,
        tool: ToolName,
    },
    #[error("Bad tool args: {message}")]
    BadArgs { message: String },
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Tool timed out: {tool} after {}s", elapsed.as_secs())]
    Timeout { tool: ToolName, elapsed: Duration },
    #[error("Tool execution failed: {tool}: {message}")]
    ExecutionFailed { tool: ToolName, message: String },
}

impl ToolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ToolError::Io {
            path: path.into(),
            source,
        }
    }

    /// The user-facing text a failed dispatch reports.
    #[must_use]
    pub fn dispatch_message(&self, tool: &str) -> String {
        match self {
            ToolError::UnknownTool { .. } => self.to_string(),
            ToolError::MissingParameter { .. } => format!("Error: {self}"),
            _ => format!("Error executing tool {tool}: {self}"),
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Sanitizes environment variables before executing commands.
#[derive(Debug, Clone)]
pub struct EnvSanitizer {
    denylist: globset::GlobSet,
}

impl EnvSanitizer {
    pub fn new(patterns: &[String]) -> Result<Self, ToolError> {
        let mut builder = globset::GlobSetBuilder::new();
        for pat in patterns {
            let mut glob = globset::GlobBuilder::new(pat);
            // Env names are matched case-insensitively: API_KEY, api_key and Api_Key alike.
            glob.case_insensitive(true);
            let glob = glob.build().map_err(|e| ToolError::BadArgs {
                message: format!("Invalid env denylist pattern '{pat}': {e}"),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ToolError::BadArgs {
            message: format!("Invalid env denylist: {e}"),
        })?;
        Ok(Self { denylist: set })
    }

    /// Sanitizer built from [`mender_types::ENV_SECRET_DENYLIST`].
    pub fn secrets() -> Result<Self, ToolError> {
        let patterns: Vec<String> = mender_types::ENV_SECRET_DENYLIST
            .iter()
            .map(ToString::to_string)
            .collect();
        Self::new(&patterns)
    }

    #[must_use]
    pub fn sanitize_env(&self, env: &[(String, String)]) -> Vec<(String, String)> {
        env.iter()
            .filter(|(k, _)| !self.denylist.is_match(k))
            .cloned()
            .collect()
    }
}
