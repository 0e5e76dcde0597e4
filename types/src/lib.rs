//! Core domain types for Mender.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod ids;
pub use ids::ProcessId;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// NonEmpty String Types
// ============================================================================

/// A string guaranteed to be non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Error)]
#[error("value must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Environment policy
// ============================================================================

/// Environment variable patterns stripped from spawned processes by default.
///
/// Matched case-insensitively as globs.
pub const ENV_SECRET_DENYLIST: &[&str] = &[
    "*_KEY",
    "*_KEYS",
    "*_SECRET",
    "*_SECRETS",
    "*_TOKEN",
    "*_TOKENS",
    "*_PASSWORD",
    "*_CREDENTIALS",
    "AWS_*",
    "ANTHROPIC_*",
    "OPENAI_*",
    "GITHUB_TOKEN",
    "DYLD_*",
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
];

// ============================================================================
// Edit Types
// ============================================================================

/// One parsed `(search, replace)` substitution.
///
/// Immutable once produced: fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditBlock {
    search: String,
    replace: String,
    similarity: f64,
}

impl EditBlock {
    /// Build a block with an explicit similarity, clamped to `[0, 1]`.
    #[must_use]
    pub fn new(search: impl Into<String>, replace: impl Into<String>, similarity: f64) -> Self {
        let similarity = if similarity.is_nan() {
            0.0
        } else {
            similarity.clamp(0.0, 1.0)
        };
        Self {
            search: search.into(),
            replace: replace.into(),
            similarity,
        }
    }

    #[must_use]
    pub fn exact(search: impl Into<String>, replace: impl Into<String>) -> Self {
        Self::new(search, replace, 1.0)
    }

    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    #[must_use]
    pub fn replace(&self) -> &str {
        &self.replace
    }

    #[must_use]
    pub fn similarity(&self) -> f64 {
        self.similarity
    }
}

/// One file's entry in a multi-file edit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEditSpec {
    pub path: NonEmptyString,
    pub instructions: NonEmptyString,
}

impl FileEditSpec {
    pub fn new(
        path: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Result<Self, EmptyStringError> {
        Ok(Self {
            path: NonEmptyString::new(path)?,
            instructions: NonEmptyString::new(instructions)?,
        })
    }
}

/// Terminal status of one file in one orchestration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    Success,
    PartialSuccess,
    NoChanges,
    NoInstructions,
    Error,
}

impl EditStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::NoChanges => "no_changes",
            Self::NoInstructions => "no_instructions",
            Self::Error => "error",
        }
    }

    /// Whether the pass wrote new content for the file.
    #[must_use]
    pub const fn changed(self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }
}

impl std::fmt::Display for EditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file result of one orchestration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEditOutcome {
    pub path: String,
    pub status: EditStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_edits: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_content: Option<String>,
}

impl FileEditOutcome {
    #[must_use]
    pub fn success(path: impl Into<String>, edited_content: String) -> Self {
        let path = path.into();
        Self {
            message: format!("All changes successfully applied to {path}"),
            path,
            status: EditStatus::Success,
            failed_edits: Vec::new(),
            edited_content: Some(edited_content),
        }
    }

    #[must_use]
    pub fn partial_success(
        path: impl Into<String>,
        failed_edits: Vec<String>,
        edited_content: String,
    ) -> Self {
        let path = path.into();
        Self {
            message: format!("Some changes applied to {path}, but some edits failed."),
            path,
            status: EditStatus::PartialSuccess,
            failed_edits,
            edited_content: Some(edited_content),
        }
    }

    #[must_use]
    pub fn no_changes(path: impl Into<String>, failed_edits: Vec<String>) -> Self {
        let path = path.into();
        Self {
            message: format!(
                "No changes could be applied to {path}. Please review the edit instructions and try again."
            ),
            path,
            status: EditStatus::NoChanges,
            failed_edits,
            edited_content: None,
        }
    }

    #[must_use]
    pub fn no_instructions(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            message: format!("No edit instructions generated for {path}"),
            path,
            status: EditStatus::NoInstructions,
            failed_edits: Vec::new(),
            edited_content: None,
        }
    }

    #[must_use]
    pub fn error(path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        let path = path.into();
        Self {
            message: format!("Error editing/applying to file {path}: {error}"),
            path,
            status: EditStatus::Error,
            failed_edits: Vec::new(),
            edited_content: None,
        }
    }
}

/// Judgment returned by a retry policy after one orchestration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryDecision {
    #[serde(default)]
    pub retry: bool,
    #[serde(default)]
    pub files_to_retry: Vec<String>,
}

impl RetryDecision {
    #[must_use]
    pub fn stop() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn retry(files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            retry: true,
            files_to_retry: files.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Tool Result
// ============================================================================

/// Normalized shape returned by every dispatched tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Value,
    pub is_error: bool,
    #[serde(default)]
    pub console_output: Option<String>,
}

impl ToolResult {
    #[must_use]
    pub fn ok(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            console_output: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: Value::String(message.into()),
            is_error: true,
            console_output: None,
        }
    }

    #[must_use]
    pub fn with_console_output(mut self, console_output: Option<String>) -> Self {
        self.console_output = console_output.filter(|s| !s.is_empty());
        self
    }

    /// Content rendered as text: strings verbatim, everything else as pretty JSON.
    #[must_use]
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}
