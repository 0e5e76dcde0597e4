use std::path::PathBuf;

use thiserror::Error;

use crate::parser::MalformedResponse;

/// Error types for the edit pipeline.
///
/// `MalformedInstructions` and `Validation` abort a batch before any file is
/// touched. `Io` is converted into a per-file `error` outcome by the orchestrator.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("Malformed edit instructions for {path}: {source}")]
    MalformedInstructions {
        path: String,
        #[source]
        source: MalformedResponse,
    },
    #[error("{0}")]
    Validation(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EditError {
    /// Whether this error stops the whole batch rather than one file.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EditError::MalformedInstructions { .. } | EditError::Validation(_)
        )
    }
}
