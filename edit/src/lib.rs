//! Patch engine: turns SEARCH/REPLACE text into applied file edits.
//!
//! The pipeline runs parser → matcher → applier per file, the orchestrator
//! drives a batch of files, and the retry coordinator may re-run part of a
//! batch under a caller-supplied policy.

mod applier;
mod cache;
mod error;
mod matcher;
mod orchestrator;
mod parser;
mod retry;

pub use applier::{AppliedEdit, ApplyReport, apply_and_persist, apply_to_content};
pub use cache::ContentCache;
pub use error::EditError;
pub use matcher::{Anchor, MatchConfig, MatchKind, locate, similarity_ratio};
pub use orchestrator::{BatchReport, EditOrchestrator, validate_files_structure};
pub use parser::{BlockKind, MalformedResponse, parse_edit_blocks, strip_markers, validate_instructions};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, NeverRetry, PolicyFut, RetryCoordinator, RetryOnFailure, RetryPolicy,
    RetryReport,
};

/// Settings for one edit session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditConfig {
    pub matching: MatchConfig,
    /// Total passes per file, counting the first.
    pub max_attempts: u32,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            matching: MatchConfig::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}
