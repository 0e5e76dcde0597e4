//! Bounded re-application of failed files.
//!
//! The coordinator never judges results itself. A [`RetryPolicy`] decides which
//! files to re-run and may rewrite their instructions; the coordinator enforces
//! the attempt cap and keeps requests inside the batch.

use std::future::Future;
use std::pin::Pin;

use mender_types::{EditStatus, FileEditOutcome, FileEditSpec, RetryDecision};
use tracing::{debug, info, warn};

use crate::cache::ContentCache;
use crate::error::EditError;
use crate::orchestrator::EditOrchestrator;

pub type PolicyFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default total passes per file, counting the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Pluggable retry judgment.
pub trait RetryPolicy: Send + Sync {
    fn decide<'a>(&'a self, outcomes: &'a [FileEditOutcome]) -> PolicyFut<'a, RetryDecision>;

    /// Instructions for the next attempt at `spec`.
    ///
    /// The default re-sends the same text. Blocks that already landed are
    /// no-ops on the second pass, so only the failed ones do any work.
    fn revise_instructions<'a>(
        &'a self,
        spec: &'a FileEditSpec,
        _previous: &'a FileEditOutcome,
    ) -> PolicyFut<'a, String> {
        Box::pin(async move { spec.instructions.to_string() })
    }
}

/// Never asks for another pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn decide<'a>(&'a self, _outcomes: &'a [FileEditOutcome]) -> PolicyFut<'a, RetryDecision> {
        Box::pin(async { RetryDecision::stop() })
    }
}

/// Retries every file that ended `partial_success` or `no_changes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryOnFailure;

impl RetryPolicy for RetryOnFailure {
    fn decide<'a>(&'a self, outcomes: &'a [FileEditOutcome]) -> PolicyFut<'a, RetryDecision> {
        Box::pin(async move {
            let files: Vec<&str> = outcomes
                .iter()
                .filter(|o| matches!(o.status, EditStatus::PartialSuccess | EditStatus::NoChanges))
                .map(|o| o.path.as_str())
                .collect();
            if files.is_empty() {
                RetryDecision::stop()
            } else {
                RetryDecision::retry(files)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryReport {
    /// Latest outcome per spec, in input order.
    pub outcomes: Vec<FileEditOutcome>,
    /// Passes run per spec, aligned with `outcomes`.
    pub attempts: Vec<u32>,
    pub console_output: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryCoordinator {
    max_attempts: u32,
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryCoordinator {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the first pass, then keep re-running what the policy asks for until
    /// it declines or every requested file is out of attempts.
    ///
    /// Only the first pass can fail the whole call. A retry pass that aborts is
    /// logged and ends the loop with the outcomes gathered so far.
    pub async fn run(
        &self,
        orchestrator: &EditOrchestrator,
        specs: &[FileEditSpec],
        cache: &mut ContentCache,
        policy: &dyn RetryPolicy,
    ) -> Result<RetryReport, EditError> {
        let first = orchestrator.apply_batch(specs, cache)?;
        let mut outcomes = first.outcomes;
        let mut attempts = vec![1u32; specs.len()];
        let mut current: Vec<FileEditSpec> = specs.to_vec();
        let mut console = vec![first.console_output];

        while attempts.iter().any(|&n| n < self.max_attempts) {
            let decision = policy.decide(&outcomes).await;
            if !decision.retry {
                debug!("Retry policy declined");
                break;
            }

            let requested = filter_requested(&decision, specs);
            let eligible: Vec<usize> = (0..specs.len())
                .filter(|&i| {
                    requested.contains(&specs[i].path.as_str()) && attempts[i] < self.max_attempts
                })
                .collect();
            if eligible.is_empty() {
                debug!("No eligible files to retry");
                break;
            }

            let mut indices = Vec::with_capacity(eligible.len());
            let mut retry_specs = Vec::with_capacity(eligible.len());
            for i in eligible {
                let instructions = policy.revise_instructions(&current[i], &outcomes[i]).await;
                match FileEditSpec::new(current[i].path.as_str(), instructions) {
                    Ok(spec) => {
                        current[i] = spec.clone();
                        indices.push(i);
                        retry_specs.push(spec);
                    }
                    Err(_) => warn!(
                        path = %current[i].path,
                        "Revised instructions were empty; not retrying"
                    ),
                }
            }
            if retry_specs.is_empty() {
                break;
            }

            info!(files = retry_specs.len(), "Retrying edits");
            let report = match orchestrator.apply_batch(&retry_specs, cache) {
                Ok(report) => report,
                Err(err) => {
                    warn!("Retry pass aborted: {err}");
                    console.push(format!("Retry aborted: {err}"));
                    break;
                }
            };
            for (i, outcome) in indices.into_iter().zip(report.outcomes) {
                attempts[i] += 1;
                outcomes[i] = merge_retry_outcome(&outcomes[i], outcome);
            }
            console.push(report.console_output);
        }

        Ok(RetryReport {
            outcomes,
            attempts,
            console_output: console.join("\n"),
        })
    }
}

/// Fold a retry pass into the file's running outcome.
///
/// A pass that changed nothing leaves earlier edits on disk, so the earlier
/// status and content stand and only `failed_edits` is refreshed.
fn merge_retry_outcome(previous: &FileEditOutcome, latest: FileEditOutcome) -> FileEditOutcome {
    let kept = previous.edited_content.is_some() && latest.status == EditStatus::NoChanges;
    if !kept {
        return latest;
    }
    FileEditOutcome {
        failed_edits: latest.failed_edits,
        ..previous.clone()
    }
}

/// Paths from `decision` that name a file in the batch.
fn filter_requested<'s>(decision: &RetryDecision, specs: &'s [FileEditSpec]) -> Vec<&'s str> {
    let mut requested = Vec::new();
    for path in &decision.files_to_retry {
        match specs.iter().find(|s| s.path.as_str() == path) {
            Some(spec) => requested.push(spec.path.as_str()),
            None => warn!(path = %path, "Ignoring retry request for a file outside the batch"),
        }
    }
    requested
}
